// Copyright 2025 Oxide Computer Company

//! Ambient comparison state threaded through the recursive comparators.
//!
//! A [`DiffContext`] is immutable: each recursive call derives a new context
//! via copy-with-override instead of mutating its parent's. It carries the
//! request/response direction (which drives read-only/write-only visibility),
//! whether the value under comparison is required in its parent, the pointer
//! trail for reporting, and the traversal-local seen set that truncates
//! recursion into already-visited reference pairs.

use std::collections::BTreeSet;

use crate::pointer::Pointer;

/// Whether the schemas under comparison describe request or response data.
///
/// The direction decides both property visibility (a write-only property
/// does not exist in a response, a read-only one does not exist in a
/// request) and which side of a change breaks which party.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Direction {
    Request,
    Response,
}

/// A `(old side, new side)` pair of reference ids; `None` for an inline
/// schema on that side.
type RefPair = (Option<String>, Option<String>);

#[derive(Clone, Debug)]
pub struct DiffContext {
    pub direction: Direction,
    /// Whether the parent marks this value required.
    pub required: bool,
    /// Where in the document the comparison currently is.
    pub pointer: Pointer,
    seen: BTreeSet<RefPair>,
}

impl DiffContext {
    pub fn new(direction: Direction, pointer: Pointer) -> Self {
        Self {
            direction,
            required: true,
            pointer,
            seen: BTreeSet::new(),
        }
    }

    pub fn with_required(&self, required: bool) -> Self {
        Self {
            required,
            ..self.clone()
        }
    }

    /// Descend one pointer segment.
    pub fn descend(&self, segment: &str) -> Self {
        Self {
            pointer: self.pointer.append(segment),
            ..self.clone()
        }
    }

    /// Record that comparison is entering the given reference pair.
    ///
    /// Returns `None` if the pair was already visited on this comparison
    /// path: the caller must treat the edge as already covered instead of
    /// descending again. Pairs with no reference on either side are never
    /// recorded (inline schemas cannot close a cycle).
    pub fn enter_refs(&self, old_ref: Option<&str>, new_ref: Option<&str>) -> Option<Self> {
        if old_ref.is_none() && new_ref.is_none() {
            return Some(self.clone());
        }
        let pair: RefPair = (old_ref.map(str::to_string), new_ref.map(str::to_string));
        if self.seen.contains(&pair) {
            return None;
        }
        let mut next = self.clone();
        next.seen.insert(pair);
        Some(next)
    }

    pub fn is_request(&self) -> bool {
        self.direction == Direction::Request
    }

    pub fn is_response(&self) -> bool {
        self.direction == Direction::Response
    }
}
