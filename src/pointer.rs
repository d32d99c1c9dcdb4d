// Copyright 2025 Oxide Computer Company

//! JSON pointer trail for diff results.
//!
//! Comparators thread a [`Pointer`] through each recursive call so every
//! reported difference carries the location it was detected at. Appending
//! returns a new value; the parent's pointer is never mutated.

use std::fmt;

use crate::reference::escape_pointer_segment;

/// An immutable JSON pointer (RFC 6901), rooted at `#`.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Pointer {
    path: String,
}

impl Pointer {
    pub fn root() -> Self {
        Self { path: "#".to_string() }
    }

    /// Start at `#/paths/<path>/<method>`.
    pub fn for_operation(api_path: &str, method: &str) -> Self {
        Self {
            path: format!("#/paths/{}/{}", escape_pointer_segment(api_path), method),
        }
    }

    /// Append one segment, escaping special characters per RFC 6901.
    pub fn append(&self, segment: &str) -> Self {
        Self {
            path: format!("{}/{}", self.path, escape_pointer_segment(segment)),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.path
    }
}

impl fmt::Display for Pointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path)
    }
}

impl fmt::Debug for Pointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operation_pointer_escapes_path() {
        let p = Pointer::for_operation("/users/{id}", "get");
        assert_eq!(p.as_str(), "#/paths/~1users~1{id}/get");
    }

    #[test]
    fn append_escapes_segments() {
        let p = Pointer::root().append("foo/bar").append("a~b");
        assert_eq!(p.as_str(), "#/foo~1bar/a~0b");
    }

    #[test]
    fn display_matches_as_str() {
        let p = Pointer::for_operation("/pets", "post").append("responses").append("201");
        assert_eq!(p.to_string(), "#/paths/~1pets/post/responses/201");
    }
}
