// Copyright 2025 Oxide Computer Company

//! Error taxonomy for loading, resolution, and comparison.
//!
//! Three tiers, matching how each failure is surfaced:
//!
//! - [`DiffError`]: the input is unprocessable (not merely "different").
//!   These abort the comparison.
//! - [`ResolveError`]: a single reference could not be resolved. Recorded as
//!   a [`Diagnostic`] on the result; the affected node is treated as absent.
//! - [`LoadError`]: I/O failures from the document loader. These propagate
//!   from the async load step and are never retried here.

use std::fmt;

use thiserror::Error;

/// Fatal, parse-time structural errors.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum DiffError {
    /// Two path templates normalize to the same signature; neither can be
    /// silently preferred.
    #[error(
        "ambiguous path templates: {first:?} and {second:?} \
         normalize to the same route signature"
    )]
    AmbiguousPath { first: String, second: String },

    /// A composed (oneOf) schema without a usable discriminator property
    /// name on one side.
    #[error("composed schema at {pointer} has no discriminator property")]
    MalformedDiscriminator { pointer: String },

    /// A named path parameter does not appear in the operation's path
    /// template.
    #[error("path parameter {name:?} does not appear in path {path:?}")]
    UnknownPathParameter { name: String, path: String },

    /// The document at `location` is not a deserializable OpenAPI
    /// description.
    #[error("error deserializing OpenAPI document {location:?}")]
    Document {
        location: String,
        #[source]
        source: serde_json::Error,
    },

    /// A document location was referenced but never registered in the
    /// workspace.
    #[error("document {location:?} is not registered in the workspace")]
    UnknownDocument { location: String },

    #[error(transparent)]
    Load(#[from] LoadError),
}

/// Failure to load a document's bytes.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum LoadError {
    #[error("failed to read {location:?}")]
    Io {
        location: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to fetch {location:?}")]
    Http {
        location: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{location:?} is neither valid JSON nor valid YAML")]
    Decode { location: String },

    #[error("unsupported location scheme in {location:?}")]
    UnsupportedScheme { location: String },
}

/// Soft, per-reference resolution failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ResolveError {
    /// The pointer does not designate a node in the target document.
    #[error("reference {reference:?} not found")]
    NotFound { reference: String },

    /// The reference crosses into a document that is not registered (or
    /// external resolution is disabled).
    #[error("reference {reference:?} leaves the resolvable document set")]
    Unresolved { reference: String },

    /// The reference chain revisited a reference already being resolved.
    #[error("reference cycle while resolving {reference:?}")]
    Cycle { reference: String },

    /// The target node exists but does not deserialize as the requested
    /// component type.
    #[error("reference {reference:?} does not denote the expected component type")]
    WrongType { reference: String },

    /// The reference text itself is not a usable pointer.
    #[error("malformed reference {reference:?}")]
    Malformed { reference: String },
}

impl ResolveError {
    pub fn reference(&self) -> &str {
        match self {
            ResolveError::NotFound { reference }
            | ResolveError::Unresolved { reference }
            | ResolveError::Cycle { reference }
            | ResolveError::WrongType { reference }
            | ResolveError::Malformed { reference } => reference,
        }
    }
}

/// A non-fatal problem encountered while comparing, attached to the result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// JSON pointer to the node the problem was encountered at.
    pub pointer: String,
    pub message: String,
}

impl Diagnostic {
    pub(crate) fn new(pointer: impl ToString, message: impl ToString) -> Self {
        Self {
            pointer: pointer.to_string(),
            message: message.to_string(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.pointer, self.message)
    }
}
