// Copyright 2025 Oxide Computer Company

//! Typed `$ref` descriptors.
//!
//! A [`Reference`] records where a referenceable object lives: which
//! component section (its kind), its component name, and, for references
//! that cross document boundaries, the external resource holding it. The
//! textual form round-trips: `Reference::parse(s).to_string()` designates
//! the same target as `s`.

use std::fmt;

use crate::error::ResolveError;

/// The component section a reference points into.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ReferenceKind {
    Schema,
    Parameter,
    Response,
    Header,
    RequestBody,
    Example,
    SecurityScheme,
    Link,
    Callback,
    Tag,
}

impl ReferenceKind {
    /// The key under `components` holding this kind, or `None` for tags
    /// (which live at the document root and are resolved by name).
    pub fn component_section(&self) -> Option<&'static str> {
        match self {
            ReferenceKind::Schema => Some("schemas"),
            ReferenceKind::Parameter => Some("parameters"),
            ReferenceKind::Response => Some("responses"),
            ReferenceKind::Header => Some("headers"),
            ReferenceKind::RequestBody => Some("requestBodies"),
            ReferenceKind::Example => Some("examples"),
            ReferenceKind::SecurityScheme => Some("securitySchemes"),
            ReferenceKind::Link => Some("links"),
            ReferenceKind::Callback => Some("callbacks"),
            ReferenceKind::Tag => None,
        }
    }

    fn from_section(section: &str) -> Option<Self> {
        match section {
            "schemas" => Some(ReferenceKind::Schema),
            "parameters" => Some(ReferenceKind::Parameter),
            "responses" => Some(ReferenceKind::Response),
            "headers" => Some(ReferenceKind::Header),
            "requestBodies" => Some(ReferenceKind::RequestBody),
            "examples" => Some(ReferenceKind::Example),
            "securitySchemes" => Some(ReferenceKind::SecurityScheme),
            "links" => Some(ReferenceKind::Link),
            "callbacks" => Some(ReferenceKind::Callback),
            _ => None,
        }
    }
}

/// A parsed reference to a reusable component.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Reference {
    pub kind: ReferenceKind,
    /// The component name, unescaped.
    pub id: String,
    /// The document holding the component, or `None` for a reference local
    /// to the current document.
    pub external_resource: Option<String>,
}

impl Reference {
    pub fn schema(id: impl ToString) -> Self {
        Self {
            kind: ReferenceKind::Schema,
            id: id.to_string(),
            external_resource: None,
        }
    }

    /// Parse reference text of the form `[resource]#/components/<section>/<id>`.
    ///
    /// A missing fragment, a fragment pointing outside `components`, or an
    /// empty component name is malformed.
    pub fn parse(text: &str) -> Result<Self, ResolveError> {
        let malformed = || ResolveError::Malformed {
            reference: text.to_string(),
        };

        let (resource, fragment) = match text.split_once('#') {
            Some((resource, fragment)) => (resource, fragment),
            None => return Err(malformed()),
        };

        let rest = fragment.strip_prefix("/components/").ok_or_else(malformed)?;
        let (section, id) = rest.split_once('/').ok_or_else(malformed)?;
        let kind = ReferenceKind::from_section(section).ok_or_else(malformed)?;
        if id.is_empty() || id.contains('/') {
            return Err(malformed());
        }

        Ok(Self {
            kind,
            id: unescape_pointer_segment(id),
            external_resource: (!resource.is_empty()).then(|| resource.to_string()),
        })
    }

    pub fn is_external(&self) -> bool {
        self.external_resource.is_some()
    }

    /// The fragment part of the reference (a JSON pointer into the owning
    /// document, without the leading `#`).
    pub fn fragment(&self) -> String {
        // Tags have no component section; kept for Display completeness but
        // never used as a pointer (tags resolve by name).
        match self.kind.component_section() {
            Some(section) => {
                format!("/components/{}/{}", section, escape_pointer_segment(&self.id))
            }
            None => format!("/tags/{}", escape_pointer_segment(&self.id)),
        }
    }

    /// The canonical string keying this reference in resolution caches:
    /// `<owning location>#<fragment>`.
    pub fn canonical(&self, base_location: &str) -> String {
        let location = self.external_resource.as_deref().unwrap_or(base_location);
        format!("{}#{}", location, self.fragment())
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(resource) = &self.external_resource {
            write!(f, "{}", resource)?;
        }
        write!(f, "#{}", self.fragment())
    }
}

/// Escape a segment for use in a JSON pointer per RFC 6901.
pub(crate) fn escape_pointer_segment(segment: &str) -> String {
    segment.replace('~', "~0").replace('/', "~1")
}

pub(crate) fn unescape_pointer_segment(segment: &str) -> String {
    segment.replace("~1", "/").replace("~0", "~")
}
