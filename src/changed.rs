// Copyright 2025 Oxide Computer Company

//! The diff result model.
//!
//! Comparators build a tree of `Changed*` records: each record is created
//! empty, populated field-by-field during one comparison pass, and never
//! mutated after the comparator returns. A record that ends up carrying no
//! difference is collapsed to `None` by its builder (see the `into_option`
//! methods), bottom-up, so a present record always means "something to
//! report".
//!
//! Compatibility classification is a pure function over the built tree
//! ([`DiffNode::compatibility`]); it is applied when the result is consumed,
//! never recomputed mid-traversal.

use indexmap::IndexMap;
use openapiv3::{Parameter, Schema, SecurityRequirement};

use crate::{context::Direction, error::Diagnostic, pointer::Pointer};

/// Overall verdict for one node of the diff tree.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Compatibility {
    /// No difference at all.
    Unchanged,
    /// Different, but old and new clients/servers continue to interoperate.
    Compatible,
    /// Different in a way that can break one side.
    Incompatible,
}

impl Compatibility {
    /// Combine two verdicts, keeping the more severe one.
    pub fn and(self, other: Compatibility) -> Compatibility {
        self.max(other)
    }

    fn over<I: IntoIterator<Item = Compatibility>>(iter: I) -> Compatibility {
        iter.into_iter()
            .fold(Compatibility::Unchanged, Compatibility::and)
    }
}

/// Read-only predicates every node of the diff tree exposes.
pub trait DiffNode {
    fn compatibility(&self) -> Compatibility;

    fn is_unchanged(&self) -> bool {
        self.compatibility() == Compatibility::Unchanged
    }

    /// Unchanged counts as compatible.
    fn is_compatible(&self) -> bool {
        self.compatibility() != Compatibility::Incompatible
    }

    fn is_incompatible(&self) -> bool {
        self.compatibility() == Compatibility::Incompatible
    }
}

/// An attribute that differs between the two documents.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Changed<T> {
    pub old: T,
    pub new: T,
}

impl<T: PartialEq + Clone> Changed<T> {
    /// `Some` only when the values actually differ.
    pub fn of(old: &T, new: &T) -> Option<Changed<T>> {
        (old != new).then(|| Changed {
            old: old.clone(),
            new: new.clone(),
        })
    }
}

/// Set difference of a named collection (required lists, enum values,
/// security schemes, ...).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ElementDiff<T> {
    /// Present in the new document only.
    pub increased: Vec<T>,
    /// Present in the old document only.
    pub missing: Vec<T>,
}

impl<T> ElementDiff<T> {
    pub fn is_empty(&self) -> bool {
        self.increased.is_empty() && self.missing.is_empty()
    }
}

impl<T: PartialEq + Clone> ElementDiff<T> {
    /// Set difference of two element lists; shared elements are unmentioned.
    pub fn of(old: &[T], new: &[T]) -> ElementDiff<T> {
        ElementDiff {
            increased: new.iter().filter(|e| !old.contains(e)).cloned().collect(),
            missing: old.iter().filter(|e| !new.contains(e)).cloned().collect(),
        }
    }
}

/// Difference between two schema graphs.
///
/// Holds read-only copies of both input schemas so consumers can resolve
/// display details later; it shares no mutable state with the inputs.
#[derive(Clone, Debug)]
pub struct ChangedSchema {
    pub old: Schema,
    pub new: Schema,
    pub direction: Direction,
    pub pointer: Pointer,

    /// The two sides have different structural kinds (or scalar types).
    /// When set, no deeper comparison was performed.
    pub type_changed: Option<Changed<String>>,

    pub changed_properties: IndexMap<String, ChangedSchema>,
    pub increased_properties: IndexMap<String, Schema>,
    pub missing_properties: IndexMap<String, Schema>,

    /// Array element schema difference.
    pub items: Option<Box<ChangedSchema>>,
    /// Additional-properties difference; kept separate from `*_properties`.
    pub additional_properties: Option<Box<ChangedSchema>>,
    /// Composed (discriminated oneOf) difference.
    pub one_of: Option<ChangedComposed>,

    pub enumeration: ElementDiff<String>,
    pub required: ElementDiff<String>,

    pub read_only: Option<Changed<bool>>,
    pub write_only: Option<Changed<bool>>,
    pub max_length: Option<Changed<Option<usize>>>,
    pub format: Option<Changed<Option<String>>>,
    pub default: Option<Changed<Option<String>>>,
    pub title: Option<Changed<Option<String>>>,
    pub description: Option<Changed<Option<String>>>,

    /// The schema became deprecated (the only reported transition).
    pub deprecated: bool,
    pub extensions_changed: bool,
    /// Discriminator property renamed, or a oneOf side had no alternatives.
    pub discriminator_changed: bool,
    /// Residual validation-keyword differences (pattern, numeric bounds,
    /// item counts, ...) not broken out above.
    pub constraints_changed: bool,
}

impl ChangedSchema {
    pub fn new(old: &Schema, new: &Schema, direction: Direction, pointer: Pointer) -> Self {
        Self {
            old: old.clone(),
            new: new.clone(),
            direction,
            pointer,
            type_changed: None,
            changed_properties: IndexMap::new(),
            increased_properties: IndexMap::new(),
            missing_properties: IndexMap::new(),
            items: None,
            additional_properties: None,
            one_of: None,
            enumeration: ElementDiff::default(),
            required: ElementDiff::default(),
            read_only: None,
            write_only: None,
            max_length: None,
            format: None,
            default: None,
            title: None,
            description: None,
            deprecated: false,
            extensions_changed: false,
            discriminator_changed: false,
            constraints_changed: false,
        }
    }

    /// Collapse a fully-unchanged record to the `None` sentinel.
    pub fn into_option(self) -> Option<Self> {
        (!self.is_unchanged()).then_some(self)
    }

    fn read_write_flip(&self, changed: &Option<Changed<bool>>, hides_in: Direction) -> Compatibility {
        match changed {
            // Becoming hidden in the current direction removes a visible
            // element; becoming visible adds one.
            Some(Changed { old: false, new: true }) if self.direction == hides_in => {
                Compatibility::Incompatible
            }
            Some(_) => Compatibility::Compatible,
            None => Compatibility::Unchanged,
        }
    }
}

impl DiffNode for ChangedSchema {
    fn compatibility(&self) -> Compatibility {
        let mut c = Compatibility::Unchanged;

        if self.type_changed.is_some() || self.discriminator_changed || self.constraints_changed {
            c = c.and(Compatibility::Incompatible);
        }

        // Newly-required names break requests; names no longer guaranteed
        // break responses.
        if !self.required.increased.is_empty() {
            c = c.and(match self.direction {
                Direction::Request => Compatibility::Incompatible,
                Direction::Response => Compatibility::Compatible,
            });
        }
        if !self.required.missing.is_empty() {
            c = c.and(match self.direction {
                Direction::Request => Compatibility::Compatible,
                Direction::Response => Compatibility::Incompatible,
            });
        }

        // Widening an enum is compatible, narrowing is not.
        if !self.enumeration.increased.is_empty() {
            c = c.and(Compatibility::Compatible);
        }
        if !self.enumeration.missing.is_empty() {
            c = c.and(Compatibility::Incompatible);
        }

        if !self.increased_properties.is_empty() {
            c = c.and(Compatibility::Compatible);
        }
        if !self.missing_properties.is_empty() {
            c = c.and(Compatibility::Incompatible);
        }

        c = c.and(self.read_write_flip(&self.read_only, Direction::Request));
        c = c.and(self.read_write_flip(&self.write_only, Direction::Response));

        if let Some(Changed { old, new }) = &self.max_length {
            let narrowed = match (old, new) {
                (_, None) => false,
                (None, Some(_)) => true,
                (Some(old), Some(new)) => new < old,
            };
            c = c.and(if narrowed {
                Compatibility::Incompatible
            } else {
                Compatibility::Compatible
            });
        }

        if self.format.is_some() {
            c = c.and(Compatibility::Incompatible);
        }

        if self.default.is_some()
            || self.title.is_some()
            || self.description.is_some()
            || self.deprecated
            || self.extensions_changed
        {
            c = c.and(Compatibility::Compatible);
        }

        c = c.and(Compatibility::over(
            self.changed_properties.values().map(DiffNode::compatibility),
        ));
        if let Some(items) = &self.items {
            c = c.and(items.compatibility());
        }
        if let Some(add) = &self.additional_properties {
            c = c.and(add.compatibility());
        }
        if let Some(one_of) = &self.one_of {
            c = c.and(one_of.compatibility());
        }

        c
    }
}

/// Difference between two discriminated `oneOf` schemas, keyed by
/// discriminator value.
#[derive(Clone, Debug, Default)]
pub struct ChangedComposed {
    pub increased: Vec<String>,
    pub missing: Vec<String>,
    pub changed: IndexMap<String, ChangedSchema>,
}

impl ChangedComposed {
    pub fn into_option(self) -> Option<Self> {
        (!self.is_unchanged()).then_some(self)
    }
}

impl DiffNode for ChangedComposed {
    fn compatibility(&self) -> Compatibility {
        let mut c = Compatibility::Unchanged;
        if !self.increased.is_empty() {
            c = c.and(Compatibility::Compatible);
        }
        if !self.missing.is_empty() {
            c = c.and(Compatibility::Incompatible);
        }
        c.and(Compatibility::over(
            self.changed.values().map(DiffNode::compatibility),
        ))
    }
}

/// One operation as an addressable endpoint.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Endpoint {
    pub path: String,
    pub method: String,
    pub operation_id: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct ChangedParameters {
    pub increased: Vec<Parameter>,
    pub missing: Vec<Parameter>,
    pub changed: Vec<ChangedParameter>,
}

impl ChangedParameters {
    pub fn into_option(self) -> Option<Self> {
        (!self.is_unchanged()).then_some(self)
    }
}

impl DiffNode for ChangedParameters {
    fn compatibility(&self) -> Compatibility {
        let mut c = Compatibility::Unchanged;
        for param in &self.increased {
            c = c.and(if param.parameter_data_ref().required {
                Compatibility::Incompatible
            } else {
                Compatibility::Compatible
            });
        }
        if !self.missing.is_empty() {
            c = c.and(Compatibility::Incompatible);
        }
        c.and(Compatibility::over(
            self.changed.iter().map(DiffNode::compatibility),
        ))
    }
}

#[derive(Clone, Debug)]
pub struct ChangedParameter {
    pub name: String,
    /// Where the parameter lives: `query`, `header`, `path`, or `cookie`.
    pub location: String,
    pub required: Option<Changed<bool>>,
    pub deprecated: bool,
    pub description: Option<Changed<Option<String>>>,
    pub schema: Option<ChangedSchema>,
}

impl ChangedParameter {
    pub fn into_option(self) -> Option<Self> {
        (!self.is_unchanged()).then_some(self)
    }
}

impl DiffNode for ChangedParameter {
    fn compatibility(&self) -> Compatibility {
        let mut c = Compatibility::Unchanged;
        match &self.required {
            Some(Changed { old: false, new: true }) => c = c.and(Compatibility::Incompatible),
            Some(_) => c = c.and(Compatibility::Compatible),
            None => {}
        }
        if self.deprecated || self.description.is_some() {
            c = c.and(Compatibility::Compatible);
        }
        if let Some(schema) = &self.schema {
            c = c.and(schema.compatibility());
        }
        c
    }
}

/// Request body difference, including one side not specifying a body at all.
#[derive(Clone, Debug)]
pub enum ChangedRequestBody {
    Added { required: bool },
    Removed { required: bool },
    Changed(ChangedBody),
}

impl DiffNode for ChangedRequestBody {
    fn compatibility(&self) -> Compatibility {
        match self {
            ChangedRequestBody::Added { required: true } => Compatibility::Incompatible,
            ChangedRequestBody::Added { required: false } => Compatibility::Compatible,
            ChangedRequestBody::Removed { .. } => Compatibility::Incompatible,
            ChangedRequestBody::Changed(body) => body.compatibility(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ChangedBody {
    pub required: Option<Changed<bool>>,
    pub description: Option<Changed<Option<String>>>,
    pub content: Option<ChangedContent>,
}

impl ChangedBody {
    pub fn into_option(self) -> Option<Self> {
        (!self.is_unchanged()).then_some(self)
    }
}

impl DiffNode for ChangedBody {
    fn compatibility(&self) -> Compatibility {
        let mut c = Compatibility::Unchanged;
        match &self.required {
            Some(Changed { old: false, new: true }) => c = c.and(Compatibility::Incompatible),
            Some(_) => c = c.and(Compatibility::Compatible),
            None => {}
        }
        if self.description.is_some() {
            c = c.and(Compatibility::Compatible);
        }
        if let Some(content) = &self.content {
            c = c.and(content.compatibility());
        }
        c
    }
}

/// Media-type map difference, keyed by MIME type.
#[derive(Clone, Debug, Default)]
pub struct ChangedContent {
    pub increased: Vec<String>,
    pub missing: Vec<String>,
    pub changed: IndexMap<String, ChangedMediaType>,
}

impl ChangedContent {
    pub fn into_option(self) -> Option<Self> {
        (!self.is_unchanged()).then_some(self)
    }
}

impl DiffNode for ChangedContent {
    fn compatibility(&self) -> Compatibility {
        let mut c = Compatibility::Unchanged;
        if !self.increased.is_empty() {
            c = c.and(Compatibility::Compatible);
        }
        if !self.missing.is_empty() {
            c = c.and(Compatibility::Incompatible);
        }
        c.and(Compatibility::over(
            self.changed.values().map(DiffNode::compatibility),
        ))
    }
}

#[derive(Clone, Debug)]
pub struct ChangedMediaType {
    pub schema: Option<ChangedSchema>,
}

impl ChangedMediaType {
    pub fn into_option(self) -> Option<Self> {
        (!self.is_unchanged()).then_some(self)
    }
}

impl DiffNode for ChangedMediaType {
    fn compatibility(&self) -> Compatibility {
        self.schema
            .as_ref()
            .map(DiffNode::compatibility)
            .unwrap_or(Compatibility::Unchanged)
    }
}

/// Response map difference, keyed by status code (or `default`).
#[derive(Clone, Debug, Default)]
pub struct ChangedResponses {
    pub increased: Vec<String>,
    pub missing: Vec<String>,
    pub changed: IndexMap<String, ChangedResponse>,
}

impl ChangedResponses {
    pub fn into_option(self) -> Option<Self> {
        (!self.is_unchanged()).then_some(self)
    }
}

impl DiffNode for ChangedResponses {
    fn compatibility(&self) -> Compatibility {
        let mut c = Compatibility::Unchanged;
        if !self.increased.is_empty() {
            c = c.and(Compatibility::Compatible);
        }
        if !self.missing.is_empty() {
            c = c.and(Compatibility::Incompatible);
        }
        c.and(Compatibility::over(
            self.changed.values().map(DiffNode::compatibility),
        ))
    }
}

#[derive(Clone, Debug)]
pub struct ChangedResponse {
    pub description: Option<Changed<String>>,
    pub headers: Option<ChangedHeaders>,
    pub content: Option<ChangedContent>,
}

impl ChangedResponse {
    pub fn into_option(self) -> Option<Self> {
        (!self.is_unchanged()).then_some(self)
    }
}

impl DiffNode for ChangedResponse {
    fn compatibility(&self) -> Compatibility {
        let mut c = Compatibility::Unchanged;
        if self.description.is_some() {
            c = c.and(Compatibility::Compatible);
        }
        if let Some(headers) = &self.headers {
            c = c.and(headers.compatibility());
        }
        if let Some(content) = &self.content {
            c = c.and(content.compatibility());
        }
        c
    }
}

/// Response header map difference, keyed by header name.
#[derive(Clone, Debug, Default)]
pub struct ChangedHeaders {
    pub increased: Vec<String>,
    pub missing: Vec<String>,
    pub changed: IndexMap<String, ChangedHeader>,
}

impl ChangedHeaders {
    pub fn into_option(self) -> Option<Self> {
        (!self.is_unchanged()).then_some(self)
    }
}

impl DiffNode for ChangedHeaders {
    fn compatibility(&self) -> Compatibility {
        let mut c = Compatibility::Unchanged;
        if !self.increased.is_empty() {
            c = c.and(Compatibility::Compatible);
        }
        if !self.missing.is_empty() {
            c = c.and(Compatibility::Incompatible);
        }
        c.and(Compatibility::over(
            self.changed.values().map(DiffNode::compatibility),
        ))
    }
}

#[derive(Clone, Debug)]
pub struct ChangedHeader {
    pub required: Option<Changed<bool>>,
    pub description: Option<Changed<Option<String>>>,
    pub schema: Option<ChangedSchema>,
}

impl ChangedHeader {
    pub fn into_option(self) -> Option<Self> {
        (!self.is_unchanged()).then_some(self)
    }
}

impl DiffNode for ChangedHeader {
    fn compatibility(&self) -> Compatibility {
        let mut c = Compatibility::Unchanged;
        match &self.required {
            // A header the server stops guaranteeing breaks clients that
            // relied on it.
            Some(Changed { old: true, new: false }) => c = c.and(Compatibility::Incompatible),
            Some(_) => c = c.and(Compatibility::Compatible),
            None => {}
        }
        if self.description.is_some() {
            c = c.and(Compatibility::Compatible);
        }
        if let Some(schema) = &self.schema {
            c = c.and(schema.compatibility());
        }
        c
    }
}

/// Security requirement difference for one operation.
#[derive(Clone, Debug, Default)]
pub struct ChangedSecurity {
    pub increased: Vec<SecurityRequirement>,
    pub missing: Vec<SecurityRequirement>,
}

impl ChangedSecurity {
    pub fn into_option(self) -> Option<Self> {
        (!self.is_unchanged()).then_some(self)
    }
}

impl DiffNode for ChangedSecurity {
    fn compatibility(&self) -> Compatibility {
        let mut c = Compatibility::Unchanged;
        // Demanding new credentials breaks existing clients; dropping a
        // requirement does not.
        if !self.increased.is_empty() {
            c = c.and(Compatibility::Incompatible);
        }
        if !self.missing.is_empty() {
            c = c.and(Compatibility::Compatible);
        }
        c
    }
}

#[derive(Clone, Debug)]
pub struct ChangedOperation {
    pub path: String,
    pub method: String,
    pub operation_id: Option<String>,

    pub summary: Option<Changed<Option<String>>>,
    pub description: Option<Changed<Option<String>>>,
    pub tags: ElementDiff<String>,
    /// The operation became deprecated.
    pub deprecated: bool,

    pub parameters: Option<ChangedParameters>,
    pub request_body: Option<ChangedRequestBody>,
    pub responses: Option<ChangedResponses>,
    pub security: Option<ChangedSecurity>,
}

impl ChangedOperation {
    pub fn into_option(self) -> Option<Self> {
        (!self.is_unchanged()).then_some(self)
    }
}

impl DiffNode for ChangedOperation {
    fn compatibility(&self) -> Compatibility {
        let mut c = Compatibility::Unchanged;
        if self.summary.is_some()
            || self.description.is_some()
            || !self.tags.is_empty()
            || self.deprecated
        {
            c = c.and(Compatibility::Compatible);
        }
        if let Some(parameters) = &self.parameters {
            c = c.and(parameters.compatibility());
        }
        if let Some(body) = &self.request_body {
            c = c.and(body.compatibility());
        }
        if let Some(responses) = &self.responses {
            c = c.and(responses.compatibility());
        }
        if let Some(security) = &self.security {
            c = c.and(security.compatibility());
        }
        c
    }
}

/// Top-level comparison result.
#[derive(Clone, Debug)]
pub struct ChangedOpenApi {
    /// Locations of the two source documents, for consumers that want to
    /// resolve display details against the workspace.
    pub old_location: String,
    pub new_location: String,

    pub new_endpoints: Vec<Endpoint>,
    pub missing_endpoints: Vec<Endpoint>,
    pub changed_operations: Vec<ChangedOperation>,

    /// Non-fatal problems (dangling references and the like) encountered
    /// while comparing.
    pub diagnostics: Vec<Diagnostic>,
}

impl DiffNode for ChangedOpenApi {
    fn compatibility(&self) -> Compatibility {
        let mut c = Compatibility::Unchanged;
        if !self.new_endpoints.is_empty() {
            c = c.and(Compatibility::Compatible);
        }
        if !self.missing_endpoints.is_empty() {
            c = c.and(Compatibility::Incompatible);
        }
        c.and(Compatibility::over(
            self.changed_operations.iter().map(DiffNode::compatibility),
        ))
    }
}
