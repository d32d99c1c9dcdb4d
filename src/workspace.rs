// Copyright 2025 Oxide Computer Company

//! Multi-document workspace and reference resolution.
//!
//! A [`Workspace`] holds every loaded document keyed by location and
//! resolves references within and across them. Resolution follows ref-to-ref
//! chains to the terminal item, caches the materialized object per canonical
//! reference string (so repeat lookups of one reference return the *same*
//! `Arc`, including through cyclic schema graphs), and fails softly on
//! cycles and danglers.
//!
//! Loading document bytes is the only asynchronous operation in the crate;
//! it goes through the [`DocumentLoader`] collaborator. Dropping the future
//! cancels an in-flight fetch.

use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use indexmap::IndexMap;
use openapiv3::{OpenAPI, ReferenceOr, Tag};
use serde::Deserialize;
use serde_json::Value;

use crate::{
    error::{DiffError, LoadError, ResolveError},
    load,
    reference::Reference,
};

/// How references into other documents are handled.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ExternalMode {
    /// Resolve through whatever documents the workspace has registered.
    #[default]
    Inline,
    /// Never cross a document boundary; external references stay unresolved
    /// and surface as diagnostics.
    LeaveUnresolved,
}

/// One loaded OpenAPI description.
pub struct Document {
    pub location: String,
    /// The generic node tree the document was parsed from. Reference
    /// resolution works on this, so a `$ref` target need not appear in the
    /// typed model to be resolvable.
    pub raw: Value,
    pub api: OpenAPI,
}

/// Documents keyed by location, plus the resolved-reference store.
///
/// A workspace (and its cache) is owned by one comparison pass at a time;
/// there is no internal locking.
pub struct Workspace {
    mode: ExternalMode,
    documents: IndexMap<String, Document>,
    resolved: RefCell<HashMap<String, Arc<dyn Any + Send + Sync>>>,
}

impl Default for Workspace {
    fn default() -> Self {
        Self::new()
    }
}

impl Workspace {
    pub fn new() -> Self {
        Self::with_mode(ExternalMode::Inline)
    }

    pub fn with_mode(mode: ExternalMode) -> Self {
        Self {
            mode,
            documents: IndexMap::new(),
            resolved: RefCell::new(HashMap::new()),
        }
    }

    /// Register a parsed node tree under `location`, deserializing the typed
    /// document model.
    pub fn register_document(&mut self, location: &str, raw: Value) -> Result<(), DiffError> {
        let api = OpenAPI::deserialize(&raw).map_err(|source| DiffError::Document {
            location: location.to_string(),
            source,
        })?;
        self.documents.insert(
            location.to_string(),
            Document {
                location: location.to_string(),
                raw,
                api,
            },
        );
        Ok(())
    }

    pub fn document(&self, location: &str) -> Result<&Document, DiffError> {
        self.documents
            .get(location)
            .ok_or_else(|| DiffError::UnknownDocument {
                location: location.to_string(),
            })
    }

    pub fn contains(&self, location: &str) -> bool {
        self.documents.contains_key(location)
    }

    /// Pre-seed the resolved-reference store with an already-materialized
    /// component under its canonical key (`location#fragment`).
    pub fn register_component<T>(&self, canonical: &str, value: T)
    where
        T: Any + Send + Sync,
    {
        self.resolved
            .borrow_mut()
            .insert(canonical.to_string(), Arc::new(value));
    }

    /// Load one document (no external closure walk).
    pub async fn load_document(
        &mut self,
        loader: &dyn DocumentLoader,
        location: &str,
    ) -> Result<(), DiffError> {
        if self.documents.contains_key(location) {
            return Ok(());
        }
        let bytes = loader.load(location).await?;
        let raw = load::parse_document(location, &bytes)?;
        self.register_document(location, raw)
    }

    /// Load `location` and, transitively, every document it references.
    ///
    /// After each document parses, its node tree is walked for external
    /// `$ref`s; each target not already registered is fetched and walked the
    /// same way. Already-registered locations are skipped, so two documents
    /// that reference each other terminate.
    pub async fn load_transitive(
        &mut self,
        loader: &dyn DocumentLoader,
        location: &str,
    ) -> Result<(), DiffError> {
        let mut pending = vec![location.to_string()];
        while let Some(loc) = pending.pop() {
            if self.documents.contains_key(&loc) {
                continue;
            }
            let bytes = loader.load(&loc).await?;
            let raw = load::parse_document(&loc, &bytes)?;
            let mut externals = Vec::new();
            collect_external_refs(&raw, &loc, &mut externals);
            self.register_document(&loc, raw)?;
            for target in externals {
                if !self.documents.contains_key(&target) {
                    pending.push(target);
                }
            }
        }
        Ok(())
    }

    /// Resolve a reference to its materialized component.
    ///
    /// `base_location` is the document the reference text appeared in; local
    /// references resolve against it. Repeat lookups of the same reference
    /// return the same `Arc`.
    pub fn resolve<T>(
        &self,
        base_location: &str,
        reference: &Reference,
    ) -> Result<Arc<T>, ResolveError>
    where
        T: for<'de> Deserialize<'de> + Any + Send + Sync,
    {
        let mut resolving = Vec::new();
        self.resolve_with_stack(base_location, reference, &mut resolving)
    }

    /// Resolve reference text (e.g. from a `ReferenceOr::Reference`).
    pub fn resolve_text<T>(&self, base_location: &str, text: &str) -> Result<Arc<T>, ResolveError>
    where
        T: for<'de> Deserialize<'de> + Any + Send + Sync,
    {
        let reference = Reference::parse(text)?;
        self.resolve(base_location, &reference)
    }

    fn resolve_with_stack<T>(
        &self,
        base_location: &str,
        reference: &Reference,
        resolving: &mut Vec<String>,
    ) -> Result<Arc<T>, ResolveError>
    where
        T: for<'de> Deserialize<'de> + Any + Send + Sync,
    {
        // A relative external resource is relative to the referring
        // document, so the canonical key uses the joined location.
        let location = match &reference.external_resource {
            Some(resource) => join_location(base_location, resource),
            None => base_location.to_string(),
        };
        let canonical = format!("{}#{}", location, reference.fragment());

        if reference.is_external() && self.mode == ExternalMode::LeaveUnresolved {
            return Err(ResolveError::Unresolved {
                reference: canonical,
            });
        }

        if let Some(hit) = self.resolved.borrow().get(&canonical) {
            return hit
                .clone()
                .downcast::<T>()
                .map_err(|_| ResolveError::WrongType {
                    reference: canonical,
                });
        }

        if resolving.contains(&canonical) {
            tracing::error!(reference = %canonical, "reference cycle during resolution");
            return Err(ResolveError::Cycle {
                reference: canonical,
            });
        }
        resolving.push(canonical.clone());

        let result = self.resolve_uncached::<T>(&location, reference, &canonical, resolving);

        resolving.pop();

        if let Ok(arc) = &result {
            self.resolved
                .borrow_mut()
                .insert(canonical, arc.clone() as Arc<dyn Any + Send + Sync>);
        }
        result
    }

    fn resolve_uncached<T>(
        &self,
        location: &str,
        reference: &Reference,
        canonical: &str,
        resolving: &mut Vec<String>,
    ) -> Result<Arc<T>, ResolveError>
    where
        T: for<'de> Deserialize<'de> + Any + Send + Sync,
    {
        let doc = self
            .documents
            .get(location)
            .ok_or_else(|| ResolveError::Unresolved {
                reference: canonical.to_string(),
            })?;

        let node = doc
            .raw
            .pointer(&reference.fragment())
            .ok_or_else(|| ResolveError::NotFound {
                reference: canonical.to_string(),
            })?;

        let item_or_ref =
            ReferenceOr::<T>::deserialize(node).map_err(|_| ResolveError::WrongType {
                reference: canonical.to_string(),
            })?;

        match item_or_ref {
            ReferenceOr::Item(item) => Ok(Arc::new(item)),
            ReferenceOr::Reference { reference: next } => {
                // A ref found inside another document is local to *that*
                // document.
                let next = Reference::parse(&next)?;
                self.resolve_with_stack(location, &next, resolving)
            }
        }
    }

    /// Look up a tag declared by the document at `location`.
    ///
    /// A tag that is not declared resolves to a synthetic placeholder
    /// carrying only the name, rather than failing.
    pub fn resolve_tag(&self, location: &str, name: &str) -> Arc<Tag> {
        let canonical = format!("{}#/tags/{}", location, name);
        if let Some(hit) = self.resolved.borrow().get(&canonical) {
            if let Ok(tag) = hit.clone().downcast::<Tag>() {
                return tag;
            }
        }

        let tag = self
            .documents
            .get(location)
            .and_then(|doc| doc.api.tags.iter().find(|t| t.name == name))
            .cloned()
            .unwrap_or_else(|| {
                tracing::warn!(location, tag = name, "undeclared tag; substituting placeholder");
                Tag {
                    name: name.to_string(),
                    description: None,
                    external_docs: None,
                    extensions: Default::default(),
                }
            });

        let tag = Arc::new(tag);
        self.resolved
            .borrow_mut()
            .insert(canonical, tag.clone() as Arc<dyn Any + Send + Sync>);
        tag
    }
}

/// Collect the locations of every external `$ref` target in a node tree,
/// joined against the referring document's location.
fn collect_external_refs(node: &Value, base: &str, out: &mut Vec<String>) {
    match node {
        Value::Object(map) => {
            if let Some(Value::String(text)) = map.get("$ref") {
                let resource = match text.split_once('#') {
                    Some((resource, _)) => resource,
                    None => text.as_str(),
                };
                if !resource.is_empty() {
                    let target = join_location(base, resource);
                    if !out.contains(&target) {
                        out.push(target);
                    }
                }
            }
            for value in map.values() {
                collect_external_refs(value, base, out);
            }
        }
        Value::Array(items) => {
            for value in items {
                collect_external_refs(value, base, out);
            }
        }
        _ => {}
    }
}

/// Join a (possibly relative) external resource against the location of the
/// document that referenced it.
fn join_location(base: &str, resource: &str) -> String {
    if resource.contains("://") || resource.starts_with('/') {
        return resource.to_string();
    }
    match base.rsplit_once('/') {
        Some((dir, _)) => format!("{}/{}", dir, resource),
        None => resource.to_string(),
    }
}

/// The I/O seam: turns a location into document bytes.
#[async_trait]
pub trait DocumentLoader: Send + Sync {
    async fn load(&self, location: &str) -> Result<Vec<u8>, LoadError>;
}

/// Reads locations from the filesystem.
#[derive(Debug, Default)]
pub struct FsLoader;

#[async_trait]
impl DocumentLoader for FsLoader {
    async fn load(&self, location: &str) -> Result<Vec<u8>, LoadError> {
        tokio::fs::read(location).await.map_err(|source| LoadError::Io {
            location: location.to_string(),
            source,
        })
    }
}

/// Fetches `http(s)` locations.
#[derive(Debug, Default)]
pub struct HttpLoader {
    client: reqwest::Client,
}

#[async_trait]
impl DocumentLoader for HttpLoader {
    async fn load(&self, location: &str) -> Result<Vec<u8>, LoadError> {
        let http = |source| LoadError::Http {
            location: location.to_string(),
            source,
        };
        let response = self
            .client
            .get(location)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(http)?;
        let bytes = response.bytes().await.map_err(http)?;
        Ok(bytes.to_vec())
    }
}

/// Dispatches to [`HttpLoader`] or [`FsLoader`] by location scheme.
#[derive(Debug, Default)]
pub struct DefaultLoader {
    http: HttpLoader,
    fs: FsLoader,
}

#[async_trait]
impl DocumentLoader for DefaultLoader {
    async fn load(&self, location: &str) -> Result<Vec<u8>, LoadError> {
        if location.starts_with("http://") || location.starts_with("https://") {
            self.http.load(location).await
        } else if location.contains("://") {
            Err(LoadError::UnsupportedScheme {
                location: location.to_string(),
            })
        } else {
            self.fs.load(location).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use openapiv3::Schema;
    use serde_json::json;

    fn minimal_doc(schemas: Value) -> Value {
        json!({
            "openapi": "3.0.0",
            "info": { "title": "t", "version": "1" },
            "paths": {},
            "components": { "schemas": schemas }
        })
    }

    #[test]
    fn resolves_local_schema() {
        let mut ws = Workspace::new();
        ws.register_document(
            "api.json",
            minimal_doc(json!({ "Pet": { "type": "string" } })),
        )
        .unwrap();

        let pet: Arc<Schema> = ws
            .resolve_text("api.json", "#/components/schemas/Pet")
            .unwrap();
        assert!(matches!(
            pet.schema_kind,
            openapiv3::SchemaKind::Type(openapiv3::Type::String(_))
        ));
    }

    #[test]
    fn repeat_lookups_share_identity() {
        let mut ws = Workspace::new();
        ws.register_document(
            "api.json",
            minimal_doc(json!({ "Pet": { "type": "string" } })),
        )
        .unwrap();

        let a: Arc<Schema> = ws
            .resolve_text("api.json", "#/components/schemas/Pet")
            .unwrap();
        let b: Arc<Schema> = ws
            .resolve_text("api.json", "#/components/schemas/Pet")
            .unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn follows_ref_chains_and_shares_identity() {
        let mut ws = Workspace::new();
        ws.register_document(
            "api.json",
            minimal_doc(json!({
                "Alias": { "$ref": "#/components/schemas/Pet" },
                "Pet": { "type": "string" }
            })),
        )
        .unwrap();

        let alias: Arc<Schema> = ws
            .resolve_text("api.json", "#/components/schemas/Alias")
            .unwrap();
        let pet: Arc<Schema> = ws
            .resolve_text("api.json", "#/components/schemas/Pet")
            .unwrap();
        assert!(Arc::ptr_eq(&alias, &pet));
    }

    #[test]
    fn ref_cycle_fails_softly() {
        let mut ws = Workspace::new();
        ws.register_document(
            "api.json",
            minimal_doc(json!({
                "A": { "$ref": "#/components/schemas/B" },
                "B": { "$ref": "#/components/schemas/A" }
            })),
        )
        .unwrap();

        let err = ws
            .resolve_text::<Schema>("api.json", "#/components/schemas/A")
            .unwrap_err();
        assert!(matches!(err, ResolveError::Cycle { .. }));
    }

    #[test]
    fn dangling_ref_is_not_found() {
        let mut ws = Workspace::new();
        ws.register_document("api.json", minimal_doc(json!({}))).unwrap();

        let err = ws
            .resolve_text::<Schema>("api.json", "#/components/schemas/Ghost")
            .unwrap_err();
        assert!(matches!(err, ResolveError::NotFound { .. }));
    }

    #[test]
    fn external_refs_cross_documents() {
        let mut ws = Workspace::new();
        ws.register_document(
            "root.json",
            minimal_doc(json!({
                "Pet": { "$ref": "pets.json#/components/schemas/Pet" }
            })),
        )
        .unwrap();
        ws.register_document(
            "pets.json",
            minimal_doc(json!({ "Pet": { "type": "integer" } })),
        )
        .unwrap();

        let pet: Arc<Schema> = ws
            .resolve_text("root.json", "#/components/schemas/Pet")
            .unwrap();
        assert!(matches!(
            pet.schema_kind,
            openapiv3::SchemaKind::Type(openapiv3::Type::Integer(_))
        ));
    }

    #[test]
    fn leave_unresolved_mode_refuses_external() {
        let mut ws = Workspace::with_mode(ExternalMode::LeaveUnresolved);
        ws.register_document("root.json", minimal_doc(json!({}))).unwrap();
        ws.register_document(
            "pets.json",
            minimal_doc(json!({ "Pet": { "type": "integer" } })),
        )
        .unwrap();

        let err = ws
            .resolve_text::<Schema>("root.json", "pets.json#/components/schemas/Pet")
            .unwrap_err();
        assert!(matches!(err, ResolveError::Unresolved { .. }));
    }

    #[test]
    fn preseeded_components_resolve_without_a_document_node() {
        let mut ws = Workspace::new();
        ws.register_document("api.json", minimal_doc(json!({}))).unwrap();

        let ghost: Schema = serde_json::from_value(json!({ "type": "string" })).unwrap();
        ws.register_component("api.json#/components/schemas/Ghost", ghost);

        let resolved: Arc<Schema> = ws
            .resolve_text("api.json", "#/components/schemas/Ghost")
            .unwrap();
        assert!(matches!(
            resolved.schema_kind,
            openapiv3::SchemaKind::Type(openapiv3::Type::String(_))
        ));
    }

    #[test]
    fn undeclared_tag_gets_placeholder() {
        let mut ws = Workspace::new();
        ws.register_document("api.json", minimal_doc(json!({}))).unwrap();

        let tag = ws.resolve_tag("api.json", "pets");
        assert_eq!(tag.name, "pets");
        assert!(tag.description.is_none());
    }

    #[test]
    fn collects_external_refs_with_relative_join() {
        let doc = json!({
            "a": { "$ref": "common/pets.json#/components/schemas/Pet" },
            "b": [ { "$ref": "#/components/schemas/Local" } ],
            "c": { "$ref": "https://example.com/api.json#/components/schemas/X" }
        });
        let mut out = Vec::new();
        collect_external_refs(&doc, "specs/root.json", &mut out);
        assert_eq!(
            out,
            vec![
                "specs/common/pets.json".to_string(),
                "https://example.com/api.json".to_string()
            ]
        );
    }
}
