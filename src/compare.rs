// Copyright 2025 Oxide Computer Company

use std::any::Any;
use std::sync::LazyLock;

use indexmap::IndexMap;
use openapiv3::{
    Header, MediaType, Operation, Parameter, ParameterSchemaOrContent, PathItem, ReferenceOr,
    RequestBody, Response, SecurityRequirement,
};
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;

use crate::{
    changed::{
        Changed, ChangedBody, ChangedContent, ChangedHeader, ChangedHeaders, ChangedMediaType,
        ChangedOpenApi, ChangedOperation, ChangedParameter, ChangedParameters, ChangedRequestBody,
        ChangedResponse, ChangedResponses, ChangedSecurity, ElementDiff, Endpoint,
    },
    context::{DiffContext, Direction},
    error::{Diagnostic, DiffError},
    pointer::Pointer,
    reference::Reference,
    schema::any_schema,
    setops::SetCompare,
    workspace::{Document, Workspace},
};

/// Compare two already-parsed OpenAPI documents.
///
/// This is the simple entry point: the two node trees are registered in a
/// throwaway workspace under synthetic locations, so only references within
/// each document resolve.
pub fn compare(old: &Value, new: &Value) -> Result<ChangedOpenApi, DiffError> {
    let mut workspace = Workspace::new();
    workspace.register_document("old", old.clone())?;
    workspace.register_document("new", new.clone())?;
    compare_locations(&workspace, "old", "new")
}

/// Compare two documents registered in a workspace, resolving references
/// across every document the workspace holds.
pub fn compare_locations(
    workspace: &Workspace,
    old_location: &str,
    new_location: &str,
) -> Result<ChangedOpenApi, DiffError> {
    let old_doc = workspace.document(old_location)?;
    let new_doc = workspace.document(new_location)?;

    let mut comp = Compare {
        workspace,
        old_doc,
        new_doc,
        diagnostics: Vec::new(),
    };
    comp.compare_documents()
}

/// Which input document a resolution happens against.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Side {
    Old,
    New,
}

pub(crate) struct Compare<'a> {
    pub workspace: &'a Workspace,
    old_doc: &'a Document,
    new_doc: &'a Document,
    pub diagnostics: Vec<Diagnostic>,
}

impl<'a> Compare<'a> {
    fn doc(&self, side: Side) -> &'a Document {
        match side {
            Side::Old => self.old_doc,
            Side::New => self.new_doc,
        }
    }

    pub(crate) fn location(&self, side: Side) -> &'a str {
        &self.doc(side).location
    }

    /// Record a non-fatal problem and keep comparing.
    pub(crate) fn diagnose(&mut self, context: &DiffContext, message: impl ToString) {
        let diagnostic = Diagnostic::new(&context.pointer, message);
        tracing::warn!(pointer = %diagnostic.pointer, "{}", diagnostic.message);
        self.diagnostics.push(diagnostic);
    }

    /// Resolve a referenceable component to an owned value, or record a
    /// diagnostic and report it absent.
    fn materialize<T>(
        &mut self,
        side: Side,
        context: &DiffContext,
        item_or_ref: &ReferenceOr<T>,
    ) -> Option<T>
    where
        T: for<'de> Deserialize<'de> + Clone + Any + Send + Sync,
    {
        match item_or_ref {
            ReferenceOr::Item(item) => Some(item.clone()),
            ReferenceOr::Reference { reference } => {
                let location = self.location(side);
                match Reference::parse(reference)
                    .and_then(|r| self.workspace.resolve::<T>(location, &r))
                {
                    Ok(resolved) => Some((*resolved).clone()),
                    Err(err) => {
                        self.diagnose(context, err.to_string());
                        None
                    }
                }
            }
        }
    }

    fn compare_documents(&mut self) -> Result<ChangedOpenApi, DiffError> {
        let old_operations = self.operations(Side::Old)?;
        let new_operations = self.operations(Side::New)?;

        let SetCompare {
            a_unique,
            common,
            b_unique,
        } = SetCompare::new(old_operations, new_operations);

        let missing_endpoints = a_unique.into_iter().map(|(_, info)| info.endpoint()).collect();
        let new_endpoints = b_unique.into_iter().map(|(_, info)| info.endpoint()).collect();

        let mut changed_operations = Vec::new();
        for (_, (old_info, new_info)) in common {
            if let Some(changed) = self.compare_operation(&old_info, &new_info)? {
                changed_operations.push(changed);
            }
        }

        Ok(ChangedOpenApi {
            old_location: self.old_doc.location.clone(),
            new_location: self.new_doc.location.clone(),
            new_endpoints,
            missing_endpoints,
            changed_operations,
            diagnostics: std::mem::take(&mut self.diagnostics),
        })
    }

    /// Enumerate a document's operations keyed by route signature + method.
    ///
    /// Two different path templates that normalize to the same signature are
    /// a hard error: there is no defensible way to pick one.
    fn operations(&mut self, side: Side) -> Result<Vec<(OperationKey, OperationInfo)>, DiffError> {
        let doc = self.doc(side);
        let mut signatures: Vec<(String, String)> = Vec::new();
        let mut out = Vec::new();

        for (path, item_or_ref) in doc.api.paths.paths.iter() {
            let signature = route_signature(path);
            if let Some((_, first)) = signatures
                .iter()
                .find(|(sig, existing)| *sig == signature && existing != path)
            {
                return Err(DiffError::AmbiguousPath {
                    first: first.clone(),
                    second: path.clone(),
                });
            }
            signatures.push((signature, path.clone()));

            let Some(path_item) = self.resolve_path_item(side, path, item_or_ref) else {
                continue;
            };

            for (method, operation) in path_item.iter() {
                out.push((
                    OperationKey {
                        route: route_signature(path),
                        method: method.to_string(),
                    },
                    OperationInfo {
                        path: path.clone(),
                        method: method.to_string(),
                        operation: operation.clone(),
                        shared_parameters: path_item.parameters.clone(),
                    },
                ));
            }
        }

        Ok(out)
    }

    /// Path items can be `$ref`s to arbitrary pointers (not components), so
    /// they resolve directly against the raw node tree.
    fn resolve_path_item(
        &mut self,
        side: Side,
        path: &str,
        item_or_ref: &ReferenceOr<PathItem>,
    ) -> Option<PathItem> {
        match item_or_ref {
            ReferenceOr::Item(item) => Some(item.clone()),
            ReferenceOr::Reference { reference } => {
                let doc = self.doc(side);
                let resolved = reference
                    .strip_prefix('#')
                    .and_then(|fragment| doc.raw.pointer(fragment))
                    .and_then(|node| PathItem::deserialize(node).ok());
                if resolved.is_none() {
                    let context =
                        DiffContext::new(Direction::Request, Pointer::root().append("paths"));
                    self.diagnose(
                        &context,
                        format!("path item reference {reference:?} for {path:?} does not resolve"),
                    );
                }
                resolved
            }
        }
    }

    fn compare_operation(
        &mut self,
        old_info: &OperationInfo,
        new_info: &OperationInfo,
    ) -> Result<Option<ChangedOperation>, DiffError> {
        let old = &old_info.operation;
        let new = &new_info.operation;

        let mut changed = ChangedOperation {
            path: new_info.path.clone(),
            method: new_info.method.clone(),
            operation_id: new
                .operation_id
                .clone()
                .or_else(|| old.operation_id.clone()),
            summary: Changed::of(&old.summary, &new.summary),
            description: Changed::of(&old.description, &new.description),
            tags: self.compare_tags(old, new),
            deprecated: !old.deprecated && new.deprecated,
            parameters: None,
            request_body: None,
            responses: None,
            security: None,
        };

        changed.parameters = self.compare_parameters(old_info, new_info)?;
        changed.request_body = self.compare_request_body(old_info, new_info)?;
        changed.responses = self.compare_responses(old_info, new_info)?;
        changed.security = self.compare_security(old, new);

        Ok(changed.into_option())
    }

    /// Tag names materialize through the workspace so undeclared tags
    /// surface as placeholders instead of lookup failures.
    fn compare_tags(&mut self, old: &Operation, new: &Operation) -> ElementDiff<String> {
        let resolve = |comp: &Compare<'_>, side: Side, names: &[String]| -> Vec<String> {
            names
                .iter()
                .map(|name| comp.workspace.resolve_tag(comp.location(side), name).name.clone())
                .collect()
        };
        let old_tags = resolve(self, Side::Old, &old.tags);
        let new_tags = resolve(self, Side::New, &new.tags);
        ElementDiff::of(&old_tags, &new_tags)
    }

    fn compare_parameters(
        &mut self,
        old_info: &OperationInfo,
        new_info: &OperationInfo,
    ) -> Result<Option<ChangedParameters>, DiffError> {
        let old_params = self.all_params(Side::Old, old_info)?;
        let new_params = self.all_params(Side::New, new_info)?;

        let SetCompare {
            a_unique,
            common,
            b_unique,
        } = SetCompare::new(old_params, new_params);

        let mut changed = ChangedParameters {
            // A removed parameter may change the semantics of the operation
            // even if new servers ignore it; an added one may not be
            // understood by old servers. Classification handles both.
            missing: a_unique.into_iter().map(|(_, p)| p).collect(),
            increased: b_unique.into_iter().map(|(_, p)| p).collect(),
            changed: Vec::new(),
        };

        for (_, (old_param, new_param)) in common {
            if let Some(diff) = self.compare_parameter(new_info, &old_param, &new_param)? {
                changed.changed.push(diff);
            }
        }

        Ok(changed.into_option())
    }

    fn compare_parameter(
        &mut self,
        info: &OperationInfo,
        old: &Parameter,
        new: &Parameter,
    ) -> Result<Option<ChangedParameter>, DiffError> {
        let old_data = old.parameter_data_ref();
        let new_data = new.parameter_data_ref();

        let pointer = info
            .pointer()
            .append("parameters")
            .append(&new_data.name);

        let mut changed = ChangedParameter {
            name: new_data.name.clone(),
            location: parameter_location(new).to_string(),
            required: Changed::of(&old_data.required, &new_data.required),
            deprecated: !old_data.deprecated.unwrap_or(false) && new_data.deprecated.unwrap_or(false),
            description: Changed::of(&old_data.description, &new_data.description),
            schema: None,
        };

        match (&old_data.format, &new_data.format) {
            (
                ParameterSchemaOrContent::Schema(old_schema),
                ParameterSchemaOrContent::Schema(new_schema),
            ) => {
                let context = DiffContext::new(Direction::Request, pointer.append("schema"))
                    .with_required(new_data.required);
                changed.schema = self.compare_schema_ref(&context, old_schema, new_schema)?;
            }
            (old_format, new_format) if old_format == new_format => {}
            _ => {
                let context = DiffContext::new(Direction::Request, pointer);
                self.diagnose(
                    &context,
                    "parameter switched between schema and content; not compared",
                );
            }
        }

        Ok(changed.into_option())
    }

    /// Merge path-item and operation parameters, resolved and keyed by
    /// (name, location). An operation-level parameter overrides a shared one
    /// with the same key. Path parameters key by position: their names carry
    /// no meaning across documents.
    fn all_params(
        &mut self,
        side: Side,
        info: &OperationInfo,
    ) -> Result<Vec<(ParameterKey, Parameter)>, DiffError> {
        let positions = path_parameter_positions(&info.path);
        let context = DiffContext::new(Direction::Request, info.pointer().append("parameters"));

        let mut out: Vec<(ParameterKey, Parameter)> = Vec::new();
        for item_or_ref in info
            .shared_parameters
            .iter()
            .chain(info.operation.parameters.iter())
        {
            let Some(param) = self.materialize::<Parameter>(side, &context, item_or_ref) else {
                continue;
            };

            let data = param.parameter_data_ref();
            let name = match &param {
                Parameter::Path { .. } => {
                    let index = positions.iter().position(|n| *n == data.name).ok_or_else(
                        || DiffError::UnknownPathParameter {
                            name: data.name.clone(),
                            path: info.path.clone(),
                        },
                    )?;
                    ParameterName::Indexed(index)
                }
                _ => ParameterName::Named(data.name.clone()),
            };
            let key = ParameterKey {
                name,
                location: parameter_location(&param),
            };

            match out.iter_mut().find(|(k, _)| *k == key) {
                Some(entry) => entry.1 = param,
                None => out.push((key, param)),
            }
        }
        Ok(out)
    }

    fn compare_request_body(
        &mut self,
        old_info: &OperationInfo,
        new_info: &OperationInfo,
    ) -> Result<Option<ChangedRequestBody>, DiffError> {
        let pointer = new_info.pointer().append("requestBody");
        let context = DiffContext::new(Direction::Request, pointer.clone());

        let old_body = old_info
            .operation
            .request_body
            .as_ref()
            .and_then(|body| self.materialize::<RequestBody>(Side::Old, &context, body));
        let new_body = new_info
            .operation
            .request_body
            .as_ref()
            .and_then(|body| self.materialize::<RequestBody>(Side::New, &context, body));

        match (old_body, new_body) {
            (None, None) => Ok(None),
            // Old clients may keep sending a body the new server no longer
            // expects.
            (Some(old_body), None) => Ok(Some(ChangedRequestBody::Removed {
                required: old_body.required,
            })),
            (None, Some(new_body)) => Ok(Some(ChangedRequestBody::Added {
                required: new_body.required,
            })),
            (Some(old_body), Some(new_body)) => {
                let changed = ChangedBody {
                    required: Changed::of(&old_body.required, &new_body.required),
                    description: Changed::of(&old_body.description, &new_body.description),
                    content: self.compare_content(
                        Direction::Request,
                        &pointer.append("content"),
                        &old_body.content,
                        &new_body.content,
                    )?,
                };
                Ok(changed.into_option().map(ChangedRequestBody::Changed))
            }
        }
    }

    fn compare_responses(
        &mut self,
        old_info: &OperationInfo,
        new_info: &OperationInfo,
    ) -> Result<Option<ChangedResponses>, DiffError> {
        let pointer = new_info.pointer().append("responses");

        let collect = |operation: &Operation| -> Vec<(String, ReferenceOr<Response>)> {
            let responses = &operation.responses;
            responses
                .default
                .iter()
                .map(|r| ("default".to_string(), r.clone()))
                .chain(
                    responses
                        .responses
                        .iter()
                        .map(|(status, r)| (status.to_string(), r.clone())),
                )
                .collect()
        };

        let SetCompare {
            a_unique,
            common,
            b_unique,
        } = SetCompare::new(collect(&old_info.operation), collect(&new_info.operation));

        let mut changed = ChangedResponses {
            missing: a_unique.into_iter().map(|(status, _)| status).collect(),
            increased: b_unique.into_iter().map(|(status, _)| status).collect(),
            changed: IndexMap::new(),
        };

        for (status, (old_response, new_response)) in common {
            let response_pointer = pointer.append(&status);
            if let Some(diff) =
                self.compare_response(&response_pointer, &old_response, &new_response)?
            {
                changed.changed.insert(status, diff);
            }
        }

        Ok(changed.into_option())
    }

    fn compare_response(
        &mut self,
        pointer: &Pointer,
        old_response: &ReferenceOr<Response>,
        new_response: &ReferenceOr<Response>,
    ) -> Result<Option<ChangedResponse>, DiffError> {
        let context = DiffContext::new(Direction::Response, pointer.clone());
        let Some(old_response) = self.materialize::<Response>(Side::Old, &context, old_response)
        else {
            return Ok(None);
        };
        let Some(new_response) = self.materialize::<Response>(Side::New, &context, new_response)
        else {
            return Ok(None);
        };

        let changed = ChangedResponse {
            description: Changed::of(&old_response.description, &new_response.description),
            headers: self.compare_headers(
                &pointer.append("headers"),
                &old_response.headers,
                &new_response.headers,
            )?,
            content: self.compare_content(
                Direction::Response,
                &pointer.append("content"),
                &old_response.content,
                &new_response.content,
            )?,
        };

        Ok(changed.into_option())
    }

    fn compare_headers(
        &mut self,
        pointer: &Pointer,
        old_headers: &IndexMap<String, ReferenceOr<Header>>,
        new_headers: &IndexMap<String, ReferenceOr<Header>>,
    ) -> Result<Option<ChangedHeaders>, DiffError> {
        let SetCompare {
            a_unique,
            common,
            b_unique,
        } = SetCompare::new(old_headers.iter(), new_headers.iter());

        let mut changed = ChangedHeaders {
            missing: a_unique.into_iter().map(|(name, _)| name.clone()).collect(),
            increased: b_unique.into_iter().map(|(name, _)| name.clone()).collect(),
            changed: IndexMap::new(),
        };

        for (name, (old_header, new_header)) in common {
            let header_pointer = pointer.append(name);
            let context = DiffContext::new(Direction::Response, header_pointer.clone());
            let (Some(old_header), Some(new_header)) = (
                self.materialize::<Header>(Side::Old, &context, old_header),
                self.materialize::<Header>(Side::New, &context, new_header),
            ) else {
                continue;
            };

            let mut diff = ChangedHeader {
                required: Changed::of(&old_header.required, &new_header.required),
                description: Changed::of(&old_header.description, &new_header.description),
                schema: None,
            };

            match (&old_header.format, &new_header.format) {
                (
                    ParameterSchemaOrContent::Schema(old_schema),
                    ParameterSchemaOrContent::Schema(new_schema),
                ) => {
                    let schema_context =
                        DiffContext::new(Direction::Response, header_pointer.append("schema"))
                            .with_required(new_header.required);
                    diff.schema = self.compare_schema_ref(&schema_context, old_schema, new_schema)?;
                }
                (old_format, new_format) if old_format == new_format => {}
                _ => {
                    self.diagnose(
                        &context,
                        "header switched between schema and content; not compared",
                    );
                }
            }

            if let Some(diff) = diff.into_option() {
                changed.changed.insert(name.clone(), diff);
            }
        }

        Ok(changed.into_option())
    }

    fn compare_content(
        &mut self,
        direction: Direction,
        pointer: &Pointer,
        old_content: &IndexMap<String, MediaType>,
        new_content: &IndexMap<String, MediaType>,
    ) -> Result<Option<ChangedContent>, DiffError> {
        let SetCompare {
            a_unique,
            common,
            b_unique,
        } = SetCompare::new(old_content.iter(), new_content.iter());

        let mut changed = ChangedContent {
            missing: a_unique.into_iter().map(|(mime, _)| mime.clone()).collect(),
            increased: b_unique.into_iter().map(|(mime, _)| mime.clone()).collect(),
            changed: IndexMap::new(),
        };

        for (mime_type, (old_media, new_media)) in common {
            let context = DiffContext::new(direction, pointer.append(mime_type).append("schema"));

            // A media type without a schema accepts anything.
            let fallback = ReferenceOr::Item(any_schema());
            let old_schema = old_media.schema.as_ref().unwrap_or(&fallback);
            let new_schema = new_media.schema.as_ref().unwrap_or(&fallback);

            let diff = ChangedMediaType {
                schema: self.compare_schema_ref(&context, old_schema, new_schema)?,
            };
            if let Some(diff) = diff.into_option() {
                changed.changed.insert(mime_type.clone(), diff);
            }
        }

        Ok(changed.into_option())
    }

    /// Compare effective security requirements (operation-level, falling
    /// back to the document default).
    fn compare_security(&mut self, old: &Operation, new: &Operation) -> Option<ChangedSecurity> {
        let effective = |operation: &Operation, doc: &Document| -> Vec<SecurityRequirement> {
            operation
                .security
                .clone()
                .or_else(|| doc.api.security.clone())
                .unwrap_or_default()
        };

        let old_security = effective(old, self.old_doc);
        let new_security = effective(new, self.new_doc);

        let changed = ChangedSecurity {
            increased: new_security
                .iter()
                .filter(|req| !old_security.contains(req))
                .cloned()
                .collect(),
            missing: old_security
                .iter()
                .filter(|req| !new_security.contains(req))
                .cloned()
                .collect(),
        };
        changed.into_option()
    }
}

/// Identity of an operation across documents: normalized route + method.
#[derive(Clone, Debug, PartialEq, Eq)]
struct OperationKey {
    route: String,
    method: String,
}

struct OperationInfo {
    path: String,
    method: String,
    operation: Operation,
    shared_parameters: Vec<ReferenceOr<Parameter>>,
}

impl OperationInfo {
    fn pointer(&self) -> Pointer {
        Pointer::for_operation(&self.path, &self.method)
    }

    fn endpoint(&self) -> Endpoint {
        Endpoint {
            path: self.path.clone(),
            method: self.method.clone(),
            operation_id: self.operation.operation_id.clone(),
        }
    }
}

/// Normalize a path template: parameter names don't distinguish routes, so
/// `/pet/{id}` and `/pet/{petId}` have the same signature.
fn route_signature(path: &str) -> String {
    static PATTERN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\{[^}]*\}").unwrap());
    PATTERN.replace_all(path, "{}").to_string()
}

/// Names of path parameters in template order.
fn path_parameter_positions(mut path: &str) -> Vec<String> {
    let mut names = Vec::new();
    while let Some(start) = path.find('{') {
        path = &path[start + 1..];
        let Some(end) = path.find('}') else { break };
        names.push(path[..end].to_string());
        path = &path[end + 1..];
    }
    names
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum ParameterName {
    Indexed(usize),
    Named(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct ParameterKey {
    name: ParameterName,
    location: &'static str,
}

fn parameter_location(parameter: &Parameter) -> &'static str {
    match parameter {
        Parameter::Query { .. } => "query",
        Parameter::Header { .. } => "header",
        Parameter::Path { .. } => "path",
        Parameter::Cookie { .. } => "cookie",
    }
}

#[cfg(test)]
mod tests {
    use super::{path_parameter_positions, route_signature};

    #[test]
    fn route_signature_erases_parameter_names() {
        assert_eq!(route_signature("/pet/{id}"), "/pet/{}");
        assert_eq!(route_signature("/pet/{petId}"), "/pet/{}");
        assert_eq!(route_signature("/pet"), "/pet");
    }

    #[test]
    fn path_parameter_positions_in_template_order() {
        assert_eq!(
            path_parameter_positions("/a/{x}/b/{y}"),
            vec!["x".to_string(), "y".to_string()]
        );
        assert!(path_parameter_positions("/a/b").is_empty());
    }
}
