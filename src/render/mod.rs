// Copyright 2025 Oxide Computer Company

//! Report generation for comparison results.
//!
//! Renderers are read-only consumers of [`ChangedOpenApi`]: the diff tree is
//! flattened once into display entries, and each output format lays those
//! entries out its own way. Nothing in here mutates the result.

mod console;
mod html;
mod markdown;

pub use console::ConsoleRenderer;
pub use html::HtmlRenderer;
pub use markdown::MarkdownRenderer;

use crate::{
    changed::{
        ChangedContent, ChangedOpenApi, ChangedOperation, ChangedParameter, ChangedRequestBody,
        ChangedSchema, Compatibility,
    },
    context::Direction,
    pointer::Pointer,
};

/// Produce a report from a comparison result.
pub trait Render {
    fn render(&self, diff: &ChangedOpenApi) -> String;
}

/// One displayable line of the report.
#[derive(Clone, Debug)]
pub(crate) struct Entry {
    pub message: String,
    pub pointer: String,
    pub compatibility: Compatibility,
}

impl Entry {
    fn new(message: impl ToString, pointer: impl ToString, compatibility: Compatibility) -> Self {
        Self {
            message: message.to_string(),
            pointer: pointer.to_string(),
            compatibility,
        }
    }
}

fn classify(incompatible: bool) -> Compatibility {
    if incompatible {
        Compatibility::Incompatible
    } else {
        Compatibility::Compatible
    }
}

/// Flatten a result tree into display entries, in traversal order.
pub(crate) fn entries(diff: &ChangedOpenApi) -> Vec<Entry> {
    let mut out = Vec::new();

    for endpoint in &diff.missing_endpoints {
        let name = endpoint.operation_id.as_deref().unwrap_or("<unnamed>");
        out.push(Entry::new(
            format!(
                "operation {name} ({} {}) was removed",
                endpoint.method.to_uppercase(),
                endpoint.path
            ),
            "#/paths",
            Compatibility::Incompatible,
        ));
    }
    for endpoint in &diff.new_endpoints {
        let name = endpoint.operation_id.as_deref().unwrap_or("<unnamed>");
        out.push(Entry::new(
            format!(
                "operation {name} ({} {}) was added",
                endpoint.method.to_uppercase(),
                endpoint.path
            ),
            "#/paths",
            Compatibility::Compatible,
        ));
    }

    for operation in &diff.changed_operations {
        operation_entries(operation, &mut out);
    }

    out
}

fn operation_entries(operation: &ChangedOperation, out: &mut Vec<Entry>) {
    let pointer = Pointer::for_operation(&operation.path, &operation.method);

    if operation.summary.is_some() || operation.description.is_some() || !operation.tags.is_empty()
    {
        out.push(Entry::new(
            "operation metadata changed",
            &pointer,
            Compatibility::Compatible,
        ));
    }
    if operation.deprecated {
        out.push(Entry::new(
            "operation became deprecated",
            &pointer,
            Compatibility::Compatible,
        ));
    }

    if let Some(parameters) = &operation.parameters {
        for param in &parameters.missing {
            let data = param.parameter_data_ref();
            out.push(Entry::new(
                format!("parameter '{}' was removed", data.name),
                pointer.append("parameters"),
                Compatibility::Incompatible,
            ));
        }
        for param in &parameters.increased {
            let data = param.parameter_data_ref();
            if data.required {
                out.push(Entry::new(
                    format!("a new, required parameter '{}' was added", data.name),
                    pointer.append("parameters"),
                    Compatibility::Incompatible,
                ));
            } else {
                out.push(Entry::new(
                    format!("a new, optional parameter '{}' was added", data.name),
                    pointer.append("parameters"),
                    Compatibility::Compatible,
                ));
            }
        }
        for param in &parameters.changed {
            parameter_entries(param, &pointer, out);
        }
    }

    if let Some(body) = &operation.request_body {
        let body_pointer = pointer.append("requestBody");
        match body {
            ChangedRequestBody::Added { required: true } => out.push(Entry::new(
                "no request body was specified and now one is required",
                &body_pointer,
                Compatibility::Incompatible,
            )),
            ChangedRequestBody::Added { required: false } => out.push(Entry::new(
                "no request body was specified and now one is accepted",
                &body_pointer,
                Compatibility::Compatible,
            )),
            ChangedRequestBody::Removed { required } => {
                let kind = if *required { "required" } else { "optional" };
                out.push(Entry::new(
                    format!("a {kind} request body was removed"),
                    &body_pointer,
                    Compatibility::Incompatible,
                ));
            }
            ChangedRequestBody::Changed(body) => {
                match &body.required {
                    Some(required) if required.new => out.push(Entry::new(
                        "the request body was optional and is now required",
                        &body_pointer,
                        Compatibility::Incompatible,
                    )),
                    Some(_) => out.push(Entry::new(
                        "the request body was required and is now optional",
                        &body_pointer,
                        Compatibility::Compatible,
                    )),
                    None => {}
                }
                if body.description.is_some() {
                    out.push(Entry::new(
                        "request body metadata changed",
                        &body_pointer,
                        Compatibility::Compatible,
                    ));
                }
                if let Some(content) = &body.content {
                    content_entries(content, &body_pointer.append("content"), out);
                }
            }
        }
    }

    if let Some(responses) = &operation.responses {
        let responses_pointer = pointer.append("responses");
        for status in &responses.missing {
            out.push(Entry::new(
                format!("operation no longer responds with status {status}"),
                &responses_pointer,
                Compatibility::Incompatible,
            ));
        }
        for status in &responses.increased {
            out.push(Entry::new(
                format!("operation added a response with status {status}"),
                &responses_pointer,
                Compatibility::Compatible,
            ));
        }
        for (status, response) in &responses.changed {
            let response_pointer = responses_pointer.append(status);
            if response.description.is_some() {
                out.push(Entry::new(
                    "response metadata changed",
                    &response_pointer,
                    Compatibility::Compatible,
                ));
            }
            if let Some(headers) = &response.headers {
                for name in &headers.missing {
                    out.push(Entry::new(
                        format!("response header '{name}' was removed"),
                        response_pointer.append("headers"),
                        Compatibility::Incompatible,
                    ));
                }
                for name in &headers.increased {
                    out.push(Entry::new(
                        format!("response header '{name}' was added"),
                        response_pointer.append("headers"),
                        Compatibility::Compatible,
                    ));
                }
                for (name, header) in &headers.changed {
                    let header_pointer = response_pointer.append("headers").append(name);
                    match &header.required {
                        Some(required) if !required.new => out.push(Entry::new(
                            format!("response header '{name}' is no longer guaranteed"),
                            &header_pointer,
                            Compatibility::Incompatible,
                        )),
                        Some(_) => out.push(Entry::new(
                            format!("response header '{name}' is now always present"),
                            &header_pointer,
                            Compatibility::Compatible,
                        )),
                        None => {}
                    }
                    if let Some(schema) = &header.schema {
                        schema_entries(schema, out);
                    }
                }
            }
            if let Some(content) = &response.content {
                content_entries(content, &response_pointer.append("content"), out);
            }
        }
    }

    if let Some(security) = &operation.security {
        if !security.increased.is_empty() {
            out.push(Entry::new(
                "operation demands new security requirements",
                pointer.append("security"),
                Compatibility::Incompatible,
            ));
        }
        if !security.missing.is_empty() {
            out.push(Entry::new(
                "operation dropped security requirements",
                pointer.append("security"),
                Compatibility::Compatible,
            ));
        }
    }
}

fn parameter_entries(param: &ChangedParameter, operation_pointer: &Pointer, out: &mut Vec<Entry>) {
    let pointer = operation_pointer.append("parameters").append(&param.name);
    match &param.required {
        Some(required) if required.new => out.push(Entry::new(
            format!("the parameter '{}' was optional and is now required", param.name),
            &pointer,
            Compatibility::Incompatible,
        )),
        Some(_) => out.push(Entry::new(
            format!("the parameter '{}' was required and is now optional", param.name),
            &pointer,
            Compatibility::Compatible,
        )),
        None => {}
    }
    if param.deprecated {
        out.push(Entry::new(
            format!("the parameter '{}' became deprecated", param.name),
            &pointer,
            Compatibility::Compatible,
        ));
    }
    if param.description.is_some() {
        out.push(Entry::new(
            format!("the parameter '{}' metadata changed", param.name),
            &pointer,
            Compatibility::Compatible,
        ));
    }
    if let Some(schema) = &param.schema {
        schema_entries(schema, out);
    }
}

fn content_entries(content: &ChangedContent, pointer: &Pointer, out: &mut Vec<Entry>) {
    for mime in &content.missing {
        out.push(Entry::new(
            format!("media type '{mime}' was removed"),
            pointer,
            Compatibility::Incompatible,
        ));
    }
    for mime in &content.increased {
        out.push(Entry::new(
            format!("media type '{mime}' was added"),
            pointer,
            Compatibility::Compatible,
        ));
    }
    for media in content.changed.values() {
        if let Some(schema) = &media.schema {
            schema_entries(schema, out);
        }
    }
}

fn schema_entries(schema: &ChangedSchema, out: &mut Vec<Entry>) {
    let pointer = &schema.pointer;
    let request = schema.direction == Direction::Request;

    if let Some(change) = &schema.type_changed {
        out.push(Entry::new(
            format!("schema type changed from {} to {}", change.old, change.new),
            pointer,
            Compatibility::Incompatible,
        ));
    }
    if schema.discriminator_changed {
        out.push(Entry::new(
            "discriminator property changed",
            pointer,
            Compatibility::Incompatible,
        ));
    }
    if schema.constraints_changed {
        out.push(Entry::new(
            "schema validation constraints changed",
            pointer,
            Compatibility::Incompatible,
        ));
    }

    if !schema.required.increased.is_empty() {
        out.push(Entry::new(
            format!("newly required: {}", schema.required.increased.join(", ")),
            pointer,
            classify(request),
        ));
    }
    if !schema.required.missing.is_empty() {
        out.push(Entry::new(
            format!("no longer required: {}", schema.required.missing.join(", ")),
            pointer,
            classify(!request),
        ));
    }

    if !schema.enumeration.increased.is_empty() {
        out.push(Entry::new(
            format!("enum gained: {}", schema.enumeration.increased.join(", ")),
            pointer,
            Compatibility::Compatible,
        ));
    }
    if !schema.enumeration.missing.is_empty() {
        out.push(Entry::new(
            format!("enum lost: {}", schema.enumeration.missing.join(", ")),
            pointer,
            Compatibility::Incompatible,
        ));
    }

    for name in schema.missing_properties.keys() {
        out.push(Entry::new(
            format!("property '{name}' was removed"),
            pointer,
            Compatibility::Incompatible,
        ));
    }
    for name in schema.increased_properties.keys() {
        out.push(Entry::new(
            format!("property '{name}' was added"),
            pointer,
            Compatibility::Compatible,
        ));
    }

    if let Some(change) = &schema.read_only {
        out.push(Entry::new(
            "readOnly changed",
            pointer,
            classify(request && change.new),
        ));
    }
    if let Some(change) = &schema.write_only {
        out.push(Entry::new(
            "writeOnly changed",
            pointer,
            classify(!request && change.new),
        ));
    }

    if let Some(change) = &schema.max_length {
        let narrowed = match (&change.old, &change.new) {
            (_, None) => false,
            (None, Some(_)) => true,
            (Some(old), Some(new)) => new < old,
        };
        out.push(Entry::new("maxLength changed", pointer, classify(narrowed)));
    }
    if schema.format.is_some() {
        out.push(Entry::new(
            "schema format changed",
            pointer,
            Compatibility::Incompatible,
        ));
    }

    if schema.default.is_some()
        || schema.title.is_some()
        || schema.description.is_some()
        || schema.extensions_changed
    {
        out.push(Entry::new(
            "schema metadata changed",
            pointer,
            Compatibility::Compatible,
        ));
    }
    if schema.deprecated {
        out.push(Entry::new(
            "schema became deprecated",
            pointer,
            Compatibility::Compatible,
        ));
    }

    if let Some(one_of) = &schema.one_of {
        if !one_of.missing.is_empty() {
            out.push(Entry::new(
                format!("oneOf alternatives removed: {}", one_of.missing.join(", ")),
                pointer,
                Compatibility::Incompatible,
            ));
        }
        if !one_of.increased.is_empty() {
            out.push(Entry::new(
                format!("oneOf alternatives added: {}", one_of.increased.join(", ")),
                pointer,
                Compatibility::Compatible,
            ));
        }
        for child in one_of.changed.values() {
            schema_entries(child, out);
        }
    }

    for child in schema.changed_properties.values() {
        schema_entries(child, out);
    }
    if let Some(items) = &schema.items {
        schema_entries(items, out);
    }
    if let Some(additional) = &schema.additional_properties {
        schema_entries(additional, out);
    }
}

/// Escape a string for safe inclusion in HTML content.
pub(crate) fn escape_html(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => result.push_str("&amp;"),
            '<' => result.push_str("&lt;"),
            '>' => result.push_str("&gt;"),
            '"' => result.push_str("&quot;"),
            '\'' => result.push_str("&#x27;"),
            _ => result.push(c),
        }
    }
    result
}

/// Escape Markdown-significant characters in untrusted text.
pub(crate) fn escape_markdown(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '\\' | '`' | '*' | '_' | '[' | ']' | '|' | '#') {
            result.push('\\');
        }
        result.push(c);
    }
    result
}
