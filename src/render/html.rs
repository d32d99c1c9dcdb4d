// Copyright 2025 Oxide Computer Company

use std::fmt::Write as _;

use crate::changed::{ChangedOpenApi, Compatibility, DiffNode};

use super::{entries, escape_html, Render};

/// Self-contained HTML report.
#[derive(Debug, Default)]
pub struct HtmlRenderer;

impl Render for HtmlRenderer {
    fn render(&self, diff: &ChangedOpenApi) -> String {
        let mut out = String::new();
        out.push_str(
            "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n\
             <title>API comparison</title>\n<style>\n\
             body { font-family: sans-serif; margin: 2em; }\n\
             .incompatible { color: #b00020; }\n\
             .compatible { color: #1b5e20; }\n\
             .pointer { color: #555; font-family: monospace; font-size: 0.85em; }\n\
             </style>\n</head>\n<body>\n",
        );
        writeln!(
            out,
            "<h1>API comparison</h1>\n<p><code>{}</code> &rarr; <code>{}</code></p>",
            escape_html(&diff.old_location),
            escape_html(&diff.new_location)
        )
        .unwrap();

        let entries = entries(diff);
        if entries.is_empty() {
            out.push_str("<p>The documents are equivalent.</p>\n");
        } else {
            out.push_str("<ul>\n");
            for entry in &entries {
                let class = if entry.compatibility == Compatibility::Incompatible {
                    "incompatible"
                } else {
                    "compatible"
                };
                writeln!(
                    out,
                    "<li class=\"{class}\">{}<br><span class=\"pointer\">{}</span></li>",
                    escape_html(&entry.message),
                    escape_html(&entry.pointer)
                )
                .unwrap();
            }
            out.push_str("</ul>\n");
        }

        if !diff.diagnostics.is_empty() {
            out.push_str("<h2>Diagnostics</h2>\n<ul>\n");
            for diagnostic in &diff.diagnostics {
                writeln!(out, "<li>{}</li>", escape_html(&diagnostic.to_string())).unwrap();
            }
            out.push_str("</ul>\n");
        }

        let verdict = match diff.compatibility() {
            Compatibility::Unchanged => "equivalent",
            Compatibility::Compatible => "compatible",
            Compatibility::Incompatible => "incompatible",
        };
        writeln!(out, "<p>Result: <strong>{verdict}</strong></p>").unwrap();
        out.push_str("</body>\n</html>\n");
        out
    }
}
