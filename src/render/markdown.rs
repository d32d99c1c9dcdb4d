// Copyright 2025 Oxide Computer Company

use std::fmt::Write as _;

use crate::changed::{ChangedOpenApi, Compatibility, DiffNode};

use super::{entries, escape_markdown, Render};

/// Markdown report, suitable for pull-request comments.
#[derive(Debug, Default)]
pub struct MarkdownRenderer;

impl Render for MarkdownRenderer {
    fn render(&self, diff: &ChangedOpenApi) -> String {
        let mut out = String::new();
        writeln!(out, "# API comparison").unwrap();
        writeln!(
            out,
            "\n`{}` → `{}`\n",
            escape_markdown(&diff.old_location),
            escape_markdown(&diff.new_location)
        )
        .unwrap();

        let entries = entries(diff);
        if entries.is_empty() {
            writeln!(out, "The documents are **equivalent**.").unwrap();
        } else {
            let sections = [
                ("Breaking changes", Compatibility::Incompatible, true),
                ("Compatible changes", Compatibility::Incompatible, false),
            ];
            for (title, level, matching) in sections {
                let rows: Vec<_> = entries
                    .iter()
                    .filter(|e| (e.compatibility == level) == matching)
                    .collect();
                if rows.is_empty() {
                    continue;
                }
                writeln!(out, "## {title}\n").unwrap();
                writeln!(out, "| Change | Location |").unwrap();
                writeln!(out, "| --- | --- |").unwrap();
                for entry in rows {
                    writeln!(
                        out,
                        "| {} | `{}` |",
                        escape_markdown(&entry.message),
                        escape_markdown(&entry.pointer)
                    )
                    .unwrap();
                }
                out.push('\n');
            }
        }

        if !diff.diagnostics.is_empty() {
            writeln!(out, "## Diagnostics\n").unwrap();
            for diagnostic in &diff.diagnostics {
                writeln!(out, "- {}", escape_markdown(&diagnostic.to_string())).unwrap();
            }
            out.push('\n');
        }

        let verdict = match diff.compatibility() {
            Compatibility::Unchanged => "equivalent",
            Compatibility::Compatible => "compatible",
            Compatibility::Incompatible => "**incompatible**",
        };
        writeln!(out, "Result: {verdict}").unwrap();
        out
    }
}
