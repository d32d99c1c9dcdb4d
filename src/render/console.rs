// Copyright 2025 Oxide Computer Company

use std::fmt::Write as _;

use crate::changed::{ChangedOpenApi, Compatibility, DiffNode};

use super::{entries, Render};

/// Plain-text report for terminals and CI logs.
#[derive(Debug, Default)]
pub struct ConsoleRenderer;

impl Render for ConsoleRenderer {
    fn render(&self, diff: &ChangedOpenApi) -> String {
        let mut out = String::new();
        writeln!(
            out,
            "comparing {} -> {}",
            diff.old_location, diff.new_location
        )
        .unwrap();

        let entries = entries(diff);
        if entries.is_empty() {
            out.push_str("\nthe documents are equivalent\n");
        } else {
            let breaking: Vec<_> = entries
                .iter()
                .filter(|e| e.compatibility == Compatibility::Incompatible)
                .collect();
            let compatible: Vec<_> = entries
                .iter()
                .filter(|e| e.compatibility != Compatibility::Incompatible)
                .collect();

            if !breaking.is_empty() {
                writeln!(out, "\nbreaking changes ({}):", breaking.len()).unwrap();
                for entry in breaking {
                    writeln!(out, "  {}\n    at {}", entry.message, entry.pointer).unwrap();
                }
            }
            if !compatible.is_empty() {
                writeln!(out, "\ncompatible changes ({}):", compatible.len()).unwrap();
                for entry in compatible {
                    writeln!(out, "  {}\n    at {}", entry.message, entry.pointer).unwrap();
                }
            }
        }

        if !diff.diagnostics.is_empty() {
            writeln!(out, "\ndiagnostics ({}):", diff.diagnostics.len()).unwrap();
            for diagnostic in &diff.diagnostics {
                writeln!(out, "  {}", diagnostic).unwrap();
            }
        }

        let verdict = match diff.compatibility() {
            Compatibility::Unchanged => "equivalent",
            Compatibility::Compatible => "compatible",
            Compatibility::Incompatible => "incompatible",
        };
        writeln!(out, "\nresult: {}", verdict).unwrap();

        out
    }
}
