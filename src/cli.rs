// Copyright 2025 Oxide Computer Company

//! Command-line argument surface.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

#[derive(Parser)]
#[command(name = "skew")]
#[command(version)]
#[command(about = "Detect and classify changes between OpenAPI documents", long_about = None)]
#[command(after_help = "EXIT CODES:
    0  Documents are equivalent, or differ only compatibly
    1  Incompatible changes detected (unless --no-fail-on-incompatible)
    2  A document could not be loaded, parsed, or compared

EXAMPLES:
    # Compare two local documents
    skew old.json new.json

    # Follow external $refs and emit a Markdown report
    skew --resolve-external -f markdown old.yaml https://example.com/new.yaml
")]
pub struct Args {
    /// The old (baseline) document: a file path or http(s) URL.
    pub old: String,

    /// The new document: a file path or http(s) URL.
    pub new: String,

    /// Follow $refs into external documents, loading them transitively.
    /// Without this, external references are reported as diagnostics.
    #[arg(long)]
    pub resolve_external: bool,

    /// Report format.
    #[arg(long, short = 'f', value_enum, default_value = "console")]
    pub format: OutputFormat,

    /// Write the report to a file instead of stdout.
    #[arg(long, short = 'o')]
    pub output: Option<PathBuf>,

    /// Exit 0 even when incompatible changes are found.
    #[arg(long)]
    pub no_fail_on_incompatible: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Console,
    Markdown,
    Html,
}
