// Copyright 2025 Oxide Computer Company

//! skew: detect and classify changes between OpenAPI documents.

use std::process::ExitCode;

use anyhow::Context as _;
use clap::Parser;
use skew::{
    cli::{Args, OutputFormat},
    compare_locations,
    render::{ConsoleRenderer, HtmlRenderer, MarkdownRenderer, Render},
    DefaultLoader, DiffNode, ExternalMode, Workspace,
};

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    match run().await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::from(2)
        }
    }
}

async fn run() -> anyhow::Result<ExitCode> {
    let args = Args::parse();

    let loader = DefaultLoader::default();
    let mode = if args.resolve_external {
        ExternalMode::Inline
    } else {
        ExternalMode::LeaveUnresolved
    };

    let mut workspace = Workspace::with_mode(mode);
    if args.resolve_external {
        workspace.load_transitive(&loader, &args.old).await?;
        workspace.load_transitive(&loader, &args.new).await?;
    } else {
        workspace.load_document(&loader, &args.old).await?;
        workspace.load_document(&loader, &args.new).await?;
    }

    let diff = compare_locations(&workspace, &args.old, &args.new)?;

    let renderer: Box<dyn Render> = match args.format {
        OutputFormat::Console => Box::new(ConsoleRenderer),
        OutputFormat::Markdown => Box::new(MarkdownRenderer),
        OutputFormat::Html => Box::new(HtmlRenderer),
    };
    let report = renderer.render(&diff);

    match &args.output {
        Some(path) => std::fs::write(path, &report)
            .with_context(|| format!("writing report to {}", path.display()))?,
        None => print!("{report}"),
    }

    if diff.is_incompatible() && !args.no_fail_on_incompatible {
        Ok(ExitCode::from(1))
    } else {
        Ok(ExitCode::SUCCESS)
    }
}
