//! CLI commands that run the pipeline on a local file.
//!
//! - `mdna analyze <file>`: full report, as JSON or markdown
//! - `mdna metrics <file>`: schema hints and metrics only
//! - `mdna chunks <file>`: the chunk list fed to retrieval
//!
//! Results go to stdout (or `--output`); logs go to stderr.

use anyhow::{Context, Result};
use mdna_core::chunk::chunk_table;
use mdna_core::metrics::analyze;
use mdna_core::report::{ReportPayload, ReportPipeline};
use serde::Serialize;
use std::path::Path;

use crate::config::Config;
use crate::embedding::create_embedder;
use crate::llm::create_language_model;
use crate::loader::load_path;

/// How `mdna analyze` renders its result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// The full report payload as pretty-printed JSON.
    Json,
    /// Only the markdown narrative.
    Markdown,
}

/// Resolve both capabilities from config and assemble a pipeline.
pub fn build_pipeline(config: &Config) -> Result<ReportPipeline> {
    let embedder = create_embedder(&config.embedding)?;
    let llm = create_language_model(&config.llm)?;
    Ok(ReportPipeline::new(embedder, llm, config.pipeline_settings()?))
}

pub async fn run_analyze(
    config: &Config,
    file: &Path,
    format: OutputFormat,
    output: Option<&Path>,
) -> Result<()> {
    let table = load_path(file)?;
    let pipeline = build_pipeline(config)?;
    let payload = pipeline.run(&table).await;

    let rendered = render(&payload, format)?;
    match output {
        Some(path) => {
            std::fs::write(path, &rendered)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!("Report written to {}", path.display());
        }
        None => println!("{}", rendered),
    }
    Ok(())
}

fn render(payload: &ReportPayload, format: OutputFormat) -> Result<String> {
    Ok(match format {
        OutputFormat::Json => serde_json::to_string_pretty(payload)?,
        OutputFormat::Markdown => payload.markdown_report.clone(),
    })
}

#[derive(Serialize)]
struct MetricsOutput<'a> {
    hints: &'a mdna_core::schema::SchemaHints,
    metrics: &'a mdna_core::metrics::MetricsResult,
}

pub fn run_metrics(config: &Config, file: &Path) -> Result<()> {
    let table = load_path(file)?;
    let settings = config.pipeline_settings()?;
    let analysis = analyze(&table, &settings.metrics);

    let out = MetricsOutput {
        hints: &analysis.hints,
        metrics: &analysis.metrics,
    };
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

pub fn run_chunks(config: &Config, file: &Path) -> Result<()> {
    let table = load_path(file)?;
    let settings = config.pipeline_settings()?;
    let analysis = analyze(&table, &settings.metrics);
    let chunks = chunk_table(&analysis.table, &analysis.metrics, &settings.splitter);

    println!(
        "{:<28} {:>8} {:>8} {:>8}",
        "SOURCE", "START", "OVERLAP", "CHARS"
    );
    println!("{}", "-".repeat(56));
    for chunk in &chunks {
        println!(
            "{:<28} {:>8} {:>8} {:>8}",
            chunk.source_id,
            chunk.start,
            chunk.overlap,
            chunk.text.chars().count()
        );
    }
    println!();
    println!("{} chunks", chunks.len());
    Ok(())
}
