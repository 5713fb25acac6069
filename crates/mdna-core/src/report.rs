//! End-to-end report assembly.
//!
//! [`ReportPipeline::run`] takes a loaded table through schema inference,
//! metrics, chunking, retrieval and narrative generation, and returns the
//! [`ReportPayload`] served to clients.

use serde::Serialize;
use tracing::info;

use crate::capability::{Capability, Embedder, LanguageModel};
use crate::chunk::{chunk_table, SplitterConfig};
use crate::metrics::{analyze, ChartSeries, Kpis, MetricsOptions};
use crate::narrative::{NarrativeGenerator, NarrativeThresholds};
use crate::retrieval::{RetrievalIndex, DEFAULT_QUERY, DEFAULT_TOP_K};
use crate::table::Table;

/// The analysis result as returned to clients.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportPayload {
    pub yoy_change: f64,
    pub qoq_change: f64,
    pub total_revenue: f64,
    pub average_revenue: f64,
    pub revenue_growth_rate: f64,
    pub kpis: Kpis,
    pub chart_data: ChartSeries,
    pub markdown_report: String,
    pub citations: Vec<String>,
}

/// Tunables for one pipeline instance.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSettings {
    pub metrics: MetricsOptions,
    pub splitter: SplitterConfig,
    pub query: String,
    pub top_k: usize,
    pub thresholds: NarrativeThresholds,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            metrics: MetricsOptions::default(),
            splitter: SplitterConfig::default(),
            query: DEFAULT_QUERY.to_string(),
            top_k: DEFAULT_TOP_K,
            thresholds: NarrativeThresholds::default(),
        }
    }
}

pub struct ReportPipeline {
    embedder: Capability<dyn Embedder>,
    generator: NarrativeGenerator,
    settings: PipelineSettings,
}

impl ReportPipeline {
    pub fn new(
        embedder: Capability<dyn Embedder>,
        llm: Capability<dyn LanguageModel>,
        settings: PipelineSettings,
    ) -> Self {
        let generator = NarrativeGenerator::new(llm, settings.thresholds);
        Self {
            embedder,
            generator,
            settings,
        }
    }

    /// A pipeline with no external capabilities: fallback retrieval and
    /// the template narrative.
    pub fn offline(settings: PipelineSettings) -> Self {
        Self::new(
            Capability::unavailable("embeddings disabled"),
            Capability::unavailable("language model disabled"),
            settings,
        )
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    pub async fn run(&self, table: &Table) -> ReportPayload {
        let analysis = analyze(table, &self.settings.metrics);
        let chunks = chunk_table(&analysis.table, &analysis.metrics, &self.settings.splitter);

        let index = RetrievalIndex::build(chunks, &self.embedder).await;
        let retrieved = index.retrieve(&self.settings.query, self.settings.top_k).await;
        let narrative = self.generator.generate(&retrieved, &analysis.metrics).await;

        info!(
            rows = table.len(),
            chunks = index.chunks().len(),
            fallback_retrieval = index.is_fallback(),
            narrative = ?narrative.source,
            "report assembled"
        );

        let metrics = analysis.metrics;
        ReportPayload {
            yoy_change: metrics.yoy_change,
            qoq_change: metrics.qoq_change,
            total_revenue: metrics.total_revenue(),
            average_revenue: metrics.average_revenue(),
            revenue_growth_rate: metrics.revenue_growth_rate(),
            kpis: metrics.kpis,
            chart_data: metrics.chart,
            markdown_report: narrative.report,
            citations: narrative.citations,
        }
    }
}
