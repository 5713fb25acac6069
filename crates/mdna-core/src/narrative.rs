//! MD&A narrative generation.
//!
//! With a language model available the generator sends one prompt built
//! from the retrieved context and the headline metrics, and cites the
//! chunk texts it used. Without one, or when the call fails or returns
//! nothing, it renders a fixed five-section markdown template whose
//! wording depends only on the metrics and [`NarrativeThresholds`].

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::capability::{Capability, LanguageModel, Prompt};
use crate::format::{currency, thousands};
use crate::metrics::MetricsResult;
use crate::retrieval::RetrievedChunk;

/// Chunks included in the prompt context.
pub const MAX_CONTEXT_CHUNKS: usize = 5;

/// Citations attached to a template report.
pub const TEMPLATE_CITATIONS: &[&str] = &["financial_data_chunks", "analysis_summary"];

pub const SYSTEM_INSTRUCTION: &str = "You are a financial analyst writing a Management Discussion & Analysis (MD&A) report. \
     Use the provided financial data and analysis to create structured sections.";

/// Cut-offs that pick the template's qualitative phrases.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NarrativeThresholds {
    /// Revenue reads as stable when volatility is below this share of the average.
    pub stable_volatility_ratio: f64,
    /// YoY percentage above which growth is "strong".
    pub strong_growth_pct: f64,
    /// YoY percentage above which market conditions read as favorable.
    pub favorable_market_pct: f64,
}

impl Default for NarrativeThresholds {
    fn default() -> Self {
        Self {
            stable_volatility_ratio: 0.2,
            strong_growth_pct: 10.0,
            favorable_market_pct: 5.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NarrativeSource {
    Model,
    Template,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Narrative {
    pub report: String,
    pub citations: Vec<String>,
    pub source: NarrativeSource,
}

/// Build the prompt for the model path.
pub fn build_prompt(retrieved: &[RetrievedChunk], metrics: &MetricsResult) -> Prompt {
    let context = context_texts(retrieved).join("\n\n");

    let user = format!(
        "Financial Data Context:\n\
         {context}\n\
         \n\
         Analysis Results:\n\
         - YoY Change: {yoy:.2}%\n\
         - QoQ Change: {qoq:.2}%\n\
         - Total Revenue: ${total}\n\
         \n\
         Generate:\n\
         1. Executive Summary\n\
         2. Revenue Trends\n\
         3. KPIs\n\
         4. Risks\n\
         5. Outlook\n",
        context = context,
        yoy = metrics.yoy_change,
        qoq = metrics.qoq_change,
        total = thousands(metrics.total_revenue()),
    );

    Prompt {
        system: SYSTEM_INSTRUCTION.to_string(),
        user,
    }
}

fn context_texts(retrieved: &[RetrievedChunk]) -> Vec<String> {
    retrieved
        .iter()
        .take(MAX_CONTEXT_CHUNKS)
        .map(|r| r.chunk.text.clone())
        .collect()
}

pub struct NarrativeGenerator {
    llm: Capability<dyn LanguageModel>,
    thresholds: NarrativeThresholds,
}

impl NarrativeGenerator {
    pub fn new(llm: Capability<dyn LanguageModel>, thresholds: NarrativeThresholds) -> Self {
        Self { llm, thresholds }
    }

    pub async fn generate(&self, retrieved: &[RetrievedChunk], metrics: &MetricsResult) -> Narrative {
        let llm = match &self.llm {
            Capability::Available(llm) => llm,
            Capability::Unavailable { reason } => {
                info!(reason = %reason, "language model unavailable; using template report");
                return self.template(metrics);
            }
        };

        let prompt = build_prompt(retrieved, metrics);
        match llm.generate(&prompt).await {
            Ok(report) if !report.trim().is_empty() => {
                info!(model = llm.model_name(), "narrative generated by model");
                Narrative {
                    report,
                    citations: context_texts(retrieved),
                    source: NarrativeSource::Model,
                }
            }
            Ok(_) => {
                warn!(model = llm.model_name(), "model returned an empty completion; using template report");
                self.template(metrics)
            }
            Err(e) => {
                warn!(model = llm.model_name(), error = %e, "narrative generation failed; using template report");
                self.template(metrics)
            }
        }
    }

    fn template(&self, metrics: &MetricsResult) -> Narrative {
        Narrative {
            report: template_report(metrics, &self.thresholds),
            citations: TEMPLATE_CITATIONS.iter().map(|s| s.to_string()).collect(),
            source: NarrativeSource::Template,
        }
    }
}

/// Deterministic markdown report.
pub fn template_report(metrics: &MetricsResult, thresholds: &NarrativeThresholds) -> String {
    let yoy = metrics.yoy_change;
    let qoq = metrics.qoq_change;
    let kpis = &metrics.kpis;
    let total = currency(metrics.total_revenue());
    let average = currency(metrics.average_revenue());

    let yoy_direction = if yoy > 0.0 { "positive" } else { "negative" };
    let yoy_reading = if yoy > thresholds.strong_growth_pct {
        "strong growth"
    } else if yoy > 0.0 {
        "moderate growth"
    } else {
        "declining revenue"
    };
    let qoq_direction = if qoq > 0.0 { "growth" } else { "decline" };
    let qoq_reading = if qoq > 0.0 {
        "suggests positive momentum"
    } else {
        "indicates potential challenges"
    };

    let mut report = format!(
        "# Management Discussion & Analysis (MD&A) Report\n\
         \n\
         ## Executive Summary\n\
         \n\
         This report provides a comprehensive analysis of the company's financial performance based on the submitted financial statements.\n\
         \n\
         **Key Highlights:**\n\
         - Year-over-Year (YoY) Revenue Change: **{yoy:.2}%**\n\
         - Quarter-over-Quarter (QoQ) Revenue Change: **{qoq:.2}%**\n\
         - Total Revenue: **{total}**\n\
         \n\
         ## Revenue Trends and Drivers\n\
         \n\
         ### Year-over-Year Analysis\n\
         The company has shown a {yoy_direction} YoY revenue change of {yoy:.2}%. \
         This indicates {yoy_reading} compared to the previous year.\n\
         \n\
         ### Quarter-over-Quarter Analysis\n\
         The most recent quarter shows a {qoq_direction} of {qoq:.2}% compared to the previous quarter. \
         This {qoq_reading} in the short term.\n\
         \n\
         ### Revenue Drivers\n\
         - Average quarterly revenue: {average}\n\
         - Revenue growth rate: {growth:.2}%\n\
         - Revenue volatility: {volatility}\n\
         \n\
         ## Key Performance Indicators\n\
         \n\
         The analysis reveals several important KPIs:\n\
         \n\
         1. **Total Revenue**: {total}\n\
         2. **Average Revenue**: {average}\n",
        growth = metrics.revenue_growth_rate(),
        volatility = currency(metrics.revenue_volatility()),
    );

    if kpis.has_expenses() {
        report.push_str(&format!(
            "\n\
             3. **Total Expenses**: {}\n\
             4. **Net Income**: {}\n\
             5. **Profit Margin**: {:.2}%\n",
            currency(kpis.total_expenses.unwrap_or(0.0)),
            currency(kpis.net_income.unwrap_or(0.0)),
            kpis.profit_margin.unwrap_or(0.0),
        ));
    }

    let volatility_line = if kpis.revenue_volatility.unwrap_or(0.0)
        < kpis.average_revenue.unwrap_or(1.0) * thresholds.stable_volatility_ratio
    {
        "The revenue shows moderate stability"
    } else {
        "High revenue volatility indicates potential market instability"
    };
    let sustainability_line = if yoy > 0.0 && qoq > 0.0 {
        "The positive growth trend appears sustainable"
    } else {
        "Mixed signals between YoY and QoQ changes require careful monitoring"
    };
    let market_line = if yoy > thresholds.favorable_market_pct {
        "Favorable market conditions"
    } else {
        "Challenging market conditions"
    };
    let near_term = if qoq > 0.0 {
        "Positive momentum is expected to continue"
    } else {
        "Careful monitoring of revenue trends is recommended"
    };
    let strategy = if yoy > 0.0 {
        "capitalizing on growth trends"
    } else {
        "addressing revenue decline through strategic initiatives"
    };

    report.push_str(&format!(
        "\n\
         ## Risks and Challenges\n\
         \n\
         Based on the financial trends observed:\n\
         \n\
         1. **Revenue Volatility**: {volatility_line}\n\
         2. **Growth Sustainability**: {sustainability_line}\n\
         3. **Market Conditions**: {market_line} are reflected in the revenue performance\n\
         \n\
         ## Outlook\n\
         \n\
         ### Near-term Expectations\n\
         {near_term} based on the QoQ change of {qoq:.2}%.\n\
         \n\
         ### Strategic Considerations\n\
         - Continue {strategy}\n\
         - Monitor key performance indicators closely\n\
         - Adjust strategies based on quarterly performance patterns\n\
         \n\
         ---\n\
         \n\
         *Report generated automatically from financial data analysis. [Source: financial_data_chunks]*\n"
    ));

    report
}
