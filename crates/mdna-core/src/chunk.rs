//! Overlapping, boundary-seeking text chunker for tabular documents.
//!
//! The prepared table is rendered to text (see [`Table::render_text`]) and
//! split into windows of at most `chunk_size` characters. Consecutive
//! windows overlap by at least `chunk_overlap` characters so that a row cut
//! at a window edge still appears whole in one of the neighbours.
//!
//! # Algorithm
//!
//! 1. If the rest of the text fits in one window, emit it and stop.
//! 2. Otherwise pick the window end inside `(start + overlap, start + size]`,
//!    preferring the last position right after `\n\n`, then `\n`, then a
//!    space. Without any separator the window is cut hard at `start + size`.
//!    The end must also move past the previous window's end.
//! 3. The next window starts `overlap` characters before that end, moved
//!    back (at most another `overlap` characters) to the nearest separator
//!    boundary.
//!
//! Lengths and offsets are counted in characters, never bytes.
//!
//! # Guarantees
//!
//! - Every window is an exact substring of the input, at most `chunk_size`
//!   characters long.
//! - Every window after the first shares at least `chunk_overlap`
//!   characters with its predecessor; `TextSpan::overlap` records how many.
//! - Dropping each window's overlap prefix and concatenating reproduces the
//!   input exactly ([`reassemble`]).
//!
//! After the table windows, [`chunk_table`] appends one `analysis_summary`
//! chunk carrying the headline metrics, so retrieval always has at least
//! one analytic document even for an empty table.

use serde::Serialize;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::format::currency;
use crate::metrics::MetricsResult;
use crate::table::Table;

pub const DEFAULT_CHUNK_SIZE: usize = 1000;
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;

/// Source id of the synthetic metrics chunk.
pub const ANALYSIS_SUMMARY_SOURCE: &str = "analysis_summary";

/// Break candidates, strongest first.
const SEPARATORS: &[&str] = &["\n\n", "\n", " "];

#[derive(Debug, Error, PartialEq)]
pub enum ChunkError {
    #[error("chunk_size must be > 0")]
    ZeroSize,

    #[error("chunk_overlap ({overlap}) must be less than half of chunk_size ({size})")]
    OverlapTooLarge { size: usize, overlap: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitterConfig {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl SplitterConfig {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self, ChunkError> {
        if chunk_size == 0 {
            return Err(ChunkError::ZeroSize);
        }
        if chunk_overlap * 2 >= chunk_size {
            return Err(ChunkError::OverlapTooLarge {
                size: chunk_size,
                overlap: chunk_overlap,
            });
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }
}

impl Default for SplitterConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

/// A window of the source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextSpan {
    /// Character offset of the window in the source text.
    pub start: usize,
    /// Number of leading characters shared with the previous window.
    pub overlap: usize,
    pub text: String,
}

/// Split `text` into overlapping windows. Empty input yields no windows.
pub fn split_text(text: &str, config: &SplitterConfig) -> Vec<TextSpan> {
    // bounds[k] is the byte offset of char k; bounds[n] == text.len().
    let bounds: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect();
    let n = bounds.len() - 1;

    let size = config.chunk_size;
    let overlap = config.chunk_overlap;

    let mut spans = Vec::new();
    if n == 0 {
        return spans;
    }

    let mut start = 0;
    let mut prev_end = 0;

    loop {
        let end = if n - start <= size {
            n
        } else {
            let lo = (start + overlap + 1).max(prev_end + 1);
            last_boundary(text, &bounds, lo, start + size)
        };

        spans.push(TextSpan {
            start,
            overlap: prev_end.saturating_sub(start),
            text: text[bounds[start]..bounds[end]].to_string(),
        });

        if end == n {
            break;
        }

        let target = end - overlap;
        let floor = target.saturating_sub(overlap).max(start + 1);
        start = last_boundary(text, &bounds, floor, target);
        prev_end = end;
    }

    spans
}

/// Last char position in `lo..=hi` that directly follows a separator,
/// trying separators strongest first. Falls back to `hi`.
fn last_boundary(text: &str, bounds: &[usize], lo: usize, hi: usize) -> usize {
    for sep in SEPARATORS {
        if let Some(pos) = (lo..=hi)
            .rev()
            .find(|&p| text[..bounds[p]].ends_with(sep))
        {
            return pos;
        }
    }
    hi
}

/// Rebuild the source text from its windows.
pub fn reassemble(spans: &[TextSpan]) -> String {
    let mut out = String::new();
    for span in spans {
        out.extend(span.text.chars().skip(span.overlap));
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkKind {
    FinancialData,
    AnalysisSummary,
}

/// A retrievable unit of text.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentChunk {
    pub id: String,
    pub source_id: String,
    pub kind: ChunkKind,
    pub chunk_index: usize,
    pub text: String,
    /// SHA-256 of `text`, hex encoded.
    pub hash: String,
    /// Character offset in the rendered table (0 for the summary chunk).
    pub start: usize,
    /// Characters shared with the previous data chunk.
    pub overlap: usize,
}

/// Render `table`, split it, and append the analysis summary chunk.
pub fn chunk_table(
    table: &Table,
    metrics: &MetricsResult,
    config: &SplitterConfig,
) -> Vec<DocumentChunk> {
    let text = table.render_text();
    let spans = split_text(&text, config);

    let mut chunks: Vec<DocumentChunk> = spans
        .into_iter()
        .enumerate()
        .map(|(i, span)| {
            make_chunk(
                format!("financial_data_chunk_{}", i),
                ChunkKind::FinancialData,
                i,
                span,
            )
        })
        .collect();

    let summary_index = chunks.len();
    chunks.push(make_chunk(
        ANALYSIS_SUMMARY_SOURCE.to_string(),
        ChunkKind::AnalysisSummary,
        summary_index,
        TextSpan {
            start: 0,
            overlap: 0,
            text: analysis_summary(metrics),
        },
    ));

    debug!(
        chars = text.chars().count(),
        chunks = chunks.len(),
        "table chunked"
    );

    chunks
}

/// Headline metrics as a short text document.
pub fn analysis_summary(metrics: &MetricsResult) -> String {
    format!(
        "Financial Analysis Results:\n\
         - Year-over-Year Change: {:.2}%\n\
         - Quarter-over-Quarter Change: {:.2}%\n\
         - Total Revenue: {}",
        metrics.yoy_change,
        metrics.qoq_change,
        currency(metrics.total_revenue())
    )
}

fn make_chunk(source_id: String, kind: ChunkKind, index: usize, span: TextSpan) -> DocumentChunk {
    let mut hasher = Sha256::new();
    hasher.update(span.text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    DocumentChunk {
        id: Uuid::new_v4().to_string(),
        source_id,
        kind,
        chunk_index: index,
        text: span.text,
        hash,
        start: span.start,
        overlap: span.overlap,
    }
}
