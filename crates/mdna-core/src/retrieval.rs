//! Semantic retrieval over the chunks of a single report.
//!
//! A [`RetrievalIndex`] is built per request and dropped with it. When an
//! embedder is available every chunk is embedded in one batch and loaded
//! into a [`SimilarityIndex`]; queries are embedded the same way and
//! answered by cosine similarity. When no embedder is configured, or any
//! embedding call fails, the index runs in fallback mode and answers every
//! query with the first `k` chunks in chunk order.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::capability::{Capability, Embedder};
use crate::chunk::DocumentChunk;

pub const DEFAULT_QUERY: &str = "financial performance revenue trends analysis";
pub const DEFAULT_TOP_K: usize = 5;

/// Nearest-neighbour lookup over chunk vectors.
#[async_trait]
pub trait SimilarityIndex: Send + Sync {
    /// Add vectors keyed by chunk id, replacing any previous vector for an id.
    async fn insert(&self, items: Vec<(String, Vec<f32>)>) -> Result<()>;

    /// Up to `k` `(chunk_id, score)` pairs, best first.
    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<(String, f32)>>;
}

/// Brute-force cosine index held in memory.
pub struct InMemoryIndex {
    vectors: RwLock<Vec<(String, Vec<f32>)>>,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self {
            vectors: RwLock::new(Vec::new()),
        }
    }
}

impl Default for InMemoryIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SimilarityIndex for InMemoryIndex {
    async fn insert(&self, items: Vec<(String, Vec<f32>)>) -> Result<()> {
        let mut vectors = self
            .vectors
            .write()
            .map_err(|_| anyhow!("similarity index lock poisoned"))?;
        for (id, vector) in items {
            vectors.retain(|(existing, _)| *existing != id);
            vectors.push((id, vector));
        }
        Ok(())
    }

    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<(String, f32)>> {
        let vectors = self
            .vectors
            .read()
            .map_err(|_| anyhow!("similarity index lock poisoned"))?;
        let mut scored: Vec<(String, f32)> = vectors
            .iter()
            .map(|(id, v)| (id.clone(), cosine_similarity(vector, v)))
            .collect();
        // Stable sort keeps insertion order among equal scores.
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        Ok(scored)
    }
}

/// Cosine similarity in `[-1, 1]`; `0.0` for empty, mismatched or zero vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a < f32::EPSILON || norm_b < f32::EPSILON {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

/// A chunk returned by [`RetrievalIndex::retrieve`].
#[derive(Debug, Clone)]
pub struct RetrievedChunk {
    pub chunk: DocumentChunk,
    /// Zero-based position in the result list.
    pub rank: usize,
    /// Cosine score; `None` in fallback mode.
    pub score: Option<f32>,
}

enum Mode {
    Indexed {
        embedder: Arc<dyn Embedder>,
        index: Box<dyn SimilarityIndex>,
    },
    Fallback,
}

pub struct RetrievalIndex {
    chunks: Vec<DocumentChunk>,
    by_id: HashMap<String, usize>,
    mode: Mode,
}

impl RetrievalIndex {
    /// Build over `chunks` with the default [`InMemoryIndex`].
    pub async fn build(chunks: Vec<DocumentChunk>, embedder: &Capability<dyn Embedder>) -> Self {
        Self::build_with(chunks, embedder, Box::new(InMemoryIndex::new())).await
    }

    /// Build over `chunks`, loading vectors into `index`.
    pub async fn build_with(
        chunks: Vec<DocumentChunk>,
        embedder: &Capability<dyn Embedder>,
        index: Box<dyn SimilarityIndex>,
    ) -> Self {
        let by_id = chunks
            .iter()
            .enumerate()
            .map(|(i, c)| (c.id.clone(), i))
            .collect();

        let mode = match embedder {
            Capability::Unavailable { reason } => {
                info!(reason = %reason, "embeddings unavailable; retrieval in fallback mode");
                Mode::Fallback
            }
            Capability::Available(embedder) => {
                let loaded = load(&chunks, embedder.as_ref(), index.as_ref()).await;
                match loaded {
                    Ok(()) => {
                        info!(
                            chunks = chunks.len(),
                            model = embedder.model_name(),
                            "retrieval index built"
                        );
                        Mode::Indexed {
                            embedder: Arc::clone(embedder),
                            index,
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "failed to build retrieval index; using fallback mode");
                        Mode::Fallback
                    }
                }
            }
        };

        Self {
            chunks,
            by_id,
            mode,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self.mode, Mode::Fallback)
    }

    pub fn chunks(&self) -> &[DocumentChunk] {
        &self.chunks
    }

    /// The `k` chunks most relevant to `query`.
    pub async fn retrieve(&self, query: &str, k: usize) -> Vec<RetrievedChunk> {
        let (embedder, index) = match &self.mode {
            Mode::Indexed { embedder, index } => (embedder, index),
            Mode::Fallback => return self.first(k),
        };

        match self.search(embedder.as_ref(), index.as_ref(), query, k).await {
            Ok(hits) => {
                debug!(query, hits = hits.len(), "retrieved chunks");
                hits
            }
            Err(e) => {
                warn!(error = %e, "query embedding failed; using fallback retrieval");
                self.first(k)
            }
        }
    }

    async fn search(
        &self,
        embedder: &dyn Embedder,
        index: &dyn SimilarityIndex,
        query: &str,
        k: usize,
    ) -> Result<Vec<RetrievedChunk>> {
        let vectors = embedder.embed(&[query.to_string()]).await?;
        let vector = vectors
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("embedder returned no vector for the query"))?;

        let hits = index.query(&vector, k).await?;
        Ok(hits
            .into_iter()
            .filter_map(|(id, score)| self.by_id.get(&id).map(|&i| (i, score)))
            .enumerate()
            .map(|(rank, (i, score))| RetrievedChunk {
                chunk: self.chunks[i].clone(),
                rank,
                score: Some(score),
            })
            .collect())
    }

    fn first(&self, k: usize) -> Vec<RetrievedChunk> {
        self.chunks
            .iter()
            .take(k)
            .enumerate()
            .map(|(rank, chunk)| RetrievedChunk {
                chunk: chunk.clone(),
                rank,
                score: None,
            })
            .collect()
    }
}

async fn load(
    chunks: &[DocumentChunk],
    embedder: &dyn Embedder,
    index: &dyn SimilarityIndex,
) -> Result<()> {
    let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
    let vectors = embedder.embed(&texts).await?;
    if vectors.len() != chunks.len() {
        bail!(
            "embedder returned {} vectors for {} chunks",
            vectors.len(),
            chunks.len()
        );
    }
    let items = chunks
        .iter()
        .zip(vectors)
        .map(|(c, v)| (c.id.clone(), v))
        .collect();
    index.insert(items).await
}
