//! Per-document vector index: build, persist, load, search.
//!
//! The index is a brute-force cosine-similarity scan over embedded chunks,
//! which is sufficient at per-document scale (one PDF's chunks). Each
//! document persists to its own directory: the index payload plus a
//! sidecar metadata record written by the document store.
//!
//! Search returns results in descending backend-similarity order, but the
//! relevance score exposed to callers is derived from rank position — the
//! i-th result gets `1.0 − 0.1·i`. The raw similarity stays internal.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::embedding::{cosine_similarity, EmbeddingBackend};
use crate::error::{PipelineError, Result};
use crate::models::Chunk;
use crate::storage;

/// File name of the index payload inside a document directory.
pub const INDEX_FILE: &str = "index.json";
/// File name of the sidecar metadata record.
pub const SIDECAR_FILE: &str = "metadata.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct IndexedChunk {
    chunk: Chunk,
    embedding: Vec<f32>,
}

/// An embedded, searchable representation of one document's chunks.
#[derive(Debug)]
pub struct VectorIndex {
    entries: Vec<IndexedChunk>,
}

/// A retrieved chunk with its rank-derived display score.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub relevance: f32,
}

impl VectorIndex {
    /// Embed all chunk texts and build the index. The chunk order is
    /// preserved; a count mismatch from the backend is unusable output.
    pub async fn build(embedder: &dyn EmbeddingBackend, chunks: Vec<Chunk>) -> Result<Self> {
        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let vectors = embedder.embed(&texts).await?;
        if vectors.len() != chunks.len() {
            return Err(PipelineError::Generation(format!(
                "embedding backend returned {} vectors for {} chunks",
                vectors.len(),
                chunks.len()
            )));
        }

        let entries = chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, embedding)| IndexedChunk { chunk, embedding })
            .collect();
        Ok(Self { entries })
    }

    /// Atomically write the index payload into `dir`.
    pub async fn persist(&self, dir: &Path) -> Result<()> {
        storage::write_json_atomic(&dir.join(INDEX_FILE), &self.entries)
            .await
            .map_err(|e| {
                PipelineError::Ingest(format!(
                    "failed to persist index at {}: {}",
                    dir.display(),
                    e
                ))
            })
    }

    /// Load a previously persisted index from `dir`.
    pub async fn load(dir: &Path) -> Result<Self> {
        let entries: Vec<IndexedChunk> = storage::read_json(&dir.join(INDEX_FILE))
            .await
            .map_err(|e| {
                PipelineError::Ingest(format!("failed to read index at {}: {}", dir.display(), e))
            })?
            .ok_or_else(|| {
                PipelineError::Ingest(format!("index payload missing at {}", dir.display()))
            })?;
        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Embed the query and return the top `k` chunks by similarity, with
    /// rank-derived display scores.
    pub async fn search(
        &self,
        embedder: &dyn EmbeddingBackend,
        query: &str,
        k: usize,
    ) -> Result<Vec<ScoredChunk>> {
        let vectors = embedder.embed(&[query.to_string()]).await?;
        let query_vec = vectors.into_iter().next().ok_or_else(|| {
            PipelineError::Generation("empty embedding response for query".to_string())
        })?;

        let mut ranked: Vec<(f32, &IndexedChunk)> = self
            .entries
            .iter()
            .map(|e| (cosine_similarity(&query_vec, &e.embedding), e))
            .collect();
        ranked.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        ranked.truncate(k);

        Ok(ranked
            .into_iter()
            .enumerate()
            .map(|(i, (_sim, entry))| ScoredChunk {
                chunk: entry.chunk.clone(),
                relevance: 1.0 - 0.1 * i as f32,
            })
            .collect())
    }
}

/// True when `dir` holds an index payload — the validity criterion used by
/// reconciliation and lookup self-healing.
pub fn has_payload(dir: &Path) -> bool {
    dir.join(INDEX_FILE).is_file()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use tempfile::tempdir;

    /// Deterministic embedder: each known text maps to a fixed vector.
    struct FixedEmbeddings {
        vectors: HashMap<String, Vec<f32>>,
    }

    impl FixedEmbeddings {
        fn new(pairs: &[(&str, Vec<f32>)]) -> Self {
            Self {
                vectors: pairs
                    .iter()
                    .map(|(t, v)| (t.to_string(), v.clone()))
                    .collect(),
            }
        }
    }

    #[async_trait]
    impl EmbeddingBackend for FixedEmbeddings {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .map(|t| self.vectors.get(t).cloned().unwrap_or_else(|| vec![0.0, 0.0]))
                .collect())
        }

        fn model_name(&self) -> &str {
            "fixed"
        }
    }

    fn chunk(content: &str, page: u32, index: u32) -> Chunk {
        Chunk::new(content.to_string(), "test.pdf", page, index)
    }

    fn three_chunk_embedder() -> FixedEmbeddings {
        FixedEmbeddings::new(&[
            ("close match", vec![1.0, 0.0]),
            ("medium match", vec![0.7, 0.7]),
            ("far match", vec![0.0, 1.0]),
            ("query", vec![1.0, 0.1]),
        ])
    }

    #[tokio::test]
    async fn search_ranks_by_similarity_with_display_scores() {
        let embedder = three_chunk_embedder();
        let chunks = vec![
            chunk("far match", 1, 0),
            chunk("close match", 1, 1),
            chunk("medium match", 2, 0),
        ];
        let index = VectorIndex::build(&embedder, chunks).await.unwrap();

        let results = index.search(&embedder, "query", 3).await.unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].chunk.content, "close match");
        assert_eq!(results[1].chunk.content, "medium match");
        assert_eq!(results[2].chunk.content, "far match");

        let scores: Vec<f32> = results.iter().map(|r| r.relevance).collect();
        assert_eq!(scores, vec![1.0, 0.9, 0.8]);
    }

    #[tokio::test]
    async fn search_respects_k() {
        let embedder = three_chunk_embedder();
        let chunks = vec![
            chunk("close match", 1, 0),
            chunk("medium match", 1, 1),
            chunk("far match", 1, 2),
        ];
        let index = VectorIndex::build(&embedder, chunks).await.unwrap();

        let results = index.search(&embedder, "query", 2).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].chunk.content, "close match");
    }

    #[tokio::test]
    async fn persist_and_load_roundtrip() {
        let embedder = three_chunk_embedder();
        let chunks = vec![chunk("close match", 1, 0), chunk("far match", 2, 0)];
        let index = VectorIndex::build(&embedder, chunks).await.unwrap();

        let dir = tempdir().unwrap();
        index.persist(dir.path()).await.unwrap();
        assert!(has_payload(dir.path()));

        let loaded = VectorIndex::load(dir.path()).await.unwrap();
        assert_eq!(loaded.len(), 2);

        let results = loaded.search(&embedder, "query", 1).await.unwrap();
        assert_eq!(results[0].chunk.content, "close match");
    }

    #[tokio::test]
    async fn load_fails_without_payload() {
        let dir = tempdir().unwrap();
        assert!(!has_payload(dir.path()));
        assert!(VectorIndex::load(dir.path()).await.is_err());
    }
}
