//! The pipeline facade: wires the cache, store, and synthesizer together
//! and exposes the operations a transport layer calls.
//!
//! Construction loads the cache mirror and then reconciles from disk —
//! the scan is authoritative over the mirror, which can lag behind manual
//! disk edits.

use std::sync::Arc;

use tracing::info;

use crate::answer::AnswerSynthesizer;
use crate::cache::MetadataCache;
use crate::config::PipelineConfig;
use crate::embedding::{EmbeddingBackend, OpenAiEmbeddings};
use crate::error::Result;
use crate::generation::{GenerationBackend, OpenAiGeneration};
use crate::models::{DocumentStatus, DocumentSummary, QueryResponse};
use crate::store::DocumentStore;

pub struct Pipeline {
    store: Arc<DocumentStore>,
    synthesizer: AnswerSynthesizer,
    cache: Arc<MetadataCache>,
}

impl Pipeline {
    /// Build a pipeline with injected backends, load the cache mirror,
    /// and reconcile the cache against the on-disk index root.
    pub async fn new(
        config: PipelineConfig,
        embedder: Arc<dyn EmbeddingBackend>,
        generator: Arc<dyn GenerationBackend>,
    ) -> Result<Self> {
        let cache = Arc::new(MetadataCache::new(
            config.storage.cache_mirror.clone(),
            &config.cache,
        ));

        let loaded = cache.load_mirror().await;
        let store = Arc::new(DocumentStore::new(&config, cache.clone(), embedder));
        let reconciled = store.reconcile_from_disk().await?;
        info!(loaded, reconciled, "pipeline started");

        let synthesizer = AnswerSynthesizer::new(&config, store.clone(), generator);
        Ok(Self {
            store,
            synthesizer,
            cache,
        })
    }

    /// Build a pipeline backed by the OpenAI embedding and generation
    /// APIs. Fails fast with a configuration error when the credential is
    /// missing — before any document work is accepted.
    pub async fn from_env(config: PipelineConfig) -> Result<Self> {
        let embedder: Arc<dyn EmbeddingBackend> =
            Arc::new(OpenAiEmbeddings::new(&config.embedding)?);
        let generator: Arc<dyn GenerationBackend> =
            Arc::new(OpenAiGeneration::new(&config.generation)?);
        Self::new(config, embedder, generator).await
    }

    /// Ingest a PDF and return its generated document id.
    pub async fn ingest_document(&self, file_bytes: &[u8], filename: &str) -> Result<String> {
        self.store.ingest(file_bytes, filename).await
    }

    /// Answer a query, optionally scoped to one document and one session.
    pub async fn query(
        &self,
        query_text: &str,
        document_id: Option<&str>,
        session_id: Option<&str>,
    ) -> QueryResponse {
        self.synthesizer.query(query_text, document_id, session_id).await
    }

    /// Answer a query across several documents.
    pub async fn query_multi(
        &self,
        query_text: &str,
        document_ids: &[String],
        session_id: Option<&str>,
    ) -> QueryResponse {
        self.synthesizer
            .query_multi(query_text, document_ids, session_id)
            .await
    }

    pub fn list_documents(&self) -> Vec<DocumentSummary> {
        self.store.list()
    }

    pub fn document_status(&self, document_id: &str) -> DocumentStatus {
        self.store.status(document_id)
    }

    pub async fn delete_document(&self, document_id: &str) -> Result<()> {
        self.store.delete(document_id).await
    }

    /// Re-run the disk reconciliation on demand. Returns the number of
    /// cache entries rebuilt.
    pub async fn reconcile(&self) -> Result<usize> {
        self.store.reconcile_from_disk().await
    }

    /// The shared metadata cache, exposed for transient entries and
    /// maintenance operations.
    pub fn cache(&self) -> &MetadataCache {
        &self.cache
    }
}
