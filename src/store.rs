//! Document store: owns the per-document lifecycle.
//!
//! Ingest is all-or-nothing — the index is built in memory before the
//! document directory is created, and a failed persist removes the partial
//! directory, so a document record exists if and only if a valid index
//! directory exists on disk. `reconcile_from_disk` restores that invariant
//! after a cold start or out-of-band disk changes: it is an explicit,
//! idempotent scan that runs at startup and can be re-run on demand.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::cache::MetadataCache;
use crate::chunk;
use crate::config::{ChunkingConfig, PipelineConfig};
use crate::embedding::EmbeddingBackend;
use crate::error::{PipelineError, Result};
use crate::index::{self, VectorIndex, SIDECAR_FILE};
use crate::models::{DocumentInfo, DocumentStatus, DocumentSummary, SidecarMetadata};
use crate::pdf;
use crate::storage;

pub struct DocumentStore {
    index_root: PathBuf,
    chunking: ChunkingConfig,
    cache: Arc<MetadataCache>,
    embedder: Arc<dyn EmbeddingBackend>,
}

impl DocumentStore {
    pub fn new(
        config: &PipelineConfig,
        cache: Arc<MetadataCache>,
        embedder: Arc<dyn EmbeddingBackend>,
    ) -> Self {
        Self {
            index_root: config.storage.index_root.clone(),
            chunking: config.chunking.clone(),
            cache,
            embedder,
        }
    }

    /// Parse, chunk, embed, and persist a document. Returns the generated
    /// document id on success; on any failure no record is created.
    pub async fn ingest(&self, file_bytes: &[u8], filename: &str) -> Result<String> {
        let doc_id = Uuid::new_v4().to_string();

        let pages = pdf::extract_pages(file_bytes)?;
        let chunks = chunk::chunk_pages(&pages, filename, &self.chunking)?;
        let chunk_count = chunks.len();

        let vector_index = VectorIndex::build(self.embedder.as_ref(), chunks)
            .await
            .map_err(|e| match e {
                PipelineError::Generation(msg) => {
                    PipelineError::Ingest(format!("embedding failed: {}", msg))
                }
                other => other,
            })?;

        let dir = self.index_root.join(&doc_id);
        tokio::fs::create_dir_all(&dir).await.map_err(|e| {
            PipelineError::Ingest(format!(
                "failed to create index directory {}: {}",
                dir.display(),
                e
            ))
        })?;

        let sidecar = SidecarMetadata {
            filename: filename.to_string(),
            doc_id: doc_id.clone(),
            status: DocumentStatus::Processed,
            chunks: chunk_count,
            created_at: Utc::now(),
        };
        if let Err(e) = self.persist_document(&dir, &vector_index, &sidecar).await {
            // ingest is all-or-nothing; drop the partial directory
            let _ = tokio::fs::remove_dir_all(&dir).await;
            return Err(e);
        }

        let info = DocumentInfo {
            filename: filename.to_string(),
            status: DocumentStatus::Processed,
            chunks: chunk_count,
            path: dir.clone(),
        };
        if let Err(e) = self.cache.set_document(&doc_id, info).await {
            // the sidecar is durable; reconciliation will recover the entry
            warn!(doc_id = %doc_id, error = %e, "cache mirror update failed after ingest");
        }

        info!(doc_id = %doc_id, filename, chunks = chunk_count, "document ingested");
        Ok(doc_id)
    }

    async fn persist_document(
        &self,
        dir: &std::path::Path,
        vector_index: &VectorIndex,
        sidecar: &SidecarMetadata,
    ) -> Result<()> {
        vector_index.persist(dir).await?;
        storage::write_json_atomic(&dir.join(SIDECAR_FILE), sidecar)
            .await
            .map_err(|e| PipelineError::Ingest(format!("failed to write sidecar metadata: {}", e)))
    }

    /// Load the vector index for a document.
    ///
    /// A cache miss falls back to the expected on-disk path; when a
    /// readable sidecar is found there, the cache entry is rebuilt before
    /// loading (self-healing lookup). A cache entry pointing at a vanished
    /// directory is dropped and reported as not found.
    pub async fn resolve(&self, doc_id: &str) -> Result<VectorIndex> {
        let dir = match self.cache.document(doc_id) {
            Some(info) => info.path,
            None => {
                let dir = self.index_root.join(doc_id);
                if !index::has_payload(&dir) {
                    return Err(PipelineError::NotFound(doc_id.to_string()));
                }
                match storage::read_json::<SidecarMetadata>(&dir.join(SIDECAR_FILE)).await {
                    Ok(Some(meta)) => {
                        let info = DocumentInfo {
                            filename: meta.filename,
                            status: DocumentStatus::Processed,
                            chunks: meta.chunks,
                            path: dir.clone(),
                        };
                        match self.cache.set_document(doc_id, info).await {
                            Ok(()) => info!(doc_id, "rebuilt cache entry from sidecar"),
                            Err(e) => {
                                warn!(doc_id, error = %e, "failed to re-register cache entry")
                            }
                        }
                    }
                    Ok(None) => {}
                    Err(e) => warn!(doc_id, error = %e, "unreadable sidecar during lookup"),
                }
                dir
            }
        };

        if !index::has_payload(&dir) {
            // stale cache entry pointing at a vanished index
            let _ = self.cache.remove_document(doc_id).await;
            return Err(PipelineError::NotFound(doc_id.to_string()));
        }
        VectorIndex::load(&dir).await
    }

    /// Resolve a document and run a similarity search over its index.
    pub async fn search(
        &self,
        doc_id: &str,
        query: &str,
        k: usize,
    ) -> Result<Vec<crate::index::ScoredChunk>> {
        let vector_index = self.resolve(doc_id).await?;
        vector_index
            .search(self.embedder.as_ref(), query, k)
            .await
    }

    /// Enumerate all cached documents. Never touches disk; the disk is
    /// reconciled separately.
    pub fn list(&self) -> Vec<DocumentSummary> {
        let mut docs: Vec<DocumentSummary> = self
            .cache
            .document_entries()
            .into_iter()
            .map(|(document_id, info)| DocumentSummary {
                document_id,
                filename: info.filename,
                status: info.status,
                chunks: info.chunks,
            })
            .collect();
        docs.sort_by(|a, b| a.document_id.cmp(&b.document_id));
        docs
    }

    /// Cache-only status lookup. Returns the `NotFound` sentinel instead
    /// of an error; this is a polled, frequently-called operation.
    pub fn status(&self, doc_id: &str) -> DocumentStatus {
        self.cache
            .document(doc_id)
            .map(|info| info.status)
            .unwrap_or(DocumentStatus::NotFound)
    }

    /// Remove a document's index directory and cache entry. Directory
    /// removal is attempted even without a cache entry, so disk and cache
    /// cannot drift apart.
    pub async fn delete(&self, doc_id: &str) -> Result<()> {
        let cached = self.cache.document(doc_id);
        let dir = cached
            .as_ref()
            .map(|info| info.path.clone())
            .unwrap_or_else(|| self.index_root.join(doc_id));

        if dir.is_dir() {
            tokio::fs::remove_dir_all(&dir).await.map_err(|e| {
                PipelineError::Deletion(format!(
                    "failed to remove index directory {}: {}",
                    dir.display(),
                    e
                ))
            })?;
            info!(doc_id, "deleted index directory");
        } else if cached.is_none() {
            return Err(PipelineError::NotFound(doc_id.to_string()));
        }

        if cached.is_some() {
            self.cache.remove_document(doc_id).await.map_err(|e| {
                PipelineError::Deletion(format!("failed to update cache mirror: {}", e))
            })?;
        }
        Ok(())
    }

    /// Scan the index root and register every valid document directory
    /// that the cache does not know yet, synthesizing default metadata
    /// when the sidecar is missing or unreadable. Returns the number of
    /// entries rebuilt; running it again immediately rebuilds zero.
    pub async fn reconcile_from_disk(&self) -> Result<usize> {
        let mut dir = match tokio::fs::read_dir(&self.index_root).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(root = %self.index_root.display(), "no index root yet; nothing to reconcile");
                return Ok(0);
            }
            Err(e) => {
                return Err(PipelineError::Configuration(format!(
                    "failed to scan index root {}: {}",
                    self.index_root.display(),
                    e
                )))
            }
        };

        let mut rebuilt = 0usize;
        while let Some(entry) = dir.next_entry().await.map_err(|e| {
            PipelineError::Configuration(format!(
                "failed to scan index root {}: {}",
                self.index_root.display(),
                e
            ))
        })? {
            let path = entry.path();
            if !path.is_dir() || !index::has_payload(&path) {
                continue;
            }
            let doc_id = entry.file_name().to_string_lossy().into_owned();

            let (filename, chunks) =
                match storage::read_json::<SidecarMetadata>(&path.join(SIDECAR_FILE)).await {
                    Ok(Some(meta)) => (meta.filename, meta.chunks),
                    Ok(None) => ("Unknown Document".to_string(), 0),
                    Err(e) => {
                        warn!(doc_id = %doc_id, error = %e, "unreadable sidecar; using defaults");
                        ("Unknown Document".to_string(), 0)
                    }
                };

            let info = DocumentInfo {
                filename,
                status: DocumentStatus::Processed,
                chunks,
                path,
            };
            if self.cache.register_document(&doc_id, info) {
                debug!(doc_id = %doc_id, "registered document from disk");
                rebuilt += 1;
            }
        }

        if rebuilt > 0 {
            if let Err(e) = self.cache.flush_mirror().await {
                // the scan is authoritative; the next mutation rewrites the mirror
                warn!(error = %e, "failed to flush cache mirror after reconciliation");
            }
        }
        info!(rebuilt, "reconciled document cache from disk");
        Ok(rebuilt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Chunk;
    use async_trait::async_trait;
    use std::path::Path;
    use tempfile::{tempdir, TempDir};

    /// Deterministic embedder: a tiny byte-frequency vector per text.
    struct HashEmbeddings;

    #[async_trait]
    impl EmbeddingBackend for HashEmbeddings {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .map(|t| {
                    let mut v = [0.0f32; 8];
                    for (i, b) in t.bytes().enumerate() {
                        v[i % 8] += b as f32;
                    }
                    v.to_vec()
                })
                .collect())
        }

        fn model_name(&self) -> &str {
            "hash"
        }
    }

    struct Fixture {
        _tmp: TempDir,
        store: DocumentStore,
        root: PathBuf,
    }

    fn fixture() -> Fixture {
        let tmp = tempdir().unwrap();
        let mut config = PipelineConfig::default();
        config.storage.index_root = tmp.path().join("vector_stores");
        config.storage.cache_mirror = tmp.path().join("cache_data.json");

        let cache = Arc::new(MetadataCache::new(
            config.storage.cache_mirror.clone(),
            &config.cache,
        ));
        let store = DocumentStore::new(&config, cache, Arc::new(HashEmbeddings));
        let root = config.storage.index_root.clone();
        Fixture {
            _tmp: tmp,
            store,
            root,
        }
    }

    async fn fabricate_document(root: &Path, doc_id: &str, filename: &str, with_sidecar: bool) {
        let dir = root.join(doc_id);
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let chunks = vec![Chunk::new("alpha beta".to_string(), filename, 1, 0)];
        let vector_index = VectorIndex::build(&HashEmbeddings, chunks).await.unwrap();
        vector_index.persist(&dir).await.unwrap();
        if with_sidecar {
            let sidecar = SidecarMetadata {
                filename: filename.to_string(),
                doc_id: doc_id.to_string(),
                status: DocumentStatus::Processed,
                chunks: 1,
                created_at: Utc::now(),
            };
            storage::write_json_atomic(&dir.join(SIDECAR_FILE), &sidecar)
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn resolve_unknown_id_is_not_found() {
        let fx = fixture();
        let err = fx.store.resolve("missing").await.unwrap_err();
        assert!(matches!(err, PipelineError::NotFound(_)));
    }

    #[tokio::test]
    async fn resolve_self_heals_from_sidecar() {
        let fx = fixture();
        fabricate_document(&fx.root, "doc-1", "healed.pdf", true).await;

        assert_eq!(fx.store.status("doc-1"), DocumentStatus::NotFound);
        let loaded = fx.store.resolve("doc-1").await.unwrap();
        assert_eq!(loaded.len(), 1);
        // lookup re-registered the cache entry
        assert_eq!(fx.store.status("doc-1"), DocumentStatus::Processed);
        assert_eq!(fx.store.list()[0].filename, "healed.pdf");
    }

    #[tokio::test]
    async fn resolve_without_sidecar_still_loads() {
        let fx = fixture();
        fabricate_document(&fx.root, "doc-1", "bare.pdf", false).await;

        let loaded = fx.store.resolve("doc-1").await.unwrap();
        assert_eq!(loaded.len(), 1);
        // no sidecar, nothing to re-register from
        assert_eq!(fx.store.status("doc-1"), DocumentStatus::NotFound);
    }

    #[tokio::test]
    async fn resolve_drops_stale_cache_entry_after_disk_deletion() {
        let fx = fixture();
        fabricate_document(&fx.root, "doc-1", "gone.pdf", true).await;
        fx.store.reconcile_from_disk().await.unwrap();
        assert_eq!(fx.store.status("doc-1"), DocumentStatus::Processed);

        tokio::fs::remove_dir_all(fx.root.join("doc-1")).await.unwrap();
        let err = fx.store.resolve("doc-1").await.unwrap_err();
        assert!(matches!(err, PipelineError::NotFound(_)));
        assert_eq!(fx.store.status("doc-1"), DocumentStatus::NotFound);
    }

    #[tokio::test]
    async fn reconcile_is_idempotent_and_defaults_missing_sidecars() {
        let fx = fixture();
        fabricate_document(&fx.root, "doc-1", "a.pdf", true).await;
        fabricate_document(&fx.root, "doc-2", "b.pdf", false).await;
        // a directory without an index payload is not a document
        tokio::fs::create_dir_all(fx.root.join("junk")).await.unwrap();

        assert_eq!(fx.store.reconcile_from_disk().await.unwrap(), 2);
        assert_eq!(fx.store.reconcile_from_disk().await.unwrap(), 0);

        let docs = fx.store.list();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].filename, "a.pdf");
        assert_eq!(docs[1].filename, "Unknown Document");
        assert_eq!(docs[1].chunks, 0);
    }

    #[tokio::test]
    async fn reconcile_with_no_root_is_a_no_op() {
        let fx = fixture();
        assert_eq!(fx.store.reconcile_from_disk().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn delete_removes_directory_and_cache_entry() {
        let fx = fixture();
        fabricate_document(&fx.root, "doc-1", "a.pdf", true).await;
        fx.store.reconcile_from_disk().await.unwrap();

        fx.store.delete("doc-1").await.unwrap();
        assert!(!fx.root.join("doc-1").exists());
        assert_eq!(fx.store.status("doc-1"), DocumentStatus::NotFound);
        assert!(fx.store.list().is_empty());
    }

    #[tokio::test]
    async fn delete_works_without_cache_entry() {
        let fx = fixture();
        fabricate_document(&fx.root, "doc-1", "a.pdf", true).await;
        // cache knows nothing, the directory is still removed
        fx.store.delete("doc-1").await.unwrap();
        assert!(!fx.root.join("doc-1").exists());
    }

    #[tokio::test]
    async fn delete_unknown_id_is_not_found() {
        let fx = fixture();
        let err = fx.store.delete("missing").await.unwrap_err();
        assert!(matches!(err, PipelineError::NotFound(_)));
    }
}
