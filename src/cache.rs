//! Time- and capacity-bounded metadata cache with a disk-backed mirror.
//!
//! Two physically separate maps replace key-prefix namespacing: document
//! records (mirrored to disk) and transient entries (in-memory only, lost
//! on restart by design). Entries expire a fixed TTL after insertion and
//! are evicted on access; once the combined entry count exceeds the
//! capacity bound, the oldest-inserted entries are dropped first
//! (least-recently-inserted, not least-recently-used).
//!
//! Every mutation of a document record rewrites the mirror file atomically
//! (temp file, then rename), so a reader never observes a half-written
//! mirror. The mirror is a convenience for warm starts; the disk scan in
//! [`DocumentStore::reconcile_from_disk`](crate::store::DocumentStore)
//! remains authoritative.

use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::config::CacheConfig;
use crate::models::DocumentInfo;
use crate::storage;

struct TimedEntry<T> {
    value: T,
    inserted_at: Instant,
    seq: u64,
}

struct CacheInner {
    documents: HashMap<String, TimedEntry<DocumentInfo>>,
    transient: HashMap<String, TimedEntry<serde_json::Value>>,
    seq: u64,
}

impl CacheInner {
    fn next_seq(&mut self) -> u64 {
        self.seq += 1;
        self.seq
    }

    fn evict_over_capacity(&mut self, max_entries: usize) {
        while self.documents.len() + self.transient.len() > max_entries {
            let doc_oldest = self
                .documents
                .iter()
                .min_by_key(|(_, e)| e.seq)
                .map(|(k, e)| (k.clone(), e.seq));
            let transient_oldest = self
                .transient
                .iter()
                .min_by_key(|(_, e)| e.seq)
                .map(|(k, e)| (k.clone(), e.seq));

            match (doc_oldest, transient_oldest) {
                (Some((dk, ds)), Some((_, ts))) if ds <= ts => {
                    self.documents.remove(&dk);
                }
                (_, Some((tk, _))) => {
                    self.transient.remove(&tk);
                }
                (Some((dk, _)), None) => {
                    self.documents.remove(&dk);
                }
                (None, None) => break,
            }
        }
    }
}

/// Shared metadata cache. All methods take `&self` so it can sit behind an
/// `Arc`; lock scopes never span an await.
pub struct MetadataCache {
    inner: Mutex<CacheInner>,
    mirror_path: PathBuf,
    ttl: Duration,
    max_entries: usize,
}

impl MetadataCache {
    pub fn new(mirror_path: PathBuf, config: &CacheConfig) -> Self {
        Self {
            inner: Mutex::new(CacheInner {
                documents: HashMap::new(),
                transient: HashMap::new(),
                seq: 0,
            }),
            mirror_path,
            ttl: Duration::from_secs(config.ttl_secs),
            max_entries: config.max_entries,
        }
    }

    fn expired(&self, inserted_at: Instant) -> bool {
        inserted_at.elapsed() >= self.ttl
    }

    /// Populate the document map from the mirror file. Returns the number
    /// of loaded entries; an absent mirror loads zero. An unreadable
    /// mirror is logged and treated as empty — the disk scan that follows
    /// at startup is authoritative anyway.
    pub async fn load_mirror(&self) -> usize {
        let snapshot: HashMap<String, DocumentInfo> =
            match storage::read_json(&self.mirror_path).await {
                Ok(Some(snapshot)) => snapshot,
                Ok(None) => return 0,
                Err(e) => {
                    warn!(mirror = %self.mirror_path.display(), error = %e, "ignoring unreadable cache mirror");
                    return 0;
                }
            };

        let mut inner = self.inner.lock().unwrap();
        let count = snapshot.len();
        for (id, info) in snapshot {
            let seq = inner.next_seq();
            inner.documents.insert(
                id,
                TimedEntry {
                    value: info,
                    inserted_at: Instant::now(),
                    seq,
                },
            );
        }
        inner.evict_over_capacity(self.max_entries);
        debug!(count, "loaded cache mirror");
        count
    }

    /// Look up a document record, evicting it if its TTL has lapsed.
    pub fn document(&self, id: &str) -> Option<DocumentInfo> {
        let mut inner = self.inner.lock().unwrap();
        match inner.documents.get(id) {
            Some(entry) if self.expired(entry.inserted_at) => {
                inner.documents.remove(id);
                None
            }
            Some(entry) => Some(entry.value.clone()),
            None => None,
        }
    }

    /// Insert or replace a document record and rewrite the mirror.
    pub async fn set_document(&self, id: &str, info: DocumentInfo) -> io::Result<()> {
        {
            let mut inner = self.inner.lock().unwrap();
            let seq = inner.next_seq();
            inner.documents.insert(
                id.to_string(),
                TimedEntry {
                    value: info,
                    inserted_at: Instant::now(),
                    seq,
                },
            );
            inner.evict_over_capacity(self.max_entries);
        }
        self.flush_mirror().await
    }

    /// Insert a document record only if the id is not already present.
    /// Does not touch the mirror; reconciliation flushes once at the end.
    pub fn register_document(&self, id: &str, info: DocumentInfo) -> bool {
        let mut inner = self.inner.lock().unwrap();
        let stale = matches!(inner.documents.get(id), Some(e) if self.expired(e.inserted_at));
        if !stale && inner.documents.contains_key(id) {
            return false;
        }
        let seq = inner.next_seq();
        inner.documents.insert(
            id.to_string(),
            TimedEntry {
                value: info,
                inserted_at: Instant::now(),
                seq,
            },
        );
        inner.evict_over_capacity(self.max_entries);
        true
    }

    /// Remove a document record. Rewrites the mirror when an entry was
    /// actually removed; returns whether one was present.
    pub async fn remove_document(&self, id: &str) -> io::Result<bool> {
        let removed = {
            let mut inner = self.inner.lock().unwrap();
            inner.documents.remove(id).is_some()
        };
        if removed {
            self.flush_mirror().await?;
        }
        Ok(removed)
    }

    /// All live document records, purging any whose TTL has lapsed.
    pub fn document_entries(&self) -> Vec<(String, DocumentInfo)> {
        let mut inner = self.inner.lock().unwrap();
        let expired: Vec<String> = inner
            .documents
            .iter()
            .filter(|(_, e)| self.expired(e.inserted_at))
            .map(|(k, _)| k.clone())
            .collect();
        for key in expired {
            inner.documents.remove(&key);
        }
        inner
            .documents
            .iter()
            .map(|(k, e)| (k.clone(), e.value.clone()))
            .collect()
    }

    /// Look up a transient entry, evicting it if its TTL has lapsed.
    pub fn transient(&self, key: &str) -> Option<serde_json::Value> {
        let mut inner = self.inner.lock().unwrap();
        match inner.transient.get(key) {
            Some(entry) if self.expired(entry.inserted_at) => {
                inner.transient.remove(key);
                None
            }
            Some(entry) => Some(entry.value.clone()),
            None => None,
        }
    }

    /// Insert or replace a transient entry. Never persisted.
    pub fn set_transient(&self, key: &str, value: serde_json::Value) {
        let mut inner = self.inner.lock().unwrap();
        let seq = inner.next_seq();
        inner.transient.insert(
            key.to_string(),
            TimedEntry {
                value,
                inserted_at: Instant::now(),
                seq,
            },
        );
        inner.evict_over_capacity(self.max_entries);
    }

    /// Rewrite the mirror from the current document map.
    pub async fn flush_mirror(&self) -> io::Result<()> {
        let snapshot: HashMap<String, DocumentInfo> = {
            let inner = self.inner.lock().unwrap();
            inner
                .documents
                .iter()
                .filter(|(_, e)| !self.expired(e.inserted_at))
                .map(|(k, e)| (k.clone(), e.value.clone()))
                .collect()
        };
        storage::write_json_atomic(&self.mirror_path, &snapshot).await
    }

    /// Empty both maps and delete the mirror file. Does not touch the
    /// per-document index directories.
    pub async fn clear(&self) {
        {
            let mut inner = self.inner.lock().unwrap();
            inner.documents.clear();
            inner.transient.clear();
        }
        match tokio::fs::remove_file(&self.mirror_path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                warn!(mirror = %self.mirror_path.display(), error = %e, "failed to delete cache mirror");
            }
        }
    }

    #[cfg(test)]
    fn entry_count(&self) -> usize {
        let inner = self.inner.lock().unwrap();
        inner.documents.len() + inner.transient.len()
    }
}
