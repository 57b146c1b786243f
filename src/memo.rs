//! Response memoizer: maps (query, document scope) to previously
//! generated answers so repeated queries skip the generation backend.
//!
//! Keys are digests of the normalized query text combined with the scope;
//! multi-document scopes sort their id set first, so query order never
//! changes cache hits. Entries have no TTL — growth is bounded by a
//! wholesale clear once a size threshold is exceeded, a deliberate
//! simplicity trade-off since memoized answers are cheap to regenerate.

use std::collections::HashMap;
use std::sync::Mutex;

use sha2::{Digest, Sha256};
use tracing::debug;

use crate::config::MemoConfig;
use crate::models::SourceCitation;

/// Document scope of a query, as seen by the memoizer and synthesizer.
#[derive(Debug, Clone)]
pub enum QueryScope<'a> {
    /// General chat, no retrieval.
    General,
    Single(&'a str),
    Multi(&'a [String]),
}

/// The memoized outcome of one generation call.
#[derive(Debug, Clone)]
pub struct MemoizedResponse {
    pub answer: String,
    pub sources: Option<Vec<SourceCitation>>,
    pub suggestions: Vec<String>,
}

/// Build the memoization key for a query within a scope.
pub fn response_key(query: &str, scope: &QueryScope<'_>) -> String {
    let normalized = query.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();
    let digest = Sha256::digest(normalized.as_bytes());
    let digest = format!("{:x}", digest);

    match scope {
        QueryScope::General => format!("general:{}", digest),
        QueryScope::Single(doc_id) => format!("doc:{}:{}", doc_id, digest),
        QueryScope::Multi(doc_ids) => {
            let mut sorted: Vec<&str> = doc_ids.iter().map(String::as_str).collect();
            sorted.sort_unstable();
            format!("multi:{}:{}", sorted.join("+"), digest)
        }
    }
}

pub struct ResponseMemoizer {
    entries: Mutex<HashMap<String, MemoizedResponse>>,
    max_entries: usize,
}

impl ResponseMemoizer {
    pub fn new(config: &MemoConfig) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            max_entries: config.max_entries,
        }
    }

    pub fn get(&self, key: &str) -> Option<MemoizedResponse> {
        let entries = self.entries.lock().unwrap();
        entries.get(key).cloned()
    }

    /// Store a response, clearing the whole map first when it has grown
    /// past the threshold.
    pub fn put(&self, key: String, value: MemoizedResponse) {
        let mut entries = self.entries.lock().unwrap();
        if entries.len() >= self.max_entries {
            debug!(entries = entries.len(), "resetting response memoizer");
            entries.clear();
        }
        entries.insert(key, value);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries.lock().unwrap().clear();
    }
}
