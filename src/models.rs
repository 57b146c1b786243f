//! Core data models used throughout the pipeline.
//!
//! These types represent the chunks, document records, and query responses
//! that flow through ingestion and answer synthesis.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A bounded span of a document's text — the unit of embedding and
/// retrieval. Produced once per ingest, owned by the document's vector
/// index, never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub content: String,
    pub filename: String,
    /// 1-based source page number.
    pub page: u32,
    /// 0-based position within the page.
    pub chunk_index: u32,
    /// Composite citation key, `"{page}-{chunk_index}"`.
    pub source_tag: String,
}

impl Chunk {
    pub fn new(content: String, filename: &str, page: u32, chunk_index: u32) -> Self {
        Self {
            content,
            filename: filename.to_string(),
            page,
            chunk_index,
            source_tag: format!("{}-{}", page, chunk_index),
        }
    }
}

/// Processing state of a document.
///
/// `NotFound` is a report sentinel for status polling; it is never stored
/// in the cache or the sidecar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Processing,
    Processed,
    Failed,
    NotFound,
}

impl std::fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DocumentStatus::Processing => "processing",
            DocumentStatus::Processed => "processed",
            DocumentStatus::Failed => "failed",
            DocumentStatus::NotFound => "not_found",
        };
        f.write_str(s)
    }
}

/// Per-document record held in the metadata cache and mirrored to disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentInfo {
    pub filename: String,
    pub status: DocumentStatus,
    pub chunks: usize,
    /// Location of the persisted vector index directory.
    pub path: PathBuf,
}

/// Durable sidecar record written next to each persisted index. The
/// sidecar, not the cache mirror, is the source of truth for document
/// metadata after a cold start.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SidecarMetadata {
    pub filename: String,
    pub doc_id: String,
    pub status: DocumentStatus,
    pub chunks: usize,
    pub created_at: DateTime<Utc>,
}

/// Summary row returned by the document listing operation.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentSummary {
    pub document_id: String,
    pub filename: String,
    pub status: DocumentStatus,
    pub chunks: usize,
}

/// A retrieved passage rendered as a citation for the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceCitation {
    pub filename: String,
    pub page: u32,
    pub chunk: u32,
    /// First 100 characters of the passage, ellipsized if truncated.
    pub content_preview: String,
    /// Rank-derived display score, not the backend similarity.
    pub relevance_score: f32,
    /// Display title, `"<filename> - Page <page>"`.
    pub title: String,
    /// Originating document, set for multi-document results.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_id: Option<String>,
}

/// Structured result of a query operation.
///
/// Failures are carried in-band (`success = false`, message in `answer`)
/// rather than as errors, so the transport layer renders one shape.
#[derive(Debug, Clone, Serialize)]
pub struct QueryResponse {
    pub success: bool,
    pub answer: String,
    pub content_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<SourceCitation>>,
    pub suggestions: Vec<String>,
}

impl QueryResponse {
    pub fn answer(
        answer: String,
        sources: Option<Vec<SourceCitation>>,
        suggestions: Vec<String>,
    ) -> Self {
        Self {
            success: true,
            answer,
            content_type: "markdown".to_string(),
            sources,
            suggestions,
        }
    }

    pub fn failure(message: String) -> Self {
        Self {
            success: false,
            answer: message,
            content_type: "markdown".to_string(),
            sources: None,
            suggestions: Vec::new(),
        }
    }
}
