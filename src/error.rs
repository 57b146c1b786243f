//! Error kinds for the document-to-answer pipeline.
//!
//! Five kinds cover the whole core. Document-store operations return them
//! directly; query operations convert backend failures into a structured
//! [`QueryResponse`](crate::models::QueryResponse) with `success = false`
//! instead, so the transport layer has one uniform failure shape to render.

use thiserror::Error;

/// Errors surfaced across the core boundary.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A required backend credential or setting is missing. Raised eagerly,
    /// before any processing work, and never retried.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The input document is empty, corrupt, or otherwise unusable. No
    /// partial state is left behind.
    #[error("ingest failed: {0}")]
    Ingest(String),

    /// The referenced document id has no cache entry and no on-disk record.
    #[error("document {0} not found")]
    NotFound(String),

    /// On-disk removal failed for a document known to exist.
    #[error("deletion failed: {0}")]
    Deletion(String),

    /// A backend call failed or returned unusable output.
    #[error("generation backend error: {0}")]
    Generation(String),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
