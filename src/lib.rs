//! # docqa
//!
//! A document question-answering pipeline: PDF ingestion, semantic
//! retrieval, and cited answer synthesis.
//!
//! docqa turns uploaded PDFs into per-document vector indexes and answers
//! natural-language questions by retrieving relevant passages and
//! synthesizing a cited, formatted answer with follow-up suggestions.
//! Document metadata lives in a TTL-bounded cache mirrored to disk and
//! reconciled against the index storage on startup, so the corpus
//! survives process restarts.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────┐   ┌───────────────┐   ┌──────────────┐
//! │  PDF    │──▶│ Chunk + Embed │──▶│ Vector Index │
//! │ (bytes) │   │               │   │  (per doc)   │
//! └─────────┘   └───────────────┘   └──────┬───────┘
//!                                          │
//!                  ┌───────────────┐       │
//!   query ────────▶│  Synthesizer  │◀──────┘
//!                  │ retrieve +    │   ┌──────────────┐
//!                  │ generate +    │◀──│ Conversation │
//!                  │ parse/clean   │   │ memory, memo │
//!                  └───────┬───────┘   └──────────────┘
//!                          ▼
//!            answer + citations + suggestions
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! # async fn run() -> docqa::error::Result<()> {
//! use docqa::config::PipelineConfig;
//! use docqa::pipeline::Pipeline;
//!
//! let pipeline = Pipeline::from_env(PipelineConfig::default()).await?;
//! let doc_id = pipeline.ingest_document(&std::fs::read("report.pdf").unwrap(), "report.pdf").await?;
//! let response = pipeline.query("What does the report conclude?", Some(&doc_id), None).await;
//! println!("{}", response.answer);
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`error`] | Typed error kinds |
//! | [`pdf`] | Per-page PDF text extraction |
//! | [`chunk`] | Boundary-preferring text chunking |
//! | [`embedding`] | Embedding backend abstraction |
//! | [`generation`] | Generation backend abstraction |
//! | [`index`] | Per-document vector index |
//! | [`cache`] | Metadata cache with disk mirror |
//! | [`storage`] | Atomic JSON file helpers |
//! | [`store`] | Document lifecycle and reconciliation |
//! | [`history`] | Per-session conversation memory |
//! | [`memo`] | Response memoization |
//! | [`answer`] | Answer synthesis and post-processing |
//! | [`pipeline`] | Facade wiring it all together |

pub mod answer;
pub mod cache;
pub mod chunk;
pub mod config;
pub mod embedding;
pub mod error;
pub mod generation;
pub mod history;
pub mod index;
pub mod memo;
pub mod models;
pub mod pdf;
pub mod pipeline;
pub mod storage;
pub mod store;
