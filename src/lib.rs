//! # edgequake-pdf2doc
//!
//! Turn PDFs into cached text artifacts, then query them with an LLM.
//!
//! ## Why this crate?
//!
//! Document workflows run the same inputs again and again: the same report
//! is uploaded, asked about, summarised, asked about again. Extracting its
//! text every time wastes CPU, and storing a fresh copy every time wastes
//! storage. This crate keys each extracted text by `(owner, content hash)`
//! and stores it exactly once, so repeated runs are served from the cache.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF / text / URL
//!  │
//!  ├─ 1. Input      read local file or download from URL
//!  ├─ 2. Normalize  pdfium text extraction (spawn_blocking) + cleaning rules
//!  ├─ 3. Key        {namespace}:{owner_len}:{owner}:{algorithm}:{hex}
//!  ├─ 4. Cache      index hit → reuse; miss → store write, then index put
//!  └─ 5. Workflow   chunk cached texts and query / prompt / call functions
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_pdf2doc::{
//!     fetch_document, CacheConfig, DocumentCache, FsArtifactStore, JsonFileIndex, Owner,
//!     PdfNormalizer,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = CacheConfig::default();
//!     let cache = DocumentCache::new(
//!         Arc::new(PdfNormalizer::from_config(&config)),
//!         Arc::new(FsArtifactStore::open("cache/blobs").await?),
//!         Arc::new(JsonFileIndex::open("cache/index.json").await?),
//!         config,
//!     );
//!
//!     let owner = Owner::new("alice")?;
//!     let doc = fetch_document("report.pdf", 120).await?;
//!     let resolution = cache.resolve_traced(&owner, &doc, false).await?;
//!     println!("{} -> {} ({})", resolution.key, resolution.descriptor.ticket, resolution.status);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdf2doc` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library to avoid pulling in CLI-only deps:
//! ```toml
//! edgequake-pdf2doc = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod cache;
pub mod config;
pub mod error;
pub mod hasher;
pub mod key;
pub mod model;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod store;
pub mod stream;
pub mod workflow;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use cache::{CacheStats, DocumentCache};
pub use config::{AskConfig, AskConfigBuilder, CacheConfig, CacheConfigBuilder};
pub use error::{
    DocumentFailure, IndexError, NormalizeError, Pdf2DocError, ResolveError, StoreError,
};
pub use hasher::{ContentHash, HashAlgorithm};
pub use key::{derive_key, DEFAULT_NAMESPACE, TEXT_NAMESPACE};
pub use model::{
    ArtifactDescriptor, ArtifactPayload, BatchOutcome, BatchStats, CacheKey, CacheStatus,
    DocumentOutcome, DocumentRef, NormalizedText, Owner, RawDocument, Resolution, ResolveRequest,
    Ticket,
};
pub use pipeline::input::fetch_document;
pub use pipeline::llm::{ChatBackend, ChatReply, ProviderChat};
pub use pipeline::normalize::{AutoNormalizer, Normalizer, PlainTextNormalizer};
pub use pipeline::pdf::PdfNormalizer;
pub use progress::{NoopProgressCallback, ProgressCallback, ResolveProgressCallback};
pub use store::{ArtifactStore, FsArtifactStore, Index, JsonFileIndex, MemoryArtifactStore, MemoryIndex};
pub use stream::ResolveStream;
pub use workflow::{ask_documents, AskRequest, AskResponse, Usage};
