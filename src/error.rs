//! Error types for the edgequake-pdf2doc library.
//!
//! Two tiers of failure, mirroring the two scopes of work:
//!
//! * [`Pdf2DocError`]: **Fatal**: the request cannot proceed at all (bad
//!   configuration, empty owner, unreadable input, workflow validation).
//!   Returned as `Err(Pdf2DocError)` from the top-level entry points.
//!
//! * [`ResolveError`]: **Per document**: one document could not be turned
//!   into a cached artifact. Batch resolution wraps it in a
//!   [`DocumentFailure`] tagged with the document's position and ticket, and
//!   sibling documents carry on.
//!
//! The collaborator seams have their own narrow error types
//! ([`NormalizeError`], [`StoreError`], [`IndexError`]) which the cache maps
//! onto [`ResolveError`] variants.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-pdf2doc library.
#[derive(Debug, Error)]
pub enum Pdf2DocError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("Document not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input string is not a valid file path or URL.
    #[error("Invalid input '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    // ── Request errors ────────────────────────────────────────────────────
    /// The owner identity is empty or whitespace-only.
    #[error("Invalid owner identity {owner:?}: must be a non-empty string")]
    InvalidOwner { owner: String },

    /// Neither documents nor text/URLs were supplied.
    #[error("No texts passed as text, url or documents")]
    NoInput,

    /// Every document of a request failed; nothing left to work with.
    #[error("All {total} documents failed.\nFirst error: {first_error}")]
    AllDocumentsFailed { total: usize, first_error: String },

    // ── Workflow errors ───────────────────────────────────────────────────
    /// The usage string is not one of the known workflows.
    #[error("Unknown usage: {usage}")]
    UnknownUsage { usage: String },

    /// The workflow needs a prompt and none was given.
    #[error("No {what} specified in [prompt] field")]
    MissingPrompt { what: &'static str },

    /// The prompt of a functions workflow is not valid JSON.
    #[error("Invalid JSON in [prompt] field: {detail}")]
    InvalidFunctions { detail: String },

    /// The prompt of a functions workflow parsed, but holds no function.
    #[error("No valid functions specified in [prompt] field")]
    NoFunctions,

    // ── LLM errors ────────────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// The LLM call failed after all retries.
    #[error("LLM API error after {retries} retries: {message}")]
    LlmApiError { retries: u32, message: String },

    // ── Storage errors ────────────────────────────────────────────────────
    /// A direct store operation (outside per-document resolution) failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The persisted index could not be opened or parsed.
    #[error("Failed to load index '{path}': {detail}")]
    IndexLoadFailed { path: PathBuf, detail: String },

    /// The artifact exists but is not valid UTF-8 text.
    #[error("Artifact '{ticket}' is not UTF-8 text")]
    NotText { ticket: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Failure of the document normalizer.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum NormalizeError {
    /// The bytes are not a supported or parseable document.
    #[error("unsupported document format: {detail}")]
    UnsupportedFormat { detail: String },

    /// The document parsed, but holds no extractable text.
    #[error("document contains no extractable text")]
    EmptyContent,

    /// The extraction backend could not be loaded.
    #[error("document engine unavailable: {detail}")]
    EngineUnavailable { detail: String },
}

/// Failure of the artifact store.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum StoreError {
    /// The backend could not be reached or refused the operation.
    #[error("artifact store unavailable: {detail}")]
    Unavailable { detail: String },

    /// No artifact is stored under the ticket.
    #[error("no artifact stored under ticket '{ticket}'")]
    NotFound { ticket: String },
}

/// Failure of the cache index.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum IndexError {
    /// The backend could not be reached.
    #[error("index unavailable: {detail}")]
    Unavailable { detail: String },

    /// The backend refused to record the entry.
    #[error("index rejected entry '{key}': {detail}")]
    Rejected { key: String, detail: String },
}

/// Why a single document could not be resolved to an artifact.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum ResolveError {
    /// Bad or empty input. Not retried.
    #[error("normalization failed: {0}")]
    Normalization(#[from] NormalizeError),

    /// The store accepted the write but returned no usable descriptor.
    #[error("artifact store write returned no valid descriptor: {detail}")]
    StoreWrite { detail: String },

    /// The store could not be reached (read of the raw document or write).
    #[error("{0}")]
    StoreUnavailable(StoreError),

    /// The blob was written but its index entry was not recorded.
    ///
    /// The blob under `ticket` is orphaned; it is neither retried nor removed.
    #[error("index entry '{key}' not recorded (orphaned ticket '{ticket}'): {detail}")]
    IndexWrite {
        key: String,
        ticket: String,
        detail: String,
    },

    /// The index could not be read or cleared before any write happened.
    #[error("index unavailable for '{key}': {detail}")]
    IndexUnavailable { key: String, detail: String },

    /// A cache hit disagrees with the text it is supposed to hold.
    ///
    /// Either the size or the digest differs; both pairs are reported.
    #[error(
        "cached artifact for '{key}' looks inconsistent: expected {expected_len} bytes \
         with digest {expected_hash}, descriptor records {stored_len} bytes with digest {stored_hash}"
    )]
    KeyCollisionSuspected {
        key: String,
        expected_len: u64,
        stored_len: u64,
        expected_hash: String,
        /// `none` when the descriptor carries no digest.
        stored_hash: String,
    },
}

impl ResolveError {
    /// Whether retrying the whole `resolve` call may succeed.
    ///
    /// Normalization failures and suspected collisions are deterministic for
    /// a given input; infrastructure failures are transient.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            ResolveError::Normalization(_) | ResolveError::KeyCollisionSuspected { .. }
        )
    }
}

/// A per-document failure inside a batch, tagged with the document identity.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("document #{index} ({ticket}): {error}")]
pub struct DocumentFailure {
    /// 0-based position of the document in the request.
    pub index: usize,
    /// Retrieval ticket of the document.
    pub ticket: String,
    /// What went wrong.
    pub error: ResolveError,
}
