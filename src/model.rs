//! Data model shared by the cache, its collaborators and callers.
//!
//! Every entity has exactly one validity check, performed at construction:
//! an [`Owner`] is non-empty, a [`NormalizedText`] holds at least one
//! non-whitespace character, an [`ArtifactDescriptor`] is live when its
//! ticket is non-empty. Code past those constructors never re-checks.

use crate::error::{DocumentFailure, NormalizeError, Pdf2DocError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ── Identities ───────────────────────────────────────────────────────────

/// The identity under whose namespace cache entries are scoped.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Owner(String);

impl Owner {
    /// Validate and wrap an owner identity.
    pub fn new(id: impl Into<String>) -> Result<Self, Pdf2DocError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(Pdf2DocError::InvalidOwner { owner: id });
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Owner {
    type Error = Pdf2DocError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Owner::new(value)
    }
}

impl From<Owner> for String {
    fn from(owner: Owner) -> Self {
        owner.0
    }
}

impl fmt::Display for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque identifier of a blob in the artifact store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Ticket(String);

impl Ticket {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for Ticket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Owner-scoped identifier of a cached artifact.
///
/// Only [`crate::key::derive_key`] builds one; see there for the format.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    pub(crate) fn from_derived(key: String) -> Self {
        Self(key)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ── Documents ────────────────────────────────────────────────────────────

/// A fetched, immutable binary document plus the ticket it was fetched by.
#[derive(Debug, Clone)]
pub struct RawDocument {
    ticket: Ticket,
    bytes: Vec<u8>,
    file_name: Option<String>,
}

impl RawDocument {
    pub fn new(ticket: Ticket, bytes: Vec<u8>) -> Self {
        Self {
            ticket,
            bytes,
            file_name: None,
        }
    }

    pub fn with_file_name(mut self, name: impl Into<String>) -> Self {
        self.file_name = Some(name.into());
        self
    }

    pub fn ticket(&self) -> &Ticket {
        &self.ticket
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn file_name(&self) -> Option<&str> {
        self.file_name.as_deref()
    }
}

/// Cleaned plain text extracted from exactly one [`RawDocument`].
///
/// Never empty: whitespace-only text is rejected with
/// [`NormalizeError::EmptyContent`], since an empty artifact would be
/// indistinguishable from one that was never computed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedText(String);

impl NormalizedText {
    pub fn new(text: impl Into<String>) -> Result<Self, NormalizeError> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(NormalizeError::EmptyContent);
        }
        Ok(Self(text))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Length in bytes of the UTF-8 encoding.
    pub fn byte_len(&self) -> u64 {
        self.0.len() as u64
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

/// Reference to a document already held by the artifact store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRef {
    pub ticket: Ticket,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
}

impl DocumentRef {
    pub fn new(ticket: impl Into<String>) -> Self {
        Self {
            ticket: Ticket::new(ticket),
            file_name: None,
        }
    }
}

// ── Artifacts ────────────────────────────────────────────────────────────

/// What the cache hands to [`crate::store::ArtifactStore::write`].
#[derive(Debug, Clone)]
pub struct ArtifactPayload {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    pub file_name: Option<String>,
    /// `algorithm:hex` digest of `bytes`, recorded in the descriptor.
    pub content_hash: Option<String>,
}

impl ArtifactPayload {
    /// A UTF-8 text payload.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            bytes: text.into().into_bytes(),
            mime_type: "text/plain; charset=utf-8".to_string(),
            file_name: None,
            content_hash: None,
        }
    }

    pub fn with_file_name(mut self, name: impl Into<String>) -> Self {
        self.file_name = Some(name.into());
        self
    }

    pub fn with_content_hash(mut self, hash: impl Into<String>) -> Self {
        self.content_hash = Some(hash.into());
        self
    }
}

/// Handle to a stored blob, returned by a successful store write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactDescriptor {
    pub ticket: Ticket,
    /// Size of the stored blob in bytes.
    pub byte_len: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
    pub mime_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ArtifactDescriptor {
    /// A descriptor is live when it references a blob at all.
    pub fn is_live(&self) -> bool {
        !self.ticket.is_empty()
    }
}

// ── Resolution results ───────────────────────────────────────────────────

/// How a resolution was satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheStatus {
    /// Served from an existing index entry; nothing written.
    Hit,
    /// No entry existed; the text was stored and registered.
    Miss,
    /// `overwrite` detached the old entry; the text was stored again.
    Invalidated,
}

impl fmt::Display for CacheStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CacheStatus::Hit => "hit",
            CacheStatus::Miss => "miss",
            CacheStatus::Invalidated => "invalidated",
        })
    }
}

/// A successful resolution with its bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub key: CacheKey,
    pub descriptor: ArtifactDescriptor,
    pub status: CacheStatus,
}

/// Outcome of one document in a batch.
pub type DocumentOutcome = Result<Resolution, DocumentFailure>;

/// The caller-facing batch request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolveRequest {
    pub owner: Owner,
    pub documents: Vec<DocumentRef>,
    #[serde(default)]
    pub overwrite: bool,
}

/// Results of a batch, in input order, plus summary counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchOutcome {
    pub results: Vec<DocumentOutcome>,
    pub stats: BatchStats,
}

impl BatchOutcome {
    pub(crate) fn from_results(results: Vec<DocumentOutcome>, duration_ms: u64) -> Self {
        let mut stats = BatchStats {
            total: results.len(),
            duration_ms,
            ..BatchStats::default()
        };
        for r in &results {
            match r {
                Ok(res) => match res.status {
                    CacheStatus::Hit => stats.hits += 1,
                    CacheStatus::Miss => stats.misses += 1,
                    CacheStatus::Invalidated => stats.invalidated += 1,
                },
                Err(_) => stats.failed += 1,
            }
        }
        Self { results, stats }
    }

    /// Descriptors of the successful documents, in input order.
    pub fn descriptors(&self) -> Vec<&ArtifactDescriptor> {
        self.results
            .iter()
            .filter_map(|r| r.as_ref().ok().map(|res| &res.descriptor))
            .collect()
    }

    pub fn failures(&self) -> Vec<&DocumentFailure> {
        self.results.iter().filter_map(|r| r.as_ref().err()).collect()
    }

    pub fn all_succeeded(&self) -> bool {
        self.stats.failed == 0
    }
}

/// Summary counters of one batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchStats {
    pub total: usize,
    pub hits: usize,
    pub misses: usize,
    pub invalidated: usize,
    pub failed: usize,
    pub duration_ms: u64,
}
