//! The content-addressed artifact cache.
//!
//! [`DocumentCache`] turns raw documents into stored text artifacts exactly
//! once per `(owner, normalized text)` pair:
//!
//! ```text
//! raw bytes ─▶ normalize ─▶ hash ─▶ key ─┬─ overwrite ─▶ index.delete ─┐
//!                                        └─ index.get ── hit ─▶ return │
//!                                                        miss ◀────────┘
//!                                                          │
//!                                     store.write ─▶ index.put ─▶ return
//! ```
//!
//! The two steps on the right are ordered: the index is only consulted or
//! cleared before anything is written, and `put` is only issued once the
//! store returned a live descriptor. An index entry therefore never points
//! at a blob that failed to land. The reverse (a blob with no entry) is
//! possible when `put` fails and is left alone.
//!
//! Within one `DocumentCache`, resolutions of the same key are serialised,
//! so duplicates inside a batch are served from the entry the first one
//! created. Separate caches (or processes) sharing a backend may still both
//! miss and both write; the index converges on the last `put`.

use crate::config::CacheConfig;
use crate::error::{DocumentFailure, Pdf2DocError, ResolveError};
use crate::hasher::ContentHash;
use crate::key::derive_key;
use crate::model::{
    ArtifactDescriptor, ArtifactPayload, BatchOutcome, CacheKey, CacheStatus, DocumentOutcome,
    DocumentRef, Owner, RawDocument, Resolution, ResolveRequest,
};
use crate::pipeline::normalize::Normalizer;
use crate::store::{ArtifactStore, Index};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Instant;
use tracing::{debug, info, warn};

// ── Stats ────────────────────────────────────────────────────────────────

/// Counters accumulated over the lifetime of a [`DocumentCache`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub invalidations: u64,
    pub store_writes: u64,
    pub index_write_failures: u64,
}

impl CacheStats {
    /// Share of lookups served from the index, in `[0, 1]`.
    ///
    /// Invalidations are not lookups and do not count.
    pub fn hit_rate(&self) -> f64 {
        let lookups = self.hits + self.misses;
        if lookups == 0 {
            0.0
        } else {
            self.hits as f64 / lookups as f64
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    invalidations: AtomicU64,
    store_writes: AtomicU64,
    index_write_failures: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
            store_writes: self.store_writes.load(Ordering::Relaxed),
            index_write_failures: self.index_write_failures.load(Ordering::Relaxed),
        }
    }
}

// ── Per-key gates ────────────────────────────────────────────────────────

/// One async mutex per key currently being resolved.
///
/// The map only holds weak references; a gate disappears as soon as the
/// last resolution holding it finishes.
#[derive(Debug, Default)]
struct KeyGates {
    gates: Mutex<HashMap<CacheKey, Weak<tokio::sync::Mutex<()>>>>,
}

impl KeyGates {
    fn gate(&self, key: &CacheKey) -> Arc<tokio::sync::Mutex<()>> {
        let mut gates = self.gates.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(gate) = gates.get(key).and_then(Weak::upgrade) {
            return gate;
        }
        gates.retain(|_, g| g.strong_count() > 0);
        let gate = Arc::new(tokio::sync::Mutex::new(()));
        gates.insert(key.clone(), Arc::downgrade(&gate));
        gate
    }

    #[cfg(test)]
    fn live(&self) -> usize {
        let gates = self.gates.lock().unwrap_or_else(PoisonError::into_inner);
        gates.values().filter(|g| g.strong_count() > 0).count()
    }
}

// ── Batch sources ────────────────────────────────────────────────────────

/// Where a batch member's bytes come from.
pub(crate) enum Source {
    Raw(RawDocument),
    Stored(DocumentRef),
}

impl Source {
    fn ticket(&self) -> &str {
        match self {
            Source::Raw(doc) => doc.ticket().as_str(),
            Source::Stored(r) => r.ticket.as_str(),
        }
    }
}

// ── DocumentCache ────────────────────────────────────────────────────────

/// Resolves documents to stored text artifacts, reusing earlier results.
pub struct DocumentCache {
    normalizer: Arc<dyn Normalizer>,
    store: Arc<dyn ArtifactStore>,
    index: Arc<dyn Index>,
    config: CacheConfig,
    gates: KeyGates,
    counters: Counters,
}

impl std::fmt::Debug for DocumentCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentCache")
            .field("config", &self.config)
            .field("stats", &self.counters.snapshot())
            .finish_non_exhaustive()
    }
}

impl DocumentCache {
    pub fn new(
        normalizer: Arc<dyn Normalizer>,
        store: Arc<dyn ArtifactStore>,
        index: Arc<dyn Index>,
        config: CacheConfig,
    ) -> Self {
        Self {
            normalizer,
            store,
            index,
            config,
            gates: KeyGates::default(),
            counters: Counters::default(),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn ArtifactStore> {
        &self.store
    }

    pub fn index(&self) -> &Arc<dyn Index> {
        &self.index
    }

    pub fn stats(&self) -> CacheStats {
        self.counters.snapshot()
    }

    /// Resolve one document to the descriptor of its stored text.
    pub async fn resolve(
        &self,
        owner: &Owner,
        doc: &RawDocument,
        overwrite: bool,
    ) -> Result<ArtifactDescriptor, ResolveError> {
        self.resolve_traced(owner, doc, overwrite)
            .await
            .map(|r| r.descriptor)
    }

    /// Like [`resolve`](Self::resolve), also reporting the key and whether
    /// the index was hit.
    pub async fn resolve_traced(
        &self,
        owner: &Owner,
        doc: &RawDocument,
        overwrite: bool,
    ) -> Result<Resolution, ResolveError> {
        let text = self.normalizer.normalize(doc.bytes()).await?;
        let hash = ContentHash::of(&text, self.config.hash_algorithm);
        let key = derive_key(&self.config.namespace, owner, &hash);

        let gate = self.gates.gate(&key);
        let _guard = gate.lock().await;

        let status = if overwrite {
            self.index
                .delete(&key)
                .await
                .map_err(|e| ResolveError::IndexUnavailable {
                    key: key.to_string(),
                    detail: e.to_string(),
                })?;
            debug!("Invalidated {}", key);
            CacheStatus::Invalidated
        } else {
            let existing = self
                .index
                .get(&key)
                .await
                .map_err(|e| ResolveError::IndexUnavailable {
                    key: key.to_string(),
                    detail: e.to_string(),
                })?;
            match existing {
                Some(descriptor) if descriptor.is_live() => {
                    if self.config.verify_hits {
                        verify_hit(&key, &descriptor, text.byte_len(), &hash)?;
                    }
                    Counters::bump(&self.counters.hits);
                    debug!("Cache hit for {} -> {}", key, descriptor.ticket);
                    return Ok(Resolution {
                        key,
                        descriptor,
                        status: CacheStatus::Hit,
                    });
                }
                Some(_) => {
                    warn!("Index entry {} has no ticket; regenerating", key);
                    CacheStatus::Miss
                }
                None => CacheStatus::Miss,
            }
        };

        let expected_len = text.byte_len();
        let mut payload = ArtifactPayload::text(text.into_string()).with_content_hash(hash.to_string());
        if let Some(name) = doc.file_name() {
            payload = payload.with_file_name(name);
        }

        let descriptor = self
            .store
            .write(payload)
            .await
            .map_err(ResolveError::StoreUnavailable)?;
        if !descriptor.is_live() {
            return Err(ResolveError::StoreWrite {
                detail: "descriptor has an empty ticket".to_string(),
            });
        }
        if descriptor.byte_len != expected_len {
            return Err(ResolveError::StoreWrite {
                detail: format!(
                    "store recorded {} bytes, wrote {}",
                    descriptor.byte_len, expected_len
                ),
            });
        }
        Counters::bump(&self.counters.store_writes);

        if let Err(e) = self.index.put(&key, &descriptor).await {
            Counters::bump(&self.counters.index_write_failures);
            warn!(
                "Index put for {} failed, ticket {} is orphaned: {}",
                key, descriptor.ticket, e
            );
            return Err(ResolveError::IndexWrite {
                key: key.to_string(),
                ticket: descriptor.ticket.to_string(),
                detail: e.to_string(),
            });
        }

        match status {
            CacheStatus::Invalidated => Counters::bump(&self.counters.invalidations),
            _ => Counters::bump(&self.counters.misses),
        }
        debug!("Stored {} as {} ({})", key, descriptor.ticket, status);

        Ok(Resolution {
            key,
            descriptor,
            status,
        })
    }

    /// Resolve a batch of fetched documents.
    ///
    /// Documents are processed concurrently (bounded by
    /// [`CacheConfig::concurrency`]); results keep input order and one
    /// document's failure never affects the others.
    pub async fn resolve_all(
        &self,
        owner: &Owner,
        docs: Vec<RawDocument>,
        overwrite: bool,
    ) -> BatchOutcome {
        self.run_batch(owner, docs.into_iter().map(Source::Raw).collect(), overwrite)
            .await
    }

    /// Resolve documents already held by the artifact store.
    ///
    /// Each ticket is read from the store first; a failed read fails that
    /// document with [`ResolveError::StoreUnavailable`].
    pub async fn resolve_request(&self, request: &ResolveRequest) -> BatchOutcome {
        let sources = request
            .documents
            .iter()
            .cloned()
            .map(Source::Stored)
            .collect();
        self.run_batch(&request.owner, sources, request.overwrite)
            .await
    }

    /// Read an artifact back as UTF-8 text.
    pub async fn read_text(&self, descriptor: &ArtifactDescriptor) -> Result<String, Pdf2DocError> {
        let bytes = self.store.read(&descriptor.ticket).await?;
        String::from_utf8(bytes).map_err(|_| Pdf2DocError::NotText {
            ticket: descriptor.ticket.to_string(),
        })
    }

    async fn run_batch(&self, owner: &Owner, sources: Vec<Source>, overwrite: bool) -> BatchOutcome {
        let total = sources.len();
        let start = Instant::now();
        info!(
            "Resolving {} documents for {} (overwrite={})",
            total, owner, overwrite
        );
        if let Some(cb) = &self.config.progress_callback {
            cb.on_batch_start(total);
        }

        let results: Vec<DocumentOutcome> = stream::iter(sources.into_iter().enumerate())
            .map(|(idx, source)| self.run_one(idx, total, owner, source, overwrite))
            .buffered(self.config.concurrency)
            .collect()
            .await;

        let outcome = BatchOutcome::from_results(results, start.elapsed().as_millis() as u64);
        let s = &outcome.stats;
        info!(
            "Batch done: {} hits, {} misses, {} invalidated, {} failed in {}ms",
            s.hits, s.misses, s.invalidated, s.failed, s.duration_ms
        );
        if let Some(cb) = &self.config.progress_callback {
            cb.on_batch_complete(total, total - s.failed);
        }
        outcome
    }

    /// Resolve one batch member, reporting progress.
    pub(crate) async fn run_one(
        &self,
        idx: usize,
        total: usize,
        owner: &Owner,
        source: Source,
        overwrite: bool,
    ) -> DocumentOutcome {
        let cb = self.config.progress_callback.as_ref();
        if let Some(cb) = cb {
            cb.on_document_start(idx, total);
        }

        let ticket = source.ticket().to_string();
        let result = match source {
            Source::Raw(doc) => self.resolve_traced(owner, &doc, overwrite).await,
            Source::Stored(r) => match self.store.read(&r.ticket).await {
                Ok(bytes) => {
                    let mut doc = RawDocument::new(r.ticket, bytes);
                    if let Some(name) = r.file_name {
                        doc = doc.with_file_name(name);
                    }
                    self.resolve_traced(owner, &doc, overwrite).await
                }
                Err(e) => Err(ResolveError::StoreUnavailable(e)),
            },
        };

        match result {
            Ok(resolution) => {
                if let Some(cb) = cb {
                    cb.on_document_complete(idx, total, resolution.status);
                }
                Ok(resolution)
            }
            Err(error) => {
                warn!("Document {} ({}) failed: {}", idx, ticket, error);
                if let Some(cb) = cb {
                    cb.on_document_error(idx, total, &error.to_string());
                }
                Err(DocumentFailure {
                    index: idx,
                    ticket,
                    error,
                })
            }
        }
    }
}

/// Check a hit against the text it is supposed to hold.
fn verify_hit(
    key: &CacheKey,
    descriptor: &ArtifactDescriptor,
    expected_len: u64,
    hash: &ContentHash,
) -> Result<(), ResolveError> {
    let expected_hash = hash.to_string();
    let hash_matches = descriptor
        .content_hash
        .as_deref()
        .map_or(true, |h| h == expected_hash);
    if descriptor.byte_len != expected_len || !hash_matches {
        warn!(
            "Descriptor {} for {} disagrees with the normalized text",
            descriptor.ticket, key
        );
        return Err(ResolveError::KeyCollisionSuspected {
            key: key.to_string(),
            expected_len,
            stored_len: descriptor.byte_len,
            expected_hash,
            stored_hash: descriptor
                .content_hash
                .clone()
                .unwrap_or_else(|| "none".to_string()),
        });
    }
    Ok(())
}
