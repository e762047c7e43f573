//! In-process store and index.
//!
//! Used by embedders that keep artifacts for the lifetime of the process,
//! and by tests: both types carry switches that make the next calls fail,
//! which is how the error paths of the cache are exercised.

use super::{hash_prefix, ArtifactStore, Index};
use crate::error::{IndexError, StoreError};
use crate::model::{ArtifactDescriptor, ArtifactPayload, CacheKey, Ticket};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::RwLock;

// ── Store ────────────────────────────────────────────────────────────────

/// Blob store backed by a `HashMap`.
#[derive(Debug, Default)]
pub struct MemoryArtifactStore {
    blobs: RwLock<HashMap<String, Vec<u8>>>,
    next_id: AtomicU64,
    writes: AtomicU64,
    fail_writes: AtomicBool,
    fail_reads: AtomicBool,
    dead_descriptors: AtomicBool,
}

impl MemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following `write` fail with [`StoreError::Unavailable`].
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Make every following `read` fail with [`StoreError::Unavailable`].
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Make `write` succeed without storing anything and return a
    /// descriptor with an empty ticket.
    pub fn set_return_dead_descriptors(&self, dead: bool) {
        self.dead_descriptors.store(dead, Ordering::SeqCst);
    }

    /// Successful writes so far.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    /// Number of blobs held.
    pub async fn len(&self) -> usize {
        self.blobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn contains(&self, ticket: &Ticket) -> bool {
        self.blobs.read().await.contains_key(ticket.as_str())
    }
}

#[async_trait]
impl ArtifactStore for MemoryArtifactStore {
    async fn write(&self, payload: ArtifactPayload) -> Result<ArtifactDescriptor, StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable {
                detail: "memory store: writes disabled".to_string(),
            });
        }

        let byte_len = payload.bytes.len() as u64;
        let ticket = if self.dead_descriptors.load(Ordering::SeqCst) {
            Ticket::new("")
        } else {
            let id = self.next_id.fetch_add(1, Ordering::SeqCst);
            let ticket = Ticket::new(format!(
                "mem-{id}-{}",
                hash_prefix(payload.content_hash.as_deref())
            ));
            self.blobs
                .write()
                .await
                .insert(ticket.as_str().to_string(), payload.bytes);
            self.writes.fetch_add(1, Ordering::SeqCst);
            ticket
        };

        Ok(ArtifactDescriptor {
            ticket,
            byte_len,
            content_hash: payload.content_hash,
            mime_type: payload.mime_type,
            file_name: payload.file_name,
            created_at: Utc::now(),
        })
    }

    async fn read(&self, ticket: &Ticket) -> Result<Vec<u8>, StoreError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable {
                detail: "memory store: reads disabled".to_string(),
            });
        }
        self.blobs
            .read()
            .await
            .get(ticket.as_str())
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                ticket: ticket.as_str().to_string(),
            })
    }
}

// ── Index ────────────────────────────────────────────────────────────────

/// Index backed by a `HashMap`.
#[derive(Debug, Default)]
pub struct MemoryIndex {
    entries: RwLock<HashMap<CacheKey, ArtifactDescriptor>>,
    puts: AtomicU64,
    fail_reads: AtomicBool,
    reject_puts: AtomicBool,
    fail_deletes: AtomicBool,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following `get` fail with [`IndexError::Unavailable`].
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Make every following `put` fail with [`IndexError::Rejected`].
    pub fn set_reject_puts(&self, reject: bool) {
        self.reject_puts.store(reject, Ordering::SeqCst);
    }

    /// Make every following `delete` fail with [`IndexError::Unavailable`].
    pub fn set_fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    /// Successful puts so far.
    pub fn put_count(&self) -> u64 {
        self.puts.load(Ordering::SeqCst)
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Current entry for `key`, bypassing fault injection.
    pub async fn peek(&self, key: &CacheKey) -> Option<ArtifactDescriptor> {
        self.entries.read().await.get(key).cloned()
    }
}

#[async_trait]
impl Index for MemoryIndex {
    async fn get(&self, key: &CacheKey) -> Result<Option<ArtifactDescriptor>, IndexError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(IndexError::Unavailable {
                detail: "memory index: reads disabled".to_string(),
            });
        }
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn put(&self, key: &CacheKey, descriptor: &ArtifactDescriptor) -> Result<(), IndexError> {
        if self.reject_puts.load(Ordering::SeqCst) {
            return Err(IndexError::Rejected {
                key: key.to_string(),
                detail: "memory index: puts disabled".to_string(),
            });
        }
        self.entries
            .write()
            .await
            .insert(key.clone(), descriptor.clone());
        self.puts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn delete(&self, key: &CacheKey) -> Result<(), IndexError> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(IndexError::Unavailable {
                detail: "memory index: deletes disabled".to_string(),
            });
        }
        self.entries.write().await.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hasher::{ContentHash, HashAlgorithm};
    use crate::key::derive_key;
    use crate::model::Owner;

    fn key(text: &str) -> CacheKey {
        let owner = Owner::new("tester").unwrap();
        derive_key(
            "ns",
            &owner,
            &ContentHash::of_bytes(text.as_bytes(), HashAlgorithm::Sha256),
        )
    }

    #[tokio::test]
    async fn write_then_read() {
        let store = MemoryArtifactStore::new();
        let d = store.write(ArtifactPayload::text("hello")).await.unwrap();
        assert!(d.is_live());
        assert_eq!(d.byte_len, 5);
        assert_eq!(store.read(&d.ticket).await.unwrap(), b"hello");
        assert_eq!(store.write_count(), 1);
    }

    #[tokio::test]
    async fn every_write_gets_a_fresh_ticket() {
        let store = MemoryArtifactStore::new();
        let a = store.write(ArtifactPayload::text("same")).await.unwrap();
        let b = store.write(ArtifactPayload::text("same")).await.unwrap();
        assert_ne!(a.ticket, b.ticket);
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn unknown_ticket_is_not_found() {
        let store = MemoryArtifactStore::new();
        let err = store.read(&Ticket::new("nope")).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn injected_write_failure() {
        let store = MemoryArtifactStore::new();
        store.set_fail_writes(true);
        assert!(store.write(ArtifactPayload::text("x")).await.is_err());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn dead_descriptor_stores_nothing() {
        let store = MemoryArtifactStore::new();
        store.set_return_dead_descriptors(true);
        let d = store.write(ArtifactPayload::text("x")).await.unwrap();
        assert!(!d.is_live());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn index_put_get_delete() {
        let store = MemoryArtifactStore::new();
        let index = MemoryIndex::new();
        let k = key("a");
        let d = store.write(ArtifactPayload::text("a")).await.unwrap();

        assert_eq!(index.get(&k).await.unwrap(), None);
        index.put(&k, &d).await.unwrap();
        assert_eq!(index.get(&k).await.unwrap(), Some(d));
        index.delete(&k).await.unwrap();
        assert_eq!(index.get(&k).await.unwrap(), None);
        // absent key
        index.delete(&k).await.unwrap();
        assert_eq!(index.put_count(), 1);
    }

    #[tokio::test]
    async fn index_rejected_put_leaves_no_entry() {
        let store = MemoryArtifactStore::new();
        let index = MemoryIndex::new();
        index.set_reject_puts(true);
        let d = store.write(ArtifactPayload::text("a")).await.unwrap();
        let err = index.put(&key("a"), &d).await.unwrap_err();
        assert!(matches!(err, IndexError::Rejected { .. }));
        assert!(index.is_empty().await);
    }
}
