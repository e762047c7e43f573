//! Persistence seams of the cache: the artifact store and the key index.
//!
//! The cache talks to two independent collaborators:
//!
//! * an [`ArtifactStore`] that keeps blobs and hands out opaque tickets;
//! * an [`Index`] that maps an owner-scoped [`CacheKey`] to the
//!   [`ArtifactDescriptor`] of the blob holding that key's text.
//!
//! Neither knows about the other. A write followed by a failed put leaves
//! an orphaned blob behind; nothing here reconciles the two.
//!
//! Implementations shipped with the crate:
//!
//! | Backend | Store | Index |
//! |---|---|---|
//! | in-process | [`MemoryArtifactStore`] | [`MemoryIndex`] |
//! | filesystem | [`FsArtifactStore`] | [`JsonFileIndex`] |

pub mod fs;
pub mod memory;

pub use fs::{FsArtifactStore, JsonFileIndex};
pub use memory::{MemoryArtifactStore, MemoryIndex};

use crate::error::{IndexError, StoreError};
use crate::model::{ArtifactDescriptor, ArtifactPayload, CacheKey, Ticket};
use async_trait::async_trait;

/// Blob storage addressed by store-assigned tickets.
///
/// Every successful `write` returns a descriptor with a fresh ticket, even
/// for byte-identical payloads.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Persist a payload and describe where it landed.
    async fn write(&self, payload: ArtifactPayload) -> Result<ArtifactDescriptor, StoreError>;

    /// Read back the bytes stored under `ticket`.
    async fn read(&self, ticket: &Ticket) -> Result<Vec<u8>, StoreError>;
}

/// Key/value map from cache keys to artifact descriptors.
#[async_trait]
pub trait Index: Send + Sync {
    async fn get(&self, key: &CacheKey) -> Result<Option<ArtifactDescriptor>, IndexError>;

    /// Insert or replace the entry for `key`.
    async fn put(&self, key: &CacheKey, descriptor: &ArtifactDescriptor) -> Result<(), IndexError>;

    /// Remove the entry for `key`. Removing an absent key succeeds.
    async fn delete(&self, key: &CacheKey) -> Result<(), IndexError>;
}

/// Short, filesystem-safe prefix of an `algorithm:hex` content hash.
pub(crate) fn hash_prefix(content_hash: Option<&str>) -> String {
    content_hash
        .and_then(|h| h.rsplit(':').next())
        .map(|hex| {
            hex.chars()
                .filter(|c| c.is_ascii_hexdigit())
                .take(12)
                .collect::<String>()
        })
        .filter(|p| !p.is_empty())
        .unwrap_or_else(|| "raw".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_prefix_takes_hex_part() {
        assert_eq!(hash_prefix(Some("sha256:0123456789abcdef")), "0123456789ab");
        assert_eq!(hash_prefix(Some("xxh3-128:ab")), "ab");
        assert_eq!(hash_prefix(None), "raw");
        assert_eq!(hash_prefix(Some("sha256:")), "raw");
    }
}
