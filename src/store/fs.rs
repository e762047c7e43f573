//! Filesystem-backed store and index.
//!
//! ## Layout (as used by the `pdf2doc` CLI)
//!
//! ```text
//! <root>/
//!   blobs/<ticket>       one file per stored artifact
//!   index.json           { "<cache key>": <descriptor>, ... }
//! ```
//!
//! Both files are written atomically: the bytes go to a temp file in the
//! same directory, which is then persisted over the target name. A crash
//! mid-write leaves the previous version (or nothing) in place, never a
//! truncated file.

use super::{hash_prefix, ArtifactStore, Index};
use crate::error::{IndexError, Pdf2DocError, StoreError};
use crate::model::{ArtifactDescriptor, ArtifactPayload, CacheKey, Ticket};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Write `bytes` to `target` through a temp file in `dir`.
fn write_atomic(dir: &Path, target: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(target).map_err(|e| e.error)?;
    Ok(())
}

// ── Store ────────────────────────────────────────────────────────────────

/// One file per ticket under a root directory.
#[derive(Debug)]
pub struct FsArtifactStore {
    root: PathBuf,
    counter: AtomicU64,
    writes: AtomicU64,
}

impl FsArtifactStore {
    /// Open (and create if needed) a store rooted at `root`.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        tokio::fs::create_dir_all(&root)
            .await
            .map_err(|e| StoreError::Unavailable {
                detail: format!("cannot create {}: {e}", root.display()),
            })?;
        info!("Artifact store at {}", root.display());
        Ok(Self {
            root,
            counter: AtomicU64::new(0),
            writes: AtomicU64::new(0),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Successful writes through this handle.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    /// Path of the blob behind `ticket`; `None` for tickets that could
    /// escape the root directory.
    fn blob_path(&self, ticket: &Ticket) -> Option<PathBuf> {
        let t = ticket.as_str();
        let safe = !t.is_empty()
            && t
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        safe.then(|| self.root.join(t))
    }

    fn mint_ticket(&self, content_hash: Option<&str>) -> Ticket {
        let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        Ticket::new(format!("{nanos}-{n}-{}", hash_prefix(content_hash)))
    }
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    async fn write(&self, payload: ArtifactPayload) -> Result<ArtifactDescriptor, StoreError> {
        let ticket = self.mint_ticket(payload.content_hash.as_deref());
        let target = self.blob_path(&ticket).ok_or_else(|| StoreError::Unavailable {
            detail: format!("minted unusable ticket '{ticket}'"),
        })?;
        let dir = self.root.clone();
        let bytes = payload.bytes;
        let byte_len = bytes.len() as u64;

        tokio::task::spawn_blocking(move || write_atomic(&dir, &target, &bytes))
            .await
            .map_err(|e| StoreError::Unavailable {
                detail: format!("write task panicked: {e}"),
            })?
            .map_err(|e| StoreError::Unavailable {
                detail: format!("write of '{ticket}' failed: {e}"),
            })?;

        self.writes.fetch_add(1, Ordering::SeqCst);
        debug!("Stored {} bytes as {}", byte_len, ticket);

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
        let not_found = || StoreError::NotFound {
            ticket: ticket.as_str().to_string(),
        };
        let path = self.blob_path(ticket).ok_or_else(not_found)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(not_found()),
            Err(e) => Err(StoreError::Unavailable {
                detail: format!("read of '{ticket}' failed: {e}"),
            }),
        }
    }
}

// ── Index ────────────────────────────────────────────────────────────────

/// A JSON object `{ key: descriptor }` rewritten on every mutation.
#[derive(Debug)]
pub struct JsonFileIndex {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, ArtifactDescriptor>>,
    puts: AtomicU64,
}

impl JsonFileIndex {
    /// Load the index at `path`, or start empty when the file is absent.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, Pdf2DocError> {
        let path = path.into();
        let entries = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| Pdf2DocError::IndexLoadFailed {
                path: path.clone(),
                detail: e.to_string(),
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                return Err(Pdf2DocError::IndexLoadFailed {
                    path,
                    detail: e.to_string(),
                })
            }
        };
        debug!("Loaded {} index entries from {}", entries.len(), path.display());
        Ok(Self {
            path,
            entries: Mutex::new(entries),
            puts: AtomicU64::new(0),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn put_count(&self) -> u64 {
        self.puts.load(Ordering::SeqCst)
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// All descriptors, for listing.
    pub async fn descriptors(&self) -> Vec<ArtifactDescriptor> {
        self.entries.lock().await.values().cloned().collect()
    }

    async fn persist(&self, entries: &BTreeMap<String, ArtifactDescriptor>) -> Result<(), String> {
        let bytes = serde_json::to_vec_pretty(entries).map_err(|e| e.to_string())?;
        let target = self.path.clone();
        let dir = match target.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        tokio::task::spawn_blocking(move || {
            std::fs::create_dir_all(&dir)?;
            write_atomic(&dir, &target, &bytes)
        })
        .await
        .map_err(|e| format!("persist task panicked: {e}"))?
        .map_err(|e| format!("cannot write {}: {e}", self.path.display()))
    }
}

#[async_trait]
impl Index for JsonFileIndex {
    async fn get(&self, key: &CacheKey) -> Result<Option<ArtifactDescriptor>, IndexError> {
        Ok(self.entries.lock().await.get(key.as_str()).cloned())
    }

    async fn put(&self, key: &CacheKey, descriptor: &ArtifactDescriptor) -> Result<(), IndexError> {
        let mut entries = self.entries.lock().await;
        let previous = entries.insert(key.as_str().to_string(), descriptor.clone());
        if let Err(detail) = self.persist(&entries).await {
            // Keep memory consistent with what is on disk.
            match previous {
                Some(p) => entries.insert(key.as_str().to_string(), p),
                None => entries.remove(key.as_str()),
            };
            return Err(IndexError::Rejected {
                key: key.to_string(),
                detail,
            });
        }
        self.puts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn delete(&self, key: &CacheKey) -> Result<(), IndexError> {
        let mut entries = self.entries.lock().await;
        let Some(previous) = entries.remove(key.as_str()) else {
            return Ok(());
        };
        if let Err(detail) = self.persist(&entries).await {
            entries.insert(key.as_str().to_string(), previous);
            return Err(IndexError::Unavailable { detail });
        }
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
        derive_key(
            "ns",
            &Owner::new("tester").unwrap(),
            &ContentHash::of_bytes(text.as_bytes(), HashAlgorithm::Sha256),
        )
    }

    #[tokio::test]
    async fn store_roundtrip_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsArtifactStore::open(dir.path().join("blobs")).await.unwrap();
        let d = store
            .write(ArtifactPayload::text("on disk").with_content_hash("sha256:abcdef"))
            .await
            .unwrap();
        assert!(d.ticket.as_str().ends_with("-abcdef"));
        assert_eq!(store.read(&d.ticket).await.unwrap(), b"on disk");
        assert!(dir.path().join("blobs").join(d.ticket.as_str()).exists());
    }

    #[tokio::test]
    async fn store_rejects_path_tickets() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsArtifactStore::open(dir.path()).await.unwrap();
        let err = store.read(&Ticket::new("../etc/passwd")).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn index_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsArtifactStore::open(dir.path().join("blobs")).await.unwrap();
        let index_path = dir.path().join("index.json");
        let d = store.write(ArtifactPayload::text("kept")).await.unwrap();

        {
            let index = JsonFileIndex::open(&index_path).await.unwrap();
            index.put(&key("kept"), &d).await.unwrap();
            assert_eq!(index.put_count(), 1);
        }

        let reopened = JsonFileIndex::open(&index_path).await.unwrap();
        assert_eq!(reopened.get(&key("kept")).await.unwrap(), Some(d));
    }

    #[tokio::test]
    async fn index_delete_absent_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        let index = JsonFileIndex::open(dir.path().join("index.json")).await.unwrap();
        index.delete(&key("missing")).await.unwrap();
        assert!(index.is_empty().await);
    }

    #[tokio::test]
    async fn corrupt_index_fails_to_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.json");
        std::fs::write(&path, "{ not json").unwrap();
        let err = JsonFileIndex::open(&path).await.unwrap_err();
        assert!(matches!(err, Pdf2DocError::IndexLoadFailed { .. }));
    }
}
