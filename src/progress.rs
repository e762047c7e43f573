//! Progress-callback trait for per-document resolution events.
//!
//! Inject an [`Arc<dyn ResolveProgressCallback>`] via
//! [`crate::config::CacheConfigBuilder::progress_callback`] to receive
//! events as a batch resolves each document.
//!
//! # Example
//!
//! ```rust
//! use edgequake_pdf2doc::{CacheConfig, CacheStatus, ResolveProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct HitCounter {
//!     hits: AtomicUsize,
//! }
//!
//! impl ResolveProgressCallback for HitCounter {
//!     fn on_document_complete(&self, _index: usize, _total: usize, status: CacheStatus) {
//!         if status == CacheStatus::Hit {
//!             self.hits.fetch_add(1, Ordering::SeqCst);
//!         }
//!     }
//! }
//!
//! let counter = Arc::new(HitCounter { hits: AtomicUsize::new(0) });
//! let config = CacheConfig::builder()
//!     .progress_callback(counter as Arc<dyn ResolveProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use crate::model::CacheStatus;
use std::sync::Arc;

/// Called by the cache as a batch resolves each document.
///
/// Documents of a batch resolve concurrently, so `on_document_*` methods
/// may be called from several tasks at once. All methods default to no-ops.
pub trait ResolveProgressCallback: Send + Sync {
    /// Called once before any document is fetched or normalised.
    fn on_batch_start(&self, total: usize) {
        let _ = total;
    }

    /// Called when work on a document begins.
    ///
    /// `index` is the 0-based position in the request.
    fn on_document_start(&self, index: usize, total: usize) {
        let _ = (index, total);
    }

    /// Called when a document resolved to a descriptor.
    fn on_document_complete(&self, index: usize, total: usize, status: CacheStatus) {
        let _ = (index, total, status);
    }

    /// Called when a document failed.
    fn on_document_error(&self, index: usize, total: usize, error: &str) {
        let _ = (index, total, error);
    }

    /// Called once after every document has been attempted.
    fn on_batch_complete(&self, total: usize, success_count: usize) {
        let _ = (total, success_count);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ResolveProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::CacheConfig`].
pub type ProgressCallback = Arc<dyn ResolveProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct TrackingCallback {
        starts: AtomicUsize,
        hits: AtomicUsize,
        misses: AtomicUsize,
        errors: AtomicUsize,
    }

    impl ResolveProgressCallback for TrackingCallback {
        fn on_document_start(&self, _index: usize, _total: usize) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }

        fn on_document_complete(&self, _index: usize, _total: usize, status: CacheStatus) {
            match status {
                CacheStatus::Hit => self.hits.fetch_add(1, Ordering::SeqCst),
                _ => self.misses.fetch_add(1, Ordering::SeqCst),
            };
        }

        fn on_document_error(&self, _index: usize, _total: usize, _error: &str) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_batch_start(3);
        cb.on_document_start(0, 3);
        cb.on_document_complete(0, 3, CacheStatus::Miss);
        cb.on_document_error(1, 3, "empty");
        cb.on_batch_complete(3, 2);
    }

    #[test]
    fn tracking_callback_receives_events() {
        let t = TrackingCallback::default();
        t.on_document_start(0, 2);
        t.on_document_complete(0, 2, CacheStatus::Hit);
        t.on_document_start(1, 2);
        t.on_document_error(1, 2, "unsupported");

        assert_eq!(t.starts.load(Ordering::SeqCst), 2);
        assert_eq!(t.hits.load(Ordering::SeqCst), 1);
        assert_eq!(t.misses.load(Ordering::SeqCst), 0);
        assert_eq!(t.errors.load(Ordering::SeqCst), 1);
    }
}
