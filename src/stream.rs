//! Streaming resolution: emit documents as they complete.
//!
//! ## Why stream?
//!
//! A batch of large PDFs can take minutes to extract. A stream lets callers
//! show each document as soon as it is cached, drive progress bars, or start
//! downstream work early instead of waiting for the slowest document.
//!
//! Unlike [`DocumentCache::resolve_all`], which returns once every document
//! is done and keeps input order, [`DocumentCache::resolve_stream`] yields
//! `(index, outcome)` pairs in completion order. Sort by index if order
//! matters.

use crate::cache::{DocumentCache, Source};
use crate::model::{DocumentOutcome, Owner, RawDocument};
use futures::stream::{self, StreamExt};
use std::pin::Pin;
use tokio_stream::Stream;
use tracing::info;

/// A boxed stream of `(input index, outcome)` pairs.
pub type ResolveStream<'a> = Pin<Box<dyn Stream<Item = (usize, DocumentOutcome)> + Send + 'a>>;

impl DocumentCache {
    /// Resolve documents concurrently, yielding each result when ready.
    ///
    /// Concurrency is bounded by [`crate::CacheConfig::concurrency`].
    /// Batch-level progress callbacks are not fired; per-document ones are.
    ///
    /// # Example
    /// ```rust,no_run
    /// use edgequake_pdf2doc::{DocumentCache, Owner, RawDocument};
    /// use futures::StreamExt;
    ///
    /// # async fn run(cache: DocumentCache, docs: Vec<RawDocument>) -> Result<(), Box<dyn std::error::Error>> {
    /// let owner = Owner::new("alice")?;
    /// let mut stream = cache.resolve_stream(&owner, docs, false);
    /// while let Some((idx, outcome)) = stream.next().await {
    ///     match outcome {
    ///         Ok(res) => println!("#{idx}: {} ({})", res.descriptor.ticket, res.status),
    ///         Err(e) => eprintln!("{e}"),
    ///     }
    /// }
    /// # Ok(())
    /// # }
    /// ```
    pub fn resolve_stream<'a>(
        &'a self,
        owner: &'a Owner,
        docs: Vec<RawDocument>,
        overwrite: bool,
    ) -> ResolveStream<'a> {
        let total = docs.len();
        info!("Streaming {} documents for {}", total, owner);

        let s = stream::iter(docs.into_iter().enumerate())
            .map(move |(idx, doc)| async move {
                let outcome = self
                    .run_one(idx, total, owner, Source::Raw(doc), overwrite)
                    .await;
                (idx, outcome)
            })
            .buffer_unordered(self.config().concurrency);

        Box::pin(s)
    }
}
