//! Cache key derivation.
//!
//! Keys are persisted in the index, so the textual format below is frozen:
//!
//! ```text
//! {namespace}:{owner_byte_len}:{owner}:{algorithm}:{hex_digest}
//! ```
//!
//! The owner is length-prefixed, which keeps the encoding injective for
//! owner strings that themselves contain `:`. The namespace is validated by
//! [`crate::config::CacheConfigBuilder::build`] to be free of `:`.

use crate::hasher::ContentHash;
use crate::model::{CacheKey, Owner};

/// Namespace of PDF text artifacts.
pub const DEFAULT_NAMESPACE: &str = "converted_pdf_texts";

/// Namespace of texts resolved by the document-LLM workflow.
pub const TEXT_NAMESPACE: &str = "converted_texts";

/// Build the owner-scoped key of a content hash. Pure and total.
pub fn derive_key(namespace: &str, owner: &Owner, hash: &ContentHash) -> CacheKey {
    let owner = owner.as_str();
    CacheKey::from_derived(format!(
        "{namespace}:{}:{owner}:{}:{}",
        owner.len(),
        hash.algorithm().name(),
        hash.hex()
    ))
}
