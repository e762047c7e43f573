//! Pipeline stages that feed and consume the artifact cache.
//!
//! Each submodule implements exactly one transformation step, so each is
//! testable on its own and the PDF backend can be swapped without touching
//! the cache.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ normalize ──▶ clean ──▶ (cache) ──▶ chunk ──▶ llm
//! (URL/path) (pdfium/utf-8) (text)             (sizing)   (chat)
//! ```
//!
//! 1. [`input`]     : turn a user-supplied path or URL into a `RawDocument`
//! 2. [`normalize`] : the `Normalizer` seam plus the UTF-8 text normalizer
//! 3. [`pdf`]       : PDF text extraction via pdfium, on a blocking thread
//! 4. [`clean`]     : deterministic whitespace and invisible-character rules
//! 5. [`chunk`]     : split cached texts into model-sized pieces
//! 6. [`llm`]       : the chat seam and its retrying provider adapter

pub mod chunk;
pub mod clean;
pub mod input;
pub mod llm;
pub mod normalize;
pub mod pdf;
