//! The normalizer seam: raw document bytes in, cleaned text out.
//!
//! The cache never looks inside a document. It only asks a [`Normalizer`]
//! for the canonical text, hashes that text and stores it. Two documents
//! whose normalized texts are equal are the same document as far as the
//! cache is concerned, so implementations must be deterministic.

use crate::error::NormalizeError;
use crate::model::NormalizedText;
use crate::pipeline::clean::clean_text;
use crate::pipeline::pdf::{is_pdf, PdfNormalizer};
use async_trait::async_trait;

/// Turns the raw bytes of one document into its cleaned text.
///
/// Must be deterministic: equal input bytes yield equal output text.
/// Empty or whitespace-only output is reported as
/// [`NormalizeError::EmptyContent`].
#[async_trait]
pub trait Normalizer: Send + Sync {
    async fn normalize(&self, raw: &[u8]) -> Result<NormalizedText, NormalizeError>;
}

/// Normalizer for UTF-8 text documents.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainTextNormalizer;

#[async_trait]
impl Normalizer for PlainTextNormalizer {
    async fn normalize(&self, raw: &[u8]) -> Result<NormalizedText, NormalizeError> {
        let text = std::str::from_utf8(raw).map_err(|e| NormalizeError::UnsupportedFormat {
            detail: format!("not valid UTF-8 text: {e}"),
        })?;
        NormalizedText::new(clean_text(text))
    }
}

/// Sends `%PDF` documents to a [`PdfNormalizer`] and everything else to
/// [`PlainTextNormalizer`].
#[derive(Debug, Clone, Default)]
pub struct AutoNormalizer {
    pdf: PdfNormalizer,
}

impl AutoNormalizer {
    pub fn new(pdf: PdfNormalizer) -> Self {
        Self { pdf }
    }
}

#[async_trait]
impl Normalizer for AutoNormalizer {
    async fn normalize(&self, raw: &[u8]) -> Result<NormalizedText, NormalizeError> {
        if is_pdf(raw) {
            self.pdf.normalize(raw).await
        } else {
            PlainTextNormalizer.normalize(raw).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn plain_text_is_cleaned() {
        let text = PlainTextNormalizer
            .normalize(b"  Hello\r\n   world\t ")
            .await
            .unwrap();
        assert_eq!(text.as_str(), "Hello world");
    }

    #[tokio::test]
    async fn invalid_utf8_is_unsupported() {
        let err = PlainTextNormalizer
            .normalize(&[0xff, 0xfe, 0x00])
            .await
            .unwrap_err();
        assert!(matches!(err, NormalizeError::UnsupportedFormat { .. }));
    }

    #[tokio::test]
    async fn whitespace_only_is_empty() {
        let err = PlainTextNormalizer.normalize(b" \n\t ").await.unwrap_err();
        assert_eq!(err, NormalizeError::EmptyContent);
    }

    #[tokio::test]
    async fn auto_routes_text_to_plain() {
        let auto = AutoNormalizer::new(PdfNormalizer::with_library_dir("/nonexistent"));
        let text = auto.normalize(b"just text").await.unwrap();
        assert_eq!(text.as_str(), "just text");

        let err = auto.normalize(b"%PDF-1.4").await.unwrap_err();
        assert!(matches!(err, NormalizeError::EngineUnavailable { .. }));
    }
}
