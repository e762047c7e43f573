//! PDF text extraction via pdfium.
//!
//! ## Why spawn_blocking?
//!
//! `pdfium-render` wraps the pdfium C++ library, which is CPU-bound and keeps
//! thread-local state. Extraction therefore runs on tokio's blocking pool so
//! the async workers resolving other documents of a batch never stall.
//!
//! ## Binding
//!
//! The library is bound per call, either from an explicit directory or from
//! the system search path. A missing library surfaces as
//! [`NormalizeError::EngineUnavailable`] instead of a panic.

use crate::config::CacheConfig;
use crate::error::NormalizeError;
use crate::model::NormalizedText;
use crate::pipeline::clean::clean_text;
use crate::pipeline::normalize::Normalizer;
use async_trait::async_trait;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Normalizer for PDF documents: every page's text, joined by single spaces
/// and cleaned.
#[derive(Debug, Clone, Default)]
pub struct PdfNormalizer {
    lib_dir: Option<PathBuf>,
}

impl PdfNormalizer {
    /// Use the system pdfium library.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind pdfium from the given directory.
    pub fn with_library_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            lib_dir: Some(dir.into()),
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self {
            lib_dir: config.pdfium_lib_dir.clone(),
        }
    }

    pub fn library_dir(&self) -> Option<&Path> {
        self.lib_dir.as_deref()
    }
}

#[async_trait]
impl Normalizer for PdfNormalizer {
    async fn normalize(&self, raw: &[u8]) -> Result<NormalizedText, NormalizeError> {
        if !is_pdf(raw) {
            return Err(NormalizeError::UnsupportedFormat {
                detail: "missing %PDF header".to_string(),
            });
        }

        let bytes = raw.to_vec();
        let lib_dir = self.lib_dir.clone();
        let text = tokio::task::spawn_blocking(move || {
            extract_text_blocking(&bytes, lib_dir.as_deref())
        })
        .await
        .map_err(|e| NormalizeError::EngineUnavailable {
            detail: format!("extraction task panicked: {e}"),
        })??;

        NormalizedText::new(clean_text(&text))
    }
}

/// Check the `%PDF` magic bytes.
pub fn is_pdf(raw: &[u8]) -> bool {
    raw.starts_with(b"%PDF")
}

fn bind(lib_dir: Option<&Path>) -> Result<Pdfium, NormalizeError> {
    let bindings = match lib_dir {
        Some(dir) => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(dir)),
        None => Pdfium::bind_to_system_library(),
    }
    .map_err(|e| NormalizeError::EngineUnavailable {
        detail: format!("cannot bind pdfium: {e:?}"),
    })?;
    Ok(Pdfium::new(bindings))
}

fn extract_text_blocking(bytes: &[u8], lib_dir: Option<&Path>) -> Result<String, NormalizeError> {
    let pdfium = bind(lib_dir)?;

    let document = pdfium.load_pdf_from_byte_slice(bytes, None).map_err(|e| {
        let err_str = format!("{:?}", e);
        if err_str.contains("Password") || err_str.contains("password") {
            NormalizeError::UnsupportedFormat {
                detail: "document is password protected".to_string(),
            }
        } else {
            NormalizeError::UnsupportedFormat {
                detail: format!("corrupt PDF: {err_str}"),
            }
        }
    })?;

    let pages = document.pages();
    let mut parts = Vec::with_capacity(pages.len() as usize);
    for (idx, page) in pages.iter().enumerate() {
        let text = page.text().map_err(|e| NormalizeError::UnsupportedFormat {
            detail: format!("page {}: {:?}", idx + 1, e),
        })?;
        parts.push(text.all());
    }

    debug!("Extracted text from {} pages", parts.len());
    Ok(parts.join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn magic_bytes() {
        assert!(is_pdf(b"%PDF-1.7\n..."));
        assert!(!is_pdf(b"<html>"));
        assert!(!is_pdf(b""));
    }

    #[tokio::test]
    async fn non_pdf_rejected_before_binding() {
        let err = PdfNormalizer::with_library_dir("/nonexistent")
            .normalize(b"plain text, not a pdf")
            .await
            .unwrap_err();
        assert!(matches!(err, NormalizeError::UnsupportedFormat { .. }));
    }

    #[tokio::test]
    async fn missing_library_is_engine_unavailable() {
        let err = PdfNormalizer::with_library_dir("/nonexistent/pdfium")
            .normalize(b"%PDF-1.4\n%%EOF")
            .await
            .unwrap_err();
        assert!(matches!(err, NormalizeError::EngineUnavailable { .. }));
    }

    #[test]
    fn from_config_takes_library_dir() {
        let config = CacheConfig::builder()
            .pdfium_lib_dir("/opt/pdfium/lib")
            .build()
            .unwrap();
        let n = PdfNormalizer::from_config(&config);
        assert_eq!(n.library_dir(), Some(Path::new("/opt/pdfium/lib")));
    }
}
