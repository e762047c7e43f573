//! Input resolution: turn a user-supplied path or URL into a [`RawDocument`].
//!
//! Documents are read fully into memory; the normalizer works on byte
//! slices, so no temp file is needed. Format validation is left to the
//! normalizer, which knows which formats it accepts.

use crate::error::Pdf2DocError;
use crate::model::{RawDocument, Ticket};
use std::path::PathBuf;
use tracing::{debug, info};

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Fetch a document from a local path or an HTTP/HTTPS URL.
///
/// The ticket of the returned document is the URL itself, or `file:<path>`
/// for local files.
pub async fn fetch_document(input: &str, timeout_secs: u64) -> Result<RawDocument, Pdf2DocError> {
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else {
        read_local(input).await
    }
}

/// Read a local file, mapping the common failures to typed errors.
async fn read_local(path_str: &str) -> Result<RawDocument, Pdf2DocError> {
    if path_str.trim().is_empty() {
        return Err(Pdf2DocError::InvalidInput {
            input: path_str.to_string(),
        });
    }
    let path = PathBuf::from(path_str);

    let bytes = match tokio::fs::read(&path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(Pdf2DocError::PermissionDenied { path });
        }
        Err(_) => return Err(Pdf2DocError::FileNotFound { path }),
    };

    debug!("Read local document: {} ({} bytes)", path.display(), bytes.len());

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string());
    let mut doc = RawDocument::new(Ticket::new(format!("file:{}", path.display())), bytes);
    if let Some(name) = file_name {
        doc = doc.with_file_name(name);
    }
    Ok(doc)
}

/// Download a URL into memory.
async fn download_url(url: &str, timeout_secs: u64) -> Result<RawDocument, Pdf2DocError> {
    info!("Downloading document from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| Pdf2DocError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            Pdf2DocError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            Pdf2DocError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    })?;

    if !response.status().is_success() {
        return Err(Pdf2DocError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| Pdf2DocError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    info!("Downloaded {} bytes from {}", bytes.len(), url);

    Ok(RawDocument::new(Ticket::new(url), bytes.to_vec()).with_file_name(extract_filename(url)))
}

/// Extract a reasonable filename from the URL path.
fn extract_filename(url: &str) -> String {
    if let Ok(parsed) = reqwest::Url::parse(url) {
        if let Some(mut segments) = parsed.path_segments() {
            if let Some(last) = segments.next_back() {
                if !last.is_empty() && last.contains('.') {
                    return last.to_string();
                }
            }
        }
    }

    "downloaded".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.com/doc.pdf"));
        assert!(is_url("http://example.com/doc.pdf"));
        assert!(!is_url("/tmp/doc.pdf"));
        assert!(!is_url("doc.pdf"));
        assert!(!is_url(""));
    }

    #[test]
    fn test_extract_filename() {
        assert_eq!(extract_filename("https://example.com/a/report.pdf"), "report.pdf");
        assert_eq!(extract_filename("https://arxiv.org/pdf/1706"), "downloaded");
        assert_eq!(extract_filename("not a url"), "downloaded");
    }

    #[tokio::test]
    async fn test_read_local_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, "some notes").unwrap();

        let doc = fetch_document(path.to_str().unwrap(), 5).await.unwrap();
        assert_eq!(doc.bytes(), b"some notes");
        assert_eq!(doc.file_name(), Some("notes.txt"));
        assert!(doc.ticket().as_str().starts_with("file:"));
    }

    #[tokio::test]
    async fn test_missing_file() {
        let err = fetch_document("/definitely/not/here.pdf", 5).await.unwrap_err();
        assert!(matches!(err, Pdf2DocError::FileNotFound { .. }));
    }

    #[tokio::test]
    async fn test_blank_input() {
        let err = fetch_document("  ", 5).await.unwrap_err();
        assert!(matches!(err, Pdf2DocError::InvalidInput { .. }));
    }
}
