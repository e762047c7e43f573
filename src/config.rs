//! Configuration types for the artifact cache and the document-LLM workflow.
//!
//! Everything that used to live in module-level registries is an explicit
//! value here, built once and passed to [`crate::cache::DocumentCache`] or
//! [`crate::workflow::ask_documents`] at construction time.
//!
//! Both configs follow the same builder pattern: setters clamp obviously
//! out-of-range values, `build()` rejects the rest with
//! [`Pdf2DocError::InvalidConfig`].

use crate::error::Pdf2DocError;
use crate::hasher::HashAlgorithm;
use crate::key::DEFAULT_NAMESPACE;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Configuration of a [`crate::cache::DocumentCache`].
///
/// # Example
/// ```rust
/// use edgequake_pdf2doc::{CacheConfig, HashAlgorithm};
///
/// let config = CacheConfig::builder()
///     .namespace("converted_pdf_texts")
///     .hash_algorithm(HashAlgorithm::Sha256)
///     .concurrency(8)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct CacheConfig {
    /// Key namespace, first segment of every [`crate::model::CacheKey`].
    /// Default: `converted_pdf_texts`.
    ///
    /// Distinct artifact families (PDF texts, plain texts, answers) sharing
    /// one index must use distinct namespaces.
    pub namespace: String,

    /// Digest used for cache keys. Default: [`HashAlgorithm::Sha256`].
    ///
    /// Changing it does not alias old entries (the algorithm is part of the
    /// key) but every document misses once under the new algorithm.
    pub hash_algorithm: HashAlgorithm,

    /// Documents resolved at once by a batch. Default: 4.
    ///
    /// Each in-flight document may hold a store write and an index call open
    /// against shared backends; keep this modest.
    pub concurrency: usize,

    /// Check cache hits against the freshly normalised text. Default: true.
    ///
    /// Compares the descriptor's recorded size and digest with the text;
    /// a mismatch fails the document with `KeyCollisionSuspected`.
    pub verify_hits: bool,

    /// Directory holding the pdfium shared library. Default: None (system library).
    pub pdfium_lib_dir: Option<PathBuf>,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Optional per-document progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            hash_algorithm: HashAlgorithm::default(),
            concurrency: 4,
            verify_hits: true,
            pdfium_lib_dir: None,
            download_timeout_secs: 120,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for CacheConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheConfig")
            .field("namespace", &self.namespace)
            .field("hash_algorithm", &self.hash_algorithm)
            .field("concurrency", &self.concurrency)
            .field("verify_hits", &self.verify_hits)
            .field("pdfium_lib_dir", &self.pdfium_lib_dir)
            .field("download_timeout_secs", &self.download_timeout_secs)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn ResolveProgressCallback>"),
            )
            .finish()
    }
}

impl CacheConfig {
    pub fn builder() -> CacheConfigBuilder {
        CacheConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`CacheConfig`].
#[derive(Debug)]
pub struct CacheConfigBuilder {
    config: CacheConfig,
}

impl CacheConfigBuilder {
    pub fn namespace(mut self, ns: impl Into<String>) -> Self {
        self.config.namespace = ns.into();
        self
    }

    pub fn hash_algorithm(mut self, algo: HashAlgorithm) -> Self {
        self.config.hash_algorithm = algo;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn verify_hits(mut self, v: bool) -> Self {
        self.config.verify_hits = v;
        self
    }

    pub fn pdfium_lib_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.pdfium_lib_dir = Some(dir.into());
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<CacheConfig, Pdf2DocError> {
        let c = &self.config;
        if c.namespace.trim().is_empty() {
            return Err(Pdf2DocError::InvalidConfig(
                "Namespace must not be empty".into(),
            ));
        }
        if c.namespace.contains(':') {
            return Err(Pdf2DocError::InvalidConfig(format!(
                "Namespace must not contain ':', got {:?}",
                c.namespace
            )));
        }
        if c.concurrency == 0 {
            return Err(Pdf2DocError::InvalidConfig(
                "Concurrency must be ≥ 1".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Workflow configuration ───────────────────────────────────────────────

/// Configuration of the document-LLM workflow.
#[derive(Clone)]
pub struct AskConfig {
    /// LLM model identifier. Default: `gpt-4.1-nano`.
    ///
    /// Also selects the chunk size through [`crate::pipeline::chunk::context_tokens`].
    pub model: String,

    /// LLM provider name (e.g. "openai", "anthropic", "ollama").
    /// If None along with `provider`, the provider is auto-detected.
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature. Default: 0.0.
    pub temperature: f32,

    /// Maximum tokens generated per call. Default: 2048.
    pub max_tokens: usize,

    /// Maximum retry attempts on a failed LLM call. Default: 3.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds, doubled per attempt. Default: 500.
    pub retry_backoff_ms: u64,

    /// Chunks sent to the LLM at once. Default: 4.
    pub concurrency: usize,
}

impl Default for AskConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4.1-nano".to_string(),
            provider_name: None,
            provider: None,
            temperature: 0.0,
            max_tokens: 2048,
            max_retries: 3,
            retry_backoff_ms: 500,
            concurrency: 4,
        }
    }
}

impl fmt::Debug for AskConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AskConfig")
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_retries", &self.max_retries)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .field("concurrency", &self.concurrency)
            .finish()
    }
}

impl AskConfig {
    pub fn builder() -> AskConfigBuilder {
        AskConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`AskConfig`].
#[derive(Debug)]
pub struct AskConfigBuilder {
    config: AskConfig,
}

impl AskConfigBuilder {
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn build(self) -> Result<AskConfig, Pdf2DocError> {
        if self.config.model.trim().is_empty() {
            return Err(Pdf2DocError::InvalidConfig("Model must not be empty".into()));
        }
        if self.config.max_tokens == 0 {
            return Err(Pdf2DocError::InvalidConfig(
                "max_tokens must be ≥ 1".into(),
            ));
        }
        Ok(self.config)
    }
}
