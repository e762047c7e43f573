//! CLI binary for edgequake-pdf2doc.
//!
//! A thin shim over the library crate: maps flags to `CacheConfig` /
//! `AskConfig`, opens the filesystem store under `--store`, and prints
//! results.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use edgequake_pdf2doc::{
    ask_documents, ArtifactStore, fetch_document, AskConfig, AskRequest, AutoNormalizer, CacheConfig,
    CacheStatus, DocumentCache, DocumentRef, FsArtifactStore, HashAlgorithm, JsonFileIndex, Owner,
    PdfNormalizer, ProgressCallback, ProviderChat, RawDocument, ResolveProgressCallback,
    Ticket, Usage, TEXT_NAMESPACE,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Progress bar plus one log line per document. Documents may finish out of
/// order, so labels and start times are looked up by index.
struct CliProgressCallback {
    bar: ProgressBar,
    labels: Vec<String>,
    start_times: Mutex<HashMap<usize, Instant>>,
}

impl CliProgressCallback {
    fn new(labels: Vec<String>) -> Arc<Self> {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} documents  \
             ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        let bar = ProgressBar::new(labels.len() as u64);
        bar.set_style(style);
        bar.set_prefix("Resolving");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            labels,
            start_times: Mutex::new(HashMap::new()),
        })
    }

    fn label(&self, index: usize) -> &str {
        self.labels.get(index).map(String::as_str).unwrap_or("?")
    }

    fn elapsed_secs(&self, index: usize) -> f64 {
        self.start_times
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&index)
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl ResolveProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total: usize) {
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Resolving {total} documents…"))
        ));
    }

    fn on_document_start(&self, index: usize, _total: usize) {
        self.start_times
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(index, Instant::now());
        self.bar.set_message(self.label(index).to_string());
    }

    fn on_document_complete(&self, index: usize, _total: usize, status: CacheStatus) {
        let secs = self.elapsed_secs(index);
        self.bar.println(format!(
            "  {} {:<40}  {:<12}  {}",
            green("✓"),
            self.label(index),
            status.to_string(),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_document_error(&self, index: usize, _total: usize, error: &str) {
        let secs = self.elapsed_secs(index);
        let msg: String = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };

        self.bar.println(format!(
            "  {} {:<40}  {}  {}",
            red("✗"),
            self.label(index),
            red(&msg),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, total: usize, success_count: usize) {
        let failed = total.saturating_sub(success_count);
        self.bar.finish_and_clear();

        if failed == 0 {
            eprintln!(
                "{} {} documents cached",
                green("✔"),
                bold(&success_count.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} documents cached  ({} failed)",
                if failed == total { red("✘") } else { cyan("⚠") },
                bold(&success_count.to_string()),
                total,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Extract and cache the text of two PDFs
  pdf2doc convert --owner alice report.pdf https://arxiv.org/pdf/1706.03762

  # Force re-extraction
  pdf2doc convert --owner alice --overwrite report.pdf

  # Print a cached text
  pdf2doc read 1739871234567890123-0-b94d27b9934d

  # Ask a question about cached texts
  pdf2doc ask --owner alice --doc <TICKET> --prompt "Who are the authors?"

  # Run a prompt on every chunk of a web page
  pdf2doc ask --owner alice --usage run_prompt_on_documents \
      --text https://example.com/notes.txt --prompt "List the action items."

ENVIRONMENT VARIABLES:
  PDF2DOC_STORE           Cache directory (default: .pdf2doc)
  PDF2DOC_OWNER           Owner identity used for cache keys
  PDF2DOC_PDFIUM_LIB_DIR  Directory containing libpdfium
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
"#;

/// Cache PDF texts and query them with LLMs.
#[derive(Parser, Debug)]
#[command(
    name = "pdf2doc",
    version,
    about = "Cache PDF texts and query them with LLMs",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Cache directory holding blobs/ and index.json.
    #[arg(long, global = true, env = "PDF2DOC_STORE", default_value = ".pdf2doc")]
    store: PathBuf,

    /// Directory containing the pdfium shared library.
    #[arg(long, global = true, env = "PDF2DOC_PDFIUM_LIB_DIR")]
    pdfium_lib_dir: Option<PathBuf>,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "PDF2DOC_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "PDF2DOC_QUIET")]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Extract, cache and register the text of PDF files or URLs.
    Convert(ConvertArgs),
    /// Print a stored artifact.
    Read {
        /// Ticket printed by `convert` or `ask`.
        ticket: String,
    },
    /// Query documents, or run a prompt or functions on them.
    Ask(AskArgs),
}

#[derive(Args, Debug)]
struct ConvertArgs {
    /// Local PDF file paths or HTTP/HTTPS URLs.
    #[arg(required = true)]
    inputs: Vec<String>,

    /// Owner identity the cache entries are scoped to.
    #[arg(long, env = "PDF2DOC_OWNER")]
    owner: String,

    /// Detach existing entries and extract again.
    #[arg(long, env = "PDF2DOC_OVERWRITE")]
    overwrite: bool,

    /// Output the batch outcome as JSON.
    #[arg(long, env = "PDF2DOC_JSON")]
    json: bool,

    /// Documents resolved at once.
    #[arg(short, long, env = "PDF2DOC_CONCURRENCY", default_value_t = 4)]
    concurrency: usize,

    /// Digest used for cache keys.
    #[arg(long, env = "PDF2DOC_HASH", value_enum, default_value = "sha256")]
    hash: HashArg,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "PDF2DOC_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Disable progress bar.
    #[arg(long, env = "PDF2DOC_NO_PROGRESS")]
    no_progress: bool,
}

#[derive(Args, Debug)]
struct AskArgs {
    /// Owner identity the cache entries are scoped to.
    #[arg(long, env = "PDF2DOC_OWNER")]
    owner: String,

    /// Ticket of a stored text artifact (repeatable).
    #[arg(long = "doc")]
    docs: Vec<String>,

    /// Literal text, or whitespace-separated URLs to download.
    #[arg(long)]
    text: Option<String>,

    /// query_documents, run_prompt_on_documents or run_functions_on_documents.
    #[arg(long, env = "PDF2DOC_USAGE", default_value = "query_documents")]
    usage: String,

    /// The query, prompt, or JSON function definitions.
    #[arg(long)]
    prompt: Option<String>,

    /// LLM model ID.
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "PDF2DOC_TEMPERATURE", default_value_t = 0.0)]
    temperature: f32,

    /// Max LLM output tokens per call.
    #[arg(long, env = "PDF2DOC_MAX_TOKENS", default_value_t = 2048)]
    max_tokens: usize,

    /// Retries per LLM call.
    #[arg(long, env = "PDF2DOC_MAX_RETRIES", default_value_t = 3)]
    max_retries: u32,

    /// Re-ingest every input instead of reusing cached texts.
    #[arg(long, env = "PDF2DOC_OVERWRITE")]
    overwrite: bool,

    /// Output the answer and its descriptors as JSON.
    #[arg(long, env = "PDF2DOC_JSON")]
    json: bool,
}

#[derive(clap::ValueEnum, Clone, Debug)]
enum HashArg {
    Sha256,
    Xxh3,
}

impl From<HashArg> for HashAlgorithm {
    fn from(v: HashArg) -> Self {
        match v {
            HashArg::Sha256 => HashAlgorithm::Sha256,
            HashArg::Xxh3 => HashAlgorithm::Xxh3_128,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs while it is visible.
    let progress_active = matches!(
        &cli.command,
        Command::Convert(c) if !c.no_progress && !c.json
    );
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || progress_active {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    match &cli.command {
        Command::Convert(args) => run_convert(&cli, args).await,
        Command::Read { ticket } => run_read(&cli, ticket).await,
        Command::Ask(args) => run_ask(&cli, args).await,
    }
}

/// Open the store and index under `dir`.
async fn open_backends(dir: &Path) -> Result<(Arc<FsArtifactStore>, Arc<JsonFileIndex>)> {
    let store = FsArtifactStore::open(dir.join("blobs"))
        .await
        .with_context(|| format!("Failed to open artifact store in {}", dir.display()))?;
    let index = JsonFileIndex::open(dir.join("index.json"))
        .await
        .context("Failed to open index")?;
    Ok((Arc::new(store), Arc::new(index)))
}

// ── convert ──────────────────────────────────────────────────────────────

async fn run_convert(cli: &Cli, args: &ConvertArgs) -> Result<()> {
    let owner = Owner::new(args.owner.as_str()).context("Invalid --owner")?;
    let (store, index) = open_backends(&cli.store).await?;

    // ── Fetch inputs ─────────────────────────────────────────────────────
    let mut docs: Vec<RawDocument> = Vec::new();
    let mut labels: Vec<String> = Vec::new();
    let mut fetch_errors: Vec<(String, String)> = Vec::new();
    for input in &args.inputs {
        match fetch_document(input, args.download_timeout).await {
            Ok(doc) => {
                docs.push(doc);
                labels.push(input.clone());
            }
            Err(e) => {
                if !cli.quiet && !args.json {
                    eprintln!("  {} {:<40}  {}", red("✗"), input, red(&e.to_string()));
                }
                fetch_errors.push((input.clone(), e.to_string()));
            }
        }
    }

    // ── Build cache ──────────────────────────────────────────────────────
    let show_progress = !cli.quiet && !args.no_progress && !args.json;
    let mut builder = CacheConfig::builder()
        .concurrency(args.concurrency)
        .hash_algorithm(args.hash.clone().into())
        .download_timeout_secs(args.download_timeout);
    if let Some(ref dir) = cli.pdfium_lib_dir {
        builder = builder.pdfium_lib_dir(dir);
    }
    if show_progress && !docs.is_empty() {
        let cb = CliProgressCallback::new(labels.clone());
        builder = builder.progress_callback(cb as ProgressCallback);
    }
    let config = builder.build().context("Invalid configuration")?;

    let cache = DocumentCache::new(
        Arc::new(PdfNormalizer::from_config(&config)),
        store,
        index,
        config,
    );

    // ── Resolve ──────────────────────────────────────────────────────────
    let outcome = cache.resolve_all(&owner, docs, args.overwrite).await;

    if args.json {
        let fetch_json: Vec<_> = fetch_errors
            .iter()
            .map(|(input, error)| serde_json::json!({ "input": input, "error": error }))
            .collect();
        let json = serde_json::json!({
            "fetch_errors": fetch_json,
            "outcome": outcome,
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&json).context("Failed to serialise output")?
        );
    } else {
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        for (label, result) in labels.iter().zip(&outcome.results) {
            let line = match result {
                Ok(res) => format!("{}\t{}\t{}", res.descriptor.ticket, res.status, label),
                Err(f) => format!("-\tfailed\t{}\t{}", label, f.error),
            };
            writeln!(handle, "{line}").context("Failed to write to stdout")?;
        }
    }

    let failed = outcome.stats.failed + fetch_errors.len();
    if !cli.quiet && !args.json {
        let stats = cache.stats();
        eprintln!(
            "   {} hits  /  {} misses  /  {} invalidated  ·  {}ms",
            dim(&stats.hits.to_string()),
            dim(&stats.misses.to_string()),
            dim(&stats.invalidations.to_string()),
            outcome.stats.duration_ms,
        );
    }
    if failed > 0 {
        anyhow::bail!("{} of {} documents failed", failed, args.inputs.len());
    }
    Ok(())
}

// ── read ─────────────────────────────────────────────────────────────────

async fn run_read(cli: &Cli, ticket: &str) -> Result<()> {
    let store = FsArtifactStore::open(cli.store.join("blobs"))
        .await
        .context("Failed to open artifact store")?;
    let bytes = store
        .read(&Ticket::new(ticket))
        .await
        .with_context(|| format!("Failed to read artifact '{ticket}'"))?;
    let text = String::from_utf8(bytes).with_context(|| format!("Artifact '{ticket}' is not UTF-8 text"))?;

    let stdout = io::stdout();
    write_text(&mut stdout.lock(), &text)
}

/// Write an artifact's text, terminated by exactly one trailing newline.
fn write_text(out: &mut impl Write, text: &str) -> Result<()> {
    out.write_all(text.as_bytes())
        .context("Failed to write to stdout")?;
    if !text.ends_with('\n') {
        out.write_all(b"\n").context("Failed to write to stdout")?;
    }
    out.flush().context("Failed to write to stdout")
}

// ── ask ──────────────────────────────────────────────────────────────────

async fn run_ask(cli: &Cli, args: &AskArgs) -> Result<()> {
    let owner = Owner::new(args.owner.as_str()).context("Invalid --owner")?;
    let usage: Usage = args.usage.parse()?;
    let (store, index) = open_backends(&cli.store).await?;

    let mut cache_builder = CacheConfig::builder().namespace(TEXT_NAMESPACE);
    if let Some(ref dir) = cli.pdfium_lib_dir {
        cache_builder = cache_builder.pdfium_lib_dir(dir);
    }
    let cache_config = cache_builder.build().context("Invalid configuration")?;
    let normalizer = AutoNormalizer::new(PdfNormalizer::from_config(&cache_config));
    let cache = DocumentCache::new(Arc::new(normalizer), store, index, cache_config);

    let mut ask_builder = AskConfig::builder()
        .temperature(args.temperature)
        .max_tokens(args.max_tokens)
        .max_retries(args.max_retries);
    if let Some(ref model) = args.model {
        ask_builder = ask_builder.model(model);
    }
    if let Some(ref provider) = args.provider {
        ask_builder = ask_builder.provider_name(provider);
    }
    let ask_config = ask_builder.build().context("Invalid configuration")?;
    let chat = ProviderChat::from_config(&ask_config)?;

    let request = AskRequest {
        owner,
        documents: args.docs.iter().map(|t| DocumentRef::new(t.as_str())).collect(),
        text: args.text.clone(),
        usage,
        prompt: args.prompt.clone(),
        overwrite: args.overwrite,
    };

    let response = ask_documents(&cache, &chat, &ask_config, &request)
        .await
        .context("Workflow failed")?;

    if args.json {
        let json = serde_json::json!({
            "answer": response.answer,
            "descriptor": response.descriptor,
            "sources": response.sources,
            "failures": response.failures,
            "chunks": response.chunks,
            "prompt_tokens": response.prompt_tokens,
            "completion_tokens": response.completion_tokens,
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&json).context("Failed to serialise output")?
        );
    } else {
        println!("{}", response.answer);
        if !cli.quiet {
            for f in &response.failures {
                eprintln!("{} {}", cyan("⚠"), f);
            }
            eprintln!(
                "   answer stored as {}  ·  {} chunks, {} tokens in  /  {} tokens out",
                bold(response.descriptor.ticket.as_str()),
                response.chunks,
                dim(&response.prompt_tokens.to_string()),
                dim(&response.completion_tokens.to_string()),
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Accepts `budget` bytes, then fails like a closed pipe.
    struct ClosingPipe {
        budget: usize,
        written: Vec<u8>,
    }

    impl Write for ClosingPipe {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.budget == 0 {
                return Err(io::Error::from(io::ErrorKind::BrokenPipe));
            }
            let n = buf.len().min(self.budget);
            self.budget -= n;
            self.written.extend_from_slice(&buf[..n]);
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn write_text_appends_missing_newline() {
        let mut out = Vec::new();
        write_text(&mut out, "hello").unwrap();
        assert_eq!(out, b"hello\n");

        let mut out = Vec::new();
        write_text(&mut out, "hello\n").unwrap();
        assert_eq!(out, b"hello\n");
    }

    #[test]
    fn failed_trailing_newline_is_reported() {
        let mut pipe = ClosingPipe {
            budget: 5,
            written: Vec::new(),
        };
        let err = write_text(&mut pipe, "hello").unwrap_err();
        assert_eq!(pipe.written, b"hello");
        assert!(err.to_string().contains("Failed to write to stdout"));
    }
}
