//! Ask questions of documents, or run prompts and functions over them.
//!
//! Every input goes through the [`DocumentCache`] first, so asking ten
//! questions about the same report extracts and stores its text once.
//! Texts are then split into model-sized chunks and each chunk is sent to
//! the [`ChatBackend`]:
//!
//! | Usage | Per chunk | Afterwards |
//! |---|---|---|
//! | `query_documents` | answer the query from the excerpt | merge partial answers (one extra call when >1 chunk) |
//! | `run_prompt_on_documents` | run the prompt on the excerpt | join answers |
//! | `run_functions_on_documents` | reply with one JSON function call | join calls, one per line |
//!
//! The final answer is written to the artifact store like any other text.

use crate::cache::DocumentCache;
use crate::config::AskConfig;
use crate::error::{DocumentFailure, Pdf2DocError};
use crate::model::{ArtifactDescriptor, ArtifactPayload, DocumentRef, Owner, RawDocument, ResolveRequest, Ticket};
use crate::pipeline::chunk::{chunk_chars_for, chunk_text};
use crate::pipeline::input::{fetch_document, is_url};
use crate::pipeline::llm::{ChatBackend, ChatReply};
use crate::prompts;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use tracing::{info, warn};

/// Tokens kept free for instructions and the prompt, on top of the reply.
const PROMPT_RESERVE_TOKENS: usize = 1024;

/// Ticket of the literal text passed in [`AskRequest::text`].
pub const INLINE_TEXT_TICKET: &str = "inline:text";

/// What to do with the documents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Usage {
    #[default]
    QueryDocuments,
    RunPromptOnDocuments,
    RunFunctionsOnDocuments,
}

impl Usage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Usage::QueryDocuments => "query_documents",
            Usage::RunPromptOnDocuments => "run_prompt_on_documents",
            Usage::RunFunctionsOnDocuments => "run_functions_on_documents",
        }
    }
}

impl fmt::Display for Usage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Usage {
    type Err = Pdf2DocError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "query_documents" => Ok(Usage::QueryDocuments),
            "run_prompt_on_documents" => Ok(Usage::RunPromptOnDocuments),
            "run_functions_on_documents" => Ok(Usage::RunFunctionsOnDocuments),
            other => Err(Pdf2DocError::UnknownUsage {
                usage: other.to_string(),
            }),
        }
    }
}

/// One workflow run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AskRequest {
    pub owner: Owner,
    /// Text artifacts already in the store.
    #[serde(default)]
    pub documents: Vec<DocumentRef>,
    /// Literal text, or whitespace-separated HTTP(S) URLs to download.
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub usage: Usage,
    /// Query, prompt, or JSON function definitions depending on `usage`.
    #[serde(default)]
    pub prompt: Option<String>,
    /// Re-ingest every input instead of reusing cached texts.
    #[serde(default)]
    pub overwrite: bool,
}

/// Result of a workflow run.
#[derive(Debug, Clone)]
pub struct AskResponse {
    pub answer: String,
    /// Where the answer was stored.
    pub descriptor: ArtifactDescriptor,
    /// Cached texts the answer was derived from, in input order.
    pub sources: Vec<ArtifactDescriptor>,
    /// Inputs that could not be resolved; the answer ignores them.
    pub failures: Vec<DocumentFailure>,
    pub chunks: usize,
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
}

/// The validated per-usage instruction.
#[derive(Debug, Clone, PartialEq)]
enum Task {
    Query(String),
    Prompt(String),
    Functions(Vec<Value>),
}

fn plan(usage: Usage, prompt: Option<&str>) -> Result<Task, Pdf2DocError> {
    let prompt = prompt.map(str::trim).filter(|p| !p.is_empty());
    match usage {
        Usage::QueryDocuments => prompt
            .map(|p| Task::Query(p.to_string()))
            .ok_or(Pdf2DocError::MissingPrompt { what: "query" }),
        Usage::RunPromptOnDocuments => prompt
            .map(|p| Task::Prompt(p.to_string()))
            .ok_or(Pdf2DocError::MissingPrompt { what: "prompt" }),
        Usage::RunFunctionsOnDocuments => parse_functions(prompt.unwrap_or("")).map(Task::Functions),
    }
}

/// Parse function definitions: a JSON array, or a single object.
fn parse_functions(prompt: &str) -> Result<Vec<Value>, Pdf2DocError> {
    let value: Value = serde_json::from_str(prompt).map_err(|e| Pdf2DocError::InvalidFunctions {
        detail: format!("{e} in {prompt:?}"),
    })?;
    match value {
        Value::Array(items) if items.is_empty() => Err(Pdf2DocError::NoFunctions),
        Value::Array(items) => Ok(items),
        obj @ Value::Object(_) => Ok(vec![obj]),
        Value::Null => Err(Pdf2DocError::NoFunctions),
        other => Err(Pdf2DocError::InvalidFunctions {
            detail: format!("expected an object or an array, got {other}"),
        }),
    }
}

fn task_instruction(task: &Task) -> Result<String, Pdf2DocError> {
    Ok(match task {
        Task::Query(_) => prompts::query_instruction(),
        Task::Prompt(p) => prompts::prompt_instruction(p),
        Task::Functions(functions) => {
            let schema = serde_json::to_string_pretty(functions)
                .map_err(|e| Pdf2DocError::Internal(format!("functions: {e}")))?;
            prompts::functions_instruction(&schema)
        }
    })
}

fn chunk_message(task: &Task, chunk: &str) -> String {
    match task {
        Task::Query(q) => prompts::query_message(q, chunk),
        Task::Prompt(_) | Task::Functions(_) => chunk.to_string(),
    }
}

/// Turn the free-form text field into raw documents.
async fn inline_documents(text: &str, timeout_secs: u64) -> Result<Vec<RawDocument>, Pdf2DocError> {
    let tokens: Vec<&str> = text.split_whitespace().collect();
    if tokens.is_empty() {
        return Ok(Vec::new());
    }
    if tokens.iter().all(|t| is_url(t)) {
        let mut docs = Vec::with_capacity(tokens.len());
        for url in tokens {
            docs.push(fetch_document(url, timeout_secs).await?);
        }
        return Ok(docs);
    }
    Ok(vec![RawDocument::new(
        Ticket::new(INLINE_TEXT_TICKET),
        text.as_bytes().to_vec(),
    )])
}

/// Tokens of the context window not available to document text.
fn reserved_tokens(config: &AskConfig) -> usize {
    config.max_tokens.saturating_add(PROMPT_RESERVE_TOKENS)
}

/// Run the workflow described by `request`.
///
/// Fatal errors (bad usage or prompt, no input, every input failing, model
/// failures after retries) abort the run. Individual inputs that fail to
/// resolve are reported in [`AskResponse::failures`] and skipped.
pub async fn ask_documents(
    cache: &DocumentCache,
    chat: &dyn ChatBackend,
    config: &AskConfig,
    request: &AskRequest,
) -> Result<AskResponse, Pdf2DocError> {
    let task = plan(request.usage, request.prompt.as_deref())?;

    let inline = match request.text.as_deref() {
        Some(text) => inline_documents(text, cache.config().download_timeout_secs).await?,
        None => Vec::new(),
    };
    if request.documents.is_empty() && inline.is_empty() {
        return Err(Pdf2DocError::NoInput);
    }

    info!(
        "{} on {} stored + {} inline documents",
        request.usage,
        request.documents.len(),
        inline.len()
    );

    // ── Resolve every input through the cache ───────────────────────────
    let mut results = Vec::new();
    if !request.documents.is_empty() {
        let stored = cache
            .resolve_request(&ResolveRequest {
                owner: request.owner.clone(),
                documents: request.documents.clone(),
                overwrite: request.overwrite,
            })
            .await;
        results.extend(stored.results);
    }
    if !inline.is_empty() {
        let offset = results.len();
        let fresh = cache
            .resolve_all(&request.owner, inline, request.overwrite)
            .await;
        results.extend(fresh.results.into_iter().map(|r| {
            r.map_err(|mut f| {
                f.index += offset;
                f
            })
        }));
    }

    let total = results.len();
    let mut sources = Vec::new();
    let mut failures = Vec::new();
    for r in results {
        match r {
            Ok(res) => sources.push(res.descriptor),
            Err(f) => failures.push(f),
        }
    }
    if sources.is_empty() {
        return Err(Pdf2DocError::AllDocumentsFailed {
            total,
            first_error: failures
                .first()
                .map(|f| f.to_string())
                .unwrap_or_default(),
        });
    }
    for f in &failures {
        warn!("Skipping input: {}", f);
    }

    // ── Chunk ───────────────────────────────────────────────────────────
    let max_chars = chunk_chars_for(&config.model, reserved_tokens(config));
    let mut chunks = Vec::new();
    for d in &sources {
        let text = cache.read_text(d).await?;
        chunks.extend(chunk_text(&text, max_chars));
    }
    info!("{} chunks of at most {} chars", chunks.len(), max_chars);

    // ── Run the task ────────────────────────────────────────────────────
    let instruction = task_instruction(&task)?;
    let replies: Vec<ChatReply> = stream::iter(chunks.iter())
        .map(|chunk| {
            let message = chunk_message(&task, chunk);
            let instruction = instruction.as_str();
            async move { chat.complete(instruction, &message).await }
        })
        .buffered(config.concurrency)
        .collect::<Vec<_>>()
        .await
        .into_iter()
        .collect::<Result<_, _>>()?;

    let mut prompt_tokens: usize = replies.iter().map(|r| r.prompt_tokens).sum();
    let mut completion_tokens: usize = replies.iter().map(|r| r.completion_tokens).sum();
    let answers: Vec<String> = replies.into_iter().map(|r| r.content).collect();

    let answer = match &task {
        Task::Query(q) if answers.len() > 1 => {
            let merged = chat
                .complete(prompts::DEFAULT_INSTRUCTION, &prompts::combine_message(q, &answers))
                .await?;
            prompt_tokens += merged.prompt_tokens;
            completion_tokens += merged.completion_tokens;
            merged.content
        }
        Task::Functions(_) => answers.join("\n"),
        _ => answers.join(prompts::ANSWER_SEPARATOR),
    };

    // ── Store the answer ────────────────────────────────────────────────
    let descriptor = cache
        .store()
        .write(ArtifactPayload::text(answer.clone()).with_file_name("answer.txt"))
        .await?;
    info!(
        "Answer stored as {} ({} input / {} output tokens)",
        descriptor.ticket, prompt_tokens, completion_tokens
    );

    Ok(AskResponse {
        answer,
        descriptor,
        sources,
        failures,
        chunks: chunks.len(),
        prompt_tokens,
        completion_tokens,
    })
}
