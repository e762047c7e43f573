//! Integration tests for `ask_documents` with a scripted chat backend.

use async_trait::async_trait;
use edgequake_pdf2doc::{
    ask_documents, prompts, ArtifactPayload, AskConfig, AskRequest, CacheConfig, ChatBackend,
    ChatReply, DocumentCache, DocumentRef, MemoryArtifactStore, MemoryIndex, Owner,
    Pdf2DocError, PlainTextNormalizer, Usage, TEXT_NAMESPACE,
};
use std::sync::{Arc, Mutex};

// ── Test helpers ─────────────────────────────────────────────────────────────

type Script = fn(&str, &str) -> Result<String, Pdf2DocError>;

/// Records every call and answers with `script(instruction, message)`.
struct ScriptedChat {
    calls: Mutex<Vec<(String, String)>>,
    script: Script,
}

impl ScriptedChat {
    fn new(script: Script) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            script,
        }
    }

    fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatBackend for ScriptedChat {
    async fn complete(&self, instruction: &str, message: &str) -> Result<ChatReply, Pdf2DocError> {
        self.calls
            .lock()
            .unwrap()
            .push((instruction.to_string(), message.to_string()));
        let content = (self.script)(instruction, message)?;
        Ok(ChatReply {
            content,
            prompt_tokens: 10,
            completion_tokens: 2,
        })
    }
}

fn echo_excerpt(_instruction: &str, message: &str) -> Result<String, Pdf2DocError> {
    if message.starts_with("The question") {
        Ok("combined answer".to_string())
    } else {
        Ok(format!("answer for {} chars", message.len()))
    }
}

fn text_cache() -> DocumentCache {
    DocumentCache::new(
        Arc::new(PlainTextNormalizer),
        Arc::new(MemoryArtifactStore::new()),
        Arc::new(MemoryIndex::new()),
        CacheConfig::builder().namespace(TEXT_NAMESPACE).build().unwrap(),
    )
}

async fn upload(cache: &DocumentCache, text: &str) -> DocumentRef {
    let d = cache
        .store()
        .write(ArtifactPayload::text(text))
        .await
        .unwrap();
    DocumentRef::new(d.ticket.as_str())
}

fn request(usage: Usage, prompt: &str) -> AskRequest {
    AskRequest {
        owner: Owner::new("alice").unwrap(),
        documents: Vec::new(),
        text: None,
        usage,
        prompt: Some(prompt.to_string()),
        overwrite: false,
    }
}

// ── Query ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn single_chunk_query_makes_one_call() {
    let cache = text_cache();
    let chat = ScriptedChat::new(|_, _| Ok("Vaswani et al.".to_string()));
    let mut req = request(Usage::QueryDocuments, "Who wrote it?");
    req.documents = vec![upload(&cache, "Attention Is All You Need. Vaswani et al.").await];

    let resp = ask_documents(&cache, &chat, &AskConfig::default(), &req)
        .await
        .unwrap();

    let calls = chat.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, prompts::query_instruction());
    assert!(calls[0].1.contains("Who wrote it?"));
    assert!(calls[0].1.contains("Attention Is All You Need."));

    assert_eq!(resp.answer, "Vaswani et al.");
    assert_eq!(resp.chunks, 1);
    assert_eq!(resp.sources.len(), 1);
    assert!(resp.failures.is_empty());
    assert_eq!(resp.prompt_tokens, 10);
    assert_eq!(resp.completion_tokens, 2);
}

#[tokio::test]
async fn multi_chunk_query_merges_partial_answers() {
    let cache = text_cache();
    let chat = ScriptedChat::new(echo_excerpt);
    let config = AskConfig::builder().model("gpt-3.5-turbo").build().unwrap();
    let mut req = request(Usage::QueryDocuments, "What is repeated?");
    req.text = Some("lorem ".repeat(1500));

    let resp = ask_documents(&cache, &chat, &config, &req).await.unwrap();

    let calls = chat.calls();
    assert_eq!(resp.chunks, 3);
    assert_eq!(calls.len(), 4);
    let (instruction, message) = calls.last().unwrap();
    assert_eq!(instruction, prompts::DEFAULT_INSTRUCTION);
    assert!(message.contains("Partial answer 3:"));
    assert_eq!(resp.answer, "combined answer");
    assert_eq!(resp.prompt_tokens, 40);
}

#[tokio::test]
async fn answer_is_stored_as_a_text_artifact() {
    let cache = text_cache();
    let chat = ScriptedChat::new(|_, _| Ok("forty-two".to_string()));
    let mut req = request(Usage::QueryDocuments, "The answer?");
    req.text = Some("The answer is forty-two.".to_string());

    let resp = ask_documents(&cache, &chat, &AskConfig::default(), &req)
        .await
        .unwrap();

    assert_eq!(resp.descriptor.file_name.as_deref(), Some("answer.txt"));
    assert_eq!(cache.read_text(&resp.descriptor).await.unwrap(), "forty-two");
}

// ── Run prompt ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn prompt_runs_on_each_document_and_answers_are_joined() {
    let cache = text_cache();
    let chat = ScriptedChat::new(|_, message| Ok(format!("summary of {message}")));
    let mut req = request(Usage::RunPromptOnDocuments, "Summarise.");
    req.documents = vec![
        upload(&cache, "first  document").await,
        upload(&cache, "second document").await,
    ];

    let resp = ask_documents(&cache, &chat, &AskConfig::default(), &req)
        .await
        .unwrap();

    let calls = chat.calls();
    assert_eq!(calls.len(), 2);
    assert!(calls.iter().all(|(i, _)| *i == prompts::prompt_instruction("Summarise.")));
    assert_eq!(
        resp.answer,
        "summary of first document\n\nsummary of second document"
    );
}

// ── Run functions ────────────────────────────────────────────────────────────

#[tokio::test]
async fn functions_are_offered_and_calls_joined_by_line() {
    let cache = text_cache();
    let chat = ScriptedChat::new(|_, _| {
        Ok(r#"{"name": "save_contact", "arguments": {"email": "a@b.c"}}"#.to_string())
    });
    let mut req = request(
        Usage::RunFunctionsOnDocuments,
        r#"{"name": "save_contact", "parameters": {"type": "object"}}"#,
    );
    req.documents = vec![
        upload(&cache, "Contact: a@b.c").await,
        upload(&cache, "Email a@b.c for details").await,
    ];

    let resp = ask_documents(&cache, &chat, &AskConfig::default(), &req)
        .await
        .unwrap();

    let calls = chat.calls();
    assert!(calls[0].0.starts_with(prompts::FUNCTIONS_INSTRUCTION));
    assert!(calls[0].0.contains("save_contact"));
    assert_eq!(resp.answer.lines().count(), 2);
    for line in resp.answer.lines() {
        let v: serde_json::Value = serde_json::from_str(line).unwrap();
        assert_eq!(v["name"], "save_contact");
    }
}

#[tokio::test]
async fn empty_function_list_is_rejected_before_any_call() {
    let cache = text_cache();
    let chat = ScriptedChat::new(echo_excerpt);
    let mut req = request(Usage::RunFunctionsOnDocuments, "[]");
    req.text = Some("some text".to_string());

    let err = ask_documents(&cache, &chat, &AskConfig::default(), &req)
        .await
        .unwrap_err();

    assert!(matches!(err, Pdf2DocError::NoFunctions), "got: {err:?}");
    assert!(chat.calls().is_empty());
}

// ── Fatal errors ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn no_documents_and_no_text_is_no_input() {
    let cache = text_cache();
    let chat = ScriptedChat::new(echo_excerpt);

    let req = request(Usage::QueryDocuments, "anything?");
    let err = ask_documents(&cache, &chat, &AskConfig::default(), &req)
        .await
        .unwrap_err();
    assert!(matches!(err, Pdf2DocError::NoInput), "got: {err:?}");

    let mut blank = request(Usage::QueryDocuments, "anything?");
    blank.text = Some("   \n".to_string());
    let err = ask_documents(&cache, &chat, &AskConfig::default(), &blank)
        .await
        .unwrap_err();
    assert!(matches!(err, Pdf2DocError::NoInput), "got: {err:?}");
}

#[tokio::test]
async fn query_without_prompt_is_rejected() {
    let cache = text_cache();
    let chat = ScriptedChat::new(echo_excerpt);
    let mut req = request(Usage::QueryDocuments, "  ");
    req.text = Some("text".to_string());

    let err = ask_documents(&cache, &chat, &AskConfig::default(), &req)
        .await
        .unwrap_err();

    assert!(
        matches!(err, Pdf2DocError::MissingPrompt { what: "query" }),
        "got: {err:?}"
    );
}

#[tokio::test]
async fn unresolvable_inputs_alone_fail_the_run() {
    let cache = text_cache();
    let chat = ScriptedChat::new(echo_excerpt);
    let mut req = request(Usage::QueryDocuments, "q");
    req.documents = vec![DocumentRef::new("missing")];

    let err = ask_documents(&cache, &chat, &AskConfig::default(), &req)
        .await
        .unwrap_err();

    assert!(
        matches!(err, Pdf2DocError::AllDocumentsFailed { total: 1, .. }),
        "got: {err:?}"
    );
    assert!(chat.calls().is_empty());
}

#[tokio::test]
async fn model_failure_aborts_the_run() {
    let cache = text_cache();
    let chat = ScriptedChat::new(|_, _| {
        Err(Pdf2DocError::LlmApiError {
            retries: 3,
            message: "HTTP 503".to_string(),
        })
    });
    let mut req = request(Usage::QueryDocuments, "q");
    req.text = Some("text".to_string());

    let err = ask_documents(&cache, &chat, &AskConfig::default(), &req)
        .await
        .unwrap_err();

    assert!(matches!(err, Pdf2DocError::LlmApiError { .. }), "got: {err:?}");
}

// ── Partial failures and reuse ───────────────────────────────────────────────

#[tokio::test]
async fn failed_inputs_are_reported_and_skipped() {
    let cache = text_cache();
    let chat = ScriptedChat::new(|_, _| Ok("ok".to_string()));
    let mut req = request(Usage::QueryDocuments, "q");
    req.documents = vec![DocumentRef::new("missing"), upload(&cache, "present").await];
    req.text = Some("inline words".to_string());

    let resp = ask_documents(&cache, &chat, &AskConfig::default(), &req)
        .await
        .unwrap();

    assert_eq!(resp.sources.len(), 2);
    assert_eq!(resp.failures.len(), 1);
    assert_eq!(resp.failures[0].index, 0);
    assert_eq!(resp.failures[0].ticket, "missing");
}

#[tokio::test]
async fn repeated_runs_reuse_the_cached_text() {
    let cache = text_cache();
    let chat = ScriptedChat::new(|_, _| Ok("ok".to_string()));
    let mut req = request(Usage::RunPromptOnDocuments, "Translate.");
    req.text = Some("Bonjour tout le monde".to_string());

    let first = ask_documents(&cache, &chat, &AskConfig::default(), &req)
        .await
        .unwrap();
    let second = ask_documents(&cache, &chat, &AskConfig::default(), &req)
        .await
        .unwrap();

    assert_eq!(first.sources[0].ticket, second.sources[0].ticket);
    let stats = cache.stats();
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.hits, 1);
}

#[test]
fn request_deserialises_with_defaults() {
    let req: AskRequest =
        serde_json::from_str(r#"{"owner": "alice", "text": "hi", "prompt": "q"}"#).unwrap();
    assert_eq!(req.usage, Usage::QueryDocuments);
    assert!(req.documents.is_empty());
    assert!(!req.overwrite);

    let req: AskRequest = serde_json::from_str(
        r#"{"owner": "alice", "usage": "run_functions_on_documents", "documents": [{"ticket": "t"}]}"#,
    )
    .unwrap();
    assert_eq!(req.usage, Usage::RunFunctionsOnDocuments);
}
