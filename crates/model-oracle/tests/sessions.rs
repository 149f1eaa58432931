//! Correction sessions and judging against a scripted chat backend.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use model_oracle::prompts::TOOLS_EXHAUSTED;
use model_oracle::tools::{LIST_DIRECTORY, READ_FILE};
use model_oracle::{
    ChatBackend, ChatMessage, ChatReply, ModelCorrectionStrategy, ModelProgressJudge,
    OracleError, ProjectSourceTools, Role, ToolCall, ToolDefinition, MAX_TOOL_ROUNDS,
};
use nixpack_core::{
    BuildError, CorrectionContext, CorrectionRequest, CorrectionStrategy, ErrorKind, FailureStage,
    LogComparison, PackagingError, ProgressJudge, ProgressVerdict, SessionInput, SourceLocator,
    Template, TemplateId,
};
use tempfile::tempdir;

#[derive(Default)]
struct ScriptedBackend {
    replies: Mutex<VecDeque<String>>,
    transcripts: Mutex<Vec<Vec<ChatMessage>>>,
}

impl ScriptedBackend {
    fn new(replies: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.iter().map(|r| r.to_string()).collect()),
            transcripts: Mutex::new(Vec::new()),
        })
    }

    fn transcripts(&self) -> Vec<Vec<ChatMessage>> {
        self.transcripts.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatBackend for ScriptedBackend {
    async fn complete(&self, messages: &[ChatMessage]) -> model_oracle::Result<String> {
        self.transcripts.lock().unwrap().push(messages.to_vec());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| OracleError::Network("script exhausted".to_string()))
    }
}

/// A backend that understands tools; records whether each call offered them.
#[derive(Default)]
struct ToolScriptedBackend {
    replies: Mutex<VecDeque<ChatReply>>,
    transcripts: Mutex<Vec<Vec<ChatMessage>>>,
    offers: Mutex<Vec<bool>>,
}

impl ToolScriptedBackend {
    fn new(replies: Vec<ChatReply>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            ..Default::default()
        })
    }

    fn next(&self, messages: &[ChatMessage], offered: bool) -> model_oracle::Result<ChatReply> {
        self.transcripts.lock().unwrap().push(messages.to_vec());
        self.offers.lock().unwrap().push(offered);
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| OracleError::Network("script exhausted".to_string()))
    }

    fn transcripts(&self) -> Vec<Vec<ChatMessage>> {
        self.transcripts.lock().unwrap().clone()
    }

    fn offers(&self) -> Vec<bool> {
        self.offers.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatBackend for ToolScriptedBackend {
    async fn complete(&self, messages: &[ChatMessage]) -> model_oracle::Result<String> {
        Ok(self.next(messages, false)?.content)
    }

    async fn complete_with_tools(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
    ) -> model_oracle::Result<ChatReply> {
        self.next(messages, !tools.is_empty())
    }
}

/// Source that has not been fetched yet.
struct NotFetched;

impl SourceLocator for NotFetched {
    fn source_dir(&self) -> Option<PathBuf> {
        None
    }
}

fn tool_request(id: &str, tool: &str, path: &str) -> ChatReply {
    ChatReply {
        content: String::new(),
        tool_calls: vec![ToolCall::new(
            id,
            tool,
            format!(r#"{{"relative_path":"{path}"}}"#),
        )],
    }
}

fn source_tools(root: &Path) -> ProjectSourceTools {
    ProjectSourceTools::new(Arc::new(root.to_path_buf()))
}

fn nix(code: &str) -> String {
    format!("Updated:\n```nix\n{code}\n```")
}

fn context() -> CorrectionContext {
    CorrectionContext {
        project_url: "https://github.com/example/hello".to_string(),
        page_text: "hello prints a greeting".to_string(),
        release: None,
        template_notes: None,
    }
}

fn error(message: &str) -> BuildError {
    BuildError {
        kind: ErrorKind::EvalError,
        message: message.to_string(),
        stage: FailureStage::Evaluation,
    }
}

fn request() -> CorrectionRequest {
    CorrectionRequest {
        context: context(),
        candidate_text: "{ broken".to_string(),
        error: error("syntax error"),
    }
}

#[tokio::test]
async fn test_draft_fills_template() {
    let draft = nix("{ stdenv }: stdenv.mkDerivation { pname = \"hello\"; }");
    let backend = ScriptedBackend::new(&[&draft]);
    let strategy = ModelCorrectionStrategy::new(backend.clone());
    let template = Template {
        id: TemplateId::new("generic"),
        text: "{ stdenv }: stdenv.mkDerivation { pname = ...; }".to_string(),
        notes: None,
    };

    let text = strategy.draft(&context(), &template).await.unwrap();

    assert!(text.contains("pname = \"hello\""));
    let transcripts = backend.transcripts();
    assert_eq!(transcripts.len(), 1);
    assert_eq!(transcripts[0][0].role, Role::System);
    assert!(transcripts[0][1].content.contains("hello prints a greeting"));
}

#[tokio::test]
async fn test_session_keeps_history_across_inputs() {
    let backend = ScriptedBackend::new(&[&nix("v1"), &nix("v2")]);
    let strategy = ModelCorrectionStrategy::new(backend.clone());
    let mut session = strategy.open(request());

    assert_eq!(session.advance(SessionInput::Start).await.unwrap(), "v1\n");
    let patched = session
        .advance(SessionInput::Patch("v1 patched\n".to_string()))
        .await
        .unwrap();
    assert_eq!(patched, "v1 patched\n");
    assert_eq!(
        session
            .advance(SessionInput::Retry(error("still broken")))
            .await
            .unwrap(),
        "v2\n"
    );

    let transcripts = backend.transcripts();
    assert_eq!(transcripts.len(), 2, "patch must not call the model");
    let second = &transcripts[1];
    // system, user(context + fix), assistant(v1), user(patch + retry)
    assert_eq!(second.len(), 4);
    assert!(second[1].content.contains("https://github.com/example/hello"));
    assert!(second[1].content.contains("{ broken"));
    assert_eq!(second[2].role, Role::Assistant);
    assert!(second[3].content.contains("v1 patched"));
    assert!(second[3].content.contains("still broken"));
}

#[tokio::test]
async fn test_patch_as_first_input_seeds_context() {
    let backend = ScriptedBackend::new(&[&nix("v2")]);
    let strategy = ModelCorrectionStrategy::new(backend.clone());
    let mut session = strategy.open(request());

    session
        .advance(SessionInput::Patch("fixed hash\n".to_string()))
        .await
        .unwrap();
    session
        .advance(SessionInput::Retry(error("next failure")))
        .await
        .unwrap();

    let transcript = &backend.transcripts()[0];
    assert_eq!(transcript.len(), 2);
    assert!(transcript[1].content.starts_with("Project: https://github.com/example/hello"));
    assert!(transcript[1].content.contains("fixed hash"));
}

#[tokio::test]
async fn test_reply_without_block_gets_one_reminder() {
    let backend = ScriptedBackend::new(&["Sure, let me think.", &nix("v1")]);
    let strategy = ModelCorrectionStrategy::new(backend.clone());
    let mut session = strategy.open(request());

    assert_eq!(session.advance(SessionInput::Start).await.unwrap(), "v1\n");
    assert_eq!(backend.transcripts().len(), 2);
}

#[tokio::test]
async fn test_two_bad_replies_fail_the_session() {
    let backend = ScriptedBackend::new(&["no code", "still no code"]);
    let strategy = ModelCorrectionStrategy::new(backend);
    let mut session = strategy.open(request());

    let err = session.advance(SessionInput::Start).await.unwrap_err();
    assert!(matches!(err, PackagingError::Oracle(ref m) if m.contains("found 0")));
}

#[tokio::test]
async fn test_model_judge() {
    let comparison = LogComparison::prepare("a\nfail", "a\nb\nfail later", 1000);

    let backend = ScriptedBackend::new(&["PROGRESS", "I am not sure"]);
    let judge = ModelProgressJudge::new(backend.clone());
    assert_eq!(judge.judge(&comparison).await.unwrap(), ProgressVerdict::Progress);
    assert_eq!(judge.judge(&comparison).await.unwrap(), ProgressVerdict::Regress);

    let prompt = &backend.transcripts()[0][1].content;
    assert!(prompt.contains("differ at line 2"));
}

#[tokio::test]
async fn test_session_reads_source_before_answering() {
    let dir = tempdir().unwrap();
    std::fs::write(dir.path().join("Cargo.toml"), "[package]\nname = \"hello\"\n").unwrap();
    let backend = ToolScriptedBackend::new(vec![
        tool_request("call_1", READ_FILE, "Cargo.toml"),
        ChatReply::text(nix("v1")),
    ]);
    let strategy =
        ModelCorrectionStrategy::new(backend.clone()).with_source_tools(source_tools(dir.path()));
    let mut session = strategy.open(request());

    assert_eq!(session.advance(SessionInput::Start).await.unwrap(), "v1\n");

    assert_eq!(backend.offers(), vec![true, true]);
    let second = &backend.transcripts()[1];
    // system, user, assistant(tool call), tool(result)
    assert_eq!(second.len(), 4);
    assert_eq!(second[2].role, Role::Assistant);
    assert_eq!(second[2].tool_calls[0].id, "call_1");
    assert_eq!(second[3].role, Role::Tool);
    assert_eq!(second[3].tool_call_id.as_deref(), Some("call_1"));
    assert!(second[3].content.contains("name = \"hello\""));
}

#[tokio::test]
async fn test_read_outside_source_is_refused_and_session_continues() {
    let outer = tempdir().unwrap();
    std::fs::write(outer.path().join("secret.txt"), "hunter2").unwrap();
    let root = outer.path().join("source");
    std::fs::create_dir(&root).unwrap();
    let backend = ToolScriptedBackend::new(vec![
        tool_request("call_1", READ_FILE, "../secret.txt"),
        ChatReply::text(nix("v1")),
    ]);
    let strategy =
        ModelCorrectionStrategy::new(backend.clone()).with_source_tools(source_tools(&root));
    let mut session = strategy.open(request());

    assert_eq!(session.advance(SessionInput::Start).await.unwrap(), "v1\n");

    let result = &backend.transcripts()[1][3];
    assert_eq!(result.role, Role::Tool);
    assert!(result.content.contains("outside the project source root"));
    assert!(!result.content.contains("hunter2"));
}

#[tokio::test]
async fn test_tool_rounds_are_capped() {
    let dir = tempdir().unwrap();
    let mut replies: Vec<_> = (0..MAX_TOOL_ROUNDS)
        .map(|i| tool_request(&format!("call_{i}"), LIST_DIRECTORY, "."))
        .collect();
    replies.push(ChatReply::text(nix("v1")));
    let backend = ToolScriptedBackend::new(replies);
    let strategy =
        ModelCorrectionStrategy::new(backend.clone()).with_source_tools(source_tools(dir.path()));
    let mut session = strategy.open(request());

    assert_eq!(session.advance(SessionInput::Start).await.unwrap(), "v1\n");

    let mut expected = vec![true; MAX_TOOL_ROUNDS];
    expected.push(false);
    assert_eq!(backend.offers(), expected);
    let last = backend.transcripts().pop().unwrap();
    assert_eq!(last.iter().filter(|m| m.role == Role::Tool).count(), MAX_TOOL_ROUNDS);
    assert_eq!(last.last().unwrap().content, TOOLS_EXHAUSTED);
}

#[tokio::test]
async fn test_no_tools_before_source_is_fetched() {
    let backend = ToolScriptedBackend::new(vec![ChatReply::text(nix("v1"))]);
    let strategy = ModelCorrectionStrategy::new(backend.clone())
        .with_source_tools(ProjectSourceTools::new(Arc::new(NotFetched)));
    let mut session = strategy.open(request());

    assert_eq!(session.advance(SessionInput::Start).await.unwrap(), "v1\n");
    assert_eq!(backend.offers(), vec![false]);
}

#[tokio::test]
async fn test_plain_backend_ignores_offered_tools() {
    let dir = tempdir().unwrap();
    let backend = ScriptedBackend::new(&[&nix("v1")]);
    let strategy =
        ModelCorrectionStrategy::new(backend.clone()).with_source_tools(source_tools(dir.path()));
    let mut session = strategy.open(request());

    assert_eq!(session.advance(SessionInput::Start).await.unwrap(), "v1\n");
    assert_eq!(backend.transcripts().len(), 1);
}
