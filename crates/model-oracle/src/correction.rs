//! Model-backed correction strategy.
//!
//! A session keeps the whole chat transcript. Inputs are appended as user
//! turns (consecutive user turns are merged) and every model reply must
//! carry exactly one ```nix block; a reply without one gets a single
//! reminder before the session gives up.
//!
//! When project-source tools are configured and the source has been
//! fetched, the model may list and read source files before answering. At
//! most [`MAX_TOOL_ROUNDS`] rounds of calls are served; after that the
//! model is asked to answer without tools.

use std::sync::Arc;

use async_trait::async_trait;
use nixpack_core::{
    CorrectionContext, CorrectionRequest, CorrectionSession, CorrectionStrategy, SessionInput,
    Template,
};
use tracing::{debug, info, warn};

use crate::client::{ChatBackend, ChatMessage, Role};
use crate::error::OracleError;
use crate::extract::extract_nix_block;
use crate::prompts;
use crate::tools::ProjectSourceTools;
use crate::Result;

pub const MAX_TOOL_ROUNDS: usize = 5;

/// One text reply. With tools available, serve the model's tool calls
/// first; their requests and results stay in the transcript.
async fn next_reply(
    backend: &dyn ChatBackend,
    history: &mut Vec<ChatMessage>,
    tools: Option<&ProjectSourceTools>,
) -> Result<String> {
    let Some((tools, root)) = tools.and_then(|t| t.root().map(|root| (t, root))) else {
        return backend.complete(history).await;
    };
    let definitions = ProjectSourceTools::definitions();

    for round in 1..=MAX_TOOL_ROUNDS {
        let reply = backend.complete_with_tools(history, &definitions).await?;
        if reply.tool_calls.is_empty() {
            return Ok(reply.content);
        }
        info!(round, calls = reply.tool_calls.len(), "model is reading the project source");
        let calls = reply.tool_calls.clone();
        history.push(ChatMessage::assistant_tool_calls(reply.content, reply.tool_calls));
        for call in &calls {
            let output = tools.execute(&root, call).await;
            history.push(ChatMessage::tool(&call.id, output));
        }
    }

    warn!(rounds = MAX_TOOL_ROUNDS, "tool budget spent, asking for an answer");
    history.push(ChatMessage::user(prompts::TOOLS_EXHAUSTED));
    backend.complete(history).await
}

/// Send the transcript and extract the code, reminding the model once if
/// the reply has no usable code block.
async fn ask_for_code(
    backend: &dyn ChatBackend,
    history: &mut Vec<ChatMessage>,
    tools: Option<&ProjectSourceTools>,
) -> Result<String> {
    let mut reminded = false;
    loop {
        let reply = next_reply(backend, history, tools).await?;
        history.push(ChatMessage::assistant(reply.clone()));
        match extract_nix_block(&reply) {
            Ok(code) => return Ok(code),
            Err(OracleError::CodeBlock { found }) if !reminded => {
                warn!(found, "reply had no single nix block, asking again");
                history.push(ChatMessage::user(prompts::FORMAT_REMINDER));
                reminded = true;
            }
            Err(e) => return Err(e),
        }
    }
}

#[derive(Clone)]
pub struct ModelCorrectionStrategy {
    backend: Arc<dyn ChatBackend>,
    tools: Option<ProjectSourceTools>,
}

impl ModelCorrectionStrategy {
    pub fn new(backend: Arc<dyn ChatBackend>) -> Self {
        Self {
            backend,
            tools: None,
        }
    }

    /// Let correction sessions browse the project source.
    pub fn with_source_tools(mut self, tools: ProjectSourceTools) -> Self {
        self.tools = Some(tools);
        self
    }
}

#[async_trait]
impl CorrectionStrategy for ModelCorrectionStrategy {
    async fn draft(
        &self,
        context: &CorrectionContext,
        template: &Template,
    ) -> nixpack_core::Result<String> {
        debug!(template = %template.id, "drafting initial candidate");
        let mut history = vec![
            ChatMessage::system(prompts::SYSTEM_PROMPT),
            ChatMessage::user(prompts::draft_prompt(context, template)),
        ];
        Ok(ask_for_code(self.backend.as_ref(), &mut history, None).await?)
    }

    fn open(&self, request: CorrectionRequest) -> Box<dyn CorrectionSession> {
        let mut session = ModelCorrectionSession::new(Arc::clone(&self.backend), request);
        session.tools = self.tools.clone();
        Box::new(session)
    }
}

pub struct ModelCorrectionSession {
    backend: Arc<dyn ChatBackend>,
    request: CorrectionRequest,
    history: Vec<ChatMessage>,
    tools: Option<ProjectSourceTools>,
}

impl ModelCorrectionSession {
    pub fn new(backend: Arc<dyn ChatBackend>, request: CorrectionRequest) -> Self {
        Self {
            backend,
            request,
            history: vec![ChatMessage::system(prompts::SYSTEM_PROMPT)],
            tools: None,
        }
    }

    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    fn push_user(&mut self, text: String) {
        // The first user turn carries the project context.
        let text = if self.history.len() == 1 {
            format!("{}\n\n{text}", prompts::context_prompt(&self.request.context))
        } else {
            text
        };
        match self.history.last_mut() {
            Some(last) if last.role == Role::User => {
                last.content.push_str("\n\n");
                last.content.push_str(&text);
            }
            _ => self.history.push(ChatMessage::user(text)),
        }
    }

    fn started(&self) -> bool {
        self.history.len() > 1
    }
}

#[async_trait]
impl CorrectionSession for ModelCorrectionSession {
    async fn advance(&mut self, input: SessionInput) -> nixpack_core::Result<String> {
        match input {
            SessionInput::Start => {
                let prompt = prompts::fix_prompt(&self.request.candidate_text, &self.request.error);
                self.push_user(prompt);
            }
            SessionInput::Retry(error) => {
                let prompt = if self.started() {
                    prompts::retry_prompt(&error)
                } else {
                    prompts::fix_prompt(&self.request.candidate_text, &error)
                };
                self.push_user(prompt);
            }
            SessionInput::Patch(text) => {
                self.push_user(prompts::patch_prompt(&text));
                return Ok(text);
            }
        }
        Ok(ask_for_code(self.backend.as_ref(), &mut self.history, self.tools.as_ref()).await?)
    }
}
