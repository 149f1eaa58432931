//! Model-backed progress judge.

use std::sync::Arc;

use async_trait::async_trait;
use nixpack_core::{LogComparison, ProgressJudge, ProgressVerdict};
use tracing::{info, warn};

use crate::client::{ChatBackend, ChatMessage};
use crate::prompts;

const JUDGE_SYSTEM_PROMPT: &str =
    "You are a software packaging expert comparing failed Nix build logs.";

/// `PROGRESS` (case and punctuation aside) is progress; anything else regresses.
pub fn parse_verdict(reply: &str) -> ProgressVerdict {
    let word: String = reply
        .trim()
        .trim_matches(|c: char| !c.is_ascii_alphabetic())
        .to_ascii_uppercase();
    if word == "PROGRESS" {
        ProgressVerdict::Progress
    } else {
        if word != "REGRESS" {
            warn!(reply = %reply.trim(), "unrecognised verdict, treating as REGRESS");
        }
        ProgressVerdict::Regress
    }
}

pub struct ModelProgressJudge {
    backend: Arc<dyn ChatBackend>,
}

impl ModelProgressJudge {
    pub fn new(backend: Arc<dyn ChatBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl ProgressJudge for ModelProgressJudge {
    async fn judge(&self, comparison: &LogComparison) -> nixpack_core::Result<ProgressVerdict> {
        let messages = [
            ChatMessage::system(JUDGE_SYSTEM_PROMPT),
            ChatMessage::user(prompts::judge_prompt(comparison)),
        ];
        let reply = self.backend.complete(&messages).await?;
        let verdict = parse_verdict(&reply);
        info!(verdict = %verdict, "model judged progress");
        Ok(verdict)
    }
}
