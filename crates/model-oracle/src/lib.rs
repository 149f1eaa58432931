//! model-oracle: the code-generation side of nixpack
//!
//! Talks to any OpenAI-compatible chat endpoint to draft the first
//! `package.nix`, run resumable correction sessions and judge whether a
//! failing build got further than the previous one. Correction sessions
//! can read the fetched project source through two path-confined tools.

pub mod client;
pub mod config;
pub mod correction;
pub mod error;
pub mod extract;
pub mod judge;
pub mod prompts;
pub mod tools;

pub use client::{
    parse_completion, parse_reply, ChatBackend, ChatMessage, ChatReply, OpenAiChatClient, Role,
};
pub use config::ModelConfig;
pub use correction::{ModelCorrectionSession, ModelCorrectionStrategy, MAX_TOOL_ROUNDS};
pub use error::OracleError;
pub use extract::extract_nix_block;
pub use judge::{parse_verdict, ModelProgressJudge};
pub use tools::{FunctionCall, ProjectSourceTools, ToolCall, ToolDefinition};

/// Result type for model-oracle operations
pub type Result<T> = std::result::Result<T, OracleError>;
