//! OpenAI-compatible chat completions over reqwest.
//!
//! Plain completions return text. When tools are offered the reply may
//! instead carry `tool_calls`, answered with `tool` role messages.

use std::time::Instant;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::config::ModelConfig;
use crate::error::OracleError;
use crate::tools::{ToolCall, ToolDefinition};
use crate::Result;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    /// Set on `tool` messages: the call this result answers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// An assistant turn that asked for tool calls.
    pub fn assistant_tool_calls(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            tool_calls,
            ..Self::new(Role::Assistant, content)
        }
    }

    /// The result of one tool call.
    pub fn tool(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: Some(tool_call_id.into()),
            ..Self::new(Role::Tool, content)
        }
    }
}

/// One model turn: text, tool calls, or both.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChatReply {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
}

impl ChatReply {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            tool_calls: Vec::new(),
        }
    }
}

/// Anything that can answer a chat transcript with one reply.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String>;

    /// Offer `tools` along with the transcript. Backends without tool
    /// support answer with plain text.
    async fn complete_with_tools(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
    ) -> Result<ChatReply> {
        let _ = tools;
        Ok(ChatReply::text(self.complete(messages).await?))
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<&'a [ToolDefinition]>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Option<ResponseMessage>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
    tool_calls: Option<Vec<ToolCall>>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

/// Pull the first choice's text and tool calls out of a response body.
pub fn parse_reply(body: &str) -> Result<ChatReply> {
    let response: ChatResponse = serde_json::from_str(body)
        .map_err(|e| OracleError::InvalidResponse(format!("JSON parse error: {e}")))?;
    if let Some(usage) = &response.usage {
        debug!(
            prompt_tokens = usage.prompt_tokens,
            completion_tokens = usage.completion_tokens,
            "token usage"
        );
    }
    let reply = response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message)
        .map(|m| ChatReply {
            content: m.content.unwrap_or_default(),
            tool_calls: m.tool_calls.unwrap_or_default(),
        })
        .unwrap_or_default();
    if reply.content.trim().is_empty() && reply.tool_calls.is_empty() {
        return Err(OracleError::InvalidResponse(
            "no content in model response".to_string(),
        ));
    }
    Ok(reply)
}

/// Pull the first choice's text out of a completions response body.
pub fn parse_completion(body: &str) -> Result<String> {
    let reply = parse_reply(body)?;
    if reply.content.trim().is_empty() {
        return Err(OracleError::InvalidResponse(
            "no content in model response".to_string(),
        ));
    }
    Ok(reply.content)
}

pub struct OpenAiChatClient {
    config: ModelConfig,
    http_client: Client,
}

impl OpenAiChatClient {
    pub fn new(config: ModelConfig) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("nixpack-model-oracle/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| OracleError::Config(format!("cannot build HTTP client: {e}")))?;
        Ok(Self { config, http_client })
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    /// POST one request and return the raw body of a successful response.
    async fn send(
        &self,
        messages: &[ChatMessage],
        tools: Option<&[ToolDefinition]>,
    ) -> Result<String> {
        let url = self.config.completions_url();
        let request = ChatRequest {
            model: &self.config.model,
            messages,
            temperature: 0.2,
            stream: false,
            tools,
        };
        debug!(
            url = %url,
            messages = messages.len(),
            tools = tools.map_or(0, <[ToolDefinition]>::len),
            "sending chat request"
        );

        let start = Instant::now();
        let mut builder = self.http_client.post(&url).json(&request);
        if let Some(key) = &self.config.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                error!("model request timed out after {:?}", self.config.timeout);
                OracleError::Timeout {
                    secs: self.config.timeout.as_secs(),
                }
            } else {
                error!("model request error: {}", e);
                OracleError::Network(e.to_string())
            }
        })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| OracleError::Network(e.to_string()))?;
        if !status.is_success() {
            return Err(OracleError::Api {
                status: status.as_u16(),
                body,
            });
        }

        info!(elapsed_secs = start.elapsed().as_secs_f64(), "model reply received");
        Ok(body)
    }
}

#[async_trait]
impl ChatBackend for OpenAiChatClient {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        let body = self.send(messages, None).await?;
        parse_completion(&body)
    }

    async fn complete_with_tools(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
    ) -> Result<ChatReply> {
        let offered = (!tools.is_empty()).then_some(tools);
        let body = self.send(messages, offered).await?;
        parse_reply(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::ProjectSourceTools;

    #[test]
    fn test_request_shape() {
        let messages = vec![ChatMessage::system("be brief"), ChatMessage::user("hi")];
        let request = ChatRequest {
            model: "m",
            messages: &messages,
            temperature: 0.2,
            stream: false,
            tools: None,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "hi");
        assert_eq!(json["stream"], false);
        assert!(json.get("tools").is_none());
        assert!(json["messages"][0].get("tool_calls").is_none());
        assert!(json["messages"][0].get("tool_call_id").is_none());
    }

    #[test]
    fn test_tool_turns_serialize_in_openai_shape() {
        let call = ToolCall::new("call_7", "read_file_content", r#"{"relative_path":"go.mod"}"#);
        let messages = vec![
            ChatMessage::assistant_tool_calls("", vec![call]),
            ChatMessage::tool("call_7", "module example.com/hello"),
        ];
        let tools = ProjectSourceTools::definitions();
        let request = ChatRequest {
            model: "m",
            messages: &messages,
            temperature: 0.2,
            stream: false,
            tools: Some(&tools),
        };

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["tools"][0]["type"], "function");
        let assistant = &json["messages"][0];
        assert_eq!(assistant["tool_calls"][0]["id"], "call_7");
        assert_eq!(assistant["tool_calls"][0]["type"], "function");
        assert_eq!(assistant["tool_calls"][0]["function"]["name"], "read_file_content");
        let result = &json["messages"][1];
        assert_eq!(result["role"], "tool");
        assert_eq!(result["tool_call_id"], "call_7");
    }

    #[test]
    fn test_parse_reply_with_tool_calls() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":null,
            "tool_calls":[{"id":"call_1","type":"function",
              "function":{"name":"list_directory_contents","arguments":"{\"relative_path\":\".\"}"}}]}}]}"#;
        let reply = parse_reply(body).unwrap();
        assert_eq!(reply.content, "");
        assert_eq!(reply.tool_calls.len(), 1);
        assert_eq!(reply.tool_calls[0].function.name, "list_directory_contents");
        assert_eq!(reply.tool_calls[0].function.arguments, r#"{"relative_path":"."}"#);

        // Tool calls alone are not a text completion.
        assert!(matches!(
            parse_completion(body).unwrap_err(),
            OracleError::InvalidResponse(_)
        ));
    }

    #[test]
    fn test_parse_reply_tolerates_null_tool_calls() {
        let body = r#"{"choices":[{"message":{"content":"done","tool_calls":null}}]}"#;
        assert_eq!(parse_reply(body).unwrap(), ChatReply::text("done"));
    }

    #[test]
    fn test_parse_completion() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"hello"}}],
                       "usage":{"prompt_tokens":3,"completion_tokens":1}}"#;
        assert_eq!(parse_completion(body).unwrap(), "hello");
    }

    #[test]
    fn test_parse_completion_without_content() {
        let err = parse_completion(r#"{"choices":[]}"#).unwrap_err();
        assert!(matches!(err, OracleError::InvalidResponse(_)));

        let err = parse_completion("not json").unwrap_err();
        assert!(matches!(err, OracleError::InvalidResponse(_)));
    }
}
