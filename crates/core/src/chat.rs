//! The chat backend seam — the abstraction over the language model.
//!
//! [`ChatBackend`] knows how to send a message list to the model and get a
//! response back, either as a complete assistant message (possibly carrying
//! tool-call requests) or as a stream of text fragments. The production
//! implementation lives in `intervet-providers`; engine tests use mocks.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::GatewayError;
use crate::tool::{ToolCallRequest, ToolDefinition};

/// The role of a message on the model wire. Distinct from the transcript
/// [`crate::message::Sender`]: candidate maps to `user`, model to
/// `assistant`, everything else to `system` (tool results to `tool`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireRole {
    System,
    User,
    Assistant,
    Tool,
}

/// One message in the payload sent to the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: WireRole,

    #[serde(default)]
    pub content: String,

    /// Tool calls requested by the assistant (if any)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallRequest>,

    /// If this is a tool result, which tool call it responds to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: WireRole::System,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: WireRole::User,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: WireRole::Assistant,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    /// Attach the tool calls an assistant message requested.
    pub fn with_tool_calls(mut self, tool_calls: Vec<ToolCallRequest>) -> Self {
        self.tool_calls = tool_calls;
        self
    }

    /// A tool result message responding to a specific tool call.
    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: WireRole::Tool,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: Some(tool_call_id.into()),
        }
    }
}

/// A complete (non-streaming) assistant response.
#[derive(Debug, Clone)]
pub struct ChatResponse {
    /// The generated text, empty when the model only called tools
    pub content: String,

    /// Tool calls the model wants dispatched, in request order
    pub tool_calls: Vec<ToolCallRequest>,
}

impl ChatResponse {
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// A single fragment of a streaming response.
#[derive(Debug, Clone)]
pub struct ChatChunk {
    /// Partial content delta
    pub content: Option<String>,

    /// Whether this is the final chunk
    pub done: bool,
}

/// The model gateway contract.
///
/// `complete` blocks until the model has produced a full assistant message;
/// `stream` yields text fragments until a sentinel or connection close. The
/// stream is finite and not restartable. Neither method retries: a transport
/// or non-success failure surfaces as [`GatewayError`] and the caller decides
/// what to fall back to.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Send the message list and get a complete assistant message.
    async fn complete(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
    ) -> std::result::Result<ChatResponse, GatewayError>;

    /// Send the message list and get a stream of response fragments.
    async fn stream(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
    ) -> std::result::Result<
        tokio::sync::mpsc::Receiver<std::result::Result<ChatChunk, GatewayError>>,
        GatewayError,
    >;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_role_serializes_lowercase() {
        let msg = ChatMessage::user("Привет");
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains(r#""role":"user""#));
    }

    #[test]
    fn tool_result_carries_call_id() {
        let msg = ChatMessage::tool_result("call_1", r#"{"ok":true}"#);
        assert_eq!(msg.role, WireRole::Tool);
        assert_eq!(msg.tool_call_id.as_deref(), Some("call_1"));
    }

    #[test]
    fn empty_tool_calls_skipped_in_json() {
        let msg = ChatMessage::assistant("done");
        let json = serde_json::to_string(&msg).unwrap();
        assert!(!json.contains("tool_calls"));
    }
}
