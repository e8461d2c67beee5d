use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::tools::ToolDefinition;

#[derive(Copy, Clone, Debug, Deserialize, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A tool call requested by the reasoning engine.
#[derive(Clone, Debug, PartialEq)]
pub struct ToolCallRequest {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

/// One entry of the conversation history.
#[derive(Clone, Debug, PartialEq)]
pub struct ConversationMessage {
    pub role: Role,
    pub content: Option<String>,
    /// Set on assistant messages that requested tools
    pub tool_calls: Vec<ToolCallRequest>,
    /// Set on tool messages; links the result to its request
    pub tool_call_id: Option<String>,
}

impl ConversationMessage {
    fn with_content(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::with_content(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::with_content(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_content(Role::Assistant, content)
    }

    pub fn assistant_tool_calls(calls: Vec<ToolCallRequest>) -> Self {
        Self {
            role: Role::Assistant,
            content: None,
            tool_calls: calls,
            tool_call_id: None,
        }
    }

    pub fn tool(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: Some(tool_call_id.into()),
        }
    }

    pub fn text(&self) -> &str {
        self.content.as_deref().unwrap_or_default()
    }
}

/// What the engine produced for one request.
#[derive(Clone, Debug, PartialEq)]
pub enum EngineReply {
    Text(String),
    ToolCalls(Vec<ToolCallRequest>),
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineError {
    #[error("Request failed: {0}")]
    RequestFailed(String),
    #[error("Engine returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Engine did not answer within {0:?}")]
    Timeout(Duration),
    #[error("Invalid engine response: {0}")]
    InvalidResponse(String),
    #[error("Configuration error: {0}")]
    ConfigurationError(String),
}

/// A conversational model that answers with text or tool-call requests.
#[async_trait::async_trait]
pub trait ReasoningEngine: Send + Sync {
    async fn complete(
        &self,
        history: &[ConversationMessage],
        tools: &[ToolDefinition],
    ) -> Result<EngineReply, EngineError>;

    fn model(&self) -> &str;
}
