//! Conversational reasoning engine: history, tool calling and the OpenAI client.

mod base;
pub mod conversation;
pub mod openai;
pub mod tools;

pub use base::{
    ConversationMessage, EngineError, EngineReply, ReasoningEngine, Role, ToolCallRequest,
};
pub use conversation::{
    ConversationConfig, ConversationEngine, DEFAULT_FALLBACK_UTTERANCE, DEFAULT_MAX_TOOL_HOPS,
    DEFAULT_SYSTEM_PROMPT, TurnFailure, TurnResponse, build_system_prompt,
};
pub use openai::{DEFAULT_OPENAI_MODEL, OPENAI_BASE_URL, OpenAIEngine};
pub use tools::{
    ParameterKind, ToolDefinition, ToolError, ToolInvocation, ToolParameter, ToolRegistry,
};
