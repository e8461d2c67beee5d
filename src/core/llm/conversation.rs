//! Per-call conversation: history plus the bounded tool round trip.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tracing::{debug, info, warn};

use super::base::{ConversationMessage, EngineError, EngineReply, ReasoningEngine, Role};
use super::tools::{ToolDefinition, ToolError, ToolInvocation, ToolRegistry};

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a friendly, concise phone assistant. \
Keep answers short and conversational because they are spoken aloud. \
Ask one question at a time and never read out URLs or IDs.";

pub const SCHEDULING_NOTE: &str =
    "Scheduling capability: I can check availability and book appointments in Google Calendar.";

pub const DEFAULT_FALLBACK_UTTERANCE: &str =
    "I'm sorry, I'm having trouble with that right now. Could you say that again?";

/// Maximum tool round trips per turn when none is configured.
pub const DEFAULT_MAX_TOOL_HOPS: usize = 2;

/// Append the scheduling note when calendar tools are available.
pub fn build_system_prompt(instructions: &str, scheduling: bool) -> String {
    let base = instructions.trim();
    let base = if base.is_empty() {
        DEFAULT_SYSTEM_PROMPT
    } else {
        base
    };
    if scheduling {
        format!("{base}\n\n{SCHEDULING_NOTE}")
    } else {
        base.to_string()
    }
}

#[derive(Debug, Clone)]
pub struct ConversationConfig {
    pub system_prompt: String,
    pub max_tool_hops: usize,
    pub engine_timeout: Duration,
    pub fallback_utterance: String,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            max_tool_hops: DEFAULT_MAX_TOOL_HOPS,
            engine_timeout: Duration::from_millis(5000),
            fallback_utterance: DEFAULT_FALLBACK_UTTERANCE.to_string(),
        }
    }
}

/// Why a turn fell back to the apology utterance.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TurnFailure {
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Tool(#[from] ToolError),
    #[error("tool round trip exceeded {0} hops")]
    HopLimit(usize),
}

/// Result of one caller turn.
#[derive(Debug, Clone)]
pub struct TurnResponse {
    /// Text to speak; the fallback utterance when `failure` is set
    pub text: String,
    pub failure: Option<TurnFailure>,
    pub invocations: Vec<ToolInvocation>,
    pub engine_calls: usize,
}

impl TurnResponse {
    pub fn is_fallback(&self) -> bool {
        self.failure.is_some()
    }
}

/// Owns the history for one call. Callers serialize access (`&mut self`).
pub struct ConversationEngine {
    engine: Arc<dyn ReasoningEngine>,
    tools: Arc<ToolRegistry>,
    config: ConversationConfig,
    history: Vec<ConversationMessage>,
}

impl ConversationEngine {
    pub fn new(
        engine: Arc<dyn ReasoningEngine>,
        tools: Arc<ToolRegistry>,
        config: ConversationConfig,
    ) -> Self {
        let history = vec![ConversationMessage::system(config.system_prompt.clone())];
        Self {
            engine,
            tools,
            config,
            history,
        }
    }

    pub fn history(&self) -> &[ConversationMessage] {
        &self.history
    }

    /// Record a caller turn that will not be answered.
    pub fn record_user_turn(&mut self, text: &str) {
        self.history.push(ConversationMessage::user(text));
    }

    /// Record speech the agent produced outside of a turn, e.g. the greeting.
    pub fn record_assistant(&mut self, text: &str) {
        self.history.push(ConversationMessage::assistant(text));
    }

    /// Drop the trailing assistant reply, e.g. one the caller never heard.
    /// Returns `false` when the history does not end in a spoken reply.
    pub fn retract_last_reply(&mut self) -> bool {
        let spoken_reply = self
            .history
            .last()
            .is_some_and(|m| m.role == Role::Assistant && m.tool_calls.is_empty());
        if spoken_reply {
            self.history.pop();
        }
        spoken_reply
    }

    /// Answer one caller turn. Never fails: engine and tool errors produce the
    /// fallback utterance, which is recorded like any other assistant reply.
    pub async fn respond(&mut self, user_text: &str) -> TurnResponse {
        self.history.push(ConversationMessage::user(user_text));

        let mut invocations = Vec::new();
        let mut engine_calls = 0;
        let outcome = self.run_turn(&mut invocations, &mut engine_calls).await;

        match outcome {
            Ok(text) => {
                self.history.push(ConversationMessage::assistant(&text));
                info!(engine_calls, tools = invocations.len(), "Engine answered turn");
                TurnResponse {
                    text,
                    failure: None,
                    invocations,
                    engine_calls,
                }
            }
            Err(failure) => {
                warn!(error = %failure, "Turn failed; answering with fallback utterance");
                let text = self.config.fallback_utterance.clone();
                self.history.push(ConversationMessage::assistant(&text));
                TurnResponse {
                    text,
                    failure: Some(failure),
                    invocations,
                    engine_calls,
                }
            }
        }
    }

    async fn run_turn(
        &mut self,
        invocations: &mut Vec<ToolInvocation>,
        engine_calls: &mut usize,
    ) -> Result<String, TurnFailure> {
        let definitions = self.tools.definitions();
        let max_hops = self.config.max_tool_hops;
        let mut hops = 0;

        loop {
            // Once the hop budget is spent the engine must answer in text
            let offered: &[ToolDefinition] = if hops < max_hops { &definitions } else { &[] };
            *engine_calls += 1;
            let reply = self.call_engine(offered).await?;

            let calls = match reply {
                EngineReply::Text(text) => return Ok(text),
                EngineReply::ToolCalls(calls) => calls,
            };
            if hops >= max_hops {
                return Err(TurnFailure::HopLimit(max_hops));
            }
            hops += 1;

            self.history
                .push(ConversationMessage::assistant_tool_calls(calls.clone()));

            let mut failure = None;
            for call in calls {
                if failure.is_some() {
                    // Every requested call needs a matching tool message
                    self.history.push(ConversationMessage::tool(
                        &call.id,
                        json!({"success": false, "error": "skipped"}).to_string(),
                    ));
                    continue;
                }

                debug!(tool = %call.name, "Executing tool call");
                let result = self.tools.call(&call.name, call.arguments.clone()).await;
                let content = match &result {
                    Ok(output) => output.clone(),
                    Err(e) => json!({"success": false, "error": e.to_string()}).to_string(),
                };
                self.history.push(ConversationMessage::tool(&call.id, content));
                if let Err(e) = &result {
                    failure = Some(e.clone());
                }
                invocations.push(ToolInvocation {
                    name: call.name,
                    arguments: call.arguments,
                    result,
                });
            }

            if let Some(e) = failure {
                return Err(TurnFailure::Tool(e));
            }
        }
    }

    async fn call_engine(
        &self,
        tools: &[ToolDefinition],
    ) -> Result<EngineReply, EngineError> {
        let timeout = self.config.engine_timeout;
        match tokio::time::timeout(timeout, self.engine.complete(&self.history, tools)).await {
            Ok(result) => result,
            Err(_) => Err(EngineError::Timeout(timeout)),
        }
    }
}
