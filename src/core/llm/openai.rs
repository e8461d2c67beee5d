//! OpenAI chat-completions client.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::base::{
    ConversationMessage, EngineError, EngineReply, ReasoningEngine, Role, ToolCallRequest,
};
use super::tools::ToolDefinition;

pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4.1-nano";

#[derive(Clone, Debug, Deserialize, Serialize)]
struct ApiToolCall {
    id: String,
    #[serde(rename = "type")]
    r#type: String,
    function: ApiFunctionCall,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
struct ApiFunctionCall {
    name: String,
    arguments: String,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
struct ApiMessage {
    role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ApiToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

impl From<&ConversationMessage> for ApiMessage {
    fn from(message: &ConversationMessage) -> Self {
        let tool_calls: Vec<ApiToolCall> = message
            .tool_calls
            .iter()
            .map(|call| ApiToolCall {
                id: call.id.clone(),
                r#type: "function".to_string(),
                function: ApiFunctionCall {
                    name: call.name.clone(),
                    arguments: call.arguments.to_string(),
                },
            })
            .collect();

        ApiMessage {
            role: message.role,
            content: message.content.clone(),
            tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
            tool_call_id: message.tool_call_id.clone(),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
struct ApiTool {
    #[serde(rename = "type")]
    r#type: &'static str,
    function: ApiFunctionDefinition,
}

#[derive(Clone, Debug, Serialize)]
struct ApiFunctionDefinition {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

impl From<&ToolDefinition> for ApiTool {
    fn from(definition: &ToolDefinition) -> Self {
        ApiTool {
            r#type: "function",
            function: ApiFunctionDefinition {
                name: definition.name.clone(),
                description: definition.description.clone(),
                parameters: definition.json_schema(),
            },
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ApiMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ApiTool>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ApiChoice>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
}

impl ChatCompletionResponse {
    fn into_reply(self) -> Result<EngineReply, EngineError> {
        let choice = self
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| EngineError::InvalidResponse("response has no choices".to_string()))?;

        if let Some(calls) = choice.message.tool_calls.filter(|c| !c.is_empty()) {
            let requests = calls
                .into_iter()
                .map(|call| {
                    let arguments = if call.function.arguments.trim().is_empty() {
                        serde_json::Value::Object(Default::default())
                    } else {
                        serde_json::from_str(&call.function.arguments).map_err(|e| {
                            EngineError::InvalidResponse(format!(
                                "tool call '{}' has malformed arguments: {e}",
                                call.function.name
                            ))
                        })?
                    };
                    Ok(ToolCallRequest {
                        id: call.id,
                        name: call.function.name,
                        arguments,
                    })
                })
                .collect::<Result<Vec<_>, EngineError>>()?;
            return Ok(EngineReply::ToolCalls(requests));
        }

        match choice.message.content.map(|c| c.trim().to_string()) {
            Some(text) if !text.is_empty() => Ok(EngineReply::Text(text)),
            _ => Err(EngineError::InvalidResponse(
                "response has neither text nor tool calls".to_string(),
            )),
        }
    }
}

/// Chat-completions engine over HTTP.
#[derive(Clone)]
pub struct OpenAIEngine {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    timeout: Duration,
}

impl OpenAIEngine {
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, EngineError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(EngineError::ConfigurationError(
                "API key is required for OpenAI".to_string(),
            ));
        }
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            model: model.into(),
            timeout,
        })
    }

    fn chat_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

#[async_trait::async_trait]
impl ReasoningEngine for OpenAIEngine {
    async fn complete(
        &self,
        history: &[ConversationMessage],
        tools: &[ToolDefinition],
    ) -> Result<EngineReply, EngineError> {
        let request = ChatCompletionRequest {
            model: self.model.clone(),
            messages: history.iter().map(ApiMessage::from).collect(),
            tools: tools.iter().map(ApiTool::from).collect(),
        };

        debug!(
            model = %self.model,
            messages = request.messages.len(),
            tools = request.tools.len(),
            "Sending chat completion request"
        );

        let response = self
            .client
            .post(self.chat_url())
            .bearer_auth(&self.api_key)
            .timeout(self.timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    EngineError::Timeout(self.timeout)
                } else {
                    EngineError::RequestFailed(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EngineError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| EngineError::InvalidResponse(e.to_string()))?;
        parsed.into_reply()
    }

    fn model(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::llm::tools::{ParameterKind, ToolParameter};
    use serde_json::json;
    use wiremock::matchers::{bearer_token, body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn engine(server: &MockServer) -> OpenAIEngine {
        OpenAIEngine::new(
            reqwest::Client::new(),
            server.uri(),
            "sk-test",
            DEFAULT_OPENAI_MODEL,
            Duration::from_secs(2),
        )
        .unwrap()
    }

    fn availability_tool() -> ToolDefinition {
        ToolDefinition::new(
            "check_availability",
            "Check open slots",
            vec![ToolParameter::required(
                "date",
                ParameterKind::String,
                "Date as YYYY-MM-DD",
            )],
        )
    }

    #[test]
    fn test_requires_api_key() {
        let result = OpenAIEngine::new(
            reqwest::Client::new(),
            OPENAI_BASE_URL,
            " ",
            DEFAULT_OPENAI_MODEL,
            Duration::from_secs(5),
        );
        assert!(matches!(result, Err(EngineError::ConfigurationError(_))));
    }

    #[test]
    fn test_tool_messages_serialize_with_call_ids() {
        let call = ToolCallRequest {
            id: "call_1".to_string(),
            name: "check_availability".to_string(),
            arguments: json!({"date": "2025-03-04"}),
        };
        let assistant = ApiMessage::from(&ConversationMessage::assistant_tool_calls(vec![call]));
        let value = serde_json::to_value(&assistant).unwrap();
        assert_eq!(value["role"], "assistant");
        assert!(value.get("content").is_none());
        assert_eq!(value["tool_calls"][0]["id"], "call_1");
        assert_eq!(value["tool_calls"][0]["type"], "function");
        assert_eq!(
            value["tool_calls"][0]["function"]["arguments"],
            r#"{"date":"2025-03-04"}"#
        );

        let tool = ApiMessage::from(&ConversationMessage::tool("call_1", "[]"));
        let value = serde_json::to_value(&tool).unwrap();
        assert_eq!(value["role"], "tool");
        assert_eq!(value["tool_call_id"], "call_1");
    }

    #[tokio::test]
    async fn test_text_reply() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(bearer_token("sk-test"))
            .and(body_partial_json(json!({"model": "gpt-4.1-nano"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"role": "assistant", "content": " Sure, I can help. "}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let reply = engine(&server)
            .complete(&[ConversationMessage::user("Hi")], &[])
            .await
            .unwrap();
        assert_eq!(reply, EngineReply::Text("Sure, I can help.".to_string()));
    }

    #[tokio::test]
    async fn test_tool_call_reply_and_advertised_tools() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_partial_json(json!({
                "tools": [{"type": "function", "function": {"name": "check_availability"}}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_9",
                        "type": "function",
                        "function": {"name": "check_availability", "arguments": "{\"date\":\"2025-03-04\"}"}
                    }]
                }}]
            })))
            .mount(&server)
            .await;

        let reply = engine(&server)
            .complete(&[ConversationMessage::user("Any time Tuesday?")], &[availability_tool()])
            .await
            .unwrap();

        match reply {
            EngineReply::ToolCalls(calls) => {
                assert_eq!(calls.len(), 1);
                assert_eq!(calls[0].id, "call_9");
                assert_eq!(calls[0].name, "check_availability");
                assert_eq!(calls[0].arguments, json!({"date": "2025-03-04"}));
            }
            other => panic!("expected tool calls, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_http_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
            .mount(&server)
            .await;

        let err = engine(&server)
            .complete(&[ConversationMessage::user("Hi")], &[])
            .await
            .unwrap_err();
        assert_eq!(
            err,
            EngineError::Status {
                status: 429,
                body: "rate limited".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_empty_reply_is_invalid() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
            .mount(&server)
            .await;

        let err = engine(&server)
            .complete(&[ConversationMessage::user("Hi")], &[])
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_slow_engine_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_delay(Duration::from_millis(500))
                    .set_body_json(json!({"choices": []})),
            )
            .mount(&server)
            .await;

        let engine = OpenAIEngine::new(
            reqwest::Client::new(),
            server.uri(),
            "sk-test",
            DEFAULT_OPENAI_MODEL,
            Duration::from_millis(50),
        )
        .unwrap();
        let err = engine
            .complete(&[ConversationMessage::user("Hi")], &[])
            .await
            .unwrap_err();
        assert_eq!(err, EngineError::Timeout(Duration::from_millis(50)));
    }
}
