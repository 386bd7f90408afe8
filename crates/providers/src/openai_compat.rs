//! OpenAI-compatible model gateway.
//!
//! Works with: OpenRouter, OpenAI, Ollama, vLLM, Together AI and any
//! endpoint exposing `/v1/chat/completions` with function calling.

use async_trait::async_trait;
use taskmate_core::error::GatewayError;
use taskmate_core::gateway::{ModelGateway, ModelResponse};
use taskmate_core::tool::{ToolCall, ToolSpec};
use taskmate_core::turn::{ConversationContext, Role, Turn};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Request timeout applied by the HTTP client itself. The agent loop
/// enforces its own, usually shorter, per-call timeout on top.
const HTTP_TIMEOUT_SECS: u64 = 120;

/// An OpenAI-compatible model gateway.
pub struct OpenAiCompatGateway {
    name: String,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
    client: reqwest::Client,
}

impl OpenAiCompatGateway {
    /// Create a new OpenAI-compatible gateway.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()
            .map_err(|e| GatewayError::NotConfigured(format!("HTTP client: {e}")))?;

        Ok(Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
            temperature: 0.7,
            max_tokens: None,
            client,
        })
    }

    /// Create an OpenRouter gateway (convenience constructor).
    pub fn openrouter(
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Result<Self, GatewayError> {
        Self::new("openrouter", "https://openrouter.ai/api/v1", api_key, model)
    }

    /// Create an Ollama gateway (convenience constructor).
    pub fn ollama(base_url: Option<&str>, model: impl Into<String>) -> Result<Self, GatewayError> {
        Self::new(
            "ollama",
            base_url.unwrap_or("http://localhost:11434/v1"),
            "ollama", // Ollama doesn't need a real key
            model,
        )
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Serialize the system instruction and turns as role/content pairs.
    fn to_api_messages(context: &ConversationContext) -> Vec<ApiMessage> {
        let mut messages = Vec::with_capacity(context.len() + 1);
        messages.push(ApiMessage::text(Role::System, context.system_prompt()));

        for turn in context.turns() {
            let message = match turn {
                Turn::User { text } | Turn::Assistant { text } => ApiMessage::text(turn.role(), text),
                Turn::ToolRequest { calls } => ApiMessage {
                    role: role_str(turn.role()).into(),
                    content: None,
                    tool_calls: Some(calls.iter().map(ApiToolCall::from_call).collect()),
                    tool_call_id: None,
                },
                Turn::ToolResult(result) => ApiMessage {
                    role: role_str(turn.role()).into(),
                    content: Some(result.content()),
                    tool_calls: None,
                    tool_call_id: Some(result.call_id.clone()),
                },
            };
            messages.push(message);
        }
        messages
    }

    /// Convert tool specs to OpenAI API format.
    fn to_api_tools(tools: &[ToolSpec]) -> Vec<ApiToolDefinition> {
        tools
            .iter()
            .map(|t| ApiToolDefinition {
                r#type: "function".into(),
                function: ApiToolFunction {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    parameters: t.parameters.clone(),
                },
            })
            .collect()
    }

    /// Turn the first choice of a completion into a strict `ModelResponse`.
    fn parse_response(api_response: ApiResponse) -> Result<ModelResponse, GatewayError> {
        if let Some(err) = api_response.error {
            return Err(GatewayError::ApiError {
                status_code: err.status_code(),
                message: err.message,
            });
        }

        let choice = api_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| GatewayError::MalformedResponse("No choices in response".into()))?;

        let calls: Vec<ToolCall> = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(ApiToolCall::into_call)
            .collect();

        Ok(ModelResponse::from_parts(choice.message.content, calls))
    }
}

fn role_str(role: Role) -> &'static str {
    match role {
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::System => "system",
        Role::Tool => "tool",
    }
}

#[async_trait]
impl ModelGateway for OpenAiCompatGateway {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(
        &self,
        context: &ConversationContext,
        tools: &[ToolSpec],
    ) -> Result<ModelResponse, GatewayError> {
        let url = format!("{}/chat/completions", self.base_url);

        let mut body = serde_json::json!({
            "model": self.model,
            "messages": Self::to_api_messages(context),
            "temperature": self.temperature,
            "stream": false,
        });

        if let Some(max_tokens) = self.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }

        if !tools.is_empty() {
            body["tools"] = serde_json::json!(Self::to_api_tools(tools));
        }

        debug!(
            gateway = %self.name,
            model = %self.model,
            turns = context.len(),
            tools = tools.len(),
            "Sending completion request"
        );

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GatewayError::Timeout {
                        timeout_ms: HTTP_TIMEOUT_SECS * 1_000,
                    }
                } else {
                    GatewayError::Network(e.to_string())
                }
            })?;

        let status = response.status().as_u16();

        if status == 429 {
            let retry_after_secs = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok())
                .unwrap_or(5);
            return Err(GatewayError::RateLimited { retry_after_secs });
        }

        if status == 401 || status == 403 {
            return Err(GatewayError::AuthenticationFailed(
                "Invalid API key or insufficient permissions".into(),
            ));
        }

        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Model provider returned error");
            return Err(GatewayError::ApiError {
                status_code: status,
                message: error_body,
            });
        }

        let api_response: ApiResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::MalformedResponse(format!("Failed to parse response: {e}")))?;

        Self::parse_response(api_response)
    }
}

// --- OpenAI API types (internal) ---

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ApiToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

impl ApiMessage {
    fn text(role: Role, content: &str) -> Self {
        Self {
            role: role_str(role).into(),
            content: Some(content.to_string()),
            tool_calls: None,
            tool_call_id: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolCall {
    #[serde(default)]
    id: String,
    #[serde(default = "function_type")]
    r#type: String,
    function: ApiFunction,
}

fn function_type() -> String {
    "function".into()
}

impl ApiToolCall {
    fn from_call(call: &ToolCall) -> Self {
        // Unparseable arguments are carried as a raw string; send them back verbatim.
        let arguments = match &call.arguments {
            serde_json::Value::String(raw) => raw.clone(),
            other => other.to_string(),
        };
        Self {
            id: call.call_id.clone(),
            r#type: function_type(),
            function: ApiFunction {
                name: call.name.clone(),
                arguments,
            },
        }
    }

    fn into_call(self) -> ToolCall {
        let call_id = if self.id.is_empty() {
            format!("call_{}", uuid::Uuid::new_v4().simple())
        } else {
            self.id
        };
        let raw = self.function.arguments;
        let arguments = if raw.trim().is_empty() {
            serde_json::json!({})
        } else {
            serde_json::from_str(&raw).unwrap_or(serde_json::Value::String(raw))
        };
        ToolCall {
            call_id,
            name: self.function.name,
            arguments,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolDefinition {
    r#type: String,
    function: ApiToolFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    choices: Vec<ApiChoice>,
    /// OpenRouter reports some upstream failures inside a 200 body
    #[serde(default)]
    error: Option<ApiErrorBody>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
    #[serde(default)]
    code: Option<serde_json::Value>,
}

impl ApiErrorBody {
    /// OpenRouter sends numeric codes, OpenAI sends strings like "invalid_api_key".
    fn status_code(&self) -> u16 {
        self.code
            .as_ref()
            .and_then(serde_json::Value::as_u64)
            .and_then(|code| u16::try_from(code).ok())
            .unwrap_or(200)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskmate_core::gateway::EMPTY_ANSWER_FALLBACK;
    use taskmate_core::tool::ToolResult;

    fn parse(json: &str) -> Result<ModelResponse, GatewayError> {
        let api: ApiResponse = serde_json::from_str(json).unwrap();
        OpenAiCompatGateway::parse_response(api)
    }

    #[test]
    fn openrouter_constructor() {
        let gw = OpenAiCompatGateway::openrouter("sk-test", "meta-llama/llama-3-8b-instruct:free")
            .unwrap();
        assert_eq!(gw.name(), "openrouter");
        assert!(gw.base_url.contains("openrouter.ai"));
    }

    #[test]
    fn ollama_constructor() {
        let gw = OpenAiCompatGateway::ollama(None, "llama3").unwrap();
        assert_eq!(gw.name(), "ollama");
        assert!(gw.base_url.contains("localhost:11434"));
    }

    #[test]
    fn system_prompt_leads_the_messages() {
        let mut ctx = ConversationContext::new("You manage tasks", vec![]);
        ctx.push(Turn::user("Hello"));
        let api = OpenAiCompatGateway::to_api_messages(&ctx);
        assert_eq!(api.len(), 2);
        assert_eq!(api[0].role, "system");
        assert_eq!(api[0].content.as_deref(), Some("You manage tasks"));
        assert_eq!(api[1].role, "user");
    }

    #[test]
    fn tool_exchange_serialization() {
        let call = ToolCall::new("call_1", "add_task", serde_json::json!({"title": "Groceries"}));
        let mut ctx = ConversationContext::new("sys", vec![]);
        ctx.push(Turn::ToolRequest {
            calls: vec![call.clone()],
        });
        ctx.push(Turn::ToolResult(ToolResult::success(
            &call,
            serde_json::json!({"id": 7}),
        )));

        let api = OpenAiCompatGateway::to_api_messages(&ctx);
        let request = &api[1];
        assert_eq!(request.role, "assistant");
        assert!(request.content.is_none());
        let tc = request.tool_calls.as_ref().unwrap();
        assert_eq!(tc[0].id, "call_1");
        assert_eq!(tc[0].function.arguments, r#"{"title":"Groceries"}"#);

        let result = &api[2];
        assert_eq!(result.role, "tool");
        assert_eq!(result.tool_call_id.as_deref(), Some("call_1"));
        assert_eq!(result.content.as_deref(), Some(r#"{"id":7}"#));
    }

    #[test]
    fn tool_spec_conversion() {
        let tools = vec![ToolSpec {
            name: "list_tasks".into(),
            description: "List tasks".into(),
            parameters: serde_json::json!({"type": "object"}),
        }];
        let api_tools = OpenAiCompatGateway::to_api_tools(&tools);
        assert_eq!(api_tools.len(), 1);
        assert_eq!(api_tools[0].function.name, "list_tasks");
        assert_eq!(api_tools[0].r#type, "function");
    }

    #[test]
    fn parse_text_answer() {
        let resp = parse(r#"{"choices":[{"message":{"role":"assistant","content":"Hi! How can I help?"}}]}"#)
            .unwrap();
        assert_eq!(resp, ModelResponse::final_answer("Hi! How can I help?"));
    }

    #[test]
    fn parse_empty_content_uses_fallback() {
        let resp = parse(r#"{"choices":[{"message":{"role":"assistant","content":null,"tool_calls":[]}}]}"#)
            .unwrap();
        assert_eq!(resp, ModelResponse::final_answer(EMPTY_ANSWER_FALLBACK));
    }

    #[test]
    fn parse_tool_calls_in_order() {
        let resp = parse(
            r#"{"choices":[{"message":{"role":"assistant","content":"","tool_calls":[
                {"id":"call_a","type":"function","function":{"name":"add_task","arguments":"{\"title\":\"Groceries\"}"}},
                {"id":"call_b","type":"function","function":{"name":"list_tasks","arguments":""}}
            ]}}]}"#,
        )
        .unwrap();
        let ModelResponse::ToolRequest { calls } = resp else {
            panic!("expected tool request");
        };
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].call_id, "call_a");
        assert_eq!(calls[0].arguments["title"], "Groceries");
        assert_eq!(calls[1].name, "list_tasks");
        assert_eq!(calls[1].arguments, serde_json::json!({}));
    }

    #[test]
    fn unparseable_arguments_are_kept_raw() {
        let resp = parse(
            r#"{"choices":[{"message":{"tool_calls":[
                {"id":"c1","function":{"name":"add_task","arguments":"{title: oops"}}
            ]}}]}"#,
        )
        .unwrap();
        let ModelResponse::ToolRequest { calls } = resp else {
            panic!("expected tool request");
        };
        assert_eq!(calls[0].arguments, serde_json::Value::String("{title: oops".into()));
    }

    #[test]
    fn missing_call_id_is_generated() {
        let resp = parse(
            r#"{"choices":[{"message":{"tool_calls":[{"function":{"name":"list_tasks","arguments":"{}"}}]}}]}"#,
        )
        .unwrap();
        let ModelResponse::ToolRequest { calls } = resp else {
            panic!("expected tool request");
        };
        assert!(calls[0].call_id.starts_with("call_"));
    }

    #[test]
    fn no_choices_is_malformed() {
        let err = parse(r#"{"choices":[]}"#).unwrap_err();
        assert!(matches!(err, GatewayError::MalformedResponse(_)));
    }

    #[test]
    fn provider_error_in_body_is_surfaced() {
        let err = parse(r#"{"error":{"message":"upstream overloaded","code":502}}"#).unwrap_err();
        assert!(matches!(err, GatewayError::ApiError { status_code: 502, .. }));
    }

    #[test]
    fn string_error_code_keeps_the_message() {
        let err = parse(
            r#"{"error":{"message":"Incorrect API key provided","type":"invalid_request_error","code":"invalid_api_key"}}"#,
        )
        .unwrap_err();
        match err {
            GatewayError::ApiError {
                status_code,
                message,
            } => {
                assert_eq!(status_code, 200);
                assert_eq!(message, "Incorrect API key provided");
            }
            other => panic!("expected ApiError, got {other:?}"),
        }
    }
}
