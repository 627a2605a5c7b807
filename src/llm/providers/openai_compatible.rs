//! OpenAI-compatible chat completion provider (`/v1/chat/completions`).
//!
//! Maps the provider-neutral [`Turn`] / [`ToolDefinition`] types onto the
//! OpenAI wire format, including function-calling (`tools`, `tool_calls`,
//! `tool_call_id`). All wire types are private to this module: callers never
//! see them. The tool-call loop belongs to the orchestrator; this provider is
//! stateless and performs exactly one round-trip per call.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, trace};

use crate::llm::{LlmResponse, LlmUsage, ProviderError, Role, ToolCall, ToolDefinition, Turn};

// ── Public provider ───────────────────────────────────────────────────────────

/// Adapter for any HTTP endpoint implementing `/v1/chat/completions`.
///
/// Covers OpenAI, OpenAI-compatible local servers (Ollama, LM Studio…),
/// and hosted alternatives. Constructed once at startup, then cheaply cloned
/// because `reqwest::Client` is an `Arc` internally.
#[derive(Debug, Clone)]
pub struct OpenAiCompatibleProvider {
    client: Client,
    api_base_url: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
    api_key: Option<String>,
}

impl OpenAiCompatibleProvider {
    /// Build a provider from config values and an optional API key.
    ///
    /// `api_key` is `None` for keyless local models. When present it is sent
    /// as `Authorization: Bearer <key>` on every request. `timeout_seconds`
    /// bounds every request; a timeout surfaces as [`ProviderError::Request`].
    pub fn new(
        api_base_url: String,
        model: String,
        temperature: f32,
        max_tokens: u32,
        timeout_seconds: u64,
        api_key: Option<String>,
    ) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .build()
            .map_err(|e| ProviderError::Request(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client, api_base_url, model, temperature, max_tokens, api_key })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Lightweight reachability probe.
    ///
    /// Sends a HEAD request to the configured endpoint.  Any HTTP response
    /// (including 4xx) means the server is reachable.  Only a transport-level
    /// failure (connection refused, timeout) is treated as unreachable.
    ///
    /// Uses a hard 5-second timeout regardless of the LLM timeout config.
    pub async fn ping(&self) -> Result<(), ProviderError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| ProviderError::Request(format!("failed to build ping client: {e}")))?;
        let mut req = client.head(&self.api_base_url);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }
        req.send()
            .await
            .map(|_| ())
            .map_err(|e| ProviderError::Request(format!("unreachable: {e}")))
    }

    /// One chat completion round over `messages`.
    ///
    /// When `tools` is non-empty they are offered with `tool_choice = "auto"`.
    pub async fn complete(
        &self,
        messages: &[Turn],
        tools: &[ToolDefinition],
    ) -> Result<LlmResponse, ProviderError> {
        let payload = self.build_request(messages, tools);

        debug!(
            model = %payload.model,
            temperature = ?payload.temperature,
            messages = payload.messages.len(),
            tools = payload.tools.len(),
            "sending LLM request"
        );
        if tracing::enabled!(tracing::Level::TRACE) {
            let json = serde_json::to_string_pretty(&payload)
                .unwrap_or_else(|e| format!("<serialization failed: {e}>"));
            trace!(payload = %json, "full LLM request payload");
        }

        let mut req = self.client.post(&self.api_base_url).json(&payload);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let response = req.send().await.map_err(|e| {
            error!(url = %self.api_base_url, error = %e, timeout = e.is_timeout(), "LLM HTTP request failed (transport)");
            ProviderError::Request(e.to_string())
        })?;

        let response = check_status(response).await?;

        let parsed = response.json::<ChatCompletionResponse>().await.map_err(|e| {
            error!(error = %e, "failed to deserialize LLM response");
            ProviderError::Request(format!("failed to parse response body: {e}"))
        })?;

        debug!(choices = parsed.choices.len(), "received LLM response");
        if tracing::enabled!(tracing::Level::TRACE) {
            let json = serde_json::to_string_pretty(&parsed)
                .unwrap_or_else(|e| format!("<serialization failed: {e}>"));
            trace!(response = %json, "full LLM response payload");
        }

        parse_response(parsed)
    }

    fn build_request(&self, messages: &[Turn], tools: &[ToolDefinition]) -> ChatCompletionRequest {
        // Some models (gpt-5 family) do not accept a temperature parameter
        // and take `max_completion_tokens` instead of `max_tokens`.
        let newer_family = self.model.starts_with("gpt-5");
        let (temperature, max_tokens, max_completion_tokens) = if newer_family {
            (None, None, Some(self.max_tokens))
        } else {
            (Some(self.temperature), Some(self.max_tokens), None)
        };

        let tools: Vec<WireTool> = tools.iter().map(WireTool::from).collect();
        let tool_choice = if tools.is_empty() { None } else { Some("auto".to_string()) };

        ChatCompletionRequest {
            model: self.model.clone(),
            messages: messages.iter().map(WireMessage::from).collect(),
            tools,
            tool_choice,
            temperature,
            max_tokens,
            max_completion_tokens,
        }
    }
}

fn parse_response(parsed: ChatCompletionResponse) -> Result<LlmResponse, ProviderError> {
    let usage = parsed.usage.as_ref().map(|u| LlmUsage {
        input_tokens: u.prompt_tokens,
        output_tokens: u.completion_tokens,
    });

    let message = parsed
        .choices
        .into_iter()
        .next()
        .map(|c| c.message)
        .ok_or_else(|| ProviderError::Request("response contained no choices".into()))?;

    let tool_calls = message
        .tool_calls
        .into_iter()
        .flatten()
        .map(|c| ToolCall { id: c.id, name: c.function.name, arguments: c.function.arguments })
        .collect();

    Ok(LlmResponse {
        text: message.content.map(|s| s.trim().to_string()).unwrap_or_default(),
        tool_calls,
        usage,
    })
}

// ── Private wire types ────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct WireMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<WireToolCall>,
}

impl From<&Turn> for WireMessage {
    fn from(turn: &Turn) -> Self {
        // An assistant turn that only carries tool calls is sent with a null body.
        let content = if turn.role == Role::Assistant
            && !turn.tool_calls.is_empty()
            && turn.content.is_empty()
        {
            None
        } else {
            Some(turn.content.clone())
        };
        Self {
            role: turn.role.as_str().to_string(),
            content,
            tool_call_id: turn.tool_call_id.clone(),
            tool_calls: turn
                .tool_calls
                .iter()
                .map(|c| WireToolCall {
                    id: c.id.clone(),
                    kind: "function".to_string(),
                    function: WireFunctionCall {
                        name: c.name.clone(),
                        arguments: c.arguments.clone(),
                    },
                })
                .collect(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct WireToolCall {
    id: String,
    #[serde(rename = "type", default = "default_call_type")]
    kind: String,
    function: WireFunctionCall,
}

fn default_call_type() -> String {
    "function".to_string()
}

#[derive(Debug, Serialize, Deserialize)]
struct WireFunctionCall {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Serialize)]
struct WireTool {
    #[serde(rename = "type")]
    kind: &'static str,
    function: WireFunctionDef,
}

impl From<&ToolDefinition> for WireTool {
    fn from(def: &ToolDefinition) -> Self {
        Self {
            kind: "function",
            function: WireFunctionDef {
                name: def.name.clone(),
                description: def.description.clone(),
                parameters: def.parameters.clone(),
            },
        }
    }
}

#[derive(Debug, Serialize)]
struct WireFunctionDef {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_completion_tokens: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<UsageData>,
}

#[derive(Debug, Serialize, Deserialize)]
struct UsageData {
    prompt_tokens: u64,
    completion_tokens: u64,
}

#[derive(Debug, Serialize, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
    // Some compatible servers send `null` instead of omitting the key.
    #[serde(default)]
    tool_calls: Option<Vec<WireToolCall>>,
}

// Error envelope used by OpenAI and compatible APIs.
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
    #[serde(default)]
    code: Option<serde_json::Value>,
}

/// Consume the response and return it if successful, or a structured error.
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<failed to read error body>".to_string());

    let message = error_message(status, &body);
    error!(%status, %message, "LLM request returned HTTP error");
    Err(ProviderError::Request(message))
}

fn error_message(status: reqwest::StatusCode, body: &str) -> String {
    if let Ok(env) = serde_json::from_str::<ErrorEnvelope>(body) {
        let code = env
            .error
            .code
            .map(|v| match v {
                serde_json::Value::String(s) => format!(" [code={s}]"),
                other => format!(" [code={other}]"),
            })
            .unwrap_or_default();
        format!("HTTP {status}{code}: {}", env.error.message)
    } else {
        format!("HTTP {status}: {body}")
    }
}
