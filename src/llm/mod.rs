//! LLM provider abstraction.
//!
//! `LlmProvider` is an enum over concrete provider implementations.
//! Add a new variant + module in `providers/` for each additional backend.
//!
//! Provider instances are shared immutable capabilities: clone them freely.
//! Async is delegated to the underlying provider; the `complete` method is
//! `async fn` on the enum so callers need no trait-object machinery.
//!
//! The conversation types ([`Turn`], [`ToolCall`], [`ToolDefinition`]) are
//! provider-neutral. Each provider maps them onto its own wire format.

pub mod providers;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ── Error ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("unknown provider: {0}")]
    UnknownProvider(String),
    #[error("provider request failed: {0}")]
    Request(String),
}

// ── Conversation types ────────────────────────────────────────────────────────

/// Author of a [`Turn`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A tool invocation requested by the model.
///
/// `arguments` is the raw JSON text exactly as the model produced it; it is
/// validated by the tools subsystem, never here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

/// One message of a conversation exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    pub role: Role,
    pub content: String,
    /// Set on `Tool` turns: the id of the call this result answers.
    pub tool_call_id: Option<String>,
    /// Set on `Assistant` turns that requested tools.
    pub tool_calls: Vec<ToolCall>,
}

impl Turn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self { role, content: content.into(), tool_call_id: None, tool_calls: Vec::new() }
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

    /// Assistant turn carrying the tool calls the model asked for.
    pub fn assistant_tool_calls(content: impl Into<String>, calls: Vec<ToolCall>) -> Self {
        Self { tool_calls: calls, ..Self::new(Role::Assistant, content) }
    }

    /// Tool result correlated to `call_id`.
    pub fn tool(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self { tool_call_id: Some(call_id.into()), ..Self::new(Role::Tool, content) }
    }
}

/// Function-calling tool offered to the model.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON schema of the arguments object.
    pub parameters: serde_json::Value,
}

// ── Response ──────────────────────────────────────────────────────────────────

/// Token counts reported by the provider, when available.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LlmUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// One completion round.
///
/// `text` is empty when the model answered with tool calls only (or with
/// nothing at all); callers decide what an empty answer means.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LlmResponse {
    pub text: String,
    pub tool_calls: Vec<ToolCall>,
    pub usage: Option<LlmUsage>,
}

impl LlmResponse {
    pub fn text(text: impl Into<String>) -> Self {
        Self { text: text.into(), ..Self::default() }
    }

    pub fn tool_calls(calls: Vec<ToolCall>) -> Self {
        Self { tool_calls: calls, ..Self::default() }
    }

    pub fn wants_tools(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

// ── Provider enum ─────────────────────────────────────────────────────────────

/// All available provider backends.
///
/// Enum dispatch avoids `dyn` trait objects and the `async-trait` dependency.
/// Adding a backend = new module + new variant + new `complete` arm.
#[derive(Debug, Clone)]
pub enum LlmProvider {
    Dummy(providers::dummy::DummyProvider),
    OpenAiCompatible(providers::openai_compatible::OpenAiCompatibleProvider),
    #[cfg(any(test, feature = "test-util"))]
    Scripted(providers::scripted::ScriptedProvider),
}

impl LlmProvider {
    /// Run one completion round over `messages`.
    ///
    /// `tools` may be empty, in which case no tool definitions are sent.
    pub async fn complete(
        &self,
        messages: &[Turn],
        tools: &[ToolDefinition],
    ) -> Result<LlmResponse, ProviderError> {
        match self {
            LlmProvider::Dummy(p) => p.complete(messages, tools).await,
            LlmProvider::OpenAiCompatible(p) => p.complete(messages, tools).await,
            #[cfg(any(test, feature = "test-util"))]
            LlmProvider::Scripted(p) => p.complete(messages, tools).await,
        }
    }

    /// Reachability probe. Offline providers are always reachable.
    pub async fn ping(&self) -> Result<(), ProviderError> {
        match self {
            LlmProvider::OpenAiCompatible(p) => p.ping().await,
            LlmProvider::Dummy(_) => Ok(()),
            #[cfg(any(test, feature = "test-util"))]
            LlmProvider::Scripted(_) => Ok(()),
        }
    }

    /// Model name for log lines.
    pub fn model(&self) -> &str {
        match self {
            LlmProvider::Dummy(_) => "dummy",
            LlmProvider::OpenAiCompatible(p) => p.model(),
            #[cfg(any(test, feature = "test-util"))]
            LlmProvider::Scripted(_) => "scripted",
        }
    }
}
