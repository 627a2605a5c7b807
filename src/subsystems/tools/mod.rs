//! Tools subsystem: capabilities the model may invoke mid-conversation.
//!
//! The only tool is `web_search`. The model's raw call (name + JSON
//! arguments) is validated into a [`ToolInvocation`] before anything runs;
//! every failure is rendered as text for the tool turn, so a bad call or a
//! dead search backend never aborts the conversation.

pub mod web_search;

use serde::Deserialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::AppError;
use crate::llm::ToolDefinition;
use web_search::{DummySearch, SearchBackend, SerperClient};

pub const WEB_SEARCH: &str = "web_search";

// ── Errors ────────────────────────────────────────────────────────────────────

/// Reasons a tool call produced no result. The `Display` text is what the
/// model sees in the tool turn.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),
    #[error("Invalid arguments for {tool}: {reason}")]
    InvalidArguments { tool: String, reason: String },
    #[error("Search unavailable: web search is not configured")]
    Disabled,
    #[error("Search unavailable: {0}")]
    Search(String),
}

// ── Invocation ────────────────────────────────────────────────────────────────

/// A validated tool call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolInvocation {
    WebSearch { query: String },
}

#[derive(Deserialize)]
struct WebSearchArgs {
    query: String,
}

impl ToolInvocation {
    /// Validate a model-issued call.
    pub fn parse(name: &str, arguments: &str) -> Result<Self, ToolError> {
        match name {
            WEB_SEARCH => {
                let args: WebSearchArgs = serde_json::from_str(arguments).map_err(|e| {
                    ToolError::InvalidArguments { tool: name.to_string(), reason: e.to_string() }
                })?;
                let query = args.query.trim();
                if query.is_empty() {
                    return Err(ToolError::InvalidArguments {
                        tool: name.to_string(),
                        reason: "query must not be empty".into(),
                    });
                }
                Ok(ToolInvocation::WebSearch { query: query.to_string() })
            }
            other => Err(ToolError::UnknownTool(other.to_string())),
        }
    }
}

// ── Executor ──────────────────────────────────────────────────────────────────

/// Runs validated tool calls. Cheap to clone.
#[derive(Debug, Clone, Default)]
pub struct ToolExecutor {
    search: Option<SearchBackend>,
}

impl ToolExecutor {
    /// `None` disables web search: no definitions are offered and any stray
    /// call answers with [`ToolError::Disabled`].
    pub fn new(search: Option<SearchBackend>) -> Self {
        Self { search }
    }

    /// Build the executor from `[tools.web_search]` and `SERPER_API_KEY`.
    pub fn from_config(config: &Config) -> Result<Self, AppError> {
        let ws = &config.tools.web_search;
        if !config.search_enabled() {
            if ws.enabled {
                warn!("web search enabled but SERPER_API_KEY is not set, search disabled");
            }
            return Ok(Self::new(None));
        }

        let backend = match ws.provider.as_str() {
            "serper" => {
                let key = config.secrets.serper_api_key.clone().unwrap_or_default();
                let client = SerperClient::new(
                    ws.api_url.clone(),
                    key,
                    ws.result_count,
                    ws.locale.clone(),
                    ws.language.clone(),
                    ws.timeout_seconds,
                )
                .map_err(|e| AppError::Config(e.to_string()))?;
                SearchBackend::Serper(client)
            }
            "dummy" => SearchBackend::Dummy(DummySearch::new()),
            other => {
                return Err(AppError::Config(format!("unknown web search provider: {other}")));
            }
        };

        info!(provider = %ws.provider, "web search enabled");
        Ok(Self::new(Some(backend)))
    }

    pub fn search_enabled(&self) -> bool {
        self.search.is_some()
    }

    /// Tool definitions to offer the model; empty when search is off.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        if self.search_enabled() {
            vec![web_search::definition()]
        } else {
            Vec::new()
        }
    }

    /// Execute one call. Never fails: errors come back as descriptive text.
    pub async fn execute(&self, name: &str, arguments: &str) -> String {
        match self.try_execute(name, arguments).await {
            Ok(text) => text,
            Err(e) => {
                warn!(tool = name, error = %e, "tool call failed");
                e.to_string()
            }
        }
    }

    async fn try_execute(&self, name: &str, arguments: &str) -> Result<String, ToolError> {
        match ToolInvocation::parse(name, arguments)? {
            ToolInvocation::WebSearch { query } => {
                let backend = self.search.as_ref().ok_or(ToolError::Disabled)?;
                info!(%query, "web search");
                let result = backend.search(&query).await?;
                info!(chars = result.chars().count(), "web search returned");
                Ok(result)
            }
        }
    }
}
