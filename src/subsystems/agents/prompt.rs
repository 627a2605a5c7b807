//! Layered system prompt for the concierge.
//!
//! The prompt is assembled from plain-text fragments stored under
//! `config/prompts/`. Each layer is appended in order; missing optional
//! files are skipped so deployments can drop a layer by deleting it.
//!
//! ## Layer ordering
//!
//! ```text
//! 0. persona.md        : who the bot is, language mirroring, ground rules
//! 1. formatting.md     : WhatsApp markup rules
//! 2. knowledge_base.md : every verified wedding fact (required)
//! 3. web_search.md     : when and how to search; only with search enabled
//! ```
//!
//! Variable substitution uses `{{key}}` syntax and is applied once at
//! [`build()`](PromptBuilder::build) time, after all layers are joined.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::AppError;
use crate::subsystems::tools::WEB_SEARCH;

const SEPARATOR: &str = "\n\n";

pub const PERSONA: &str = "persona.md";
pub const FORMATTING: &str = "formatting.md";
pub const KNOWLEDGE_BASE: &str = "knowledge_base.md";
pub const WEB_SEARCH_GUIDE: &str = "web_search.md";

/// Fluent builder that assembles a layered prompt from template files.
pub struct PromptBuilder {
    prompts_dir: PathBuf,
    parts: Vec<String>,
    vars: HashMap<String, String>,
}

impl PromptBuilder {
    /// Create a builder rooted at `prompts_dir` (e.g. `"config/prompts"`).
    pub fn new(prompts_dir: impl Into<PathBuf>) -> Self {
        Self {
            prompts_dir: prompts_dir.into(),
            parts: Vec::new(),
            vars: HashMap::new(),
        }
    }

    /// Append a layer by loading `filename` from the prompts directory.
    /// Silently skips the layer when the file does not exist.
    pub fn layer(mut self, filename: &str) -> Self {
        let path = self.prompts_dir.join(filename);
        match fs::read_to_string(&path) {
            Ok(text) => self.push(text),
            Err(_) => {
                tracing::debug!("prompt: layer '{}' not found, skipped", path.display());
            }
        }
        self
    }

    /// Like [`layer`](Self::layer) but a missing or empty file is an error.
    pub fn required_layer(mut self, filename: &str) -> Result<Self, AppError> {
        let path = self.prompts_dir.join(filename);
        let text = fs::read_to_string(&path)
            .map_err(|e| AppError::Config(format!("cannot read prompt {}: {e}", path.display())))?;
        if text.trim().is_empty() {
            return Err(AppError::Config(format!("prompt {} is empty", path.display())));
        }
        self.push(text);
        Ok(self)
    }

    /// Append `filename` only when `condition` holds.
    pub fn layer_if(self, condition: bool, filename: &str) -> Self {
        if condition { self.layer(filename) } else { self }
    }

    /// Directly append a text fragment.
    pub fn append(mut self, text: impl Into<String>) -> Self {
        self.push(text.into());
        self
    }

    /// Register a single `{{key}}` → `value` substitution applied at build time.
    pub fn var(mut self, key: &str, value: impl Into<String>) -> Self {
        self.vars.insert(key.to_string(), value.into());
        self
    }

    /// Assemble all layers, join with blank lines, and apply variable substitution.
    pub fn build(self) -> String {
        let mut prompt = self.parts.join(SEPARATOR);
        for (k, v) in &self.vars {
            let placeholder = format!("{{{{{}}}}}", k);
            prompt = prompt.replace(&placeholder, v);
        }
        prompt
    }

    fn push(&mut self, text: String) {
        let trimmed = text.trim();
        if !trimmed.is_empty() {
            self.parts.push(trimmed.to_string());
        }
    }
}

/// Build the concierge system prompt once at startup.
///
/// The knowledge base is mandatory; the search guide is included only when
/// the `web_search` tool will actually be offered.
pub fn system_prompt(prompts_dir: impl AsRef<Path>, search_enabled: bool) -> Result<String, AppError> {
    let prompt = PromptBuilder::new(prompts_dir.as_ref())
        .layer(PERSONA)
        .layer(FORMATTING)
        .required_layer(KNOWLEDGE_BASE)?
        .layer_if(search_enabled, WEB_SEARCH_GUIDE)
        .var("search_tool", WEB_SEARCH)
        .build();
    Ok(prompt)
}
