//! Scripted LLM provider: replays a queue of canned responses and records
//! every request it receives.
//!
//! Lets tests drive the orchestrator through tool-call rounds without a
//! network. Clones share the same script and request log.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::llm::{LlmResponse, ProviderError, ToolDefinition, Turn};

/// Snapshot of one `complete` call.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub messages: Vec<Turn>,
    pub tools: Vec<ToolDefinition>,
}

#[derive(Debug, Clone, Default)]
pub struct ScriptedProvider {
    script: Arc<Mutex<VecDeque<Result<LlmResponse, String>>>>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful response.
    pub fn push(&self, response: LlmResponse) -> &Self {
        lock(&self.script).push_back(Ok(response));
        self
    }

    /// Queue a provider failure.
    pub fn push_error(&self, message: impl Into<String>) -> &Self {
        lock(&self.script).push_back(Err(message.into()));
        self
    }

    /// Every request seen so far, oldest first.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        lock(&self.requests).clone()
    }

    pub fn call_count(&self) -> usize {
        lock(&self.requests).len()
    }

    pub async fn complete(
        &self,
        messages: &[Turn],
        tools: &[ToolDefinition],
    ) -> Result<LlmResponse, ProviderError> {
        lock(&self.requests).push(RecordedRequest {
            messages: messages.to_vec(),
            tools: tools.to_vec(),
        });
        match lock(&self.script).pop_front() {
            Some(Ok(response)) => Ok(response),
            Some(Err(message)) => Err(ProviderError::Request(message)),
            None => Err(ProviderError::Request("script exhausted".into())),
        }
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn replays_in_order_then_exhausts() {
        let p = ScriptedProvider::new();
        p.push(LlmResponse::text("one")).push_error("boom");

        assert_eq!(p.complete(&[Turn::user("a")], &[]).await.unwrap().text, "one");
        assert!(p.complete(&[Turn::user("b")], &[]).await.is_err());
        let err = p.complete(&[Turn::user("c")], &[]).await.unwrap_err();
        assert!(err.to_string().contains("script exhausted"));
        assert_eq!(p.call_count(), 3);
    }

    #[tokio::test]
    async fn clones_share_log() {
        let p = ScriptedProvider::new();
        let q = p.clone();
        q.push(LlmResponse::text("x"));
        p.complete(&[Turn::user("hi")], &[]).await.unwrap();
        assert_eq!(q.requests()[0].messages[0].content, "hi");
    }
}
