//! Dummy LLM provider: echoes the last user message back prefixed with `[echo]`.
//! Used for running the console channel end-to-end without an API key.

use crate::llm::{LlmResponse, ProviderError, Role, ToolDefinition, Turn};

#[derive(Debug, Clone)]
pub struct DummyProvider;

impl DummyProvider {
    pub async fn complete(
        &self,
        messages: &[Turn],
        _tools: &[ToolDefinition],
    ) -> Result<LlmResponse, ProviderError> {
        let last_user = messages
            .iter()
            .rev()
            .find(|t| t.role == Role::User)
            .map(|t| t.content.as_str())
            .unwrap_or_default();
        Ok(LlmResponse::text(format!("[echo] {last_user}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn complete_echoes_last_user_turn() {
        let p = DummyProvider;
        let msgs = vec![Turn::system("sys"), Turn::user("first"), Turn::assistant("a"), Turn::user("hello")];
        assert_eq!(p.complete(&msgs, &[]).await.unwrap().text, "[echo] hello");
    }

    #[tokio::test]
    async fn complete_without_user_turn() {
        let p = DummyProvider;
        assert_eq!(p.complete(&[Turn::system("sys")], &[]).await.unwrap().text, "[echo] ");
    }

    #[tokio::test]
    async fn complete_never_requests_tools() {
        let p = DummyProvider;
        let r = p.complete(&[Turn::user("x")], &[]).await.unwrap();
        assert!(!r.wants_tools());
        assert!(r.usage.is_none());
    }
}
