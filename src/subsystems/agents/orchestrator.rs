//! Conversation orchestrator: one guest message in, one sanitized reply out.
//!
//! Each request builds a throwaway exchange `[system, ...history, user]`,
//! runs the model through at most `max_tool_rounds` tool-call rounds, and
//! persists only the user message and the final reply.
//!
//! ```text
//! AwaitingModel ──text──────────────▶ Done
//!      │  ▲
//! tool │  │ results appended
//! calls▼  │
//! ExecutingTools ──cap reached──────▶ RoundLimit
//! ```

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::llm::{LlmProvider, LlmResponse, ProviderError, Role, Turn};
use crate::subsystems::memory::{HistoryStore, UserLocks};
use crate::subsystems::tools::ToolExecutor;

use super::sanitize::sanitize;

/// Appended to the reply when the model keeps asking for tools past the cap.
pub const ROUND_LIMIT_NOTE: &str =
    "(I couldn't finish looking that up just now. Please ask again, or check with the family directly 🙏)";

enum LoopState {
    AwaitingModel,
    ExecutingTools(LlmResponse),
    Done(String),
    RoundLimit(String),
}

pub struct Orchestrator {
    llm: LlmProvider,
    tools: ToolExecutor,
    history: HistoryStore,
    locks: UserLocks,
    system_prompt: Arc<str>,
    max_tool_rounds: usize,
}

impl Orchestrator {
    pub fn new(
        llm: LlmProvider,
        tools: ToolExecutor,
        system_prompt: impl Into<Arc<str>>,
        max_history_pairs: usize,
        max_tool_rounds: usize,
    ) -> Self {
        Self {
            llm,
            tools,
            history: HistoryStore::new(max_history_pairs),
            locks: UserLocks::new(),
            system_prompt: system_prompt.into(),
            max_tool_rounds,
        }
    }

    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    pub fn model(&self) -> &str {
        self.llm.model()
    }

    /// Startup reachability check for the model endpoint.
    pub async fn llm_ping(&self) -> Result<(), ProviderError> {
        self.llm.ping().await
    }

    /// Answer `message` from `user_id`.
    ///
    /// Requests from the same user are serialized. An empty string means the
    /// model produced no content; the caller decides what to send instead.
    /// On error nothing is written to history.
    pub async fn respond(&self, user_id: &str, message: &str) -> Result<String, ProviderError> {
        let _guard = self.locks.acquire(user_id).await;

        let history = self.history.get(user_id);
        let mut exchange = Vec::with_capacity(history.len() + 2);
        exchange.push(Turn::system(&*self.system_prompt));
        exchange.extend(history);
        exchange.push(Turn::user(message));

        let tools = self.tools.definitions();
        let mut rounds = 0usize;
        let mut state = LoopState::AwaitingModel;

        let raw = loop {
            state = match state {
                LoopState::AwaitingModel => {
                    // Tools are offered on the first call only.
                    let offered = if rounds == 0 { tools.as_slice() } else { &[] };
                    let response = self.llm.complete(&exchange, offered).await?;
                    if !response.wants_tools() {
                        LoopState::Done(response.text)
                    } else if rounds >= self.max_tool_rounds {
                        LoopState::RoundLimit(response.text)
                    } else {
                        LoopState::ExecutingTools(response)
                    }
                }
                LoopState::ExecutingTools(response) => {
                    rounds += 1;
                    debug!(user_id, round = rounds, calls = response.tool_calls.len(), "executing tool calls");
                    let calls = response.tool_calls.clone();
                    exchange.push(Turn::assistant_tool_calls(response.text, response.tool_calls));
                    for call in calls {
                        let result = self.tools.execute(&call.name, &call.arguments).await;
                        exchange.push(Turn::tool(call.id, result));
                    }
                    LoopState::AwaitingModel
                }
                LoopState::Done(text) => break text,
                LoopState::RoundLimit(partial) => {
                    warn!(user_id, rounds, "tool round limit reached, returning partial reply");
                    break with_round_limit_note(&partial);
                }
            }
        };

        let reply = sanitize(&raw);
        self.history.append(user_id, Role::User, message);
        self.history.append(user_id, Role::Assistant, reply.as_str());

        info!(user_id, rounds, chars = reply.chars().count(), "reply ready");
        Ok(reply)
    }
}

fn with_round_limit_note(partial: &str) -> String {
    let partial = partial.trim();
    if partial.is_empty() {
        ROUND_LIMIT_NOTE.to_string()
    } else {
        format!("{partial}\n\n{ROUND_LIMIT_NOTE}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ToolCall;
    use crate::llm::providers::scripted::ScriptedProvider;
    use crate::subsystems::tools::web_search::{DummySearch, SearchBackend};

    const PROMPT: &str = "You are SuSh, the wedding concierge.";

    fn search_call(id: &str, query: &str) -> ToolCall {
        ToolCall {
            id: id.into(),
            name: "web_search".into(),
            arguments: serde_json::json!({ "query": query }).to_string(),
        }
    }

    fn orchestrator(script: &ScriptedProvider, search: Option<DummySearch>, rounds: usize) -> Orchestrator {
        Orchestrator::new(
            LlmProvider::Scripted(script.clone()),
            ToolExecutor::new(search.map(SearchBackend::Dummy)),
            PROMPT,
            8,
            rounds,
        )
    }

    #[tokio::test]
    async fn plain_answer_without_tools() {
        let script = ScriptedProvider::new();
        script.push(LlmResponse::text("Sangeet *raat 8 baje* hai Convergence Ballroom mein! 🎶"));
        let orch = orchestrator(&script, None, 4);

        let reply = orch.respond("919800000001", "Sangeet kab hai?").await.unwrap();
        assert_eq!(reply, "Sangeet *raat 8 baje* hai Convergence Ballroom mein! 🎶");

        let requests = script.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].messages.len(), 2);
        assert_eq!(requests[0].messages[0].role, Role::System);
        assert_eq!(requests[0].messages[0].content, PROMPT);
        assert_eq!(requests[0].messages[1].content, "Sangeet kab hai?");
        assert!(requests[0].tools.is_empty());

        let history = orch.history().get("919800000001");
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, Role::User);
        assert_eq!(history[1].content, reply);
    }

    #[tokio::test]
    async fn tool_round_then_answer() {
        let script = ScriptedProvider::new();
        script
            .push(LlmResponse::tool_calls(vec![search_call("call_1", "Jaipur airport to Sitapura distance")]))
            .push(LlmResponse::text("It's about **25 km** from the airport 🚗"));
        let search = DummySearch::with_answer("Answer: 25 km");
        let orch = orchestrator(&script, Some(search.clone()), 4);

        let reply = orch.respond("u", "Airport se kitna door hai?").await.unwrap();
        assert_eq!(reply, "It's about *25 km* from the airport 🚗");
        assert_eq!(search.queries(), vec!["Jaipur airport to Sitapura distance".to_string()]);

        let requests = script.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].tools.len(), 1);
        assert!(requests[1].tools.is_empty());

        let second = &requests[1].messages;
        assert_eq!(second.len(), 4);
        assert_eq!(second[2].role, Role::Assistant);
        assert_eq!(second[2].tool_calls.len(), 1);
        assert_eq!(second[3].role, Role::Tool);
        assert_eq!(second[3].tool_call_id.as_deref(), Some("call_1"));
        assert_eq!(second[3].content, "Answer: 25 km");

        assert_eq!(orch.history().len("u"), 2);
    }

    #[tokio::test]
    async fn one_tool_turn_per_call() {
        let script = ScriptedProvider::new();
        script
            .push(LlmResponse::tool_calls(vec![
                search_call("a", "salons Sitapura Tonk Road Jaipur 302022"),
                search_call("b", "pharmacy Sitapura Tonk Road Jaipur 302022"),
            ]))
            .push(LlmResponse::text("Here you go"));
        let search = DummySearch::with_answer("result");
        let orch = orchestrator(&script, Some(search.clone()), 4);

        orch.respond("u", "salon and chemist nearby?").await.unwrap();
        assert_eq!(search.queries().len(), 2);

        let second = &script.requests()[1].messages;
        let ids: Vec<_> = second
            .iter()
            .filter(|t| t.role == Role::Tool)
            .map(|t| t.tool_call_id.clone().unwrap())
            .collect();
        assert_eq!(ids, vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn failing_tool_still_answers() {
        let script = ScriptedProvider::new();
        script
            .push(LlmResponse::tool_calls(vec![search_call("c1", "weather Jaipur")]))
            .push(LlmResponse::text("Couldn't check live weather, but July is warm and humid."));
        let orch = orchestrator(&script, Some(DummySearch::failing("HTTP 503")), 4);

        let reply = orch.respond("u", "weather?").await.unwrap();
        assert!(reply.starts_with("Couldn't check"));

        let tool_turn = &script.requests()[1].messages[3];
        assert_eq!(tool_turn.role, Role::Tool);
        assert!(!tool_turn.content.is_empty());
        assert!(tool_turn.content.contains("Search unavailable"));
    }

    #[tokio::test]
    async fn stray_call_with_search_disabled() {
        let script = ScriptedProvider::new();
        script
            .push(LlmResponse::tool_calls(vec![search_call("c1", "x")]))
            .push(LlmResponse::text("ok"));
        let orch = orchestrator(&script, None, 4);

        assert_eq!(orch.respond("u", "x").await.unwrap(), "ok");
        let tool_turn = &script.requests()[1].messages[3];
        assert!(tool_turn.content.starts_with("Search unavailable"));
    }

    #[tokio::test]
    async fn round_limit_returns_partial_with_note() {
        let script = ScriptedProvider::new();
        script
            .push(LlmResponse::tool_calls(vec![search_call("r1", "a")]))
            .push(LlmResponse {
                text: "The venue is on **Tonk Road**.".into(),
                tool_calls: vec![search_call("r2", "b")],
                usage: None,
            });
        let orch = orchestrator(&script, Some(DummySearch::new()), 1);

        let reply = orch.respond("u", "where?").await.unwrap();
        assert_eq!(reply, format!("The venue is on *Tonk Road*.\n\n{ROUND_LIMIT_NOTE}"));
        assert_eq!(script.call_count(), 2);
        assert_eq!(orch.history().len("u"), 2);
    }

    #[tokio::test]
    async fn round_limit_without_text_is_note_only() {
        let script = ScriptedProvider::new();
        script
            .push(LlmResponse::tool_calls(vec![search_call("r1", "a")]))
            .push(LlmResponse::tool_calls(vec![search_call("r2", "b")]));
        let orch = orchestrator(&script, Some(DummySearch::new()), 1);
        assert_eq!(orch.respond("u", "q").await.unwrap(), ROUND_LIMIT_NOTE);
    }

    #[tokio::test]
    async fn provider_error_persists_nothing() {
        let script = ScriptedProvider::new();
        script.push_error("HTTP 500");
        let orch = orchestrator(&script, None, 4);

        assert!(orch.respond("u", "hi").await.is_err());
        assert_eq!(orch.history().len("u"), 0);
    }

    #[tokio::test]
    async fn empty_content_is_empty_reply() {
        let script = ScriptedProvider::new();
        script.push(LlmResponse::text("   "));
        let orch = orchestrator(&script, None, 4);
        assert_eq!(orch.respond("u", "hi").await.unwrap(), "");
    }

    #[tokio::test]
    async fn history_feeds_next_request() {
        let script = ScriptedProvider::new();
        script.push(LlmResponse::text("first")).push(LlmResponse::text("second"));
        let orch = orchestrator(&script, None, 4);

        orch.respond("u", "one").await.unwrap();
        orch.respond("u", "two").await.unwrap();

        let msgs = &script.requests()[1].messages;
        let contents: Vec<_> = msgs.iter().map(|t| t.content.as_str()).collect();
        assert_eq!(contents, vec![PROMPT, "one", "first", "two"]);
    }
}
