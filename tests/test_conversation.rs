//! End-to-end conversations through the router with scripted backends:
//! no network, no ffmpeg.

use std::sync::Arc;

use wedding_bot::llm::providers::scripted::ScriptedProvider;
use wedding_bot::llm::{LlmProvider, LlmResponse, Role, ToolCall};
use wedding_bot::subsystems::agents::Orchestrator;
use wedding_bot::subsystems::comms::Router;
use wedding_bot::subsystems::comms::router::{Disposition, InboundEvent, MessageKind, FALLBACK_MESSAGE};
use wedding_bot::subsystems::comms::transport::{Outbound, RecordingTransport, Transport};
use wedding_bot::subsystems::tools::ToolExecutor;
use wedding_bot::subsystems::tools::web_search::{DummySearch, SearchBackend};
use wedding_bot::subsystems::voice::{DummyVoice, VoicePipeline};

const READY: i64 = 1_783_000_000;
const GUEST: &str = "919800000001";

struct Harness {
    llm: ScriptedProvider,
    search: DummySearch,
    voice: DummyVoice,
    router: Router,
}

fn harness(search: DummySearch, voice: DummyVoice) -> Harness {
    let llm = ScriptedProvider::new();
    let orchestrator = Orchestrator::new(
        LlmProvider::Scripted(llm.clone()),
        ToolExecutor::new(Some(SearchBackend::Dummy(search.clone()))),
        "You are SuSh.",
        8,
        4,
    );
    let router = Router::new(Arc::new(orchestrator), VoicePipeline::Dummy(voice.clone()));
    router.ready().mark_ready_at(READY);
    Harness { llm, search, voice, router }
}

fn text_from(from: &str, id: &str, body: &str) -> InboundEvent {
    InboundEvent {
        message_id: id.into(),
        from: from.into(),
        kind: MessageKind::Text,
        body: body.into(),
        timestamp: READY + 10,
        is_group: false,
        media_id: None,
    }
}

fn texts(rec: &RecordingTransport) -> Vec<String> {
    rec.replies()
        .into_iter()
        .filter_map(|o| match o {
            Outbound::Text { text, .. } => Some(text),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn hinglish_question_gets_clean_reply() {
    let h = harness(DummySearch::new(), DummyVoice::new());
    h.llm.push(LlmResponse::text(
        "## Sangeet\n**Sangeet** *raat 8 baje* hai Convergence Ballroom mein! 🎶\n---",
    ));
    let rec = RecordingTransport::new();

    let d = h.router.handle(text_from(GUEST, "wamid.1", "Sangeet kab hai?"), &Transport::Recording(rec.clone())).await;

    assert_eq!(d, Disposition::Text("Sangeet kab hai?".into()));
    assert_eq!(
        rec.replies(),
        vec![Outbound::Text {
            to: GUEST.into(),
            text: "Sangeet\n*Sangeet* *raat 8 baje* hai Convergence Ballroom mein! 🎶\n━━━━━━".into(),
            reply_to: Some("wamid.1".into()),
        }]
    );

    // First contact: just the system prompt and the question.
    assert_eq!(h.llm.requests()[0].messages.len(), 2);

    let history = h.router.orchestrator().history().get(GUEST);
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].role, Role::User);
    assert_eq!(history[0].content, "Sangeet kab hai?");
    assert!(!history[1].content.contains("**"));
}

#[tokio::test]
async fn search_round_feeds_result_back() {
    let h = harness(DummySearch::with_answer("Jaipur Airport: 25 min drive, 12 km"), DummyVoice::new());
    h.llm.push(LlmResponse::tool_calls(vec![ToolCall {
        id: "call_1".into(),
        name: "web_search".into(),
        arguments: r#"{"query":"Jaipur airport to InterContinental Jaipur distance"}"#.into(),
    }]));
    h.llm.push(LlmResponse::text("Airport se hotel sirf *25 min* hai! ✈️"));
    let rec = RecordingTransport::new();

    h.router
        .handle(text_from(GUEST, "wamid.2", "airport se hotel kitna time?"), &Transport::Recording(rec.clone()))
        .await;

    assert_eq!(texts(&rec), vec!["Airport se hotel sirf *25 min* hai! ✈️".to_string()]);
    assert_eq!(h.search.queries(), vec!["Jaipur airport to InterContinental Jaipur distance".to_string()]);

    let requests = h.llm.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].tools.len(), 1);
    let tool_turn = requests[1].messages.last().unwrap();
    assert_eq!(tool_turn.role, Role::Tool);
    assert_eq!(tool_turn.tool_call_id.as_deref(), Some("call_1"));
    assert!(tool_turn.content.contains("25 min"));

    // Only the user message and the final reply are remembered.
    assert_eq!(h.router.orchestrator().history().len(GUEST), 2);
}

#[tokio::test]
async fn long_conversation_keeps_recent_pairs() {
    let h = harness(DummySearch::new(), DummyVoice::new());
    let rec = RecordingTransport::new();
    let transport = Transport::Recording(rec.clone());

    for i in 0..20 {
        h.llm.push(LlmResponse::text(format!("answer {i}")));
        h.router.handle(text_from(GUEST, &format!("wamid.{i}"), &format!("question {i}")), &transport).await;
    }

    let history = h.router.orchestrator().history().get(GUEST);
    assert_eq!(history.len(), 16);
    assert_eq!(history[0].content, "question 12");
    assert_eq!(history[15].content, "answer 19");

    // The 20th request carried the system prompt plus 8 remembered pairs.
    let last = h.llm.requests().pop().unwrap();
    assert_eq!(last.messages.len(), 1 + 16 + 1);
}

#[tokio::test]
async fn guests_do_not_share_history() {
    let h = harness(DummySearch::new(), DummyVoice::new());
    let transport = Transport::Recording(RecordingTransport::new());
    h.llm.push(LlmResponse::text("Hi Asha!"));
    h.llm.push(LlmResponse::text("Hi Ravi!"));

    h.router.handle(text_from("911", "a", "Main Asha hoon"), &transport).await;
    h.router.handle(text_from("912", "b", "I'm Ravi"), &transport).await;

    let second = &h.llm.requests()[1];
    assert!(second.messages.iter().all(|t| !t.content.contains("Asha")));
    assert_eq!(h.router.orchestrator().history().user_count(), 2);
}

#[tokio::test]
async fn provider_failure_sends_fallback_and_keeps_history_clean() {
    let h = harness(DummySearch::new(), DummyVoice::new());
    h.llm.push_error("HTTP 500");
    let rec = RecordingTransport::new();

    h.router.handle(text_from(GUEST, "wamid.9", "Baraat kab hai?"), &Transport::Recording(rec.clone())).await;

    assert_eq!(texts(&rec), vec![FALLBACK_MESSAGE.to_string()]);
    assert_eq!(h.router.orchestrator().history().len(GUEST), 0);
}

#[tokio::test]
async fn voice_note_round_trip() {
    let h = harness(DummySearch::new(), DummyVoice::new().with_transcript("Pheras kitne baje hain?"));
    h.llm.push(LlmResponse::text("Pheras *raat 2 baje* Atlantiis Jaipur mein hain 🔥"));
    let rec = RecordingTransport::new().with_media(b"OggS-voice".to_vec(), "audio/ogg; codecs=opus");

    let mut event = text_from(GUEST, "wamid.v", "");
    event.kind = MessageKind::Voice;
    event.media_id = Some("media-1".into());
    let d = h.router.handle(event, &Transport::Recording(rec.clone())).await;

    assert_eq!(d, Disposition::Voice);
    match rec.replies().as_slice() {
        [Outbound::Voice { to, bytes, reply_to }] => {
            assert_eq!(to, GUEST);
            assert!(bytes.starts_with(b"OggS"));
            assert_eq!(reply_to.as_deref(), Some("wamid.v"));
        }
        other => panic!("expected one voice reply, got {other:?}"),
    }
    assert_eq!(h.voice.spoken(), vec!["Pheras *raat 2 baje* Atlantiis Jaipur mein hain 🔥".to_string()]);
    assert_eq!(h.router.orchestrator().history().get(GUEST)[0].content, "Pheras kitne baje hain?");
}

#[tokio::test]
async fn backlog_and_groups_are_ignored() {
    let h = harness(DummySearch::new(), DummyVoice::new());
    let rec = RecordingTransport::new();
    let transport = Transport::Recording(rec.clone());

    let mut old = text_from(GUEST, "old", "hello?");
    old.timestamp = READY - 60;
    let mut group = text_from(GUEST, "grp", "hello all");
    group.is_group = true;

    assert!(matches!(h.router.handle(old, &transport).await, Disposition::Ignore(_)));
    assert!(matches!(h.router.handle(group, &transport).await, Disposition::Ignore(_)));
    assert!(rec.sent().is_empty());
    assert_eq!(h.llm.call_count(), 0);
}
