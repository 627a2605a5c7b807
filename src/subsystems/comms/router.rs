//! Message router: decides what, if anything, to do with an inbound event.
//!
//! Filters run in a fixed order (group, status broadcast, backlog, empty
//! text) and the survivors go to the text, voice or unsupported-media
//! handler. Each handled event gets exactly one reply.

use std::sync::{Arc, OnceLock};

use tracing::{debug, info, warn};

use crate::subsystems::agents::Orchestrator;
use crate::subsystems::voice::{VoiceError, VoicePipeline};

use super::transport::Transport;

pub const STATUS_BROADCAST: &str = "status@broadcast";

pub const FALLBACK_MESSAGE: &str = "🙏 So sorry, I ran into a small hiccup! Please try again in a moment, \
or contact the family directly for urgent queries. 😊";

pub const DOWNLOAD_FAILED_MESSAGE: &str = "Hmm, I couldn't download your voice note 🙈 Please try again!";

pub const NOT_UNDERSTOOD_MESSAGE: &str =
    "I couldn't make that out clearly 🙈\n\nCould you try again, or type your question instead?";

pub const VOICE_REPLY_FAILED_NOTE: &str = "(I couldn't record a voice reply this time, so here it is in text 🙏)";

// ── Events ────────────────────────────────────────────────────────────────────

/// What the guest sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageKind {
    Text,
    Voice,
    Image,
    Video,
    Document,
    Sticker,
    Other(String),
}

impl MessageKind {
    /// Map a transport type tag. Accepts both WhatsApp Web (`chat`, `ptt`)
    /// and Cloud API (`text`, `audio`) names.
    pub fn from_wire(kind: &str) -> Self {
        match kind {
            "chat" | "text" => MessageKind::Text,
            "ptt" | "audio" | "voice" => MessageKind::Voice,
            "image" => MessageKind::Image,
            "video" => MessageKind::Video,
            "document" => MessageKind::Document,
            "sticker" => MessageKind::Sticker,
            other => MessageKind::Other(other.to_string()),
        }
    }
}

/// A normalised inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundEvent {
    pub message_id: String,
    /// Sender id; doubles as the conversation key.
    pub from: String,
    pub kind: MessageKind,
    pub body: String,
    /// Unix seconds as reported by the transport.
    pub timestamp: i64,
    pub is_group: bool,
    pub media_id: Option<String>,
}

// ── Ready clock ───────────────────────────────────────────────────────────────

/// Instant the bot became ready, in Unix seconds. Set once.
#[derive(Debug, Default)]
pub struct ReadyClock {
    at: OnceLock<i64>,
}

impl ReadyClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record now as the ready instant. Later calls keep the first value.
    pub fn mark_ready(&self) -> i64 {
        *self.at.get_or_init(|| chrono::Utc::now().timestamp())
    }

    /// Record an explicit instant (tests, replays).
    pub fn mark_ready_at(&self, unix_secs: i64) -> i64 {
        *self.at.get_or_init(|| unix_secs)
    }

    pub fn ready_at(&self) -> Option<i64> {
        self.at.get().copied()
    }
}

// ── Classification ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    Group,
    StatusBroadcast,
    NotReady,
    Backlog,
    EmptyText,
    UnhandledKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// Text handler, with the trimmed body.
    Text(String),
    Voice,
    /// Friendly decline naming the media.
    Unsupported(&'static str),
    Ignore(IgnoreReason),
}

fn media_label(kind: &MessageKind) -> Option<&'static str> {
    match kind {
        MessageKind::Image => Some("image 📸"),
        MessageKind::Video => Some("video 🎥"),
        MessageKind::Document => Some("document 📄"),
        MessageKind::Sticker => Some("sticker 😄"),
        _ => None,
    }
}

/// Pure routing decision for `event`.
///
/// Backlog compares whole seconds: the transport timestamp has no finer
/// resolution, so a message from the ready second itself is answered.
pub fn classify(event: &InboundEvent, ready_at: Option<i64>) -> Disposition {
    if event.is_group {
        return Disposition::Ignore(IgnoreReason::Group);
    }
    if event.from == STATUS_BROADCAST {
        return Disposition::Ignore(IgnoreReason::StatusBroadcast);
    }
    let Some(ready_at) = ready_at else {
        return Disposition::Ignore(IgnoreReason::NotReady);
    };
    if event.timestamp < ready_at {
        return Disposition::Ignore(IgnoreReason::Backlog);
    }

    if let Some(label) = media_label(&event.kind) {
        return Disposition::Unsupported(label);
    }
    match &event.kind {
        MessageKind::Voice => Disposition::Voice,
        MessageKind::Text => {
            let text = event.body.trim();
            if text.is_empty() {
                Disposition::Ignore(IgnoreReason::EmptyText)
            } else {
                Disposition::Text(text.to_string())
            }
        }
        _ => Disposition::Ignore(IgnoreReason::UnhandledKind),
    }
}

pub fn unsupported_media_message(label: &str) -> String {
    format!(
        "I can see you sent a {label}!\n\n\
         I can only read *text messages* and listen to *voice notes* for now.\n\n\
         Try typing your question, or record a voice note and I'll respond with one! 🎙️"
    )
}

// ── Router ────────────────────────────────────────────────────────────────────

/// Shared by every channel as `Arc<Router>`.
pub struct Router {
    orchestrator: Arc<Orchestrator>,
    voice: VoicePipeline,
    ready: ReadyClock,
}

impl Router {
    pub fn new(orchestrator: Arc<Orchestrator>, voice: VoicePipeline) -> Self {
        Self { orchestrator, voice, ready: ReadyClock::new() }
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    pub fn ready(&self) -> &ReadyClock {
        &self.ready
    }

    /// Classify and handle one event, replying through `transport`.
    pub async fn handle(&self, event: InboundEvent, transport: &Transport) -> Disposition {
        let disposition = classify(&event, self.ready.ready_at());
        match &disposition {
            Disposition::Ignore(reason) => {
                debug!(from = %event.from, message_id = %event.message_id, ?reason, "event ignored");
            }
            Disposition::Text(text) => self.handle_text(&event, text, transport).await,
            Disposition::Voice => self.handle_voice(&event, transport).await,
            Disposition::Unsupported(label) => {
                info!(user_id = %event.from, kind = ?event.kind, "unsupported media");
                let text = unsupported_media_message(label);
                self.reply_text(&event, &text, transport).await;
            }
        }
        disposition
    }

    async fn handle_text(&self, event: &InboundEvent, text: &str, transport: &Transport) {
        let user_id = event.from.as_str();
        info!(user_id, chars = text.chars().count(), "text message");
        self.typing(event, transport).await;

        let reply = match self.orchestrator.respond(user_id, text).await {
            Ok(reply) if !reply.is_empty() => reply,
            Ok(_) => {
                warn!(user_id, "model returned an empty reply");
                FALLBACK_MESSAGE.to_string()
            }
            Err(e) => {
                warn!(user_id, error = %e, "text handler failed");
                FALLBACK_MESSAGE.to_string()
            }
        };
        self.reply_text(event, &reply, transport).await;
    }

    async fn handle_voice(&self, event: &InboundEvent, transport: &Transport) {
        let user_id = event.from.as_str();
        info!(user_id, "voice note received");
        self.typing(event, transport).await;

        let media = match &event.media_id {
            Some(media_id) => transport.download_media(media_id).await,
            None => Err(crate::error::AppError::Comms("voice event without media id".into())),
        };
        let media = match media {
            Ok(media) if !media.bytes.is_empty() => media,
            Ok(_) => {
                warn!(user_id, "voice note download was empty");
                return self.reply_text(event, DOWNLOAD_FAILED_MESSAGE, transport).await;
            }
            Err(e) => {
                warn!(user_id, error = %e, "voice note download failed");
                return self.reply_text(event, DOWNLOAD_FAILED_MESSAGE, transport).await;
            }
        };

        let transcript = match self.voice.transcribe(media.bytes, &media.mime_type).await {
            Ok(text) => text,
            Err(e) => {
                warn!(user_id, error = %e, "transcription failed");
                return self.reply_text(event, FALLBACK_MESSAGE, transport).await;
            }
        };
        if transcript.chars().filter(|c| !c.is_whitespace()).count() < 2 {
            info!(user_id, "transcript too short");
            return self.reply_text(event, NOT_UNDERSTOOD_MESSAGE, transport).await;
        }
        info!(user_id, transcript = %transcript, "transcribed");

        let reply = match self.orchestrator.respond(user_id, &transcript).await {
            Ok(reply) if !reply.is_empty() => reply,
            Ok(_) => return self.reply_text(event, FALLBACK_MESSAGE, transport).await,
            Err(e) => {
                warn!(user_id, error = %e, "voice handler failed");
                return self.reply_text(event, FALLBACK_MESSAGE, transport).await;
            }
        };

        match self.voice.synthesize(&reply).await {
            Ok(ogg) => {
                let quote = Some(event.message_id.as_str());
                match transport.send_voice(&event.from, ogg, quote).await {
                    Ok(()) => info!(user_id, "voice reply sent"),
                    Err(e) => {
                        warn!(user_id, error = %e, "voice send failed, replying in text");
                        self.reply_text(event, &reply, transport).await;
                    }
                }
            }
            Err(e) => {
                let stage = match e {
                    VoiceError::Transcode(_) => "transcode",
                    _ => "synthesis",
                };
                warn!(user_id, stage, error = %e, "voice reply failed, replying in text");
                let text = format!("{reply}\n\n{VOICE_REPLY_FAILED_NOTE}");
                self.reply_text(event, &text, transport).await;
            }
        }
    }

    async fn typing(&self, event: &InboundEvent, transport: &Transport) {
        if let Err(e) = transport.mark_typing(&event.message_id).await {
            debug!(user_id = %event.from, error = %e, "typing indicator failed");
        }
    }

    async fn reply_text(&self, event: &InboundEvent, text: &str, transport: &Transport) {
        match transport.send_text(&event.from, text, Some(&event.message_id)).await {
            Ok(()) => debug!(user_id = %event.from, "text reply sent"),
            Err(e) => warn!(user_id = %event.from, error = %e, "text reply failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::providers::scripted::ScriptedProvider;
    use crate::llm::{LlmProvider, LlmResponse};
    use crate::subsystems::comms::transport::{Outbound, RecordingTransport};
    use crate::subsystems::tools::ToolExecutor;
    use crate::subsystems::voice::DummyVoice;

    const READY: i64 = 1_780_000_000;

    fn event(kind: MessageKind, body: &str) -> InboundEvent {
        InboundEvent {
            message_id: "wamid.1".into(),
            from: "919800000001".into(),
            kind,
            body: body.into(),
            timestamp: READY + 5,
            is_group: false,
            media_id: Some("media-1".into()),
        }
    }

    fn router(script: &ScriptedProvider, voice: DummyVoice) -> Router {
        let orch = Orchestrator::new(
            LlmProvider::Scripted(script.clone()),
            ToolExecutor::new(None),
            "prompt",
            8,
            4,
        );
        let r = Router::new(Arc::new(orch), VoicePipeline::Dummy(voice));
        r.ready().mark_ready_at(READY);
        r
    }

    fn only_text(rec: &RecordingTransport) -> String {
        match rec.replies().as_slice() {
            [Outbound::Text { text, .. }] => text.clone(),
            other => panic!("expected one text reply, got {other:?}"),
        }
    }

    #[test]
    fn filters_run_in_order() {
        let mut e = event(MessageKind::Text, "hi");
        e.is_group = true;
        e.from = STATUS_BROADCAST.into();
        assert_eq!(classify(&e, Some(READY)), Disposition::Ignore(IgnoreReason::Group));

        e.is_group = false;
        assert_eq!(classify(&e, Some(READY)), Disposition::Ignore(IgnoreReason::StatusBroadcast));

        e.from = "91".into();
        assert_eq!(classify(&e, None), Disposition::Ignore(IgnoreReason::NotReady));

        e.timestamp = READY - 1;
        assert_eq!(classify(&e, Some(READY)), Disposition::Ignore(IgnoreReason::Backlog));

        e.timestamp = READY;
        e.body = "   ".into();
        assert_eq!(classify(&e, Some(READY)), Disposition::Ignore(IgnoreReason::EmptyText));

        e.body = "  Sangeet kab hai? ".into();
        assert_eq!(classify(&e, Some(READY)), Disposition::Text("Sangeet kab hai?".into()));
    }

    #[test]
    fn kinds_map_to_handlers() {
        assert_eq!(classify(&event(MessageKind::from_wire("ptt"), ""), Some(READY)), Disposition::Voice);
        assert_eq!(classify(&event(MessageKind::from_wire("audio"), ""), Some(READY)), Disposition::Voice);
        assert_eq!(
            classify(&event(MessageKind::from_wire("sticker"), ""), Some(READY)),
            Disposition::Unsupported("sticker 😄")
        );
        assert_eq!(
            classify(&event(MessageKind::from_wire("location"), ""), Some(READY)),
            Disposition::Ignore(IgnoreReason::UnhandledKind)
        );
    }

    #[test]
    fn ready_clock_sets_once() {
        let clock = ReadyClock::new();
        assert_eq!(clock.ready_at(), None);
        assert_eq!(clock.mark_ready_at(10), 10);
        assert_eq!(clock.mark_ready_at(20), 10);
        assert_eq!(clock.mark_ready(), 10);
    }

    #[tokio::test]
    async fn text_reply_quotes_original() {
        let script = ScriptedProvider::new();
        script.push(LlmResponse::text("Sangeet *raat 8 baje* hai! 🎶"));
        let r = router(&script, DummyVoice::new());
        let rec = RecordingTransport::new();

        let d = r.handle(event(MessageKind::Text, "Sangeet kab hai?"), &Transport::Recording(rec.clone())).await;
        assert_eq!(d, Disposition::Text("Sangeet kab hai?".into()));

        let sent = rec.sent();
        assert_eq!(sent[0], Outbound::Typing { message_id: "wamid.1".into() });
        assert_eq!(
            sent[1],
            Outbound::Text {
                to: "919800000001".into(),
                text: "Sangeet *raat 8 baje* hai! 🎶".into(),
                reply_to: Some("wamid.1".into()),
            }
        );
    }

    #[tokio::test]
    async fn llm_failure_sends_fallback() {
        let script = ScriptedProvider::new();
        script.push_error("HTTP 500");
        let r = router(&script, DummyVoice::new());
        let rec = RecordingTransport::new();
        r.handle(event(MessageKind::Text, "hi"), &Transport::Recording(rec.clone())).await;
        assert_eq!(only_text(&rec), FALLBACK_MESSAGE);
    }

    #[tokio::test]
    async fn empty_reply_sends_fallback() {
        let script = ScriptedProvider::new();
        script.push(LlmResponse::text(""));
        let r = router(&script, DummyVoice::new());
        let rec = RecordingTransport::new();
        r.handle(event(MessageKind::Text, "hi"), &Transport::Recording(rec.clone())).await;
        assert_eq!(only_text(&rec), FALLBACK_MESSAGE);
    }

    #[tokio::test]
    async fn ignored_event_sends_nothing() {
        let script = ScriptedProvider::new();
        let r = router(&script, DummyVoice::new());
        let rec = RecordingTransport::new();
        let mut e = event(MessageKind::Text, "old");
        e.timestamp = READY - 60;
        r.handle(e, &Transport::Recording(rec.clone())).await;
        assert!(rec.sent().is_empty());
        assert_eq!(script.call_count(), 0);
    }

    #[tokio::test]
    async fn unsupported_media_declines() {
        let script = ScriptedProvider::new();
        let r = router(&script, DummyVoice::new());
        let rec = RecordingTransport::new();
        r.handle(event(MessageKind::Image, ""), &Transport::Recording(rec.clone())).await;
        let text = only_text(&rec);
        assert!(text.starts_with("I can see you sent a image 📸!"));
        assert!(text.contains("*voice notes*"));
    }

    #[tokio::test]
    async fn voice_round_trip() {
        let script = ScriptedProvider::new();
        script.push(LlmResponse::text("Sangeet raat 8 baje hai!"));
        let voice = DummyVoice::new().with_transcript("Sangeet kab hai?");
        let r = router(&script, voice.clone());
        let rec = RecordingTransport::new().with_media(b"OggS-in".to_vec(), "audio/ogg; codecs=opus");

        r.handle(event(MessageKind::Voice, ""), &Transport::Recording(rec.clone())).await;

        assert_eq!(voice.spoken(), vec!["Sangeet raat 8 baje hai!".to_string()]);
        match rec.replies().as_slice() {
            [Outbound::Voice { bytes, reply_to, .. }] => {
                assert!(bytes.starts_with(b"OggS"));
                assert_eq!(reply_to.as_deref(), Some("wamid.1"));
            }
            other => panic!("expected a voice reply, got {other:?}"),
        }
        assert_eq!(r.orchestrator().history().len("919800000001"), 2);
    }

    #[tokio::test]
    async fn voice_download_failure() {
        let script = ScriptedProvider::new();
        let r = router(&script, DummyVoice::new());
        let rec = RecordingTransport::new().failing_media("HTTP 404");
        r.handle(event(MessageKind::Voice, ""), &Transport::Recording(rec.clone())).await;
        assert_eq!(only_text(&rec), DOWNLOAD_FAILED_MESSAGE);
    }

    #[tokio::test]
    async fn voice_transcription_failure_and_short_transcript() {
        let script = ScriptedProvider::new();
        let rec = RecordingTransport::new().with_media(vec![1], "audio/ogg");

        let r = router(&script, DummyVoice::new().failing_transcription("bad audio"));
        r.handle(event(MessageKind::Voice, ""), &Transport::Recording(rec.clone())).await;
        assert_eq!(only_text(&rec), FALLBACK_MESSAGE);

        let rec = RecordingTransport::new().with_media(vec![1], "audio/ogg");
        let r = router(&script, DummyVoice::new().with_transcript(" a "));
        r.handle(event(MessageKind::Voice, ""), &Transport::Recording(rec.clone())).await;
        assert_eq!(only_text(&rec), NOT_UNDERSTOOD_MESSAGE);
        assert_eq!(script.call_count(), 0);
    }

    #[tokio::test]
    async fn synthesis_failure_replies_in_text() {
        let script = ScriptedProvider::new();
        script.push(LlmResponse::text("Haldi is at noon"));
        let voice = DummyVoice::new().with_transcript("Haldi kab hai").failing_synthesis("tts down");
        let r = router(&script, voice);
        let rec = RecordingTransport::new().with_media(vec![1], "audio/ogg");

        r.handle(event(MessageKind::Voice, ""), &Transport::Recording(rec.clone())).await;
        assert_eq!(only_text(&rec), format!("Haldi is at noon\n\n{VOICE_REPLY_FAILED_NOTE}"));
    }

    #[tokio::test]
    async fn voice_send_failure_falls_back_to_text() {
        let script = ScriptedProvider::new();
        script.push(LlmResponse::text("Pheras at 2 AM"));
        let r = router(&script, DummyVoice::new().with_transcript("pheras kab"));
        let rec = RecordingTransport::new().with_media(vec![1], "audio/ogg").failing_voice();

        r.handle(event(MessageKind::Voice, ""), &Transport::Recording(rec.clone())).await;
        assert_eq!(only_text(&rec), "Pheras at 2 AM");
    }
}
