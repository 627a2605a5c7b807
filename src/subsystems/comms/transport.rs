//! Outbound side of a channel: how replies leave the bot.
//!
//! Enum dispatch over the concrete transports. Every operation returns a
//! `Result`; callers log failures, nothing here retries.

#[cfg(any(test, feature = "test-util"))]
use std::sync::{Arc, Mutex};

use crate::error::AppError;

#[cfg(feature = "channel-whatsapp")]
use super::whatsapp::client::CloudApiClient;

/// Downloaded media payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaBlob {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

#[derive(Debug, Clone)]
pub enum Transport {
    #[cfg(feature = "channel-whatsapp")]
    WhatsApp(CloudApiClient),
    Console(ConsoleTransport),
    #[cfg(any(test, feature = "test-util"))]
    Recording(RecordingTransport),
}

impl Transport {
    /// Send a text reply, quoting `reply_to` when the transport supports it.
    pub async fn send_text(&self, to: &str, text: &str, reply_to: Option<&str>) -> Result<(), AppError> {
        match self {
            #[cfg(feature = "channel-whatsapp")]
            Transport::WhatsApp(c) => c.send_text(to, text, reply_to).await,
            Transport::Console(c) => c.send_text(text),
            #[cfg(any(test, feature = "test-util"))]
            Transport::Recording(r) => r.record(Outbound::Text {
                to: to.to_string(),
                text: text.to_string(),
                reply_to: reply_to.map(str::to_string),
            }),
        }
    }

    /// Send an OGG/Opus voice note.
    pub async fn send_voice(&self, to: &str, ogg: Vec<u8>, reply_to: Option<&str>) -> Result<(), AppError> {
        match self {
            #[cfg(feature = "channel-whatsapp")]
            Transport::WhatsApp(c) => c.send_voice(to, ogg, reply_to).await,
            Transport::Console(c) => c.send_voice(&ogg),
            #[cfg(any(test, feature = "test-util"))]
            Transport::Recording(r) => r.send_voice(to, ogg, reply_to),
        }
    }

    pub async fn download_media(&self, media_id: &str) -> Result<MediaBlob, AppError> {
        match self {
            #[cfg(feature = "channel-whatsapp")]
            Transport::WhatsApp(c) => c.download_media(media_id).await,
            Transport::Console(_) => Err(AppError::Comms("console channel has no media".into())),
            #[cfg(any(test, feature = "test-util"))]
            Transport::Recording(r) => r.download_media(media_id),
        }
    }

    /// Show "typing…" for the message being answered. Best effort.
    pub async fn mark_typing(&self, message_id: &str) -> Result<(), AppError> {
        match self {
            #[cfg(feature = "channel-whatsapp")]
            Transport::WhatsApp(c) => c.mark_typing(message_id).await,
            Transport::Console(_) => Ok(()),
            #[cfg(any(test, feature = "test-util"))]
            Transport::Recording(r) => r.record(Outbound::Typing { message_id: message_id.to_string() }),
        }
    }
}

// ── Console ───────────────────────────────────────────────────────────────────

/// Prints replies to stdout for the interactive console channel.
#[derive(Debug, Clone, Default)]
pub struct ConsoleTransport;

impl ConsoleTransport {
    fn send_text(&self, text: &str) -> Result<(), AppError> {
        println!("{text}");
        Ok(())
    }

    fn send_voice(&self, ogg: &[u8]) -> Result<(), AppError> {
        println!("🎙️ [voice note, {} bytes]", ogg.len());
        Ok(())
    }
}

// ── Recording ─────────────────────────────────────────────────────────────────

/// One captured outbound action.
#[cfg(any(test, feature = "test-util"))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Text { to: String, text: String, reply_to: Option<String> },
    Voice { to: String, bytes: Vec<u8>, reply_to: Option<String> },
    Typing { message_id: String },
}

/// In-memory transport: captures everything sent, serves canned media.
/// Clones share the same log.
#[cfg(any(test, feature = "test-util"))]
#[derive(Debug, Clone, Default)]
pub struct RecordingTransport {
    sent: Arc<Mutex<Vec<Outbound>>>,
    media: Option<Result<MediaBlob, String>>,
    fail_voice: bool,
}

#[cfg(any(test, feature = "test-util"))]
impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every download succeeds with `bytes`.
    pub fn with_media(mut self, bytes: Vec<u8>, mime_type: impl Into<String>) -> Self {
        self.media = Some(Ok(MediaBlob { bytes, mime_type: mime_type.into() }));
        self
    }

    /// Every download fails.
    pub fn failing_media(mut self, reason: impl Into<String>) -> Self {
        self.media = Some(Err(reason.into()));
        self
    }

    /// Voice sends fail, as when the media upload is rejected.
    pub fn failing_voice(mut self) -> Self {
        self.fail_voice = true;
        self
    }

    pub fn sent(&self) -> Vec<Outbound> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Only the replies, typing indicators left out.
    pub fn replies(&self) -> Vec<Outbound> {
        self.sent().into_iter().filter(|o| !matches!(o, Outbound::Typing { .. })).collect()
    }

    fn record(&self, out: Outbound) -> Result<(), AppError> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).push(out);
        Ok(())
    }

    fn send_voice(&self, to: &str, bytes: Vec<u8>, reply_to: Option<&str>) -> Result<(), AppError> {
        if self.fail_voice {
            return Err(AppError::Comms("media upload rejected".into()));
        }
        self.record(Outbound::Voice {
            to: to.to_string(),
            bytes,
            reply_to: reply_to.map(str::to_string),
        })
    }

    fn download_media(&self, media_id: &str) -> Result<MediaBlob, AppError> {
        match &self.media {
            Some(Ok(blob)) => Ok(blob.clone()),
            Some(Err(reason)) => Err(AppError::Comms(reason.clone())),
            None => Err(AppError::Comms(format!("no media stored for {media_id}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn recording_captures_in_order() {
        let rec = RecordingTransport::new();
        let t = Transport::Recording(rec.clone());
        t.mark_typing("wamid.1").await.unwrap();
        t.send_text("91", "hello", Some("wamid.1")).await.unwrap();
        t.send_voice("91", b"OggS".to_vec(), None).await.unwrap();

        assert_eq!(rec.sent().len(), 3);
        assert_eq!(
            rec.replies()[0],
            Outbound::Text { to: "91".into(), text: "hello".into(), reply_to: Some("wamid.1".into()) }
        );
    }

    #[tokio::test]
    async fn recording_media_and_failures() {
        let t = Transport::Recording(RecordingTransport::new().with_media(vec![1, 2], "audio/ogg"));
        assert_eq!(t.download_media("m").await.unwrap().bytes, vec![1, 2]);

        let t = Transport::Recording(RecordingTransport::new().failing_media("404").failing_voice());
        assert!(t.download_media("m").await.is_err());
        assert!(t.send_voice("91", vec![], None).await.is_err());
    }

    #[tokio::test]
    async fn console_has_no_media() {
        let t = Transport::Console(ConsoleTransport);
        assert!(t.download_media("m").await.is_err());
        assert!(t.mark_typing("x").await.is_ok());
    }
}
