//! Voice subsystem: voice-note round trip.
//!
//! Inbound audio is transcribed by an OpenAI-compatible transcription
//! endpoint; outbound replies are spoken through the Google Translate TTS
//! endpoint and transcoded by `ffmpeg` into the OGG/Opus container WhatsApp
//! plays as a voice note.
//!
//! Backends use enum dispatch like the LLM providers: `Remote` talks to the
//! real services, `Dummy` is for console runs and tests.

pub mod speech;
pub mod transcribe;

use std::fs;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use reqwest::Client;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::Config;
use crate::error::AppError;

/// Vocabulary hint file inside the prompts directory.
pub const TRANSCRIPTION_HINT: &str = "transcription_hint.txt";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VoiceError {
    #[error("transcription failed: {0}")]
    Transcription(String),
    #[error("speech synthesis failed: {0}")]
    Synthesis(String),
    #[error("audio transcode failed: {0}")]
    Transcode(String),
}

// ── Pipeline ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub enum VoicePipeline {
    Remote(RemoteVoice),
    Dummy(DummyVoice),
}

impl VoicePipeline {
    /// Build from `[voice]`. The remote backend reuses the LLM API key.
    pub fn from_config(config: &Config) -> Result<Self, AppError> {
        let v = &config.voice;
        match v.provider.as_str() {
            "dummy" => Ok(VoicePipeline::Dummy(DummyVoice::new())),
            "openai" => {
                let api_key = config.secrets.llm_api_key.clone().ok_or_else(|| {
                    AppError::Config("voice provider 'openai' needs LLM_API_KEY".into())
                })?;
                let hint_path = config.concierge.prompts_dir.join(TRANSCRIPTION_HINT);
                let hint = match fs::read_to_string(&hint_path) {
                    Ok(text) => text.split_whitespace().collect::<Vec<_>>().join(" "),
                    Err(_) => {
                        debug!("voice: '{}' not found, no transcription hint", hint_path.display());
                        String::new()
                    }
                };
                let client = Client::builder()
                    .timeout(Duration::from_secs(v.timeout_seconds))
                    .build()
                    .map_err(|e| AppError::Config(format!("failed to build voice HTTP client: {e}")))?;
                info!(model = %v.transcription_model, ffmpeg = %v.ffmpeg_path, "voice pipeline enabled");
                Ok(VoicePipeline::Remote(RemoteVoice {
                    client,
                    api_key,
                    transcription_url: v.transcription_url.clone(),
                    transcription_model: v.transcription_model.clone(),
                    hint,
                    tts_url: v.tts_url.clone(),
                    ffmpeg_path: v.ffmpeg_path.clone(),
                }))
            }
            other => Err(AppError::Config(format!("unknown voice provider: {other}"))),
        }
    }

    /// Speech to text. `mime_type` is the container reported by the transport.
    pub async fn transcribe(&self, audio: Vec<u8>, mime_type: &str) -> Result<String, VoiceError> {
        match self {
            VoicePipeline::Remote(r) => r.transcribe(audio, mime_type).await,
            VoicePipeline::Dummy(d) => d.transcribe(),
        }
    }

    /// Text to an OGG/Opus voice note.
    pub async fn synthesize(&self, text: &str) -> Result<Vec<u8>, VoiceError> {
        match self {
            VoicePipeline::Remote(r) => r.synthesize(text).await,
            VoicePipeline::Dummy(d) => d.synthesize(text),
        }
    }
}

// ── Remote ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct RemoteVoice {
    client: Client,
    api_key: String,
    transcription_url: String,
    transcription_model: String,
    hint: String,
    tts_url: String,
    ffmpeg_path: String,
}

impl RemoteVoice {
    async fn transcribe(&self, audio: Vec<u8>, mime_type: &str) -> Result<String, VoiceError> {
        transcribe::transcribe(
            &self.client,
            &self.transcription_url,
            &self.api_key,
            &self.transcription_model,
            &self.hint,
            audio,
            mime_type,
        )
        .await
    }

    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, VoiceError> {
        let lang = speech::detect_lang(text);
        let spoken = speech::spoken_text(text);
        if spoken.is_empty() {
            return Err(VoiceError::Synthesis("nothing speakable in reply".into()));
        }
        let mp3 = speech::fetch_tts(&self.client, &self.tts_url, &spoken, lang).await?;
        speech::transcode_to_ogg(&self.ffmpeg_path, &mp3).await
    }
}

// ── Dummy ─────────────────────────────────────────────────────────────────────

/// Offline voice backend.
///
/// Transcription returns a fixed text; synthesis returns a fake OGG payload
/// (`OggS` magic followed by the text). Synthesized texts are recorded.
#[derive(Debug, Clone)]
pub struct DummyVoice {
    transcript: Result<String, VoiceError>,
    synthesis: Result<(), VoiceError>,
    spoken: Arc<Mutex<Vec<String>>>,
}

impl Default for DummyVoice {
    fn default() -> Self {
        Self { transcript: Ok(String::new()), synthesis: Ok(()), spoken: Arc::default() }
    }
}

impl DummyVoice {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_transcript(mut self, text: impl Into<String>) -> Self {
        self.transcript = Ok(text.into());
        self
    }

    pub fn failing_transcription(mut self, reason: impl Into<String>) -> Self {
        self.transcript = Err(VoiceError::Transcription(reason.into()));
        self
    }

    pub fn failing_synthesis(mut self, reason: impl Into<String>) -> Self {
        self.synthesis = Err(VoiceError::Synthesis(reason.into()));
        self
    }

    /// Texts passed to `synthesize`, oldest first.
    pub fn spoken(&self) -> Vec<String> {
        self.spoken.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn transcribe(&self) -> Result<String, VoiceError> {
        self.transcript.clone()
    }

    fn synthesize(&self, text: &str) -> Result<Vec<u8>, VoiceError> {
        self.synthesis.clone()?;
        self.spoken.lock().unwrap_or_else(|e| e.into_inner()).push(text.to_string());
        let mut out = b"OggS".to_vec();
        out.extend_from_slice(text.as_bytes());
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn dummy_round_trip() {
        let voice = VoicePipeline::Dummy(DummyVoice::new().with_transcript("Sangeet kab hai?"));
        assert_eq!(voice.transcribe(vec![1, 2, 3], "audio/ogg").await.unwrap(), "Sangeet kab hai?");
        let ogg = voice.synthesize("8 baje").await.unwrap();
        assert!(ogg.starts_with(b"OggS"));
    }

    #[tokio::test]
    async fn dummy_failures() {
        let d = DummyVoice::new().failing_transcription("bad audio").failing_synthesis("tts down");
        let voice = VoicePipeline::Dummy(d.clone());
        assert!(matches!(voice.transcribe(vec![], "audio/ogg").await, Err(VoiceError::Transcription(_))));
        assert!(matches!(voice.synthesize("x").await, Err(VoiceError::Synthesis(_))));
        assert!(d.spoken().is_empty());
    }

    #[test]
    fn from_config_selects_backend() {
        let mut cfg = Config::test_default();
        assert!(matches!(VoicePipeline::from_config(&cfg).unwrap(), VoicePipeline::Dummy(_)));

        cfg.voice.provider = "openai".into();
        assert!(VoicePipeline::from_config(&cfg).is_err());

        cfg.secrets.llm_api_key = Some("sk-test".into());
        assert!(matches!(VoicePipeline::from_config(&cfg).unwrap(), VoicePipeline::Remote(_)));

        cfg.voice.provider = "azure".into();
        assert!(VoicePipeline::from_config(&cfg).is_err());
    }
}
