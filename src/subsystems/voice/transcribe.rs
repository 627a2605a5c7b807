//! Speech-to-text over an OpenAI-compatible `/v1/audio/transcriptions`.
//!
//! No language is sent: the model auto-detects Hindi, English and Hinglish.
//! The vocabulary hint primes it with names and ceremony terms.

use reqwest::Client;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use tracing::{debug, error};

use super::VoiceError;

#[derive(Deserialize)]
struct TranscriptionResponse {
    #[serde(default)]
    text: String,
}

/// File name sent with the upload; the API infers the codec from it.
pub fn file_name_for(mime_type: &str) -> &'static str {
    let essence = mime_type.split(';').next().unwrap_or("").trim();
    match essence {
        "audio/mpeg" | "audio/mp3" => "voice.mp3",
        "audio/mp4" | "audio/m4a" | "audio/x-m4a" | "audio/aac" => "voice.m4a",
        "audio/wav" | "audio/x-wav" => "voice.wav",
        "audio/webm" => "voice.webm",
        _ => "voice.ogg",
    }
}

pub async fn transcribe(
    client: &Client,
    url: &str,
    api_key: &str,
    model: &str,
    hint: &str,
    audio: Vec<u8>,
    mime_type: &str,
) -> Result<String, VoiceError> {
    let bytes = audio.len();
    let essence = mime_type.split(';').next().unwrap_or("audio/ogg").trim().to_string();
    let part = Part::bytes(audio)
        .file_name(file_name_for(mime_type))
        .mime_str(&essence)
        .map_err(|e| VoiceError::Transcription(format!("bad mime type '{mime_type}': {e}")))?;

    let mut form = Form::new().part("file", part).text("model", model.to_string());
    if !hint.is_empty() {
        form = form.text("prompt", hint.to_string());
    }

    debug!(%url, bytes, %model, "transcription request");
    let response = client
        .post(url)
        .bearer_auth(api_key)
        .multipart(form)
        .send()
        .await
        .map_err(|e| {
            error!(error = %e, timeout = e.is_timeout(), "transcription request failed (transport)");
            VoiceError::Transcription(e.to_string())
        })?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        error!(%status, %body, "transcription API returned error status");
        return Err(VoiceError::Transcription(format!("API returned HTTP {}", status.as_u16())));
    }

    let parsed = response
        .json::<TranscriptionResponse>()
        .await
        .map_err(|e| VoiceError::Transcription(format!("failed to parse response: {e}")))?;

    Ok(parsed.text.trim().to_string())
}
