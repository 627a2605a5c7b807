//! WhatsApp Cloud API (Graph API) client: the outbound half of the
//! WhatsApp channel.
//!
//! ```text
//! POST {base}/{phone_number_id}/messages   text, audio, typing indicator
//! POST {base}/{phone_number_id}/media      voice-note upload (multipart)
//! GET  {base}/{media_id}                   media metadata → download URL
//! GET  {download url}                      media bytes (bearer auth)
//! ```

use std::time::Duration;

use reqwest::Client;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, error};

use crate::error::AppError;
use crate::subsystems::comms::transport::MediaBlob;

/// Cloud API rejects text bodies longer than this.
pub const MAX_TEXT_CHARS: usize = 4_096;

const VOICE_MIME: &str = "audio/ogg";

#[derive(Debug, Clone)]
pub struct CloudApiClient {
    client: Client,
    api_base_url: String,
    phone_number_id: String,
    access_token: String,
}

#[derive(Deserialize)]
struct MediaInfo {
    url: String,
    #[serde(default)]
    mime_type: Option<String>,
}

#[derive(Deserialize)]
struct UploadedMedia {
    id: String,
}

impl CloudApiClient {
    pub fn new(
        api_base_url: String,
        phone_number_id: String,
        access_token: String,
        timeout_seconds: u64,
    ) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .build()
            .map_err(|e| AppError::Comms(format!("failed to build Graph API client: {e}")))?;
        Ok(Self {
            client,
            api_base_url: api_base_url.trim_end_matches('/').to_string(),
            phone_number_id,
            access_token,
        })
    }

    fn messages_url(&self) -> String {
        format!("{}/{}/messages", self.api_base_url, self.phone_number_id)
    }

    fn media_upload_url(&self) -> String {
        format!("{}/{}/media", self.api_base_url, self.phone_number_id)
    }

    pub async fn send_text(&self, to: &str, text: &str, reply_to: Option<&str>) -> Result<(), AppError> {
        self.post_message(text_message(to, text, reply_to)).await
    }

    /// Upload `ogg` and send it as a voice note.
    pub async fn send_voice(&self, to: &str, ogg: Vec<u8>, reply_to: Option<&str>) -> Result<(), AppError> {
        let media_id = self.upload_voice(ogg).await?;
        self.post_message(voice_message(to, &media_id, reply_to)).await
    }

    /// Mark `message_id` read and show the typing indicator.
    pub async fn mark_typing(&self, message_id: &str) -> Result<(), AppError> {
        self.post_message(typing_indicator(message_id)).await
    }

    pub async fn download_media(&self, media_id: &str) -> Result<MediaBlob, AppError> {
        let url = format!("{}/{}", self.api_base_url, media_id);
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(|e| AppError::Comms(format!("media lookup failed: {e}")))?;
        let info = check_status(response, "media lookup")
            .await?
            .json::<MediaInfo>()
            .await
            .map_err(|e| AppError::Comms(format!("malformed media lookup response: {e}")))?;

        let response = self
            .client
            .get(&info.url)
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(|e| AppError::Comms(format!("media download failed: {e}")))?;
        let bytes = check_status(response, "media download")
            .await?
            .bytes()
            .await
            .map_err(|e| AppError::Comms(format!("media download interrupted: {e}")))?;

        debug!(media_id, bytes = bytes.len(), "media downloaded");
        Ok(MediaBlob {
            bytes: bytes.to_vec(),
            mime_type: info.mime_type.unwrap_or_else(|| VOICE_MIME.to_string()),
        })
    }

    async fn upload_voice(&self, ogg: Vec<u8>) -> Result<String, AppError> {
        let part = Part::bytes(ogg)
            .file_name("reply.ogg")
            .mime_str(VOICE_MIME)
            .map_err(|e| AppError::Comms(format!("bad upload mime type: {e}")))?;
        let form = Form::new()
            .text("messaging_product", "whatsapp")
            .text("type", VOICE_MIME)
            .part("file", part);

        let response = self
            .client
            .post(self.media_upload_url())
            .bearer_auth(&self.access_token)
            .multipart(form)
            .send()
            .await
            .map_err(|e| AppError::Comms(format!("media upload failed: {e}")))?;
        let uploaded = check_status(response, "media upload")
            .await?
            .json::<UploadedMedia>()
            .await
            .map_err(|e| AppError::Comms(format!("malformed media upload response: {e}")))?;
        Ok(uploaded.id)
    }

    async fn post_message(&self, body: Value) -> Result<(), AppError> {
        let response = self
            .client
            .post(self.messages_url())
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::Comms(format!("send failed: {e}")))?;
        check_status(response, "send").await?;
        Ok(())
    }
}

// ── Payload builders ──────────────────────────────────────────────────────────

fn with_context(mut body: Value, reply_to: Option<&str>) -> Value {
    if let Some(id) = reply_to {
        body["context"] = json!({ "message_id": id });
    }
    body
}

/// Text message body. Over-long text is cut to the API limit.
pub fn text_message(to: &str, text: &str, reply_to: Option<&str>) -> Value {
    let body: String = if text.chars().count() > MAX_TEXT_CHARS {
        let mut cut: String = text.chars().take(MAX_TEXT_CHARS - 1).collect();
        cut.push('…');
        cut
    } else {
        text.to_string()
    };
    with_context(
        json!({
            "messaging_product": "whatsapp",
            "recipient_type": "individual",
            "to": to,
            "type": "text",
            "text": { "preview_url": false, "body": body }
        }),
        reply_to,
    )
}

pub fn voice_message(to: &str, media_id: &str, reply_to: Option<&str>) -> Value {
    with_context(
        json!({
            "messaging_product": "whatsapp",
            "recipient_type": "individual",
            "to": to,
            "type": "audio",
            "audio": { "id": media_id, "voice": true }
        }),
        reply_to,
    )
}

pub fn typing_indicator(message_id: &str) -> Value {
    json!({
        "messaging_product": "whatsapp",
        "status": "read",
        "message_id": message_id,
        "typing_indicator": { "type": "text" }
    })
}

// ── Errors ────────────────────────────────────────────────────────────────────

async fn check_status(response: reqwest::Response, what: &str) -> Result<reqwest::Response, AppError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    error!(%status, %body, "graph api {what} failed");
    Err(AppError::Comms(format!("{what}: {}", graph_error(status.as_u16(), &body))))
}

/// Extract `error.message` from a Graph API error envelope.
pub fn graph_error(status: u16, body: &str) -> String {
    let message = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_string));
    match message {
        Some(m) => format!("HTTP {status}: {m}"),
        None if body.trim().is_empty() => format!("HTTP {status}"),
        None => format!("HTTP {status}: {}", body.trim()),
    }
}
