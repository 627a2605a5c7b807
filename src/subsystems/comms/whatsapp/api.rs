//! Axum handlers for the webhook routes and the Cloud API payload shape.
//!
//! Meta retries any delivery that is not answered with 200 quickly, so the
//! POST handler only parses and spawns; replies go out from the spawned
//! tasks.

use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::subsystems::comms::router::{InboundEvent, MessageKind};

use super::AxumState;

// ── Verification handshake ────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub(super) struct VerifyParams {
    #[serde(rename = "hub.mode")]
    mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    challenge: Option<String>,
}

/// GET /webhook: echo `hub.challenge` when the verify token matches.
pub(super) async fn verify(
    State(state): State<AxumState>,
    Query(params): Query<VerifyParams>,
) -> Response {
    let accepted = params.mode.as_deref() == Some("subscribe")
        && params.verify_token.as_deref() == Some(&*state.verify_token);
    match (accepted, params.challenge) {
        (true, Some(challenge)) => {
            info!(channel_id = %state.channel_id, "webhook verified");
            (StatusCode::OK, challenge).into_response()
        }
        _ => {
            warn!(channel_id = %state.channel_id, "webhook verification rejected");
            StatusCode::FORBIDDEN.into_response()
        }
    }
}

// ── Delivery ──────────────────────────────────────────────────────────────────

/// POST /webhook: accept a delivery and dispatch each message on its own task.
pub(super) async fn receive(
    State(state): State<AxumState>,
    Json(payload): Json<WebhookPayload>,
) -> StatusCode {
    let events = payload.into_events();
    debug!(channel_id = %state.channel_id, count = events.len(), "webhook delivery");

    for event in events {
        let comms = state.comms.clone();
        let transport = state.transport.clone();
        tokio::spawn(async move {
            comms.dispatch(event, &transport).await;
        });
    }
    StatusCode::OK
}

/// GET /health
pub(super) async fn health() -> &'static str {
    "ok\n"
}

// ── Payload ───────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct WebhookPayload {
    object: String,
    entry: Vec<Entry>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Entry {
    changes: Vec<Change>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Change {
    field: String,
    value: ChangeValue,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ChangeValue {
    messages: Vec<WaMessage>,
    /// Delivery/read receipts; counted and dropped.
    statuses: Vec<serde_json::Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WaMessage {
    from: String,
    id: String,
    timestamp: String,
    #[serde(rename = "type")]
    kind: String,
    text: Option<TextBody>,
    audio: Option<MediaRef>,
    image: Option<MediaRef>,
    video: Option<MediaRef>,
    document: Option<MediaRef>,
    sticker: Option<MediaRef>,
    /// Present when the message was posted in a group.
    group_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TextBody {
    body: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct MediaRef {
    id: String,
}

impl WebhookPayload {
    /// Flatten the delivery into router events. Status callbacks are dropped.
    pub fn into_events(self) -> Vec<InboundEvent> {
        if !self.object.is_empty() && self.object != "whatsapp_business_account" {
            debug!(object = %self.object, "ignoring non-whatsapp webhook");
            return Vec::new();
        }
        let mut events = Vec::new();
        for change in self.entry.into_iter().flat_map(|e| e.changes) {
            if change.field != "messages" {
                continue;
            }
            if !change.value.statuses.is_empty() {
                debug!(count = change.value.statuses.len(), "status callbacks ignored");
            }
            events.extend(change.value.messages.into_iter().map(WaMessage::into_event));
        }
        events
    }
}

impl WaMessage {
    fn into_event(self) -> InboundEvent {
        let media_id = [&self.audio, &self.image, &self.video, &self.document, &self.sticker]
            .into_iter()
            .flatten()
            .map(|m| m.id.clone())
            .find(|id| !id.is_empty());
        InboundEvent {
            message_id: self.id,
            from: self.from,
            kind: MessageKind::from_wire(&self.kind),
            body: self.text.map(|t| t.body).unwrap_or_default(),
            timestamp: self.timestamp.trim().parse().unwrap_or(0),
            is_group: self.group_id.is_some(),
            media_id,
        }
    }
}
