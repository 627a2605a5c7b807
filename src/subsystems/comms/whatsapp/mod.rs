//! WhatsApp channel: Cloud API webhook in, Graph API out.
//!
//! Implements [`Component`] like every other channel: `run()` drives an axum
//! server and the shared [`CancellationToken`] is wired to axum's graceful
//! shutdown.
//!
//! ```text
//! GET  /webhook   subscription handshake (hub.challenge)
//! POST /webhook   message deliveries
//! GET  /health
//! ```

mod api;
pub mod client;

pub use api::WebhookPayload;

use std::sync::Arc;

use axum::{Router, routing::get};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::Config;
use crate::error::AppError;
use crate::subsystems::runtime::{Component, ComponentFuture};

use super::state::CommsState;
use super::transport::Transport;
use client::CloudApiClient;

// ── Shared request state ──────────────────────────────────────────────────────

/// Axum router state injected into every handler. Cheap to clone.
#[derive(Clone)]
pub(crate) struct AxumState {
    /// Channel identifier used in log spans.
    pub channel_id: Arc<str>,
    pub comms: Arc<CommsState>,
    /// Outbound side; handed to every dispatched event.
    pub transport: Transport,
    pub verify_token: Arc<str>,
}

// ── WhatsAppChannel ───────────────────────────────────────────────────────────

pub struct WhatsAppChannel {
    channel_id: String,
    bind_addr: String,
    state: Arc<CommsState>,
    transport: Transport,
    verify_token: String,
}

impl WhatsAppChannel {
    pub fn from_config(
        channel_id: impl Into<String>,
        config: &Config,
        state: Arc<CommsState>,
    ) -> Result<Self, AppError> {
        let wa = &config.comms.whatsapp;
        let access_token = config
            .secrets
            .whatsapp_access_token
            .clone()
            .ok_or_else(|| AppError::Config("WHATSAPP_ACCESS_TOKEN is not set".into()))?;
        let verify_token = config
            .secrets
            .whatsapp_verify_token
            .clone()
            .ok_or_else(|| AppError::Config("WHATSAPP_VERIFY_TOKEN is not set".into()))?;

        let client = CloudApiClient::new(
            wa.api_base_url.clone(),
            wa.phone_number_id.clone(),
            access_token,
            wa.timeout_seconds,
        )?;

        Ok(Self {
            channel_id: channel_id.into(),
            bind_addr: wa.bind.clone(),
            state,
            transport: Transport::WhatsApp(client),
            verify_token,
        })
    }
}

impl Component for WhatsAppChannel {
    fn id(&self) -> &str {
        &self.channel_id
    }

    fn run(self: Box<Self>, shutdown: CancellationToken) -> ComponentFuture {
        Box::pin(run_webhook(*self, shutdown))
    }
}

// ── Server loop ───────────────────────────────────────────────────────────────

async fn run_webhook(channel: WhatsAppChannel, shutdown: CancellationToken) -> Result<(), AppError> {
    let WhatsAppChannel { channel_id, bind_addr, state, transport, verify_token } = channel;

    let listener = TcpListener::bind(&bind_addr)
        .await
        .map_err(|e| AppError::Comms(format!("webhook bind failed on {bind_addr}: {e}")))?;

    let ready_at = state.mark_ready(&channel_id);
    info!(%channel_id, %bind_addr, ready_at, "whatsapp webhook listening");

    let router = build_router(AxumState {
        channel_id: Arc::from(channel_id.as_str()),
        comms: state,
        transport,
        verify_token: Arc::from(verify_token.as_str()),
    });

    axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|e| AppError::Comms(format!("webhook server error: {e}")))?;

    info!(%channel_id, "whatsapp webhook shut down");
    Ok(())
}

// ── Router ────────────────────────────────────────────────────────────────────

fn build_router(state: AxumState) -> Router {
    Router::new()
        .route("/webhook", get(api::verify).post(api::receive))
        .route("/health",  get(api::health))
        .with_state(state)
}
