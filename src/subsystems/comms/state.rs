//! Shared state for the Comms subsystem: capability boundary for channels.
//!
//! Channels receive an `Arc<CommsState>` and are restricted to the typed
//! methods below. The [`Router`] is private; channels hand it events and a
//! transport, nothing more.
//!
//! # Intra-subsystem events
//!
//! [`CommsState::report_event`] lets a running channel signal the comms
//! subsystem manager (e.g. "I'm listening", "I shut down"). The manager owns
//! the receiver end.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::warn;

use super::router::{Disposition, InboundEvent, Router};
use super::transport::Transport;

// ── Events ────────────────────────────────────────────────────────────────────

/// Events a channel sends back to the comms subsystem manager.
#[derive(Debug)]
pub enum CommsEvent {
    /// Channel has stopped (clean exit or EOF).
    ChannelShutdown { channel_id: String },
    /// Channel is accepting messages.
    ChannelReady { channel_id: String },
}

// ── State ─────────────────────────────────────────────────────────────────────

/// Shared state passed as `Arc<CommsState>` to every channel task.
pub struct CommsState {
    router: Arc<Router>,
    /// Back-channel to the comms subsystem manager.
    event_tx: mpsc::Sender<CommsEvent>,
}

impl CommsState {
    pub fn new(router: Arc<Router>, event_tx: mpsc::Sender<CommsEvent>) -> Self {
        Self { router, event_tx }
    }

    /// Route one inbound event; the reply goes out through `transport`.
    pub async fn dispatch(&self, event: InboundEvent, transport: &Transport) -> Disposition {
        self.router.handle(event, transport).await
    }

    /// Mark the bot ready (first caller wins) and tell the manager.
    ///
    /// Events stamped before the ready instant are treated as backlog.
    pub fn mark_ready(&self, channel_id: &str) -> i64 {
        let at = self.router.ready().mark_ready();
        self.report_event(CommsEvent::ChannelReady { channel_id: channel_id.to_string() });
        at
    }

    /// Forget one guest's conversation.
    pub fn reset_conversation(&self, user_id: &str) {
        self.router.orchestrator().history().evict(user_id);
    }

    /// Report an event to the comms subsystem manager.
    ///
    /// Non-blocking: drops the event and logs a warning if the manager is not
    /// keeping up (channel full) or has already exited (closed).
    pub fn report_event(&self, event: CommsEvent) {
        if let Err(e) = self.event_tx.try_send(event) {
            warn!("comms event dropped: {e}");
        }
    }
}
