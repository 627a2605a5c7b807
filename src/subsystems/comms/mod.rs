//! Comms subsystem: manages all external I/O channels.
//!
//! # Architecture
//!
//! Each channel (PTY, WhatsApp webhook) implements [`runtime::Component`] and
//! is spawned as an independent concurrent task by [`start`] via
//! [`runtime::spawn_components`]. Channels capture their shared
//! [`Arc<CommsState>`] at construction time: no state is passed through the
//! generic `Component::run` signature.
//!
//! Inbound messages become [`router::InboundEvent`]s; replies leave through
//! the channel's [`transport::Transport`].
//!
//! An intra-subsystem [`mpsc`] channel lets running channels signal the
//! comms manager (lifecycle events). This is drained in a short-lived
//! background task that dies naturally when all channel senders are dropped.
//!
//! [`runtime::Component`]: crate::subsystems::runtime::Component
//! [`runtime::spawn_components`]: crate::subsystems::runtime::spawn_components

mod state;
pub mod pty;
pub mod router;
pub mod transport;
#[cfg(feature = "channel-whatsapp")]
pub mod whatsapp;

pub use router::Router;
pub use state::{CommsEvent, CommsState};

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::AppError;
use crate::subsystems::runtime::{Component, SubsystemHandle, spawn_components};

// ── start ───────────────────────────────────────────────────────────────────

/// Spawn all configured comms channels and return a [`SubsystemHandle`].
///
/// Channels start immediately. If any channel exits with an error the shared
/// `shutdown` token is cancelled so siblings stop cooperatively. The handle
/// resolves when all channels have exited.
///
/// Fails only when a channel cannot be constructed (e.g. the Graph API
/// client); runtime failures surface through the handle.
pub fn start(
    config: &Config,
    router: Arc<Router>,
    shutdown: CancellationToken,
) -> Result<SubsystemHandle, AppError> {
    let (event_tx, event_rx) = mpsc::channel::<CommsEvent>(32);
    let state = Arc::new(CommsState::new(router, event_tx));

    let mut components: Vec<Box<dyn Component>> = Vec::new();

    #[cfg(feature = "channel-pty")]
    {
        if config.comms_pty_should_load() {
            info!("loading pty channel");
            components.push(Box::new(pty::PtyChannel::new("pty0", state.clone())));
        }
    }

    #[cfg(feature = "channel-whatsapp")]
    {
        if config.comms_whatsapp_should_load() {
            info!(bind = %config.comms.whatsapp.bind, "loading whatsapp channel");
            let channel = whatsapp::WhatsAppChannel::from_config("whatsapp0", config, state.clone())?;
            components.push(Box::new(channel));
        }
    }

    if components.is_empty() {
        warn!("no comms channels configured, enable one with -i or [comms.whatsapp]");
    }

    // Monitoring-only drain; ends when every channel has dropped its sender.
    tokio::spawn(async move {
        let mut rx = event_rx;
        while let Some(event) = rx.recv().await {
            match event {
                CommsEvent::ChannelShutdown { ref channel_id } => {
                    debug!(channel_id, "channel reported shutdown");
                }
                CommsEvent::ChannelReady { ref channel_id } => {
                    info!(channel_id, "channel ready");
                }
            }
        }
    });

    Ok(spawn_components(components, shutdown))
}
