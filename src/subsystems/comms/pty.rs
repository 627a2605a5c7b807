//! PTY (console) comms channel: reads lines from stdin as messages from the
//! `console` user and prints the replies to stdout.
//!
//! Enabled with `-i` or `[comms.pty] enabled = true`. Runs until the
//! `shutdown` token is cancelled (Ctrl-C) or stdin is closed. `/reset`
//! clears the console conversation.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::AppError;
use crate::subsystems::runtime::{Component, ComponentFuture};

use super::router::{InboundEvent, MessageKind};
use super::state::{CommsEvent, CommsState};
use super::transport::{ConsoleTransport, Transport};

/// Conversation key for everything typed at the console.
pub const CONSOLE_USER: &str = "console";

const RESET_COMMAND: &str = "/reset";

// ── PtyChannel ───────────────────────────────────────────────────────────────

pub struct PtyChannel {
    channel_id: String,
    state: Arc<CommsState>,
}

impl PtyChannel {
    pub fn new(channel_id: impl Into<String>, state: Arc<CommsState>) -> Self {
        Self { channel_id: channel_id.into(), state }
    }
}

impl Component for PtyChannel {
    fn id(&self) -> &str {
        &self.channel_id
    }

    fn run(self: Box<Self>, shutdown: CancellationToken) -> ComponentFuture {
        Box::pin(run_pty(self.channel_id, self.state, shutdown))
    }
}

/// Wrap a typed line as an inbound text event.
pub fn console_event(line: &str) -> InboundEvent {
    InboundEvent {
        message_id: uuid::Uuid::new_v4().to_string(),
        from: CONSOLE_USER.to_string(),
        kind: MessageKind::Text,
        body: line.to_string(),
        timestamp: chrono::Utc::now().timestamp(),
        is_group: false,
        media_id: None,
    }
}

// ── run_pty ──────────────────────────────────────────────────────────────────

async fn run_pty(
    channel_id: String,
    state: Arc<CommsState>,
    shutdown: CancellationToken,
) -> Result<(), AppError> {
    state.mark_ready(&channel_id);
    info!(%channel_id, "pty channel started, type a message and press Enter. Ctrl-C to quit.");
    println!("─────────────────────────────────");
    println!(" Wedding concierge console  (Ctrl-C to quit, /reset to start over)");
    println!("─────────────────────────────────");

    let transport = Transport::Console(ConsoleTransport);
    let stdin = tokio::io::stdin();
    let mut lines = BufReader::new(stdin).lines();

    loop {
        print!("> ");
        use std::io::Write as _;
        let _ = std::io::stdout().flush();

        tokio::select! {
            biased;

            _ = shutdown.cancelled() => {
                println!("\n[pty] shutdown signal received, closing console channel");
                info!("pty channel shutting down");
                break;
            }

            line = lines.next_line() => {
                match line {
                    Err(e) => {
                        warn!("pty read error: {e}");
                        break;
                    }
                    Ok(None) => {
                        info!("pty stdin closed");
                        break;
                    }
                    Ok(Some(input)) => {
                        let input = input.trim();
                        if input.is_empty() { continue; }

                        if input == RESET_COMMAND {
                            state.reset_conversation(CONSOLE_USER);
                            println!("(conversation cleared)");
                            continue;
                        }

                        debug!(input = %input, "pty received line");
                        state.dispatch(console_event(input), &transport).await;
                    }
                }
            }
        }
    }

    state.report_event(CommsEvent::ChannelShutdown { channel_id });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn console_events_are_text_from_console_user() {
        let e = console_event("Haldi kab hai?");
        assert_eq!(e.from, CONSOLE_USER);
        assert_eq!(e.kind, MessageKind::Text);
        assert!(!e.is_group);
        assert!(e.media_id.is_none());
        assert_ne!(console_event("x").message_id, e.message_id);
    }
}
