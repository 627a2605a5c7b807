//! Component runtime shared by the comms channels.
//!
//! A [`Component`] is an independently-runnable unit (the console, the
//! WhatsApp webhook server) built with its shared state already captured.
//! [`spawn_components`] runs them on a [`JoinSet`] and hands back a
//! [`SubsystemHandle`]; the first component error cancels the shared
//! [`CancellationToken`] so siblings wind down too.

use std::future::Future;
use std::pin::Pin;

use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::error::AppError;

// ── Component ─────────────────────────────────────────────────────────────────

/// Boxed run-loop of a [`Component`].
pub type ComponentFuture = Pin<Box<dyn Future<Output = Result<(), AppError>> + Send + 'static>>;

/// A channel task. Everything it needs is captured at construction; `run`
/// is called exactly once and should return when `shutdown` fires or its
/// input is exhausted.
pub trait Component: Send + 'static {
    /// Identifier for logs.
    fn id(&self) -> &str;

    fn run(self: Box<Self>, shutdown: CancellationToken) -> ComponentFuture;
}

// ── SubsystemHandle ───────────────────────────────────────────────────────────

/// Resolves once every spawned component has exited.
pub struct SubsystemHandle {
    inner: JoinHandle<Result<(), AppError>>,
}

impl SubsystemHandle {
    /// Wait for the component set; yields the first failure, if any.
    pub async fn join(self) -> Result<(), AppError> {
        self.inner
            .await
            .unwrap_or_else(|e| Err(AppError::Comms(format!("component task panicked: {e}"))))
    }
}

// ── spawn_components ──────────────────────────────────────────────────────────

/// Run every component on its own task.
///
/// A failing or panicking component cancels `shutdown`, the rest are still
/// drained, and the first failure is what [`SubsystemHandle::join`] returns.
pub fn spawn_components(components: Vec<Box<dyn Component>>, shutdown: CancellationToken) -> SubsystemHandle {
    let inner = tokio::spawn(async move {
        let mut set: JoinSet<(String, Result<(), AppError>)> = JoinSet::new();
        for component in components {
            let id = component.id().to_string();
            debug!(component = %id, "spawning component");
            let run = component.run(shutdown.clone());
            set.spawn(async move { (id, run.await) });
        }

        let mut first_err: Option<AppError> = None;
        while let Some(joined) = set.join_next().await {
            let failure = match joined {
                Ok((id, Ok(()))) => {
                    info!(component = %id, "component exited");
                    continue;
                }
                Ok((id, Err(e))) => {
                    error!(component = %id, error = %e, "component failed");
                    e
                }
                Err(e) => {
                    error!(error = %e, "component panicked");
                    AppError::Comms(format!("component panicked: {e}"))
                }
            };
            shutdown.cancel();
            first_err.get_or_insert(failure);
        }

        first_err.map_or(Ok(()), Err)
    });

    SubsystemHandle { inner }
}
