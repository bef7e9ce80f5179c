use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, info, warn};

use crate::api::{self, AppState};
use crate::channels::{Messenger, UpdateSource};
use crate::config::Config;
use crate::dispatcher::Dispatcher;
use crate::error::{CourierError, Result};
use crate::poller;
use crate::registry::ChatRegistry;

/// Owns the shared pieces and runs the poll loop and HTTP API side by side.
pub struct Relay {
    registry: Arc<ChatRegistry>,
    messenger: Arc<dyn Messenger>,
    listener: Option<TcpListener>,
    grace: Duration,
}

impl Relay {
    /// Bind the HTTP listener (when the API is enabled). Binding happens
    /// before anything is spawned so a taken port fails startup.
    pub async fn bind(config: &Config, messenger: Arc<dyn Messenger>) -> Result<Self> {
        let listener = if config.api.enabled {
            let addr = config.api.bind_addr();
            let listener = TcpListener::bind(&addr)
                .await
                .map_err(|e| CourierError::Config(format!("Failed to bind to {addr}: {e}")))?;
            Some(listener)
        } else {
            None
        };

        Ok(Self {
            registry: Arc::new(ChatRegistry::new()),
            messenger,
            listener,
            grace: Duration::from_secs(config.shutdown.grace_secs),
        })
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.as_ref().and_then(|l| l.local_addr().ok())
    }

    pub fn registry(&self) -> Arc<ChatRegistry> {
        self.registry.clone()
    }

    /// Run until `shutdown` resolves (or the HTTP server dies), then cancel
    /// both tasks and wait for them.
    ///
    /// Everything after cancellation shares one deadline, `grace` from the
    /// moment shutdown begins: stopping the update stream, draining HTTP
    /// requests and finishing in-flight dispatches. Whatever is still running
    /// then is abandoned.
    pub async fn run<S>(self, source: S, shutdown: impl Future<Output = ()>) -> Result<()>
    where
        S: UpdateSource + 'static,
    {
        let cancel = CancellationToken::new();
        let tracker = TaskTracker::new();
        let dispatcher = Arc::new(Dispatcher::new(
            self.registry.clone(),
            self.messenger.clone(),
        ));

        let mut poll_task = tokio::spawn(poller::run_poll_loop(
            source,
            dispatcher,
            tracker.clone(),
            cancel.clone(),
        ));

        let mut api_task = self.listener.map(|listener| {
            if let Ok(addr) = listener.local_addr() {
                log_endpoints(addr);
            }
            let state = Arc::new(AppState {
                registry: self.registry.clone(),
                messenger: self.messenger.clone(),
            });
            let router = api::router(state);
            let cancel = cancel.clone();
            let grace = self.grace;
            tokio::spawn(async move {
                if let Err(e) = api::serve(listener, router, cancel.clone(), grace).await {
                    error!("HTTP API error: {e}");
                    // Take the rest of the relay down with it.
                    cancel.cancel();
                }
            })
        });
        if api_task.is_none() {
            info!("HTTP API disabled, running the poll loop only");
        }

        tokio::select! {
            _ = shutdown => info!("Shutdown signal received, shutting down gracefully..."),
            _ = cancel.cancelled() => warn!("A component stopped unexpectedly, shutting down..."),
        }
        cancel.cancel();
        let deadline = Instant::now() + self.grace;
        tracker.close();

        match tokio::time::timeout_at(deadline, &mut poll_task).await {
            Ok(Err(e)) => error!("Poll loop task failed: {e}"),
            Ok(Ok(())) => {}
            Err(_) => {
                warn!("Poll loop did not stop within the grace period, aborting it");
                poll_task.abort();
            }
        }
        if let Some(api_task) = api_task.as_mut() {
            match tokio::time::timeout_at(deadline, &mut *api_task).await {
                Ok(Err(e)) => error!("HTTP API task failed: {e}"),
                Ok(Ok(())) => {}
                Err(_) => {
                    warn!("HTTP API did not stop within the grace period, aborting it");
                    api_task.abort();
                }
            }
        }
        if tokio::time::timeout_at(deadline, tracker.wait()).await.is_err() {
            warn!(
                "{} dispatch task(s) still running after {}s, abandoning them",
                tracker.len(),
                self.grace.as_secs()
            );
        }

        info!("Relay stopped");
        Ok(())
    }
}

fn log_endpoints(addr: SocketAddr) {
    info!("HTTP API listening on http://{addr}");
    info!("  POST /api/v1/send      - send a message to one chat");
    info!("  POST /api/v1/broadcast - send a message to every known chat");
    info!("  GET  /api/v1/chats     - list known chats");
    info!("  GET  /health           - health check");
}

/// Resolves on SIGINT or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
