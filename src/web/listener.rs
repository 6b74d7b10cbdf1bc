//! Listener lifecycle shared by the config and reboot servers.
//!
//! A listener that fails to bind (port taken, privileged port without
//! rights) does not stop the appliance: it keeps retrying in the background
//! with jittered exponential backoff while the rest of the process runs.

use axum::Router;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tracing::{info, warn};

/// Status of a listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerStatus {
    /// Bound and serving requests.
    Running,
    /// Failed to bind, retrying in background.
    Retrying,
    /// Shut down.
    Stopped,
}

/// Backoff settings for [`start_server_with_retry`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub initial_ms: u64,
    pub jitter_ms: u64,
    pub max_ms: u64,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_ms: 5_000,
            jitter_ms: 1_000,
            max_ms: 60_000,
            multiplier: 2.0,
        }
    }
}

/// Handle for managing a listener's lifecycle.
#[derive(Debug)]
pub struct ServerHandle {
    label: &'static str,
    shutdown_tx: Option<oneshot::Sender<()>>,
    status_rx: watch::Receiver<ServerStatus>,
    addr_rx: watch::Receiver<Option<SocketAddr>>,
}

impl ServerHandle {
    pub fn label(&self) -> &'static str {
        self.label
    }

    pub fn status(&self) -> ServerStatus {
        *self.status_rx.borrow()
    }

    /// Bound address once running.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.addr_rx.borrow()
    }

    /// Wait until the listener is bound, up to `timeout`.
    pub async fn wait_running(&mut self, timeout: Duration) -> Option<SocketAddr> {
        let running = self
            .status_rx
            .wait_for(|status| *status == ServerStatus::Running);
        let ready = matches!(tokio::time::timeout(timeout, running).await, Ok(Ok(_)));
        if ready { self.local_addr() } else { None }
    }

    /// Trigger shutdown; in-flight requests finish in the background.
    pub fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

/// Bind `bind:port` and serve `app` until the returned sender fires.
///
/// Returns the shutdown sender and the actual bound address (useful when
/// `port` is 0).
pub async fn start_server(
    label: &'static str,
    app: Router,
    bind: &str,
    port: u16,
) -> anyhow::Result<(oneshot::Sender<()>, SocketAddr)> {
    let listener = tokio::net::TcpListener::bind((bind, port)).await?;
    let bound_addr = listener.local_addr()?;

    info!("{} server listening on http://{}", label, bound_addr);

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
                info!("{} server shutting down", label);
            })
            .await
        {
            tracing::error!("{} server error: {}", label, e);
        }
    });

    Ok((shutdown_tx, bound_addr))
}

/// Compute jittered delay for retry.
/// Uses system time nanoseconds for simple jitter without requiring rand crate.
fn compute_jittered_delay(base_ms: u64, jitter_ms: u64) -> Duration {
    use std::time::SystemTime;

    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);

    let jitter_range = (jitter_ms * 2) as i64;
    let jitter = if jitter_range > 0 {
        (nanos as i64 % jitter_range) - (jitter_ms as i64)
    } else {
        0
    };

    let delay_ms = (base_ms as i64 + jitter).max(1000) as u64;
    Duration::from_millis(delay_ms)
}

/// Start a listener that retries binding in the background.
///
/// Never fails; the returned handle reports `Retrying` until the bind
/// succeeds.
pub fn start_server_with_retry(
    label: &'static str,
    app: Router,
    bind: String,
    port: u16,
    retry: RetryPolicy,
) -> ServerHandle {
    let (status_tx, status_rx) = watch::channel(ServerStatus::Retrying);
    let (addr_tx, addr_rx) = watch::channel(None);
    let (handle_shutdown_tx, mut handle_shutdown_rx) = oneshot::channel::<()>();

    tokio::spawn(async move {
        let mut current_delay_ms = retry.initial_ms;

        loop {
            match handle_shutdown_rx.try_recv() {
                Ok(()) | Err(oneshot::error::TryRecvError::Closed) => {
                    info!("{} retry loop shutting down", label);
                    let _ = status_tx.send(ServerStatus::Stopped);
                    break;
                }
                Err(oneshot::error::TryRecvError::Empty) => {}
            }

            match start_server(label, app.clone(), &bind, port).await {
                Ok((server_shutdown_tx, bound_addr)) => {
                    let _ = addr_tx.send(Some(bound_addr));
                    let _ = status_tx.send(ServerStatus::Running);

                    let _ = (&mut handle_shutdown_rx).await;
                    let _ = server_shutdown_tx.send(());
                    let _ = status_tx.send(ServerStatus::Stopped);
                    break;
                }
                Err(e) => {
                    warn!(
                        "Failed to start {} server on {}:{}: {}. Retrying in {:.1}s...",
                        label,
                        bind,
                        port,
                        e,
                        current_delay_ms as f64 / 1000.0
                    );
                    let _ = status_tx.send(ServerStatus::Retrying);

                    let delay = compute_jittered_delay(current_delay_ms, retry.jitter_ms);
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = &mut handle_shutdown_rx => {
                            let _ = status_tx.send(ServerStatus::Stopped);
                            break;
                        }
                    }

                    current_delay_ms =
                        ((current_delay_ms as f64 * retry.multiplier) as u64).min(retry.max_ms);
                }
            }
        }
    });

    ServerHandle {
        label,
        shutdown_tx: Some(handle_shutdown_tx),
        status_rx,
        addr_rx,
    }
}
