//! Process-wide cancellation watcher.
//!
//! A `CancelScope` owns the `CancellationToken` handed to every session of
//! one operation and cancels it on SIGINT, SIGTERM or an optional deadline.
//! Cancellation is cooperative: sessions observe the token between and
//! during calls.

use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::select;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Cancellation token plus the watcher that fires it.
///
/// Must be created inside a tokio runtime. Dropping the scope stops the watcher.
pub struct CancelScope {
    token: CancellationToken,
    reason: Arc<OnceLock<String>>,
    watcher: JoinHandle<()>,
}

impl CancelScope {
    /// Start watching for signals and, when given, the deadline.
    pub fn new(deadline: Option<Duration>) -> Self {
        let token = CancellationToken::new();
        let reason = Arc::new(OnceLock::new());

        let watcher = {
            let token = token.clone();
            let reason = Arc::clone(&reason);
            tokio::spawn(async move {
                let why = select! {
                    _ = token.cancelled() => return,
                    _ = tokio::signal::ctrl_c() => "interrupted".to_string(),
                    _ = terminate() => "terminated".to_string(),
                    _ = expire(deadline) => format!("deadline of {:?} exceeded", deadline.unwrap_or_default()),
                };
                tracing::warn!(reason = %why, "Cancelling operation");
                let _ = reason.set(why);
                token.cancel();
            })
        };

        Self { token, reason, watcher }
    }

    /// Token to hand to connectors.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Why the token fired, if it has.
    pub fn reason(&self) -> Option<&str> {
        self.reason.get().map(String::as_str)
    }

    /// Whether the operation was cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl Drop for CancelScope {
    fn drop(&mut self) {
        self.watcher.abort();
    }
}

async fn expire(deadline: Option<Duration>) {
    match deadline {
        Some(deadline) => tokio::time::sleep(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(unix)]
async fn terminate() {
    use tokio::signal::unix::{signal, SignalKind};
    match signal(SignalKind::terminate()) {
        Ok(mut stream) => {
            stream.recv().await;
        }
        Err(e) => {
            tracing::warn!(error = %e, "Cannot watch SIGTERM");
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn terminate() {
    std::future::pending::<()>().await;
}
