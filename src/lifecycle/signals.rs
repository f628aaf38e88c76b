//! OS signal handling.
//!
//! # Responsibilities
//! - Resolve on SIGINT (Ctrl-C) or SIGTERM to start graceful shutdown
//! - Turn SIGUSR1 into log-reopen notifications
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - Reopen requests go through a coalescing `Notifier`, so bursts of
//!   SIGUSR1 cause a single reopen

#[cfg(unix)]
use tokio::task::JoinHandle;

#[cfg(unix)]
use crate::admission::Notifier;

/// Resolve when the process is asked to terminate.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!(signal = "SIGINT", "Shutdown signal received"),
        _ = terminate => tracing::info!(signal = "SIGTERM", "Shutdown signal received"),
    }
}

/// Notify `notifier` on every SIGUSR1.
#[cfg(unix)]
pub fn spawn_reopen_on_sigusr1(notifier: Notifier) -> std::io::Result<JoinHandle<()>> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut stream = signal(SignalKind::user_defined1())?;
    Ok(tokio::spawn(async move {
        while stream.recv().await.is_some() {
            tracing::debug!(signal = "SIGUSR1", "Log reopen requested");
            notifier.notify();
        }
    }))
}
