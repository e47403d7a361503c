//! Graceful shutdown: wait for an interrupt signal, then drain a
//! [`StreamGroup`].

use crate::stream::StreamGroup;

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Signal registration can fail in restricted environments (containers,
    // sandboxes); fall back rather than taking the whole process down with
    // it.
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => tracing::info!("received SIGTERM"),
                _ = sigint.recv() => tracing::info!("received SIGINT"),
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("received SIGINT");
            } else {
                tracing::error!("could not register any signal handlers, falling back to ctrl-c");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("received SIGTERM");
            } else {
                tracing::error!("could not register any signal handlers, falling back to ctrl-c");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("received ctrl-c"),
        Err(e) => tracing::error!(error = %e, "could not register ctrl-c handler"),
    }
}

/// Wait for SIGTERM/SIGINT (or ctrl-c on non-Unix platforms), then shut the
/// group down and wait for both of its pumps to drain.
pub async fn run_until_shutdown(group: &StreamGroup) {
    wait_for_signal().await;
    tracing::info!("shutting down, draining in-flight transfers");
    group.shutdown().await;
    tracing::info!("shutdown complete");
}
