//! Shutdown signal handling.
//!
//! The first SIGINT/SIGTERM cancels the shared token so running work can
//! wind down; a second one exits immediately with status 1.

use tokio_util::sync::CancellationToken;

pub fn spawn_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        shutdown_signal().await;
        tracing::warn!("Shutdown requested, finishing up (repeat to force exit)");
        cancel.cancel();

        shutdown_signal().await;
        tracing::error!("Second shutdown request, exiting immediately");
        std::process::exit(1);
    });
}

/// Wait for SIGINT (Ctrl-C) or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
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
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
