//! Graceful shutdown signal handling

use tracing::info;

/// Resolve when the process receives a termination signal (Ctrl+C or, on
/// unix, SIGTERM)
///
/// Signal streams are process-global, so the launcher awaits this once and
/// then drives the cooperative shutdown sequence (unregister, cleanup, exit).
pub async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Ctrl+C received, shutting down");
        }
        _ = terminate => {
            info!("SIGTERM received, shutting down");
        }
    }
}
