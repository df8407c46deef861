// Shutdown signals - Ctrl+C / SIGTERM mapped onto a CancellationToken

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Cancel `token` on the first interrupt or terminate notification.
///
/// Returns immediately; the listener runs as a background task.
pub fn cancel_on_shutdown_signal(token: CancellationToken) {
    tokio::spawn(async move {
        tokio::select! {
            _ = wait_for_signal() => {
                info!("Received shutdown signal, finishing current work");
                token.cancel();
            }
            _ = token.cancelled() => {}
        }
    });
}

async fn wait_for_signal() {
    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = interrupt => {}
        _ = terminate => {}
    }
}
