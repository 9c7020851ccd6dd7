//! Graceful shutdown handling
//!
//! The process-wide shutdown signal is a [`CancelSignal`]. Servers stop
//! accepting on it, and the movie handler passes it to its gateways so retry
//! loops stop at shutdown.
//!
//! There is no per-request signal. When a client cancels or disconnects,
//! tonic drops the handler future, which drops any in-flight gateway call and
//! its retry loop with it. Cache and repository lookups are not signalled.

use tracing::{error, info};

use movieapp_common::CancelSignal;

/// Fire the returned signal on Ctrl+C or SIGTERM
pub fn wait_for_shutdown_signal() -> CancelSignal {
    let shutdown = CancelSignal::new();
    let shutdown_clone = shutdown.clone();

    tokio::spawn(async move {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to install Ctrl+C handler: {}", e);
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
                    error!("Failed to install SIGTERM handler: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {
                info!("Received Ctrl+C, initiating graceful shutdown...");
            }
            _ = terminate => {
                info!("Received SIGTERM, initiating graceful shutdown...");
            }
        }

        shutdown_clone.cancel();
    });

    shutdown
}
