//! OS signal handling.
//!
//! - SIGINT / SIGTERM: trigger graceful shutdown; a second one exits at once
//! - SIGHUP: reload the routes file

use crate::lifecycle::Shutdown;
use crate::routing::RouteTableHandle;

/// Install the handlers. Runs until shutdown.
pub async fn handle_signals(shutdown: Shutdown, routes: RouteTableHandle) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let (mut term, mut hup) = match (signal(SignalKind::terminate()), signal(SignalKind::hangup())) {
            (Ok(term), Ok(hup)) => (term, hup),
            (Err(e), _) | (_, Err(e)) => {
                tracing::error!(error = %e, "Failed to install signal handlers, falling back to Ctrl+C");
                wait_ctrl_c(&shutdown).await;
                return;
            }
        };

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => request_shutdown(&shutdown, "SIGINT"),
                _ = term.recv() => request_shutdown(&shutdown, "SIGTERM"),
                _ = hup.recv() => {
                    tracing::info!("SIGHUP received, reloading routes");
                    let _ = routes.reload().await;
                }
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = routes;
        loop {
            wait_ctrl_c(&shutdown).await;
        }
    }
}

async fn wait_ctrl_c(shutdown: &Shutdown) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => request_shutdown(shutdown, "Ctrl+C"),
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    }
}

fn request_shutdown(shutdown: &Shutdown, signal: &str) {
    if shutdown.is_triggered() {
        tracing::warn!(signal, "Second shutdown signal, exiting immediately");
        std::process::exit(130);
    }
    tracing::info!(signal, "Shutdown signal received");
    shutdown.trigger();
}
