//! Signal handling: graceful shutdown and item reload

use crate::config;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use voltage_rules::ItemsHandle;

/// Wait for Ctrl+C, or SIGTERM on Unix
pub async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let term_signal = match signal(SignalKind::terminate()) {
            Ok(sig) => Some(sig),
            Err(e) => {
                warn!(
                    "Failed to install SIGTERM handler: {}. Service will only respond to Ctrl+C",
                    e
                );
                None
            },
        };

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = async {
                if let Some(mut sig) = term_signal {
                    sig.recv().await;
                } else {
                    std::future::pending::<()>().await
                }
            } => {},
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

/// Cancel `token` once a shutdown signal arrives
pub fn spawn_shutdown_listener(token: CancellationToken) {
    tokio::spawn(async move {
        wait_for_shutdown().await;
        info!("Shutdown signal received");
        token.cancel();
    });
}

/// Reload the item list from `path` on SIGHUP (Unix only)
///
/// Policy numbers are fixed at startup; only `items` is replaced.
pub fn spawn_reload_on_hangup(path: PathBuf, items: ItemsHandle, token: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        tokio::spawn(async move {
            let mut hup = match signal(SignalKind::hangup()) {
                Ok(hup) => hup,
                Err(e) => {
                    warn!("SIGHUP handler: {}", e);
                    return;
                },
            };
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = hup.recv() => match config::load(&path) {
                        Ok(reloaded) => {
                            info!("Reloaded {} item(s) from {}", reloaded.items.len(), path.display());
                            items.replace(reloaded.items);
                        },
                        Err(e) => warn!("Reload failed, keeping current items: {:#}", e),
                    },
                }
            }
        });
    }
    #[cfg(not(unix))]
    {
        let _ = (path, items, token);
    }
}
