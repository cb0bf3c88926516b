//! Signal handling for graceful shutdown and config reload.

use crate::config::ConfigLoader;
use crate::state::AppState;
use salerelay_core::SubscriberRegistry;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::{Notify, watch};

/// Creates a future that completes when a shutdown signal is received.
///
/// Listens for SIGTERM and SIGINT (Ctrl+C).
pub async fn shutdown_signal() {
    let (mut sigterm, mut sigint) = match (
        signal(SignalKind::terminate()),
        signal(SignalKind::interrupt()),
    ) {
        (Ok(sigterm), Ok(sigint)) => (sigterm, sigint),
        (Err(e), _) | (_, Err(e)) => {
            tracing::error!("Failed to install signal handlers: {}", e);
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = sigterm.recv() => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        }
        _ = sigint.recv() => {
            tracing::info!("Received SIGINT, initiating graceful shutdown");
        }
    }
}

/// Spawns a task that flips the returned watch to `true` on SIGTERM/SIGINT.
pub fn spawn_shutdown_watch() -> watch::Receiver<bool> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    shutdown_rx
}

/// Send `1001 Going Away` to every live subscriber and wait up to `grace`
/// for their connection tasks to finish.
///
/// Upgraded WebSocket connections outlive the HTTP listeners, so this runs
/// after the servers have stopped. Returns `false` if the grace period ran
/// out first.
pub async fn close_subscribers(registry: &SubscriberRegistry, grace: Duration) -> bool {
    let closing = registry.drain().await;
    if closing == 0 {
        return true;
    }
    tracing::info!(subscribers = closing, "Closing live subscriber connections");

    match tokio::time::timeout(grace, registry.wait_until_empty()).await {
        Ok(()) => {
            tracing::info!("Closed live subscriber connections");
            true
        }
        Err(_) => {
            tracing::warn!(
                remaining = registry.len().await,
                "Timed out waiting for live subscribers to close"
            );
            false
        }
    }
}

/// Completes once the shutdown watch reads `true` (or its sender is gone).
pub async fn wait_for_shutdown(mut shutdown_rx: watch::Receiver<bool>) {
    let _ = shutdown_rx.wait_for(|stop| *stop).await;
}

/// Spawns a task that listens for SIGHUP and reloads the configuration.
///
/// Only the `auth` section is applied at runtime; listener and relay
/// changes are reported as requiring a restart.
///
/// Returns a Notify that can be used to signal when shutdown is complete.
pub fn spawn_config_reload_handler(state: AppState, config_loader: Arc<ConfigLoader>) -> Arc<Notify> {
    let shutdown_notify = Arc::new(Notify::new());
    let shutdown_notify_clone = shutdown_notify.clone();

    tokio::spawn(async move {
        let mut sighup = match signal(SignalKind::hangup()) {
            Ok(sighup) => sighup,
            Err(e) => {
                tracing::error!("Failed to install SIGHUP handler: {}", e);
                return;
            }
        };

        loop {
            tokio::select! {
                _ = sighup.recv() => {
                    tracing::info!("Received SIGHUP, reloading configuration");
                    match config_loader.reload() {
                        Ok(loaded_config) => {
                            state.update_auth(loaded_config.auth).await;

                            if loaded_config.server != *state.server {
                                tracing::warn!("Listener changes require a restart to take effect");
                            }
                            if loaded_config.relay != state.relay {
                                tracing::warn!("Relay policy changes require a restart to take effect");
                            }

                            tracing::info!("Configuration reloaded successfully");
                        }
                        Err(e) => {
                            tracing::error!("Failed to reload configuration: {}", e);
                        }
                    }
                }
                _ = shutdown_notify_clone.notified() => {
                    tracing::debug!("Config reload handler shutting down");
                    break;
                }
            }
        }
    });

    shutdown_notify
}
