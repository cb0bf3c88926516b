//! Application state shared across all request handlers.

use crate::config::runtime::{AuthConfig, RelayConfig, ServerConfig};
use salerelay_core::{Broadcaster, EventIngress, SubscriberRegistry};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Application state that is shared across all request handlers.
///
/// This is cloneable and cheap to pass around (everything is behind Arc).
#[derive(Clone)]
pub struct AppState {
    /// Validates submissions and hands them to the broadcaster.
    pub ingress: Arc<EventIngress>,
    /// Connected live-update subscribers.
    pub registry: Arc<SubscriberRegistry>,
    /// Listener configuration the process was started with.
    pub server: Arc<ServerConfig>,
    /// Relay behaviour the process was started with.
    pub relay: RelayConfig,
    /// Authentication settings (can be reloaded via SIGHUP).
    pub auth: Arc<RwLock<AuthConfig>>,
}

impl AppState {
    /// Wire up the registry, broadcaster and ingress for the given configuration.
    pub fn new(server: ServerConfig, relay: RelayConfig, auth: AuthConfig) -> Self {
        let registry = Arc::new(SubscriberRegistry::new(relay.policy));
        let ingress = Arc::new(EventIngress::new(Broadcaster::new(registry.clone())));
        Self {
            ingress,
            registry,
            server: Arc::new(server),
            relay,
            auth: Arc::new(RwLock::new(auth)),
        }
    }

    /// Get a read lock on the authentication settings.
    pub async fn auth(&self) -> tokio::sync::RwLockReadGuard<'_, AuthConfig> {
        self.auth.read().await
    }

    /// Update the authentication settings (used during SIGHUP reload).
    pub async fn update_auth(&self, new_auth: AuthConfig) {
        let mut auth = self.auth.write().await;
        *auth = new_auth;
    }
}
