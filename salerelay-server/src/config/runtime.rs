//! Validated runtime configuration.

use salerelay_core::RegistryPolicy;
use std::net::SocketAddr;

/// Listener configuration. Changes require a restart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// The ingress listener address.
    pub listen: SocketAddr,
    /// Dedicated live-update listener, or `None` when the live endpoint is
    /// served on `listen`.
    pub live_listen: Option<SocketAddr>,
}

/// Relay behaviour. Changes require a restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayConfig {
    pub policy: RegistryPolicy,
    pub subscriber_buffer: usize,
}

/// Authentication settings. Reloaded on SIGHUP.
#[derive(Clone, Default)]
pub struct AuthConfig {
    ingress_secret: Option<Box<[u8]>>,
    subscriber_token: Option<String>,
}

impl AuthConfig {
    pub fn new(ingress_secret: Option<String>, subscriber_token: Option<String>) -> Self {
        Self {
            ingress_secret: ingress_secret.map(|s| s.into_bytes().into_boxed_slice()),
            subscriber_token,
        }
    }

    /// Secret ingress bodies must be signed with, if any.
    pub fn ingress_secret(&self) -> Option<&[u8]> {
        self.ingress_secret.as_deref()
    }

    /// Token subscribers must present, if any.
    pub fn subscriber_token(&self) -> Option<&str> {
        self.subscriber_token.as_deref()
    }
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("ingress_secret", &self.ingress_secret.as_ref().map(|_| "<redacted>"))
            .field(
                "subscriber_token",
                &self.subscriber_token.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}
