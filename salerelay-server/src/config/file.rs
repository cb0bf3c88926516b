//! TOML file configuration structures.
//!
//! These structs directly map to the `salerelay.toml` file format. Every
//! field has a default, so an absent file or section is valid.

use salerelay_core::RegistryPolicy;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

/// Root configuration structure as read from the TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub relay: RelayConfig,
    #[serde(default)]
    pub auth: AuthConfig,
}

/// Server configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address of the ingress listener (e.g., "0.0.0.0:40509").
    #[serde(default = "default_listen_addr")]
    pub listen: SocketAddr,
    /// Address of the dedicated live-update listener.
    #[serde(default = "default_live_listen_addr")]
    pub live_listen: SocketAddr,
    /// Serve the live endpoint on `listen` at `/live` instead of on
    /// `live_listen`.
    #[serde(default)]
    pub shared_live: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen_addr(),
            live_listen: default_live_listen_addr(),
            shared_live: false,
        }
    }
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 40509))
}

fn default_live_listen_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 40510))
}

/// Relay behaviour section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// `fan_out` or `latest_only`.
    #[serde(default)]
    pub policy: RegistryPolicy,
    /// Frames queued per subscriber before it is evicted as too slow.
    #[serde(default = "default_subscriber_buffer")]
    pub subscriber_buffer: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            policy: RegistryPolicy::default(),
            subscriber_buffer: default_subscriber_buffer(),
        }
    }
}

fn default_subscriber_buffer() -> usize {
    32
}

/// Optional authentication section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    /// HMAC secret producers sign ingress bodies with.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingress_secret: Option<String>,
    /// Token subscribers present as `?token=`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscriber_token: Option<String>,
}
