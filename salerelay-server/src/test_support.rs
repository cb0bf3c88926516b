//! Helpers shared by the server's unit tests.

use crate::config::runtime::{AuthConfig, RelayConfig, ServerConfig};
use crate::state::AppState;
use axum::Router;
use salerelay_core::{RegistryPolicy, SubscriberRegistry};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;

pub fn relay_config() -> RelayConfig {
    RelayConfig {
        policy: RegistryPolicy::FanOut,
        subscriber_buffer: 8,
    }
}

/// Build state; `shared_live` mounts the live endpoint on the ingress router.
pub fn state_with(relay: RelayConfig, auth: AuthConfig, shared_live: bool) -> AppState {
    let server = ServerConfig {
        listen: "127.0.0.1:0".parse().unwrap(),
        live_listen: (!shared_live).then(|| "127.0.0.1:0".parse().unwrap()),
    };
    AppState::new(server, relay, auth)
}

/// Serve `router` on an ephemeral local port.
pub async fn spawn(router: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, router).await });
    addr
}

/// Wait until the registry holds exactly `count` subscribers.
pub async fn wait_for_subscribers(registry: &SubscriberRegistry, count: usize) {
    let waited = tokio::time::timeout(Duration::from_secs(5), async {
        while registry.len().await != count {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(waited.is_ok(), "registry never reached {count} subscribers");
}
