//! Clients for both ends of the relay.
//!
//! Gated behind the `client` cargo feature so crates that only need the
//! shared types do not pull in `reqwest` and `tokio-tungstenite`.
//!
//! - [`IngressClient`] is used by producers to submit sales.
//! - [`ReconnectingClient`] keeps a subscriber connected to the live-update
//!   endpoint.

mod ingress;
mod live;

pub use ingress::IngressClient;
pub use live::{
    ConnectionState, DEFAULT_RECONNECT_DELAY, LiveError, LiveSubscription, ReconnectPolicy,
    ReconnectingClient,
};

use reqwest::StatusCode;

/// Errors produced by the ingress HTTP client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Transport-level failure (DNS, TLS, connection reset, …).
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// The relay returned a non-2xx status code.
    #[error("api error: status {status}, body: {body}")]
    Api { status: StatusCode, body: String },

    /// Request or response body could not be (de)serialized.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// The base URL could not be joined with the endpoint path.
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
}
