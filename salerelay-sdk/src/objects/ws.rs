//! Live-update protocol constants.
//!
//! Subscribers open a WebSocket to the relay and receive one text frame per
//! sale, holding the encoded [`SaleEvent`](super::SaleEvent). Messages sent
//! by the subscriber are ignored.
//!
//! When the relay has a dedicated live listener it accepts upgrades at both
//! `/` and [`LIVE_PATH`]; when multiplexed on the ingress listener only
//! [`LIVE_PATH`] is served.

/// Path of the live-update endpoint.
pub const LIVE_PATH: &str = "/live";

/// Query parameter carrying the subscriber token, when one is configured.
pub const TOKEN_QUERY: &str = "token";

/// WebSocket close codes sent by the relay.
///
/// Codes in the 4000–4999 range are reserved for application use by
/// [RFC 6455 §7.4.2](https://www.rfc-editor.org/rfc/rfc6455#section-7.4.2).
pub struct LiveCloseCode;

impl LiveCloseCode {
    /// The relay is shutting down.
    pub const GOING_AWAY: u16 = 1001;

    /// A newer subscriber took over the single slot.
    pub const REPLACED: u16 = 4000;

    /// The subscriber fell behind or its queue was closed during a broadcast.
    pub const EVICTED: u16 = 4008;
}
