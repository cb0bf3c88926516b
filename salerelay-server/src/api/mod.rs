//! HTTP and WebSocket handlers.
//!
//! # Endpoints
//!
//! - `POST /add-upi-sale`         – submit a sale for relaying
//! - `GET  /api/transaction/sms`  – reachability probe
//! - `POST /api/transaction/sms`  – log an arbitrary transaction notification
//! - `GET  /live` (and `/` on the dedicated listener) – live-update WebSocket

use axum::{
    Router,
    routing::{get, post},
};
use salerelay_sdk::objects::INGRESS_PATH;

use crate::state::AppState;

mod extractors;
mod ingress;
pub mod live;
mod transaction;

/// Largest accepted request body.
pub const MAX_BODY_BYTES: usize = 64 * 1024;

/// Build the ingress API router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route(INGRESS_PATH, post(ingress::add_sale))
        .route(
            "/api/transaction/sms",
            get(transaction::probe).post(transaction::receive),
        )
}
