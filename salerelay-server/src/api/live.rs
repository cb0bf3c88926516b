//! Live-update WebSocket endpoint.
//!
//! Each upgraded connection is registered with the
//! [`SubscriberRegistry`](salerelay_core::SubscriberRegistry) and receives
//! every relayed sale as one JSON text frame. The relay never expects
//! application messages from subscribers; anything they send is ignored.

use axum::{
    Router,
    extract::{
        State,
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
    routing::get,
};
use salerelay_core::{CloseReason, Outbound, subscriber_channel};
use salerelay_sdk::objects::ws::LIVE_PATH;

use super::extractors::SubscriberAuth;
use crate::state::AppState;

/// Routes serving the live endpoint.
///
/// On a dedicated listener the endpoint answers at `/` as well as `/live`.
pub fn router(dedicated: bool) -> Router<AppState> {
    let router = Router::new().route(LIVE_PATH, get(live_ws));
    if dedicated {
        router.route("/", get(live_ws))
    } else {
        router
    }
}

/// `GET /live`: upgrade to a live-update stream.
async fn live_ws(
    State(state): State<AppState>,
    _auth: SubscriberAuth,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_subscriber(socket, state))
}

/// Drive one subscriber connection until either side ends it.
async fn handle_subscriber(mut socket: WebSocket, state: AppState) {
    let (tx, mut rx) = subscriber_channel(state.relay.subscriber_buffer);
    let id = state.registry.register(tx).await;
    tracing::info!(subscriber = %id, "live subscriber connected");

    let close_reason = loop {
        tokio::select! {
            outbound = rx.recv() => {
                match outbound {
                    Some(Outbound::Event(frame)) => {
                        if socket.send(Message::Text(frame.as_str().into())).await.is_err() {
                            break None;
                        }
                    }
                    Some(Outbound::Close(reason)) => break Some(reason),
                    // The registry dropped our queue without a reason.
                    None => break Some(CloseReason::Evicted),
                }
            }

            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break None,
                    Some(Ok(_)) => {}
                }
            }
        }
    };

    state.registry.mark_closing(id).await;
    if let Some(reason) = close_reason {
        tracing::info!(subscriber = %id, reason = reason.as_str(), "closing live subscriber");
        let _ = socket
            .send(Message::Close(Some(CloseFrame {
                code: reason.code(),
                reason: reason.as_str().into(),
            })))
            .await;
    } else {
        tracing::info!(subscriber = %id, "live subscriber disconnected");
    }
    state.registry.unregister(id).await;
}
