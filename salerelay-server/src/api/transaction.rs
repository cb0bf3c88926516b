use axum::{Json, extract::rejection::JsonRejection, http::StatusCode};
use serde::Serialize;
use serde_json::Value;

#[derive(Serialize)]
pub(super) struct Received {
    message: &'static str,
}

/// `GET /api/transaction/sms`: reachability probe for notification forwarders.
pub(super) async fn probe() -> &'static str {
    "API endpoint reachable"
}

/// `POST /api/transaction/sms`: log a transaction notification.
///
/// The payload is free-form JSON and is not relayed to subscribers.
pub(super) async fn receive(
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Received>, (StatusCode, String)> {
    let Json(payload) = payload.map_err(|e| {
        tracing::warn!(error = %e, "rejected transaction notification");
        (e.status(), e.body_text())
    })?;
    tracing::info!(%payload, "transaction notification received");
    Ok(Json(Received {
        message: "Received",
    }))
}

#[cfg(test)]
mod tests {
    use crate::server::build_router;
    use crate::test_support::{relay_config, state_with};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    #[tokio::test]
    async fn probe_answers() {
        let router = build_router(state_with(relay_config(), Default::default(), true));
        let response = router
            .oneshot(Request::get("/api/transaction/sms").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], b"API endpoint reachable");
    }

    #[tokio::test]
    async fn notification_is_acknowledged() {
        let router = build_router(state_with(relay_config(), Default::default(), true));
        let request = Request::post("/api/transaction/sms")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"sender":"VM-BANK","body":"credited"}"#))
            .unwrap();
        let response = router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], br#"{"message":"Received"}"#);
    }

    #[tokio::test]
    async fn notification_without_json_is_refused() {
        let router = build_router(state_with(relay_config(), Default::default(), true));
        let request = Request::post("/api/transaction/sms")
            .body(Body::from("plain text"))
            .unwrap();
        let response = router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    }
}
