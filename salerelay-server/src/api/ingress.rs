use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use salerelay_core::ValidationError;
use salerelay_sdk::objects::Ack;

use super::extractors::IngressBody;
use crate::state::AppState;

/// Error returned when a submission fails validation.
#[derive(Debug)]
pub(super) struct IngressError(ValidationError);

impl From<ValidationError> for IngressError {
    fn from(err: ValidationError) -> Self {
        Self(err)
    }
}

impl IntoResponse for IngressError {
    fn into_response(self) -> Response {
        tracing::warn!(error = %self.0, "rejected sale submission");
        (StatusCode::BAD_REQUEST, Json(Ack::rejected(self.0.to_string()))).into_response()
    }
}

/// `POST /add-upi-sale`: accept one sale from the producer.
///
/// The body must be a JSON object with `amount`, `date` and `time`. A valid
/// sale is acknowledged with `{"ok":1}` once it has been queued for every
/// connected subscriber; delivery itself is not awaited.
pub(super) async fn add_sale(
    State(state): State<AppState>,
    IngressBody(body): IngressBody,
) -> Result<Json<Ack>, IngressError> {
    let ack = state.ingress.submit_raw(&body).await?;
    Ok(Json(ack))
}

#[cfg(test)]
mod tests {
    use crate::config::runtime::AuthConfig;
    use crate::server::build_router;
    use crate::test_support::{relay_config, state_with};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use salerelay_core::{Outbound, subscriber_channel};
    use salerelay_sdk::signature::{SIGNATURE_HEADER, sign_body};
    use serde_json::Value;
    use tower::ServiceExt;

    const SALE: &str = r#"{"amount":250,"date":"2024-06-01","time":"14:30"}"#;

    fn post(body: &'static str) -> Request<Body> {
        Request::post("/add-upi-sale")
            .header("content-type", "application/json")
            .body(Body::from(body))
            .unwrap()
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), 4096).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn valid_sale_is_acknowledged_and_relayed() {
        let state = state_with(relay_config(), AuthConfig::default(), true);
        let (tx, mut rx) = subscriber_channel(4);
        state.registry.register(tx).await;

        let response = build_router(state).oneshot(post(SALE)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await, serde_json::json!({ "ok": 1 }));

        match rx.recv().await {
            Some(Outbound::Event(frame)) => assert_eq!(frame.as_str(), SALE),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn sale_without_subscribers_is_still_acknowledged() {
        let router = build_router(state_with(relay_config(), AuthConfig::default(), true));
        let response = router.oneshot(post(SALE)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn missing_field_is_rejected() {
        let router = build_router(state_with(relay_config(), AuthConfig::default(), true));
        let response = router
            .oneshot(post(r#"{"amount":250,"date":"2024-06-01"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["ok"], 0);
        assert_eq!(body["error"], "missing field `time`");
    }

    #[tokio::test]
    async fn non_json_body_is_rejected() {
        let router = build_router(state_with(relay_config(), AuthConfig::default(), true));
        let response = router.oneshot(post("amount=250")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["ok"], 0);
    }

    #[tokio::test]
    async fn oversized_body_is_rejected() {
        let router = build_router(state_with(relay_config(), AuthConfig::default(), true));
        let huge = format!(
            r#"{{"amount":1,"date":"2024-06-01","time":"{}"}}"#,
            "x".repeat(super::super::MAX_BODY_BYTES)
        );
        let request = Request::post("/add-upi-sale").body(Body::from(huge)).unwrap();
        let response = router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unsigned_submission_is_refused_when_secret_is_set() {
        let auth = AuthConfig::new(Some("producer-secret".to_owned()), None);
        let router = build_router(state_with(relay_config(), auth, true));
        let response = router.oneshot(post(SALE)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn signed_submission_is_accepted() {
        let auth = AuthConfig::new(Some("producer-secret".to_owned()), None);
        let router = build_router(state_with(relay_config(), auth, true));
        let request = Request::post("/add-upi-sale")
            .header(SIGNATURE_HEADER, sign_body(SALE.as_bytes(), b"producer-secret"))
            .body(Body::from(SALE))
            .unwrap();
        let response = router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn signature_over_other_body_is_refused() {
        let auth = AuthConfig::new(Some("producer-secret".to_owned()), None);
        let router = build_router(state_with(relay_config(), auth, true));
        let request = Request::post("/add-upi-sale")
            .header(SIGNATURE_HEADER, sign_body(b"{}", b"producer-secret"))
            .body(Body::from(SALE))
            .unwrap();
        let response = router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn garbled_signature_header_is_a_bad_request() {
        let auth = AuthConfig::new(Some("producer-secret".to_owned()), None);
        let router = build_router(state_with(relay_config(), auth, true));
        let request = Request::post("/add-upi-sale")
            .header(SIGNATURE_HEADER, "not-a-signature")
            .body(Body::from(SALE))
            .unwrap();
        let response = router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
