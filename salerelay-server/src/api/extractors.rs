//! Custom Axum extractors for request authentication.
//!
//! Provides:
//! - `IngressBody`: reads the raw submission body and, when an ingress
//!   secret is configured, verifies its `Relay-Signature` header.
//! - `SubscriberAuth`: checks the `?token=` query parameter on live-update
//!   upgrades when a subscriber token is configured.
//!
//! All cryptographic operations are delegated to [`salerelay_sdk::signature`].

use axum::{
    Json,
    body::Bytes,
    extract::{FromRequest, FromRequestParts, Query, Request},
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Response},
};
use salerelay_sdk::objects::Ack;
use salerelay_sdk::signature::{self, SIGNATURE_HEADER, SignatureError};
use serde::Deserialize;

use super::MAX_BODY_BYTES;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// IngressBody: producer authentication via signed body
// ---------------------------------------------------------------------------

/// Raw ingress request body, authenticated when the relay has an ingress
/// secret.
///
/// # Header format
///
/// ```text
/// Relay-Signature: {unix_timestamp}.{base64_signature}
/// ```
///
/// The signature is computed as `HMAC-SHA256("{timestamp}.{raw_body}", ingress_secret)`.
pub struct IngressBody(pub Bytes);

/// Errors that can occur while reading or authenticating the body.
#[derive(Debug, thiserror::Error)]
pub enum IngressBodyError {
    #[error("missing Relay-Signature header")]
    MissingHeader,
    #[error("invalid Relay-Signature header format")]
    InvalidHeader,
    #[error("invalid signature encoding")]
    InvalidBase64,
    #[error("failed to read request body")]
    BodyReadError,
    #[error("signature verification failed")]
    VerificationFailed,
}

impl From<SignatureError> for IngressBodyError {
    fn from(err: SignatureError) -> Self {
        match err {
            SignatureError::InvalidFormat => Self::InvalidHeader,
            SignatureError::InvalidBase64 => Self::InvalidBase64,
            SignatureError::SignatureMismatch | SignatureError::Expired => {
                Self::VerificationFailed
            }
        }
    }
}

impl IntoResponse for IngressBodyError {
    fn into_response(self) -> Response {
        let status = match self {
            IngressBodyError::MissingHeader | IngressBodyError::VerificationFailed => {
                StatusCode::UNAUTHORIZED
            }
            IngressBodyError::InvalidHeader
            | IngressBodyError::InvalidBase64
            | IngressBodyError::BodyReadError => StatusCode::BAD_REQUEST,
        };
        tracing::warn!(error = %self, "rejected ingress request");
        (status, Json(Ack::rejected(self.to_string()))).into_response()
    }
}

impl FromRequest<AppState> for IngressBody {
    type Rejection = IngressBodyError;

    async fn from_request(req: Request, state: &AppState) -> Result<Self, Self::Rejection> {
        let header_value = match req.headers().get(SIGNATURE_HEADER) {
            Some(value) => Some(
                value
                    .to_str()
                    .map_err(|_| IngressBodyError::InvalidHeader)?
                    .to_owned(),
            ),
            None => None,
        };

        let body = axum::body::to_bytes(req.into_body(), MAX_BODY_BYTES)
            .await
            .map_err(|_| IngressBodyError::BodyReadError)?;

        let auth = state.auth().await;
        if let Some(secret) = auth.ingress_secret() {
            let header_value = header_value.ok_or(IngressBodyError::MissingHeader)?;
            signature::verify_body(&header_value, &body, secret)?;
        }
        drop(auth);

        Ok(IngressBody(body))
    }
}

// ---------------------------------------------------------------------------
// SubscriberAuth: live-update authentication via query token
// ---------------------------------------------------------------------------

/// An Axum extractor that admits a live-update upgrade only when it carries
/// the configured subscriber token.
///
/// Browsers cannot set headers on WebSocket upgrades, so the token travels
/// as a query parameter:
///
/// ```text
/// GET /live?token=…
/// ```
pub struct SubscriberAuth;

#[derive(Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

/// Errors returned by the [`SubscriberAuth`] extractor.
#[derive(Debug)]
pub enum SubscriberAuthError {
    MissingToken,
    InvalidQuery,
    InvalidToken,
}

impl IntoResponse for SubscriberAuthError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            SubscriberAuthError::MissingToken => (StatusCode::UNAUTHORIZED, "missing token"),
            SubscriberAuthError::InvalidQuery => (StatusCode::BAD_REQUEST, "invalid query string"),
            SubscriberAuthError::InvalidToken => (StatusCode::UNAUTHORIZED, "invalid token"),
        };
        (status, message).into_response()
    }
}

impl FromRequestParts<AppState> for SubscriberAuth {
    type Rejection = SubscriberAuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let auth = state.auth().await;
        let Some(expected) = auth.subscriber_token() else {
            return Ok(SubscriberAuth);
        };

        let Query(query) = Query::<TokenQuery>::try_from_uri(&parts.uri)
            .map_err(|_| SubscriberAuthError::InvalidQuery)?;

        match query.token {
            Some(token) if signature::verify_token(&token, expected) => Ok(SubscriberAuth),
            Some(_) => Err(SubscriberAuthError::InvalidToken),
            None => Err(SubscriberAuthError::MissingToken),
        }
    }
}
