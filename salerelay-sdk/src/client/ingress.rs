//! Producer-side client for the ingress endpoint.

use reqwest::Client;
use url::Url;

use super::ClientError;
use crate::objects::{Ack, INGRESS_PATH, SaleEvent};
use crate::signature::{SIGNATURE_HEADER, sign_body};

/// Typed HTTP client for `POST /add-upi-sale`.
///
/// When constructed with a secret, every request body is signed with
/// `HMAC-SHA256("{timestamp}.{json}", secret)` in the `Relay-Signature`
/// header.
#[derive(Debug, Clone)]
pub struct IngressClient {
    http: Client,
    base_url: Url,
    secret: Option<Vec<u8>>,
}

impl IngressClient {
    /// Create a client for the relay rooted at `base_url`
    /// (e.g. `http://localhost:40509`).
    pub fn new(base_url: Url) -> Self {
        Self {
            http: Client::new(),
            base_url,
            secret: None,
        }
    }

    /// Sign every submission with the relay's ingress secret.
    pub fn with_secret(mut self, secret: impl Into<Vec<u8>>) -> Self {
        self.secret = Some(secret.into());
        self
    }

    /// Submit a sale and return the relay's acknowledgement.
    pub async fn submit_sale(&self, sale: &SaleEvent) -> Result<Ack, ClientError> {
        let body = serde_json::to_vec(sale)?;
        self.submit_raw(body).await
    }

    /// Submit an arbitrary JSON body, for producers that build their own
    /// payloads.
    pub async fn submit_raw(&self, body: Vec<u8>) -> Result<Ack, ClientError> {
        let url = self.base_url.join(INGRESS_PATH)?;

        let mut request = self
            .http
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, "application/json");
        if let Some(secret) = &self.secret {
            request = request.header(SIGNATURE_HEADER, sign_body(&body, secret));
        }

        let resp = request.body(body).send().await?;
        parse_response(resp).await
    }
}

async fn parse_response<T: serde::de::DeserializeOwned>(
    resp: reqwest::Response,
) -> Result<T, ClientError> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(ClientError::Api { status, body });
    }
    let bytes = resp.bytes().await?;
    serde_json::from_slice(&bytes).map_err(ClientError::Json)
}
