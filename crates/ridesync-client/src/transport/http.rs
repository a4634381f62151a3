//! REST adapter.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use ridesync_proto::{ApiEnvelope, HttpMethod};
use tracing::{debug, warn};

use crate::api::{ApiCall, ApiError, ApiReply, RideApi};

/// Upper bound on one REST call, connect through body.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// [`RideApi`] backed by a reqwest client and a bearer token.
#[derive(Debug, Clone)]
pub struct HttpApi {
    client: Client,
    base_url: String,
    token: String,
}

impl HttpApi {
    /// Adapter for the backend at `base_url` (no trailing slash needed).
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self::with_timeout(base_url, token, DEFAULT_REQUEST_TIMEOUT)
    }

    /// Adapter whose calls give up after `timeout`.
    ///
    /// A call that times out fails with [`ApiError::Network`].
    pub fn with_timeout(base_url: impl Into<String>, token: impl Into<String>, timeout: Duration) -> Self {
        let client = Client::builder().timeout(timeout).build().unwrap_or_else(|err| {
            warn!(error = %err, "http client setup failed, falling back to defaults");
            Client::new()
        });
        Self::with_client(client, base_url, token)
    }

    /// Adapter reusing an existing client.
    pub fn with_client(client: Client, base_url: impl Into<String>, token: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url, token: token.into() }
    }

    /// Backend base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl RideApi for HttpApi {
    async fn execute(&self, call: ApiCall) -> Result<ApiReply, ApiError> {
        let route = call.route();
        let url = format!("{}{}", self.base_url, route.path);
        let method = match route.method {
            HttpMethod::Get => Method::GET,
            HttpMethod::Post => Method::POST,
            HttpMethod::Patch => Method::PATCH,
        };
        debug!(method = route.method.as_str(), %url, "api request");

        let mut request = self.client.request(method, &url).bearer_auth(&self.token);
        if let Some(body) = call.body().map_err(|e| ApiError::Malformed(e.to_string()))? {
            request = request.json(&body);
        }

        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();
        let text = response.text().await.map_err(transport_error)?;

        if !status.is_success() {
            let message = serde_json::from_str::<ApiEnvelope>(&text)
                .ok()
                .and_then(|envelope| envelope.message)
                .unwrap_or_else(|| status.canonical_reason().unwrap_or("request failed").to_string());
            warn!(%url, status = status.as_u16(), %message, "api request rejected");
            return Err(ApiError::from_status(status.as_u16(), message));
        }

        if status == StatusCode::NO_CONTENT || text.trim().is_empty() {
            return ApiReply::from_envelope(&call, ApiEnvelope { success: true, ..ApiEnvelope::default() });
        }
        let envelope: ApiEnvelope =
            serde_json::from_str(&text).map_err(|e| ApiError::Malformed(e.to_string()))?;
        ApiReply::from_envelope(&call, envelope)
    }
}

fn transport_error(err: reqwest::Error) -> ApiError {
    if err.is_timeout() {
        warn!(error = %err, "api request timed out");
        return ApiError::Network(format!("timed out: {err}"));
    }
    ApiError::Network(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_is_normalized() {
        let api = HttpApi::new("http://localhost:5000/api/", "t");
        assert_eq!(api.base_url(), "http://localhost:5000/api");
    }

    #[tokio::test]
    async fn unreachable_backend_is_a_network_error() {
        // Port 9 (discard) is closed on test machines.
        let api = HttpApi::new("http://127.0.0.1:9", "t");
        let result = api.execute(ApiCall::FetchOffers).await;
        assert!(matches!(result, Err(ApiError::Network(_))));
    }

    #[tokio::test]
    async fn silent_backend_times_out() {
        // Accepts connections but never answers.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let held = tokio::spawn(async move {
            let mut open = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                open.push(stream);
            }
        });

        let api = HttpApi::with_timeout(format!("http://{addr}"), "t", Duration::from_millis(200));
        let result =
            tokio::time::timeout(Duration::from_secs(5), api.execute(ApiCall::FetchOffers)).await.unwrap();
        let Err(ApiError::Network(reason)) = result else {
            panic!("expected a network error, got {result:?}");
        };
        assert!(reason.starts_with("timed out"), "{reason}");
        held.abort();
    }
}
