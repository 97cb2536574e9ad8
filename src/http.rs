//! REST client for the Sayna HTTP API.
//!
//! Wraps the health, voices, LiveKit token, speak, and SIP hook endpoints
//! with typed request/response shapes. Error responses are mapped onto
//! [`SaynaError`]: 4xx becomes `Validation`, everything else non-2xx
//! becomes `Server`, preferring the `error` field of a JSON error body
//! over the raw text.

use bytes::Bytes;
use http::HeaderMap;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::errors::{SaynaError, SaynaResult};
use crate::types::{
    HealthResponse, LiveKitTokenRequest, LiveKitTokenResponse, SetSipHooksRequest, SipHook,
    SipHooksResponse, SpeakRequest, VoicesResponse,
};

/// Typed client for Sayna's REST endpoints.
///
/// Cloning is cheap; the underlying connection pool is shared.
#[derive(Debug, Clone)]
pub struct SaynaHttpClient {
    base_url: Url,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl SaynaHttpClient {
    /// Creates a client for the given HTTP base URL (e.g.,
    /// `https://api.sayna.example.com`). The API key, when provided, is
    /// sent as a `Bearer` token on every request.
    pub fn new(base_url: &str, api_key: Option<String>) -> SaynaResult<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| SaynaError::Validation(format!("Invalid base URL '{}': {}", base_url, e)))?;
        match base_url.scheme() {
            "http" | "https" => {}
            scheme => {
                return Err(SaynaError::Validation(format!(
                    "Invalid base URL scheme '{}': expected http or https",
                    scheme
                )));
            }
        }

        Ok(Self {
            base_url,
            api_key,
            client: reqwest::Client::new(),
        })
    }

    /// Checks server health via `GET /`.
    pub async fn health(&self) -> SaynaResult<HealthResponse> {
        self.get_json("/").await
    }

    /// Lists available TTS voices grouped by provider via `GET /voices`.
    pub async fn get_voices(&self) -> SaynaResult<VoicesResponse> {
        self.get_json("/voices").await
    }

    /// Generates a LiveKit access token via `POST /livekit/token`.
    pub async fn get_livekit_token(
        &self,
        request: &LiveKitTokenRequest,
    ) -> SaynaResult<LiveKitTokenResponse> {
        self.post_json("/livekit/token", request).await
    }

    /// Synthesizes speech via `POST /speak`, returning the audio bytes and
    /// the response headers (content type, provider metadata).
    pub async fn speak(&self, request: &SpeakRequest) -> SaynaResult<(Bytes, HeaderMap)> {
        self.post_binary("/speak", request).await
    }

    /// Fetches the configured SIP webhook hooks via `GET /sip/hooks`.
    pub async fn get_sip_hooks(&self) -> SaynaResult<Vec<SipHook>> {
        let response: SipHooksResponse = self.get_json("/sip/hooks").await?;
        Ok(response.hooks)
    }

    /// Creates or replaces SIP webhook hooks via `POST /sip/hooks`. Hooks
    /// with hosts matching existing entries replace them.
    pub async fn set_sip_hooks(&self, hooks: Vec<SipHook>) -> SaynaResult<Vec<SipHook>> {
        let request = SetSipHooksRequest { hooks };
        let response: SipHooksResponse = self.post_json("/sip/hooks", &request).await?;
        Ok(response.hooks)
    }

    fn endpoint(&self, path: &str) -> SaynaResult<Url> {
        // Url::join would drop the last segment of a base URL without a
        // trailing slash, so build the full URL by concatenation
        let joined = format!(
            "{}/{}",
            self.base_url.as_str().trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        Url::parse(&joined)
            .map_err(|e| SaynaError::Validation(format!("Invalid endpoint path '{}': {}", path, e)))
    }

    fn request(&self, method: reqwest::Method, url: Url) -> reqwest::RequestBuilder {
        let builder = self.client.request(method, url);
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> SaynaResult<T> {
        let url = self.endpoint(path)?;
        debug!(%url, "GET request");
        let response = self
            .request(reqwest::Method::GET, url)
            .send()
            .await
            .map_err(|e| SaynaError::Connection(format!("Request failed: {}", e)))?;
        let response = check_status(response).await?;
        response
            .json()
            .await
            .map_err(|e| SaynaError::Server(format!("Invalid response body: {}", e)))
    }

    async fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> SaynaResult<T> {
        let url = self.endpoint(path)?;
        debug!(%url, "POST request");
        let response = self
            .request(reqwest::Method::POST, url)
            .json(body)
            .send()
            .await
            .map_err(|e| SaynaError::Connection(format!("Request failed: {}", e)))?;
        let response = check_status(response).await?;
        response
            .json()
            .await
            .map_err(|e| SaynaError::Server(format!("Invalid response body: {}", e)))
    }

    async fn post_binary<B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> SaynaResult<(Bytes, HeaderMap)> {
        let url = self.endpoint(path)?;
        debug!(%url, "POST request (binary response)");
        let response = self
            .request(reqwest::Method::POST, url)
            .json(body)
            .send()
            .await
            .map_err(|e| SaynaError::Connection(format!("Request failed: {}", e)))?;
        let response = check_status(response).await?;
        let headers = response.headers().clone();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| SaynaError::Server(format!("Failed to read response body: {}", e)))?;
        Ok((bytes, headers))
    }
}

/// Maps non-success statuses onto SDK errors, preferring the `error` field
/// of a JSON error body.
async fn check_status(response: reqwest::Response) -> SaynaResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let detail = serde_json::from_str::<Value>(&body)
        .ok()
        .and_then(|v| v.get("error").map(value_to_message))
        .unwrap_or(body);
    let message = if detail.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("HTTP {}: {}", status.as_u16(), detail)
    };

    if status.is_client_error() {
        Err(SaynaError::Validation(message))
    } else {
        Err(SaynaError::Server(message))
    }
}

fn value_to_message(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
