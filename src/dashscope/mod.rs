//! DashScope (Alibaba Cloud, Qwen model family) HTTP client and transforms.
//!
//! Two transforms share one thin client:
//!
//! * [`chat`] — chat completion via the OpenAI-compatible endpoint, with
//!   named context sections folded into the user message.
//! * [`transcribe`] — speech recognition via the multimodal generation
//!   endpoint, with audio inlined as a base64 data URI.
//!
//! ## Why a shared client?
//!
//! Both endpoints use the same bearer credential, the same JSON error shapes,
//! and benefit from one connection pool. The client owns exactly that —
//! authentication, timeout, transport errors — and nothing endpoint-specific,
//! so each transform stays a pure request-shape/response-shape concern.
//!
//! The base URL is normally chosen per endpoint (the ASR models have regional
//! variants), but [`DashScopeClient::with_base_url`] overrides it globally,
//! which is how the tests point the client at a local mock server.

pub mod chat;
pub mod transcribe;

use crate::error::ApiError;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// Default base URL (mainland region). Regional ASR variants override it.
pub const DEFAULT_BASE_URL: &str = "https://dashscope.aliyuncs.com";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
const BODY_EXCERPT_BYTES: usize = 2048;

/// Authenticated HTTP client for the DashScope API.
#[derive(Debug, Clone)]
pub struct DashScopeClient {
    http: reqwest::Client,
    api_key: String,
    base_url: Option<String>,
    timeout: Duration,
}

impl DashScopeClient {
    /// Client with the given API key and per-endpoint default base URLs.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Client keyed from the `DASHSCOPE_API_KEY` environment variable.
    pub fn from_env() -> Result<Self, ApiError> {
        match std::env::var("DASHSCOPE_API_KEY") {
            Ok(key) if !key.is_empty() => Ok(Self::new(key)),
            _ => Err(ApiError::MissingApiKey),
        }
    }

    /// Route every request to this base URL instead of the per-endpoint
    /// defaults (regional routing included). Intended for tests and proxies.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        let mut base = base_url.into();
        while base.ends_with('/') {
            base.pop();
        }
        self.base_url = Some(base);
        self
    }

    /// Per-request timeout. Default: 60 s.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The base URL to use when an endpoint's natural choice is `default`.
    pub(crate) fn effective_base<'a>(&'a self, default: &'a str) -> &'a str {
        self.base_url.as_deref().unwrap_or(default)
    }

    /// POST a JSON body with bearer auth, expecting a JSON reply.
    pub(crate) async fn post_json(&self, url: &str, body: &Value) -> Result<Value, ApiError> {
        if self.api_key.is_empty() {
            return Err(ApiError::MissingApiKey);
        }
        debug!("POST {}", url);

        let response = self
            .http
            .post(url)
            .bearer_auth(&self.api_key)
            .timeout(self.timeout)
            .json(body)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Status {
                status: status.as_u16(),
                body: excerpt(&body),
            });
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| ApiError::MalformedResponse {
                detail: e.to_string(),
            })
    }

    /// Fetch a remote resource as raw bytes (no auth; used for audio URLs).
    pub(crate) async fn get_bytes(&self, url: &str) -> Result<Vec<u8>, ApiError> {
        debug!("GET {}", url);
        let response = self
            .http
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Status {
                status: status.as_u16(),
                body: excerpt(&body),
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| self.transport_error(e))?;
        Ok(bytes.to_vec())
    }

    fn transport_error(&self, e: reqwest::Error) -> ApiError {
        if e.is_timeout() {
            ApiError::Timeout {
                secs: self.timeout.as_secs(),
            }
        } else {
            ApiError::Request(e.to_string())
        }
    }
}

/// First couple of KiB of an error body, cut on a char boundary.
fn excerpt(body: &str) -> String {
    if body.len() <= BODY_EXCERPT_BYTES {
        return body.to_string();
    }
    let mut end = BODY_EXCERPT_BYTES;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}… ({} bytes total)", &body[..end], body.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_override_wins_and_loses_trailing_slashes() {
        let client = DashScopeClient::new("sk-test").with_base_url("http://127.0.0.1:9999///");
        assert_eq!(
            client.effective_base(DEFAULT_BASE_URL),
            "http://127.0.0.1:9999"
        );

        let plain = DashScopeClient::new("sk-test");
        assert_eq!(plain.effective_base(DEFAULT_BASE_URL), DEFAULT_BASE_URL);
    }

    #[test]
    fn excerpt_keeps_short_bodies_verbatim() {
        assert_eq!(excerpt("rate limited"), "rate limited");
        let long = "x".repeat(BODY_EXCERPT_BYTES + 100);
        let cut = excerpt(&long);
        assert!(cut.contains("bytes total"));
        assert!(cut.len() < long.len());
    }

    #[tokio::test]
    async fn empty_api_key_fails_before_any_io() {
        let client = DashScopeClient::new("");
        let err = client
            .post_json("http://127.0.0.1:1/never", &serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::MissingApiKey));
    }
}
