// Proxy transport - wraps provider requests for the trusted relay
//
// The relay forwards the body to `X-Target-URL` with `X-Proxy-Authorization`
// as the provider credential and returns the provider response verbatim.

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;
use std::sync::Arc;

use crate::config::SecretResolver;
use crate::error::{DispatchError, DispatchResult};

pub const HEADER_TARGET_URL: &str = "X-Target-URL";
pub const HEADER_PROXY_SECRET: &str = "X-Proxy-Secret";
pub const HEADER_PROXY_AUTHORIZATION: &str = "X-Proxy-Authorization";

const ERROR_BODY_LOG_LIMIT: usize = 2048;

#[derive(Debug, Clone, PartialEq)]
pub enum EnvelopeBody {
    Json(Value),
    Binary(Bytes),
}

/// Provider-shaped request produced by an adapter; consumed by a `Transport`.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderEnvelope {
    pub target_url: String,
    pub body: EnvelopeBody,
    pub authorization: Option<String>,
}

impl ProviderEnvelope {
    pub fn json(target_url: impl Into<String>, body: Value) -> Self {
        Self {
            target_url: target_url.into(),
            body: EnvelopeBody::Json(body),
            authorization: None,
        }
    }

    pub fn binary(target_url: impl Into<String>, body: Bytes) -> Self {
        Self {
            target_url: target_url.into(),
            body: EnvelopeBody::Binary(body),
            authorization: None,
        }
    }

    pub fn with_authorization(mut self, value: impl Into<String>) -> Self {
        self.authorization = Some(value.into());
        self
    }

    pub fn body_is_binary(&self) -> bool {
        matches!(self.body, EnvelopeBody::Binary(_))
    }

    pub fn content_type(&self) -> &'static str {
        if self.body_is_binary() {
            "application/octet-stream"
        } else {
            "application/json"
        }
    }

    pub fn json_body(&self) -> Option<&Value> {
        match &self.body {
            EnvelopeBody::Json(value) => Some(value),
            EnvelopeBody::Binary(_) => None,
        }
    }
}

/// 2xx response as returned by the relay.
#[derive(Debug, Clone)]
pub struct RawProviderResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Bytes,
}

impl RawProviderResponse {
    pub fn json(value: &Value) -> Self {
        Self {
            status: 200,
            content_type: Some("application/json".to_string()),
            body: Bytes::from(value.to_string()),
        }
    }

    pub fn is_json(&self) -> bool {
        match self.content_type.as_deref() {
            // Relays sometimes drop the header
            None => true,
            Some(ct) => {
                let ct = ct.to_ascii_lowercase();
                ct.contains("json") || ct.starts_with("text/")
            }
        }
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, envelope: &ProviderEnvelope) -> DispatchResult<RawProviderResponse>;
}

/// Map a non-2xx relay status into the error taxonomy.
pub fn status_error(status: u16, body: &[u8]) -> DispatchError {
    let snippet = String::from_utf8_lossy(&body[..body.len().min(ERROR_BODY_LOG_LIMIT)]);
    tracing::warn!("Relay returned HTTP {}: {}", status, snippet);
    if status == 429 {
        DispatchError::Quota { status }
    } else {
        DispatchError::transport(Some(status), format!("relay returned HTTP {}", status))
    }
}

#[derive(Clone)]
pub struct RelayTransport {
    relay_url: String,
    secrets: Arc<dyn SecretResolver>,
    proxy_secret_ref: String,
    http_client: reqwest::Client,
}

impl RelayTransport {
    /// `proxy_secret_ref` names the relay's shared secret; it is resolved per send.
    pub fn new(
        relay_url: impl Into<String>,
        secrets: Arc<dyn SecretResolver>,
        proxy_secret_ref: impl Into<String>,
    ) -> Self {
        Self {
            relay_url: relay_url.into(),
            secrets,
            proxy_secret_ref: proxy_secret_ref.into(),
            http_client: reqwest::Client::new(),
        }
    }

    pub fn relay_url(&self) -> &str {
        &self.relay_url
    }
}

#[async_trait]
impl Transport for RelayTransport {
    async fn send(&self, envelope: &ProviderEnvelope) -> DispatchResult<RawProviderResponse> {
        let proxy_secret = self.secrets.resolve(&self.proxy_secret_ref)?;
        let mut req = self
            .http_client
            .post(&self.relay_url)
            .header(HEADER_TARGET_URL, &envelope.target_url)
            .header(HEADER_PROXY_SECRET, proxy_secret)
            .header("Content-Type", envelope.content_type());

        if let Some(auth) = &envelope.authorization {
            req = req.header(HEADER_PROXY_AUTHORIZATION, auth);
        }

        req = match &envelope.body {
            EnvelopeBody::Json(value) => req.body(value.to_string()),
            EnvelopeBody::Binary(bytes) => req.body(bytes.clone()),
        };

        let response = req.send().await.map_err(|e| {
            tracing::warn!("Relay request failed: {}", e);
            DispatchError::transport(e.status().map(|s| s.as_u16()), e.to_string())
        })?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());
        let body = response
            .bytes()
            .await
            .map_err(|e| DispatchError::transport(Some(status), e.to_string()))?;

        if !(200..300).contains(&status) {
            return Err(status_error(status, &body));
        }

        Ok(RawProviderResponse {
            status,
            content_type,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_content_type_follows_body() {
        let json_env = ProviderEnvelope::json("https://x", json!({}));
        let bin_env = ProviderEnvelope::binary("https://x", Bytes::from_static(b"\x00\x01"));
        assert_eq!(json_env.content_type(), "application/json");
        assert!(bin_env.body_is_binary());
        assert_eq!(bin_env.content_type(), "application/octet-stream");
    }

    #[test]
    fn test_status_error_mapping() {
        assert_eq!(status_error(429, b"slow down"), DispatchError::Quota { status: 429 });
        assert!(matches!(
            status_error(503, b""),
            DispatchError::Transport { status: Some(503), .. }
        ));
    }

    #[test]
    fn test_is_json() {
        let mut raw = RawProviderResponse::json(&json!({"a": 1}));
        assert!(raw.is_json());
        raw.content_type = Some("audio/mpeg".to_string());
        assert!(!raw.is_json());
        raw.content_type = Some("application/json; charset=utf-8".to_string());
        assert!(raw.is_json());
    }
}
