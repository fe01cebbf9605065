// Provider adapters and response normalization
//
// One adapter per provider family. Adapters never touch the network: they
// turn a request into a `ProviderEnvelope` and pull text out of a response.

pub mod gemini;
pub mod openai;
pub mod workers_ai;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::Value;

use crate::config::SecretResolver;
use crate::dispatch::types::{InboundRequest, NormalizedResult, ResultAction};
use crate::error::{DispatchError, DispatchResult};
use crate::proxy::{ProviderEnvelope, RawProviderResponse};
use crate::registry::{ModelEntry, ProviderKind, ServiceType};

pub use gemini::GeminiAdapter;
pub use openai::OpenAiCompatAdapter;
pub use workers_ai::WorkersAiAdapter;

pub const SYSTEM_PROMPT: &str = "You are Leshiy-AI, a friendly multi-purpose assistant.

Your abilities:
- Hold a meaningful conversation on any topic.
- Analyze images, audio and video the user sends you.
- Generate images on request (use [ACTION:GENERATE]).
- Save important information (use [ACTION:STORAGE]).

Always answer in a positive tone, use emoji and be ready to help! If the user sent an attachment, your main task is to analyze it and answer the related question. If there is no question, simply describe what you see.";

const ATTACHMENT_DEFAULT_PROMPT: &str = "describe this";
const TEXT_DEFAULT_PROMPT: &str = "hello";
const STORAGE_MARKER: &str = "[ACTION:STORAGE]";
const GENERATE_MARKER: &str = "[ACTION:GENERATE]";
const RAW_LOG_LIMIT: usize = 2048;

pub trait ProviderAdapter: Send + Sync {
    fn kind(&self) -> ProviderKind;

    fn build_envelope(
        &self,
        entry: &ModelEntry,
        service_type: ServiceType,
        request: &InboundRequest,
        secrets: &dyn SecretResolver,
    ) -> DispatchResult<ProviderEnvelope>;

    fn extract_text(&self, body: &Value) -> Option<String>;

    /// Media carried inside a JSON body (e.g. base64 audio).
    fn extract_media(&self, _body: &Value) -> Option<NormalizedResult> {
        None
    }
}

pub fn adapter_for(kind: ProviderKind) -> &'static dyn ProviderAdapter {
    match kind {
        ProviderKind::Gemini => &GeminiAdapter,
        ProviderKind::OpenAiCompat => &OpenAiCompatAdapter,
        ProviderKind::WorkersAi => &WorkersAiAdapter,
    }
}

/// Text to send, substituting a generic prompt when the turn has none.
pub fn prompt_for(request: &InboundRequest) -> &str {
    match request.prompt() {
        "" if request.attachment().is_some() => ATTACHMENT_DEFAULT_PROMPT,
        "" => TEXT_DEFAULT_PROMPT,
        text => text,
    }
}

pub(crate) fn non_empty(value: Option<&Value>) -> Option<String> {
    value
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
        .map(|s| s.to_string())
}

fn truncated(body: &[u8]) -> String {
    String::from_utf8_lossy(&body[..body.len().min(RAW_LOG_LIMIT)]).into_owned()
}

fn is_provider_quota_error(body: &Value) -> bool {
    let Some(error) = body.get("error") else {
        return false;
    };
    error.get("code").and_then(|c| c.as_u64()) == Some(429)
        || error.get("status").and_then(|s| s.as_str()) == Some("RESOURCE_EXHAUSTED")
}

/// Split action markers out of model text.
pub fn apply_actions(text: &str) -> NormalizedResult {
    for (marker, action) in [
        (STORAGE_MARKER, ResultAction::Storage),
        (GENERATE_MARKER, ResultAction::Generate),
    ] {
        if text.contains(marker) {
            let rest = text.replacen(marker, "", 1);
            let mut result = NormalizedResult::text(rest.trim());
            // Marker-only replies carry the action alone
            if rest.trim().is_empty() {
                result.text = None;
            }
            result.action = Some(action);
            return result;
        }
    }
    NormalizedResult::text(text)
}

pub fn normalize(
    adapter: &dyn ProviderAdapter,
    service_type: ServiceType,
    raw: &RawProviderResponse,
) -> DispatchResult<NormalizedResult> {
    if !raw.is_json() {
        let content_type = raw
            .content_type
            .clone()
            .unwrap_or_else(|| "application/octet-stream".to_string());
        let url = format!("data:{};base64,{}", content_type, STANDARD.encode(&raw.body));
        tracing::debug!(
            "Binary {} response ({} bytes) for {}",
            content_type,
            raw.body.len(),
            service_type
        );
        return Ok(if content_type.starts_with("image/") {
            NormalizedResult::image(url)
        } else {
            NormalizedResult::audio(url)
        });
    }

    let body: Value = serde_json::from_slice(&raw.body).map_err(|e| {
        tracing::warn!(
            "Unparseable {} response: {} raw={}",
            adapter.kind(),
            e,
            truncated(&raw.body)
        );
        DispatchError::parse(e.to_string())
    })?;

    if is_provider_quota_error(&body) {
        return Err(DispatchError::Quota { status: 429 });
    }

    if let Some(media) = adapter.extract_media(&body) {
        return Ok(media);
    }

    match adapter.extract_text(&body) {
        Some(text) => Ok(apply_actions(&text)),
        None => {
            tracing::warn!(
                "No text in {} response for {}: raw={}",
                adapter.kind(),
                service_type,
                truncated(&raw.body)
            );
            Err(DispatchError::EmptyResponse)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::types::{Attachment, ResultKind};
    use bytes::Bytes;
    use serde_json::json;

    #[test]
    fn test_prompt_substitution() {
        assert_eq!(prompt_for(&InboundRequest::text("  hi  ")), "hi");
        let att_only = InboundRequest::default().with_attachment(Attachment::from_bytes("image/png", vec![1u8]));
        assert_eq!(prompt_for(&att_only), "describe this");
        assert_eq!(prompt_for(&InboundRequest::default()), "hello");
    }

    #[test]
    fn test_action_markers() {
        let result = apply_actions("Saving it now! [ACTION:STORAGE]");
        assert_eq!(result.text.as_deref(), Some("Saving it now!"));
        assert_eq!(result.action, Some(ResultAction::Storage));

        let result = apply_actions("[ACTION:GENERATE] a cat");
        assert_eq!(result.text.as_deref(), Some("a cat"));
        assert_eq!(result.action, Some(ResultAction::Generate));

        assert_eq!(apply_actions("plain").action, None);
    }

    #[test]
    fn test_marker_only_reply_keeps_action_without_text() {
        let result = apply_actions("  [ACTION:STORAGE]\n");
        assert_eq!(result.kind, ResultKind::Text);
        assert_eq!(result.text, None);
        assert_eq!(result.action, Some(ResultAction::Storage));
    }

    #[test]
    fn test_binary_audio_and_image() {
        let raw = RawProviderResponse {
            status: 200,
            content_type: Some("audio/mpeg".to_string()),
            body: Bytes::from_static(&[1, 2, 3]),
        };
        let result = normalize(&WorkersAiAdapter, ServiceType::TextToAudio, &raw).unwrap();
        assert_eq!(result.kind, ResultKind::Audio);
        assert_eq!(result.url.as_deref(), Some("data:audio/mpeg;base64,AQID"));

        let raw = RawProviderResponse {
            content_type: Some("image/png".to_string()),
            ..raw
        };
        let result = normalize(&WorkersAiAdapter, ServiceType::TextToImage, &raw).unwrap();
        assert_eq!(result.kind, ResultKind::Image);
    }

    #[test]
    fn test_unparseable_json_is_parse_error() {
        let raw = RawProviderResponse {
            status: 200,
            content_type: Some("application/json".to_string()),
            body: Bytes::from_static(b"<html>oops</html>"),
        };
        assert!(matches!(
            normalize(&GeminiAdapter, ServiceType::TextToText, &raw),
            Err(DispatchError::Parse(_))
        ));
    }

    #[test]
    fn test_provider_quota_error_in_body() {
        let raw = RawProviderResponse::json(&json!({
            "error": { "code": 429, "message": "Resource has been exhausted", "status": "RESOURCE_EXHAUSTED" }
        }));
        assert_eq!(
            normalize(&GeminiAdapter, ServiceType::TextToText, &raw),
            Err(DispatchError::Quota { status: 429 })
        );
    }

    #[test]
    fn test_unknown_shape_is_empty_response() {
        let raw = RawProviderResponse::json(&json!({ "unexpected": true }));
        assert_eq!(
            normalize(&OpenAiCompatAdapter, ServiceType::TextToText, &raw),
            Err(DispatchError::EmptyResponse)
        );
    }
}
