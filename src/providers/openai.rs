// OpenAI-compatible chat completions adapter (BotHub and friends)

use serde_json::{json, Value};

use super::{non_empty, prompt_for, ProviderAdapter, SYSTEM_PROMPT};
use crate::config::SecretResolver;
use crate::dispatch::types::InboundRequest;
use crate::error::DispatchResult;
use crate::proxy::ProviderEnvelope;
use crate::registry::{ModelEntry, ProviderKind, ServiceType};

#[derive(Debug, Clone, Copy, Default)]
pub struct OpenAiCompatAdapter;

/// Plain string content, or a text + image_url list when an image is attached.
pub fn user_content(request: &InboundRequest) -> Value {
    let text = prompt_for(request);
    match request.attachment() {
        Some(att) if att.is_image() => json!([
            { "type": "text", "text": text },
            { "type": "image_url", "image_url": { "url": att.data_uri() } }
        ]),
        Some(att) => {
            tracing::debug!("Attachment {} not supported by chat completions, sending text only", att.mime_type);
            json!(text)
        }
        None => json!(text),
    }
}

impl ProviderAdapter for OpenAiCompatAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenAiCompat
    }

    fn build_envelope(
        &self,
        entry: &ModelEntry,
        service_type: ServiceType,
        request: &InboundRequest,
        secrets: &dyn SecretResolver,
    ) -> DispatchResult<ProviderEnvelope> {
        let api_key = secrets.resolve(&entry.api_key_ref)?;
        let url = format!("{}/chat/completions", entry.base_url.trim_end_matches('/'));

        let mut messages = Vec::new();
        if service_type.produces_text() {
            messages.push(json!({ "role": "system", "content": SYSTEM_PROMPT }));
        }
        messages.push(json!({ "role": "user", "content": user_content(request) }));

        let payload = json!({
            "model": entry.model,
            "messages": messages,
        });

        Ok(ProviderEnvelope::json(url, payload).with_authorization(format!("Bearer {}", api_key)))
    }

    fn extract_text(&self, body: &Value) -> Option<String> {
        non_empty(
            body.get("choices")
                .and_then(|c| c.get(0))
                .and_then(|c| c.get("message"))
                .and_then(|m| m.get("content")),
        )
    }
}
