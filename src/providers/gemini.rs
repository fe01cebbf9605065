// Gemini generateContent adapter

use serde::Serialize;
use serde_json::{json, Value};

use super::{non_empty, prompt_for, ProviderAdapter, SYSTEM_PROMPT};
use crate::config::SecretResolver;
use crate::dispatch::types::InboundRequest;
use crate::error::DispatchResult;
use crate::proxy::ProviderEnvelope;
use crate::registry::{ModelEntry, ProviderKind, ServiceType};

#[derive(Debug, Serialize)]
pub struct GeminiContent {
    pub role: String,
    pub parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum GeminiPart {
    Text { text: String },
    InlineData { inline_data: InlineData },
}

#[derive(Debug, Serialize)]
pub struct InlineData {
    pub mime_type: String,
    pub data: String,
}

#[derive(Debug, Serialize)]
pub struct GeminiRequest {
    pub contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<GeminiSystemInstruction>,
}

#[derive(Debug, Serialize)]
pub struct GeminiSystemInstruction {
    pub parts: Vec<GeminiPart>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct GeminiAdapter;

impl GeminiAdapter {
    /// Text first, then the attachment as an inline data part.
    pub fn user_parts(request: &InboundRequest) -> Vec<GeminiPart> {
        let mut parts = vec![GeminiPart::Text {
            text: prompt_for(request).to_string(),
        }];
        if let Some(att) = request.attachment() {
            parts.push(GeminiPart::InlineData {
                inline_data: InlineData {
                    mime_type: att.mime_type.clone(),
                    data: att.base64().into_owned(),
                },
            });
        }
        parts
    }
}

impl ProviderAdapter for GeminiAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Gemini
    }

    fn build_envelope(
        &self,
        entry: &ModelEntry,
        service_type: ServiceType,
        request: &InboundRequest,
        secrets: &dyn SecretResolver,
    ) -> DispatchResult<ProviderEnvelope> {
        let api_key = secrets.resolve(&entry.api_key_ref)?;
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            entry.base_url.trim_end_matches('/'),
            entry.model,
            urlencoding::encode(&api_key)
        );

        let system_instruction = service_type.produces_text().then(|| GeminiSystemInstruction {
            parts: vec![GeminiPart::Text {
                text: SYSTEM_PROMPT.to_string(),
            }],
        });

        let payload = GeminiRequest {
            contents: vec![GeminiContent {
                role: "user".to_string(),
                parts: Self::user_parts(request),
            }],
            system_instruction,
        };

        Ok(ProviderEnvelope::json(url, json!(payload)))
    }

    fn extract_text(&self, body: &Value) -> Option<String> {
        non_empty(
            body.get("candidates")
                .and_then(|c| c.get(0))
                .and_then(|c| c.get("content"))
                .and_then(|c| c.get("parts"))
                .and_then(|p| p.get(0))
                .and_then(|p| p.get("text")),
        )
    }
}
