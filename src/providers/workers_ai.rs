// Cloudflare Workers AI adapter (REST-run style: /{account}/ai/run/{model})

use serde_json::{json, Value};

use super::{non_empty, prompt_for, ProviderAdapter, SYSTEM_PROMPT};
use crate::config::{SecretResolver, CLOUDFLARE_ACCOUNT_ID};
use crate::dispatch::types::{InboundRequest, NormalizedResult};
use crate::error::DispatchResult;
use crate::proxy::ProviderEnvelope;
use crate::registry::{ModelEntry, ProviderKind, ServiceType};

const IMAGE_MAX_TOKENS: u32 = 512;

#[derive(Debug, Clone, Copy, Default)]
pub struct WorkersAiAdapter;

impl ProviderAdapter for WorkersAiAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::WorkersAi
    }

    fn build_envelope(
        &self,
        entry: &ModelEntry,
        service_type: ServiceType,
        request: &InboundRequest,
        secrets: &dyn SecretResolver,
    ) -> DispatchResult<ProviderEnvelope> {
        let token = secrets.resolve(&entry.api_key_ref)?;
        let account_id = secrets.resolve(CLOUDFLARE_ACCOUNT_ID)?;
        let url = format!(
            "{}/{}/ai/run/{}",
            entry.base_url.trim_end_matches('/'),
            account_id,
            entry.model
        );
        let prompt = prompt_for(request);

        let envelope = match request.attachment() {
            // Raw media goes through untouched
            Some(att) if att.is_audio() || att.is_video() => ProviderEnvelope::binary(url, att.bytes()?),
            Some(att) => {
                let image: Vec<u8> = att.bytes()?.to_vec();
                ProviderEnvelope::json(
                    url,
                    json!({
                        "image": image,
                        "prompt": prompt,
                        "max_tokens": IMAGE_MAX_TOKENS,
                    }),
                )
            }
            None if !service_type.produces_text() => ProviderEnvelope::json(url, json!({ "prompt": prompt })),
            None => ProviderEnvelope::json(
                url,
                json!({
                    "messages": [
                        { "role": "system", "content": SYSTEM_PROMPT },
                        { "role": "user", "content": prompt },
                    ]
                }),
            ),
        };

        Ok(envelope.with_authorization(format!("Bearer {}", token)))
    }

    fn extract_text(&self, body: &Value) -> Option<String> {
        let result = body.get("result")?;
        non_empty(result.get("response"))
            .or_else(|| non_empty(result.get("text")))
            .or_else(|| non_empty(result.get("description")))
    }

    fn extract_media(&self, body: &Value) -> Option<NormalizedResult> {
        let result = body.get("result")?;
        if let Some(audio) = non_empty(result.get("audio")) {
            return Some(NormalizedResult::audio(format!("data:audio/mpeg;base64,{}", audio)));
        }
        non_empty(result.get("image")).map(|image| NormalizedResult::image(format!("data:image/png;base64,{}", image)))
    }
}
