// Model-routing dispatcher
//
// classify -> resolve -> build -> send -> normalize. Every failure is folded
// into a `NormalizedResult` of kind `error` at this boundary.

pub mod classifier;
pub mod resolver;
pub mod types;

use std::sync::Arc;
use tracing::Instrument;
use uuid::Uuid;

pub use classifier::classify;
pub use resolver::{ResolvedModel, Resolver};
pub use types::{Attachment, InboundRequest, NormalizedResult, ResultAction, ResultKind};

use crate::config::SecretResolver;
use crate::db::KeyValueStore;
use crate::error::{DispatchError, DispatchResult};
use crate::providers::{adapter_for, normalize};
use crate::proxy::Transport;
use crate::registry::{ModelRegistry, ServiceType};

#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<ModelRegistry>,
    store: Arc<dyn KeyValueStore>,
    secrets: Arc<dyn SecretResolver>,
    transport: Arc<dyn Transport>,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<ModelRegistry>,
        store: Arc<dyn KeyValueStore>,
        secrets: Arc<dyn SecretResolver>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            registry,
            store,
            secrets,
            transport,
        }
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    pub fn store(&self) -> &dyn KeyValueStore {
        self.store.as_ref()
    }

    pub fn resolver(&self) -> Resolver<'_> {
        Resolver::new(&self.registry, self.store.as_ref())
    }

    /// Classify the turn by modality and dispatch it.
    pub async fn dispatch(&self, request: &InboundRequest) -> NormalizedResult {
        self.dispatch_as(classify(request), request).await
    }

    /// Dispatch with an explicit service type (e.g. TEXT_TO_IMAGE generation).
    pub async fn dispatch_as(&self, service_type: ServiceType, request: &InboundRequest) -> NormalizedResult {
        let request_id = Uuid::new_v4();
        let span = tracing::info_span!("dispatch", %request_id, %service_type);

        async move {
            match self.try_dispatch(service_type, request).await {
                Ok(result) => result,
                Err(err) => {
                    match &err {
                        DispatchError::Config(_) => tracing::error!("[{}] {}", err.code(), err),
                        _ => tracing::warn!("[{}] {}", err.code(), err),
                    }
                    err.into()
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn try_dispatch(
        &self,
        service_type: ServiceType,
        request: &InboundRequest,
    ) -> DispatchResult<NormalizedResult> {
        if request.is_empty() {
            return Err(DispatchError::InvalidRequest("message is empty".to_string()));
        }

        let resolved = self
            .resolver()
            .resolve(service_type)
            .ok_or_else(|| DispatchError::config(format!("no model available for {}", service_type)))?;

        tracing::info!(
            "Calling {} via {} ({})",
            resolved.entry.model,
            resolved.entry.service,
            resolved.id
        );

        let adapter = adapter_for(resolved.entry.service);
        let envelope = adapter.build_envelope(resolved.entry, service_type, request, self.secrets.as_ref())?;
        let raw = self.transport.send(&envelope).await?;
        normalize(adapter, service_type, &raw)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::StaticSecrets;
    use crate::db::MemoryStore;
    use crate::proxy::{ProviderEnvelope, RawProviderResponse};
    use crate::registry::{ModelEntry, ProviderKind};
    use async_trait::async_trait;
    use bytes::Bytes;
    use parking_lot::Mutex;
    use serde_json::json;

    type Reply = Box<dyn Fn(&ProviderEnvelope) -> DispatchResult<RawProviderResponse> + Send + Sync>;

    /// Records envelopes and answers from a closure.
    pub(crate) struct ScriptedTransport {
        pub sent: Mutex<Vec<ProviderEnvelope>>,
        reply: Reply,
    }

    impl ScriptedTransport {
        pub(crate) fn new(
            reply: impl Fn(&ProviderEnvelope) -> DispatchResult<RawProviderResponse> + Send + Sync + 'static,
        ) -> Arc<Self> {
            Arc::new(Self {
                sent: Mutex::new(Vec::new()),
                reply: Box::new(reply),
            })
        }

        /// Answers each provider family with its canonical fixture.
        pub(crate) fn fixtures() -> Arc<Self> {
            Self::new(|env| {
                let body = if env.target_url.contains(":generateContent") {
                    json!({ "candidates": [{ "content": { "parts": [{ "text": "from gemini" }] } }] })
                } else if env.target_url.contains("/chat/completions") {
                    json!({ "choices": [{ "message": { "content": "from openai" } }] })
                } else {
                    json!({ "result": { "response": "from workers" } })
                };
                Ok(RawProviderResponse::json(&body))
            })
        }

        pub(crate) fn sent_count(&self) -> usize {
            self.sent.lock().len()
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn send(&self, envelope: &ProviderEnvelope) -> DispatchResult<RawProviderResponse> {
            self.sent.lock().push(envelope.clone());
            tokio::task::yield_now().await;
            (self.reply)(envelope)
        }
    }

    pub(crate) fn all_secrets() -> StaticSecrets {
        StaticSecrets::new()
            .with("GEMINI_API_KEY", "g-key")
            .with("BOTHUB_API_KEY", "bh-key")
            .with("CLOUDFLARE_API_TOKEN", "cf-token")
            .with("CLOUDFLARE_ACCOUNT_ID", "acc")
    }

    fn dispatcher_with(registry: ModelRegistry, store: Arc<MemoryStore>, transport: Arc<ScriptedTransport>) -> Dispatcher {
        Dispatcher::new(Arc::new(registry), store, Arc::new(all_secrets()), transport)
    }

    #[tokio::test]
    async fn test_text_turn_uses_default_gemini() {
        let transport = ScriptedTransport::fixtures();
        let dispatcher = dispatcher_with(ModelRegistry::builtin(), Arc::new(MemoryStore::new()), transport.clone());

        let result = dispatcher.dispatch(&InboundRequest::text("hi")).await;
        assert_eq!(result, NormalizedResult::text("from gemini"));
        assert_eq!(transport.sent_count(), 1);
    }

    #[tokio::test]
    async fn test_stored_selection_routes_to_provider() {
        let store = Arc::new(MemoryStore::new());
        store
            .set(&ServiceType::TextToText.persistence_key(), "TEXT_TO_TEXT_WORKERS_AI")
            .unwrap();
        let transport = ScriptedTransport::fixtures();
        let dispatcher = dispatcher_with(ModelRegistry::builtin(), store, transport.clone());

        let result = dispatcher.dispatch(&InboundRequest::text("hi")).await;
        assert_eq!(result.text.as_deref(), Some("from workers"));
        assert!(transport.sent.lock()[0].target_url.contains("/acc/ai/run/"));
    }

    #[tokio::test]
    async fn test_empty_turn_never_reaches_transport() {
        let transport = ScriptedTransport::fixtures();
        let dispatcher = dispatcher_with(ModelRegistry::builtin(), Arc::new(MemoryStore::new()), transport.clone());

        let result = dispatcher.dispatch(&InboundRequest::text("   ")).await;
        assert!(result.is_error());
        assert_eq!(transport.sent_count(), 0);
    }

    #[tokio::test]
    async fn test_no_image_model_is_configuration_error() {
        let registry = ModelRegistry::new(vec![(
            "TEXT_TO_TEXT_GEMINI".to_string(),
            ModelEntry::new(ProviderKind::Gemini, "gemini-2.5-flash", "GEMINI_API_KEY", "https://g"),
        )]);
        let transport = ScriptedTransport::fixtures();
        let dispatcher = dispatcher_with(registry, Arc::new(MemoryStore::new()), transport.clone());

        let request = InboundRequest::text("look").with_attachment(Attachment::from_base64("image/png", "AAAA"));
        let result = dispatcher.dispatch(&request).await;
        assert_eq!(result.kind, ResultKind::Error);
        assert_eq!(
            result.text,
            Some(DispatchError::config("no model available for IMAGE_TO_TEXT").user_message())
        );
        assert_eq!(transport.sent_count(), 0);
    }

    #[tokio::test]
    async fn test_missing_secret_is_error_result() {
        let transport = ScriptedTransport::fixtures();
        let dispatcher = Dispatcher::new(
            Arc::new(ModelRegistry::builtin()),
            Arc::new(MemoryStore::new()),
            Arc::new(StaticSecrets::new()),
            transport.clone(),
        );
        let result = dispatcher.dispatch(&InboundRequest::text("hi")).await;
        assert!(result.is_error());
        assert!(result.text.unwrap().contains("GEMINI_API_KEY"));
        assert_eq!(transport.sent_count(), 0);
    }

    #[tokio::test]
    async fn test_quota_is_distinguishable() {
        let transport = ScriptedTransport::new(|_| Err(DispatchError::Quota { status: 429 }));
        let dispatcher = dispatcher_with(ModelRegistry::builtin(), Arc::new(MemoryStore::new()), transport);

        let result = dispatcher.dispatch(&InboundRequest::text("hi")).await;
        assert_eq!(result.kind, ResultKind::Error);
        assert_eq!(result.text, Some(DispatchError::Quota { status: 429 }.user_message()));
        assert_ne!(result.text, Some(DispatchError::parse("").user_message()));
    }

    #[tokio::test]
    async fn test_network_failure_is_error_result() {
        let transport = ScriptedTransport::new(|_| Err(DispatchError::transport(None, "connection refused")));
        let dispatcher = dispatcher_with(ModelRegistry::builtin(), Arc::new(MemoryStore::new()), transport);

        let result = dispatcher.dispatch(&InboundRequest::text("hi")).await;
        assert!(result.is_error());
        assert!(result.text.unwrap().contains("connection refused"));
    }

    #[tokio::test]
    async fn test_generation_returns_image() {
        let transport = ScriptedTransport::new(|_| {
            Ok(RawProviderResponse {
                status: 200,
                content_type: Some("image/png".to_string()),
                body: Bytes::from_static(b"\x89PNG"),
            })
        });
        let dispatcher = dispatcher_with(ModelRegistry::builtin(), Arc::new(MemoryStore::new()), transport.clone());

        let result = dispatcher
            .dispatch_as(ServiceType::TextToImage, &InboundRequest::text("a fox"))
            .await;
        assert_eq!(result.kind, ResultKind::Image);
        assert!(result.url.unwrap().starts_with("data:image/png;base64,"));
        assert_eq!(transport.sent.lock()[0].json_body(), Some(&json!({ "prompt": "a fox" })));
    }

    #[tokio::test]
    async fn test_concurrent_dispatches_do_not_interfere() {
        let store = Arc::new(MemoryStore::new());
        store
            .set(&ServiceType::ImageToText.persistence_key(), "IMAGE_TO_TEXT_BOTHUB")
            .unwrap();
        store
            .set(&ServiceType::AudioToText.persistence_key(), "AUDIO_TO_TEXT_WORKERS_AI")
            .unwrap();
        let transport = ScriptedTransport::fixtures();
        let dispatcher = dispatcher_with(ModelRegistry::builtin(), store, transport.clone());

        let text = InboundRequest::text("hi");
        let image = InboundRequest::text("what").with_attachment(Attachment::from_base64("image/png", "AAAA"));
        let audio = InboundRequest::default().with_attachment(Attachment::from_bytes("audio/ogg", vec![1u8, 2]));

        let (a, b, c) = tokio::join!(
            dispatcher.dispatch(&text),
            dispatcher.dispatch(&image),
            dispatcher.dispatch(&audio),
        );
        assert_eq!(a.text.as_deref(), Some("from gemini"));
        assert_eq!(b.text.as_deref(), Some("from openai"));
        assert_eq!(c.text.as_deref(), Some("from workers"));
        assert_eq!(transport.sent_count(), 3);
        assert_eq!(transport.sent.lock().iter().filter(|e| e.body_is_binary()).count(), 1);
    }
}
