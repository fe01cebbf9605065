// Chat turn handler: intent first, then storage or the AI dispatcher

use serde::Serialize;
use std::sync::Arc;

use crate::dispatch::{Dispatcher, InboundRequest, NormalizedResult};
use crate::error::DispatchError;
use crate::intent::{classify_intent, Intent};
use crate::storage::StorageBackend;

const STORAGE_MENU_TEXT: &str = "Storage: attach files and write \"save\" to upload them to your cloud storage.";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TurnOutcome {
    Admin,
    StorageMenu { text: String },
    Saved { results: Vec<NormalizedResult> },
    Reply { result: NormalizedResult },
}

#[derive(Clone)]
pub struct ChatService {
    dispatcher: Dispatcher,
    storage: Option<Arc<dyn StorageBackend>>,
}

impl ChatService {
    pub fn new(dispatcher: Dispatcher, storage: Option<Arc<dyn StorageBackend>>) -> Self {
        Self { dispatcher, storage }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub async fn handle_turn(&self, request: &InboundRequest) -> TurnOutcome {
        match classify_intent(request) {
            Intent::Admin => TurnOutcome::Admin,
            Intent::StorageMenu => TurnOutcome::StorageMenu {
                text: STORAGE_MENU_TEXT.to_string(),
            },
            Intent::Save => TurnOutcome::Saved {
                results: self.save_all(request).await,
            },
            Intent::AiQuery => TurnOutcome::Reply {
                result: self.dispatcher.dispatch(request).await,
            },
        }
    }

    async fn save_all(&self, request: &InboundRequest) -> Vec<NormalizedResult> {
        let Some(storage) = &self.storage else {
            return vec![DispatchError::config("storage gateway is not configured").into()];
        };

        let mut results = Vec::with_capacity(request.attachments.len());
        for attachment in &request.attachments {
            let name = attachment.display_name();
            let result = match storage.upload(attachment).await {
                Ok(()) => NormalizedResult::text(format!("{} saved", name)),
                Err(e) => {
                    tracing::error!("Failed to upload {}: {}", name, e);
                    NormalizedResult::error(format!("failed to save {}", name))
                }
            };
            results.push(result);
        }
        results
    }
}
