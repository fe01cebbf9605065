// Storage gateway client: multipart file uploads
// Folder and quota endpoints of the gateway are not used here

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};

use crate::config::AppConfig;
use crate::dispatch::Attachment;
use crate::error::{DispatchError, DispatchResult};

#[async_trait]
pub trait StorageBackend: Send + Sync {
    async fn upload(&self, attachment: &Attachment) -> DispatchResult<()>;
}

#[derive(Debug, Clone)]
pub struct StorageGateway {
    url: String,
    chat_id: String,
    http_client: reqwest::Client,
}

impl StorageGateway {
    pub fn new(url: impl Into<String>, chat_id: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            chat_id: chat_id.into(),
            http_client: reqwest::Client::new(),
        }
    }

    /// `None` unless both the gateway URL and chat id are configured.
    pub fn from_config(config: &AppConfig) -> Option<Self> {
        let url = config.storage_gateway.as_deref().filter(|u| !u.trim().is_empty())?;
        let chat_id = config.storage_chat_id.as_deref().filter(|c| !c.trim().is_empty())?;
        Some(Self::new(url, chat_id))
    }

    fn form_for(&self, attachment: &Attachment) -> DispatchResult<Form> {
        let part = Part::bytes(attachment.bytes()?.to_vec())
            .file_name(attachment.display_name())
            .mime_str(&attachment.mime_type)
            .map_err(|e| DispatchError::InvalidRequest(format!("bad mime type {}: {}", attachment.mime_type, e)))?;

        Ok(Form::new().part("file", part).text("chat_id", self.chat_id.clone()))
    }
}

#[async_trait]
impl StorageBackend for StorageGateway {
    async fn upload(&self, attachment: &Attachment) -> DispatchResult<()> {
        let form = self.form_for(attachment)?;
        tracing::info!("Uploading {} to storage gateway", attachment.display_name());

        let response = self
            .http_client
            .post(&self.url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                tracing::warn!("Storage upload failed: {}", e);
                DispatchError::transport(None, e.to_string())
            })?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let body = response.bytes().await.unwrap_or_default();
            return Err(upload_status_error(status, &body));
        }
        Ok(())
    }
}

const ERROR_BODY_LOG_LIMIT: usize = 2048;

fn upload_status_error(status: u16, body: &[u8]) -> DispatchError {
    let snippet = String::from_utf8_lossy(&body[..body.len().min(ERROR_BODY_LOG_LIMIT)]);
    tracing::warn!("Storage gateway returned HTTP {}: {}", status, snippet);
    if status == 429 {
        DispatchError::Quota { status }
    } else {
        DispatchError::transport(Some(status), format!("storage gateway returned HTTP {}", status))
    }
}
