// Per-turn request and result values

use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;

use crate::error::{DispatchError, DispatchResult};

#[derive(Debug, Clone)]
enum AttachmentData {
    Bytes(Bytes),
    Base64(String),
}

/// A file attached to a chat turn, held either as raw bytes or base64.
#[derive(Debug, Clone)]
pub struct Attachment {
    pub mime_type: String,
    pub file_name: Option<String>,
    data: AttachmentData,
}

impl Attachment {
    pub fn from_bytes(mime_type: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            mime_type: mime_type.into(),
            file_name: None,
            data: AttachmentData::Bytes(bytes.into()),
        }
    }

    /// Accepts bare base64 or a full `data:<mime>;base64,` URI.
    pub fn from_base64(mime_type: impl Into<String>, data: impl Into<String>) -> Self {
        let data = data.into();
        let data = match data.strip_prefix("data:").and_then(|rest| rest.split_once(";base64,")) {
            Some((_, payload)) => payload.to_string(),
            None => data,
        };
        Self {
            mime_type: mime_type.into(),
            file_name: None,
            data: AttachmentData::Base64(data),
        }
    }

    pub fn with_file_name(mut self, name: impl Into<String>) -> Self {
        self.file_name = Some(name.into());
        self
    }

    pub fn is_audio(&self) -> bool {
        self.mime_type.starts_with("audio/")
    }

    pub fn is_video(&self) -> bool {
        self.mime_type.starts_with("video/")
    }

    pub fn is_image(&self) -> bool {
        self.mime_type.starts_with("image/")
    }

    pub fn base64(&self) -> Cow<'_, str> {
        match &self.data {
            AttachmentData::Base64(data) => Cow::Borrowed(data.as_str()),
            AttachmentData::Bytes(bytes) => Cow::Owned(STANDARD.encode(bytes)),
        }
    }

    /// Original bytes, decoding base64 when needed.
    pub fn bytes(&self) -> DispatchResult<Bytes> {
        match &self.data {
            AttachmentData::Bytes(bytes) => Ok(bytes.clone()),
            AttachmentData::Base64(data) => STANDARD
                .decode(data.trim())
                .map(Bytes::from)
                .map_err(|e| DispatchError::InvalidRequest(format!("attachment is not valid base64: {}", e))),
        }
    }

    pub fn data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.base64())
    }

    pub fn display_name(&self) -> String {
        self.file_name.clone().unwrap_or_else(|| "file".to_string())
    }
}

#[derive(Debug, Clone, Default)]
pub struct InboundRequest {
    pub text: Option<String>,
    pub attachments: Vec<Attachment>,
}

impl InboundRequest {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            attachments: Vec::new(),
        }
    }

    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    /// Trimmed text, empty when absent.
    pub fn prompt(&self) -> &str {
        self.text.as_deref().map(str::trim).unwrap_or("")
    }

    /// Only the first attachment takes part in a dispatch.
    pub fn attachment(&self) -> Option<&Attachment> {
        self.attachments.first()
    }

    pub fn is_empty(&self) -> bool {
        self.prompt().is_empty() && self.attachments.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultKind {
    Text,
    Audio,
    Image,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultAction {
    Storage,
    Generate,
}

/// The one shape handed back to callers, whatever the provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedResult {
    pub kind: ResultKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<ResultAction>,
}

impl NormalizedResult {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            kind: ResultKind::Text,
            text: Some(text.into()),
            url: None,
            action: None,
        }
    }

    pub fn audio(url: impl Into<String>) -> Self {
        Self {
            kind: ResultKind::Audio,
            text: None,
            url: Some(url.into()),
            action: None,
        }
    }

    pub fn image(url: impl Into<String>) -> Self {
        Self {
            kind: ResultKind::Image,
            text: None,
            url: Some(url.into()),
            action: None,
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            kind: ResultKind::Error,
            text: Some(text.into()),
            url: None,
            action: None,
        }
    }

    pub fn is_error(&self) -> bool {
        self.kind == ResultKind::Error
    }
}

impl From<DispatchError> for NormalizedResult {
    fn from(err: DispatchError) -> Self {
        NormalizedResult::error(err.user_message())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attachment_base64_and_bytes_agree() {
        let raw = Attachment::from_bytes("image/png", vec![1u8, 2, 3]);
        let encoded = Attachment::from_base64("image/png", raw.base64().into_owned());
        assert_eq!(encoded.bytes().unwrap(), Bytes::from_static(&[1, 2, 3]));
        assert_eq!(raw.data_uri(), "data:image/png;base64,AQID");
    }

    #[test]
    fn test_data_uri_payload_is_unwrapped() {
        let att = Attachment::from_base64("image/png", "data:image/png;base64,AQID");
        assert_eq!(att.base64(), "AQID");
        assert_eq!(att.data_uri(), "data:image/png;base64,AQID");
        assert_eq!(att.bytes().unwrap(), Bytes::from_static(&[1, 2, 3]));
    }

    #[test]
    fn test_invalid_base64_is_invalid_request() {
        let att = Attachment::from_base64("image/png", "not base64!!");
        assert!(matches!(att.bytes(), Err(DispatchError::InvalidRequest(_))));
    }

    #[test]
    fn test_blank_request_is_empty() {
        assert!(InboundRequest::text("   ").is_empty());
        assert!(!InboundRequest::default()
            .with_attachment(Attachment::from_bytes("audio/ogg", vec![0u8]))
            .is_empty());
    }

    #[test]
    fn test_result_serialization_skips_none() {
        let json = serde_json::to_value(NormalizedResult::text("hi")).unwrap();
        assert_eq!(json, serde_json::json!({ "kind": "text", "text": "hi" }));
    }
}
