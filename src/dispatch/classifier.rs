// Modality classifier

use super::types::InboundRequest;
use crate::registry::ServiceType;

/// Pick the service type for a turn. Only the first attachment is inspected.
pub fn classify(request: &InboundRequest) -> ServiceType {
    match request.attachment() {
        Some(att) if att.is_audio() => ServiceType::AudioToText,
        Some(att) if att.is_video() => ServiceType::VideoToText,
        Some(_) => ServiceType::ImageToText,
        None => ServiceType::TextToText,
    }
}
