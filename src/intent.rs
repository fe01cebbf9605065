// Intent classifier - runs before modality classification so the AI
// dispatcher itself stays intent-agnostic

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::dispatch::InboundRequest;

static SAVE_COMMAND: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\s*(/save|save|сохрани)\b").expect("valid save regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    /// `/admin`: open the model configuration
    Admin,
    /// `/storage`: show the storage menu
    StorageMenu,
    /// "save ..." with attachments: upload to the storage gateway
    Save,
    AiQuery,
}

pub fn classify_intent(request: &InboundRequest) -> Intent {
    let text = request.prompt();
    let command = text.to_lowercase();

    if command == "/admin" {
        return Intent::Admin;
    }
    if command == "/storage" {
        return Intent::StorageMenu;
    }
    if !request.attachments.is_empty() && SAVE_COMMAND.is_match(text) {
        return Intent::Save;
    }
    Intent::AiQuery
}
