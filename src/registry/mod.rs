// Model registry: known (provider, model, endpoint) tuples keyed by a
// modality-prefixed identifier such as `IMAGE_TO_TEXT_GEMINI`

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const WORKERS_AI_BASE_URL: &str = "https://api.cloudflare.com/client/v4/accounts";
pub const BOTHUB_BASE_URL: &str = "https://bothub.chat/api/v2/openai/v1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProviderKind {
    Gemini,
    #[serde(rename = "OPENAI_COMPAT")]
    OpenAiCompat,
    /// REST-run style (`/{account}/ai/run/{model}`), binary-capable
    WorkersAi,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gemini => "GEMINI",
            Self::OpenAiCompat => "OPENAI_COMPAT",
            Self::WorkersAi => "WORKERS_AI",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServiceType {
    TextToText,
    ImageToText,
    AudioToText,
    VideoToText,
    TextToImage,
    TextToAudio,
    ImageToImage,
}

impl ServiceType {
    pub const ALL: [ServiceType; 7] = [
        ServiceType::TextToText,
        ServiceType::ImageToText,
        ServiceType::AudioToText,
        ServiceType::VideoToText,
        ServiceType::TextToImage,
        ServiceType::TextToAudio,
        ServiceType::ImageToImage,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TextToText => "TEXT_TO_TEXT",
            Self::ImageToText => "IMAGE_TO_TEXT",
            Self::AudioToText => "AUDIO_TO_TEXT",
            Self::VideoToText => "VIDEO_TO_TEXT",
            Self::TextToImage => "TEXT_TO_IMAGE",
            Self::TextToAudio => "TEXT_TO_AUDIO",
            Self::ImageToImage => "IMAGE_TO_IMAGE",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::TextToText => "✍️ Text → Text",
            Self::ImageToText => "👁️ Image → Text",
            Self::AudioToText => "🎙️ Audio → Text",
            Self::VideoToText => "🎬 Video → Text",
            Self::TextToImage => "🎨 Text → Image",
            Self::TextToAudio => "🔊 Text → Audio",
            Self::ImageToImage => "🖼️ Image → Image",
        }
    }

    /// Key under which the active model id is persisted.
    pub fn persistence_key(&self) -> String {
        format!("ai_config:ACTIVE_MODEL_{}", self.as_str())
    }

    /// Derive the service type of a registry identifier by its structural
    /// prefix. `TEXT_TO_TEXT_GEMINI` -> `TextToText`.
    pub fn from_model_id(id: &str) -> Option<ServiceType> {
        Self::ALL.into_iter().find(|st| {
            id.strip_prefix(st.as_str())
                .map(|rest| rest.starts_with('_') && rest.len() > 1)
                .unwrap_or(false)
        })
    }

    /// Service types whose output is text (and so get the assistant prompt).
    pub fn produces_text(&self) -> bool {
        matches!(
            self,
            Self::TextToText | Self::ImageToText | Self::AudioToText | Self::VideoToText
        )
    }
}

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServiceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_uppercase();
        Self::ALL
            .into_iter()
            .find(|st| st.as_str() == upper)
            .ok_or_else(|| format!("unknown service type: {}", s))
    }
}

/// Immutable registry record. `api_key_ref` names a secret, never holds it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelEntry {
    pub service: ProviderKind,
    pub model: String,
    pub api_key_ref: String,
    pub base_url: String,
}

impl ModelEntry {
    pub fn new(
        service: ProviderKind,
        model: impl Into<String>,
        api_key_ref: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            service,
            model: model.into(),
            api_key_ref: api_key_ref.into(),
            base_url: base_url.into(),
        }
    }

    pub fn friendly_name(&self) -> String {
        format!("{}: {}", self.service, self.model)
    }
}

/// Built-in table. Declaration order is the fallback order.
/// Format: (id, provider, model, api_key_ref, base_url)
static BUILTIN_MODELS: &[(&str, ProviderKind, &str, &str, &str)] = &[
    // Text -> Text
    ("TEXT_TO_TEXT_GEMINI", ProviderKind::Gemini, "gemini-2.5-flash", "GEMINI_API_KEY", GEMINI_BASE_URL),
    ("TEXT_TO_TEXT_WORKERS_AI", ProviderKind::WorkersAi, "@cf/qwen/qwen1.5-14b-chat-awq", "CLOUDFLARE_API_TOKEN", WORKERS_AI_BASE_URL),
    ("TEXT_TO_TEXT_BOTHUB", ProviderKind::OpenAiCompat, "gpt-4o-mini", "BOTHUB_API_KEY", BOTHUB_BASE_URL),
    // Image -> Text
    ("IMAGE_TO_TEXT_GEMINI", ProviderKind::Gemini, "gemini-2.5-flash", "GEMINI_API_KEY", GEMINI_BASE_URL),
    ("IMAGE_TO_TEXT_WORKERS_AI", ProviderKind::WorkersAi, "@cf/unum/uform-gen2-qwen-500m", "CLOUDFLARE_API_TOKEN", WORKERS_AI_BASE_URL),
    ("IMAGE_TO_TEXT_BOTHUB", ProviderKind::OpenAiCompat, "gpt-4o-mini", "BOTHUB_API_KEY", BOTHUB_BASE_URL),
    // Audio / Video -> Text
    ("AUDIO_TO_TEXT_GEMINI", ProviderKind::Gemini, "gemini-2.5-flash", "GEMINI_API_KEY", GEMINI_BASE_URL),
    ("AUDIO_TO_TEXT_WORKERS_AI", ProviderKind::WorkersAi, "@cf/openai/whisper", "CLOUDFLARE_API_TOKEN", WORKERS_AI_BASE_URL),
    ("VIDEO_TO_TEXT_GEMINI", ProviderKind::Gemini, "gemini-2.5-flash", "GEMINI_API_KEY", GEMINI_BASE_URL),
    // Generation
    ("TEXT_TO_IMAGE_WORKERS_AI", ProviderKind::WorkersAi, "@cf/stabilityai/stable-diffusion-xl-base-1.0", "CLOUDFLARE_API_TOKEN", WORKERS_AI_BASE_URL),
    ("TEXT_TO_AUDIO_WORKERS_AI", ProviderKind::WorkersAi, "@cf/myshell-ai/melotts", "CLOUDFLARE_API_TOKEN", WORKERS_AI_BASE_URL),
];

#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    entries: Vec<(String, ModelEntry)>,
}

impl ModelRegistry {
    pub fn new(entries: Vec<(String, ModelEntry)>) -> Self {
        Self { entries }
    }

    pub fn builtin() -> Self {
        let entries = BUILTIN_MODELS
            .iter()
            .map(|(id, service, model, key_ref, base_url)| {
                (id.to_string(), ModelEntry::new(*service, *model, *key_ref, *base_url))
            })
            .collect();
        Self { entries }
    }

    pub fn get(&self, id: &str) -> Option<&ModelEntry> {
        self.entries
            .iter()
            .find(|(entry_id, _)| entry_id == id)
            .map(|(_, entry)| entry)
    }

    /// Entries whose id derives to `service_type`, in declaration order.
    pub fn candidates(&self, service_type: ServiceType) -> impl Iterator<Item = (&str, &ModelEntry)> {
        self.entries
            .iter()
            .filter(move |(id, _)| ServiceType::from_model_id(id) == Some(service_type))
            .map(|(id, entry)| (id.as_str(), entry))
    }

    /// Selectable models grouped per service type, as shown in the model
    /// configuration menu. Service types without candidates are skipped.
    pub fn menu_config(&self) -> Vec<MenuSection> {
        ServiceType::ALL
            .into_iter()
            .filter_map(|service_type| {
                let models: Vec<MenuItem> = self
                    .candidates(service_type)
                    .map(|(id, entry)| MenuItem {
                        id: id.to_string(),
                        label: entry.friendly_name(),
                    })
                    .collect();
                if models.is_empty() {
                    return None;
                }
                Some(MenuSection {
                    service_type,
                    name: service_type.display_name().to_string(),
                    kv_key: service_type.persistence_key(),
                    models,
                })
            })
            .collect()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MenuSection {
    pub service_type: ServiceType,
    pub name: String,
    pub kv_key: String,
    pub models: Vec<MenuItem>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MenuItem {
    pub id: String,
    pub label: String,
}
