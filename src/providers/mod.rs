use anyhow::{Result, anyhow};
use serde::Serialize;
use std::future::Future;
use std::pin::Pin;

use crate::data::RawImage;

mod google_tts;
mod google_vision;
mod openai_images;

pub use google_tts::GoogleTts;
pub use google_vision::GoogleVision;
pub use openai_images::OpenAIImages;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Google,
    OpenAI,
}

/// Result of one OCR call. `Empty` means the service answered but detected no
/// text regions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "text", rename_all = "snake_case")]
pub enum OcrOutcome {
    Text(String),
    Empty,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VoiceSelection {
    pub language_code: String,
    pub name: String,
    pub gender: String,
    pub encoding: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageRequest {
    pub prompt: String,
    pub model: String,
    pub size: String,
    pub quality: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ImageReference {
    Url(String),
    Base64(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GeneratedImage {
    pub reference: ImageReference,
    pub revised_prompt: Option<String>,
}

pub type ProviderFuture<T> = Pin<Box<dyn Future<Output = Result<T>> + Send>>;

pub trait OcrProvider: Clone + Send + Sync {
    fn detect_text(self, image: RawImage) -> ProviderFuture<OcrOutcome>;
}

pub trait SpeechProvider: Clone + Send + Sync {
    fn synthesize(self, text: String, voice: VoiceSelection) -> ProviderFuture<Vec<u8>>;
}

pub trait ImageProvider: Clone + Send + Sync {
    fn generate(self, request: ImageRequest) -> ProviderFuture<GeneratedImage>;
}

pub fn resolve_key(provider: ProviderKind, override_key: Option<&str>) -> Result<String> {
    if let Some(key) = override_key.map(str::trim).filter(|key| !key.is_empty()) {
        return Ok(key.to_string());
    }

    match provider {
        ProviderKind::Google => {
            get_env("GOOGLE_API_KEY").or_else(|| get_env("GOOGLE_CLOUD_API_KEY"))
        }
        ProviderKind::OpenAI => get_env("OPENAI_API_KEY"),
    }
    .ok_or_else(|| missing_key(provider))
}

pub(crate) fn missing_key(provider: ProviderKind) -> anyhow::Error {
    match provider {
        ProviderKind::Google => anyhow!(
            "API key not found for google (checked --google-key, GOOGLE_API_KEY, GOOGLE_CLOUD_API_KEY)"
        ),
        ProviderKind::OpenAI => {
            anyhow!("API key not found for openai (checked --openai-key, OPENAI_API_KEY)")
        }
    }
}

pub(crate) fn get_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
}

/// Formats the `{"error": {...}}` body shared by the Google and OpenAI APIs.
pub(crate) fn format_error_parts(
    message: Option<String>,
    kind: Option<String>,
    code: Option<String>,
) -> String {
    let mut parts = Vec::new();
    if let Some(message) = message
        && !message.trim().is_empty()
    {
        parts.push(message);
    }
    if let Some(kind) = kind
        && !kind.trim().is_empty()
    {
        parts.push(format!("type: {}", kind));
    }
    if let Some(code) = code
        && !code.trim().is_empty()
    {
        parts.push(format!("code: {}", code));
    }
    if parts.is_empty() {
        "unknown error".to_string()
    } else {
        parts.join(" | ")
    }
}
