use anyhow::{Context, Result, anyhow};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::Deserialize;
use serde_json::json;

use super::google_vision::extract_google_error;
use super::{ProviderFuture, ProviderKind, SpeechProvider, VoiceSelection, get_env, missing_key};

const DEFAULT_BASE_URL: &str = "https://texttospeech.googleapis.com/v1";

#[derive(Debug, Clone)]
pub struct GoogleTts {
    key: Option<String>,
    base_url: Option<String>,
}

impl GoogleTts {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: Some(key.into()),
            base_url: None,
        }
    }

    pub fn from_key(key: Option<String>) -> Self {
        let mut client = Self::new(String::new());
        client.key = key;
        client
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    fn base_url(&self) -> String {
        self.base_url
            .clone()
            .or_else(|| get_env("GOOGLE_TTS_BASE_URL"))
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
    }
}

impl SpeechProvider for GoogleTts {
    fn synthesize(self, text: String, voice: VoiceSelection) -> ProviderFuture<Vec<u8>> {
        Box::pin(async move {
            let key = self.key.clone().ok_or_else(|| missing_key(ProviderKind::Google))?;
            let client = reqwest::Client::new();
            let url = format!("{}/text:synthesize", self.base_url());
            let body = json!({
                "input": {"text": text},
                "voice": {
                    "languageCode": voice.language_code,
                    "name": voice.name,
                    "ssmlGender": voice.gender
                },
                "audioConfig": {"audioEncoding": voice.encoding}
            });

            let response = client
                .post(&url)
                .query(&[("key", key.as_str())])
                .json(&body)
                .send()
                .await
                .with_context(|| "failed to reach Text-to-Speech API")?;

            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            if !status.is_success() {
                return Err(anyhow!(
                    "Text-to-Speech API error ({}): {}",
                    status,
                    extract_google_error(&text).unwrap_or(text)
                ));
            }
            decode_audio_content(&text)
        })
    }
}

pub(crate) fn decode_audio_content(text: &str) -> Result<Vec<u8>> {
    #[derive(Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct SynthesizeResponse {
        audio_content: Option<String>,
    }

    let payload: SynthesizeResponse = serde_json::from_str(text)
        .with_context(|| "failed to parse Text-to-Speech response JSON")?;
    let encoded = payload
        .audio_content
        .filter(|value| !value.is_empty())
        .ok_or_else(|| anyhow!("no audio content in Text-to-Speech response"))?;
    BASE64
        .decode(encoded.as_bytes())
        .with_context(|| "failed to decode audio content")
}
