use anyhow::{Context, Result, anyhow};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::{
    OcrOutcome, OcrProvider, ProviderFuture, ProviderKind, format_error_parts, get_env, missing_key,
};
use crate::data::RawImage;

const DEFAULT_BASE_URL: &str = "https://vision.googleapis.com/v1";
pub(crate) const DEFAULT_FEATURE: &str = "TEXT_DETECTION";

#[derive(Debug, Clone)]
pub struct GoogleVision {
    key: Option<String>,
    feature: String,
    base_url: Option<String>,
}

impl GoogleVision {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: Some(key.into()),
            feature: DEFAULT_FEATURE.to_string(),
            base_url: None,
        }
    }

    /// Builds a client whose calls fail with a missing-key error when `key` is
    /// `None`.
    pub fn from_key(key: Option<String>) -> Self {
        let mut client = Self::new(String::new());
        client.key = key;
        client
    }

    /// `TEXT_DETECTION` or `DOCUMENT_TEXT_DETECTION`.
    pub fn with_feature(mut self, feature: impl Into<String>) -> Self {
        let feature = feature.into();
        if !feature.trim().is_empty() {
            self.feature = feature.trim().to_ascii_uppercase();
        }
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    fn base_url(&self) -> String {
        self.base_url
            .clone()
            .or_else(|| get_env("GOOGLE_VISION_BASE_URL"))
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
    }
}

impl OcrProvider for GoogleVision {
    fn detect_text(self, image: RawImage) -> ProviderFuture<OcrOutcome> {
        Box::pin(async move {
            let key = self.key.clone().ok_or_else(|| missing_key(ProviderKind::Google))?;
            let client = reqwest::Client::new();
            let url = format!("{}/images:annotate", self.base_url());
            let body = json!({
                "requests": [
                    {
                        "image": {"content": BASE64.encode(&image.bytes)},
                        "features": [{"type": self.feature}]
                    }
                ]
            });

            debug!(
                "vision: annotating {} ({} bytes, {})",
                image.label(),
                image.bytes.len(),
                self.feature
            );
            let response = client
                .post(&url)
                .query(&[("key", key.as_str())])
                .json(&body)
                .send()
                .await
                .with_context(|| "failed to reach Vision API")?;

            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            if !status.is_success() {
                return Err(anyhow!(
                    "Vision API error ({}): {}",
                    status,
                    extract_google_error(&text).unwrap_or(text)
                ));
            }
            parse_annotate_response(&text)
        })
    }
}

pub(crate) fn parse_annotate_response(text: &str) -> Result<OcrOutcome> {
    let payload: AnnotateResponse =
        serde_json::from_str(text).with_context(|| "failed to parse Vision response JSON")?;
    let first = payload
        .responses
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("Vision API returned no responses"))?;

    if let Some(error) = first.error {
        return Err(anyhow!(
            "Vision API error: {}",
            format_error_parts(error.message, error.status, error.code.map(|c| c.to_string()))
        ));
    }

    let description = first
        .text_annotations
        .into_iter()
        .next()
        .map(|annotation| annotation.description)
        .unwrap_or_default();
    let description = description.trim_end_matches(['\n', '\r']);
    if description.is_empty() {
        return Ok(OcrOutcome::Empty);
    }
    Ok(OcrOutcome::Text(description.to_string()))
}

pub(crate) fn extract_google_error(body: &str) -> Option<String> {
    #[derive(Deserialize)]
    struct ErrorBody {
        error: Option<GoogleError>,
    }

    let parsed: ErrorBody = serde_json::from_str(body).ok()?;
    let error = parsed.error?;
    Some(format_error_parts(
        error.message,
        error.status,
        error.code.map(|code| code.to_string()),
    ))
}

#[derive(Debug, Deserialize)]
struct AnnotateResponse {
    #[serde(default)]
    responses: Vec<AnnotateImageResponse>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnnotateImageResponse {
    #[serde(default)]
    text_annotations: Vec<TextAnnotation>,
    error: Option<GoogleError>,
}

#[derive(Debug, Deserialize)]
struct TextAnnotation {
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GoogleError {
    pub(crate) code: Option<i64>,
    pub(crate) message: Option<String>,
    pub(crate) status: Option<String>,
}
