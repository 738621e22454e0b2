use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use serde_json::json;

use super::{
    GeneratedImage, ImageProvider, ImageReference, ImageRequest, ProviderFuture, ProviderKind,
    format_error_parts, get_env, missing_key,
};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub(crate) const DEFAULT_MODEL: &str = "dall-e-3";
pub(crate) const DEFAULT_SIZE: &str = "1024x1024";
pub(crate) const DEFAULT_QUALITY: &str = "standard";

#[derive(Debug, Clone)]
pub struct OpenAIImages {
    key: Option<String>,
    base_url: Option<String>,
}

impl OpenAIImages {
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
            .or_else(|| get_env("OPENAI_BASE_URL"))
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
    }
}

impl ImageProvider for OpenAIImages {
    fn generate(self, request: ImageRequest) -> ProviderFuture<GeneratedImage> {
        Box::pin(async move {
            let key = self.key.clone().ok_or_else(|| missing_key(ProviderKind::OpenAI))?;
            let client = reqwest::Client::new();
            let url = format!("{}/images/generations", self.base_url());
            let body = json!({
                "model": request.model,
                "prompt": request.prompt,
                "size": request.size,
                "quality": request.quality,
                "n": 1
            });

            let response = client
                .post(&url)
                .bearer_auth(key)
                .json(&body)
                .send()
                .await
                .with_context(|| "failed to reach OpenAI images API")?;

            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            if !status.is_success() {
                return Err(anyhow!(
                    "OpenAI API error ({}): {}",
                    status,
                    extract_openai_error(&text).unwrap_or(text)
                ));
            }
            extract_generated_image(&text)
        })
    }
}

pub(crate) fn extract_generated_image(text: &str) -> Result<GeneratedImage> {
    let payload: ImagesResponse =
        serde_json::from_str(text).with_context(|| "failed to parse OpenAI response JSON")?;
    let image = payload
        .data
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("no image returned from OpenAI"))?;

    let reference = match (image.url, image.b64_json) {
        (Some(url), _) if !url.trim().is_empty() => ImageReference::Url(url),
        (_, Some(data)) if !data.trim().is_empty() => ImageReference::Base64(data),
        _ => return Err(anyhow!("OpenAI image has neither url nor b64_json")),
    };
    Ok(GeneratedImage {
        reference,
        revised_prompt: image
            .revised_prompt
            .filter(|value| !value.trim().is_empty()),
    })
}

fn extract_openai_error(body: &str) -> Option<String> {
    #[derive(Deserialize)]
    struct ErrorBody {
        error: Option<OpenAIError>,
    }

    #[derive(Deserialize)]
    struct OpenAIError {
        message: Option<String>,
        #[serde(rename = "type")]
        kind: Option<String>,
        code: Option<String>,
    }

    let parsed: ErrorBody = serde_json::from_str(body).ok()?;
    let error = parsed.error?;
    Some(format_error_parts(error.message, error.kind, error.code))
}

#[derive(Debug, Deserialize)]
struct ImagesResponse {
    #[serde(default)]
    data: Vec<ImageData>,
}

#[derive(Debug, Deserialize)]
struct ImageData {
    url: Option<String>,
    b64_json: Option<String>,
    revised_prompt: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::test_server::serve_fixed;
    use axum::http::StatusCode;
    use insta::assert_json_snapshot;

    fn request() -> ImageRequest {
        ImageRequest {
            prompt: "a cat".to_string(),
            model: DEFAULT_MODEL.to_string(),
            size: DEFAULT_SIZE.to_string(),
            quality: DEFAULT_QUALITY.to_string(),
        }
    }

    #[test]
    fn openai_extract_image_snapshot() {
        let payload = include_str!(concat!(
            env!("CARGO_MANIFEST_DIR"),
            "/tests/fixtures/openai_image_response.json"
        ));
        let image = extract_generated_image(payload).unwrap();
        assert_json_snapshot!(image);
    }

    #[test]
    fn falls_back_to_base64_payload() {
        let image = extract_generated_image(r#"{"data":[{"b64_json":"iVBORw0K"}]}"#).unwrap();
        assert_eq!(image.reference, ImageReference::Base64("iVBORw0K".to_string()));
        assert_eq!(image.revised_prompt, None);
    }

    #[test]
    fn empty_data_is_an_error() {
        assert!(extract_generated_image(r#"{"data":[]}"#).is_err());
        assert!(extract_generated_image(r#"{"data":[{}]}"#).is_err());
    }

    #[tokio::test]
    async fn http_error_status_is_surfaced() {
        let base = serve_fixed(
            StatusCode::BAD_REQUEST,
            r#"{"error":{"message":"Your request was rejected by the safety system.","type":"invalid_request_error","code":"content_policy_violation"}}"#,
        )
        .await;
        let err = OpenAIImages::new("sk-test")
            .with_base_url(base)
            .generate(request())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("content_policy_violation"));
    }
}
