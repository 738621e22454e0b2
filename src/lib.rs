use anyhow::{Context, Result, anyhow};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

pub mod aggregator;
pub mod artifacts;
pub mod chunker;
pub mod data;
pub mod error;
mod extractor;
pub mod logging;
pub mod paths;
pub mod pipeline;
pub mod prompt;
pub mod providers;
pub mod server;
pub mod settings;
mod synthesis;
mod test_util;

pub use aggregator::{AggregateMode, TextDraft, aggregate};
pub use chunker::chunk;
pub use data::RawImage;
pub use error::PipelineError;
pub use extractor::Extractor;
pub use pipeline::Pipeline;
pub use prompt::{PROMPT_SUFFIX, build_prompt};
pub use providers::{GeneratedImage, GoogleTts, GoogleVision, ImageReference, OpenAIImages};
pub use synthesis::{AudioOutput, AudioSegment, SpeechSynthesizer, join_segments};

pub type DefaultPipeline = Pipeline<GoogleVision, GoogleTts, OpenAIImages>;

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub text: Option<String>,
    pub images: Vec<String>,
    pub speech: bool,
    pub illustrate: bool,
    pub out_dir: Option<String>,
    pub stem: Option<String>,
    pub join: bool,
    pub save_image: bool,
    pub max_chunk: Option<usize>,
    pub voice: Option<String>,
    pub language_code: Option<String>,
    pub feature: Option<String>,
    pub google_key: Option<String>,
    pub openai_key: Option<String>,
    pub settings_path: Option<String>,
}

/// Loads settings and applies command-line overrides.
pub fn resolve_settings(config: &Config) -> Result<settings::Settings> {
    let settings_path = config.settings_path.as_deref().map(Path::new);
    let mut settings = settings::load_settings(settings_path)?;
    if let Some(max_chunk) = config.max_chunk {
        settings.max_chunk = NonZeroUsize::new(max_chunk)
            .ok_or_else(|| anyhow!("--max-chunk must be greater than zero"))?;
    }
    if let Some(voice) = non_empty(config.voice.as_deref()) {
        settings.voice = voice.to_string();
    }
    if let Some(code) = non_empty(config.language_code.as_deref()) {
        settings.language_code = code.to_string();
    }
    if let Some(feature) = non_empty(config.feature.as_deref()) {
        settings.vision_feature = feature.to_ascii_uppercase();
    }
    if let Some(dir) = non_empty(config.out_dir.as_deref()) {
        settings.output_dir = PathBuf::from(dir);
    }
    Ok(settings)
}

/// Builds the Google/OpenAI pipeline. Missing keys surface as errors on the
/// first call that needs them.
pub fn build_pipeline(config: &Config, settings: &settings::Settings) -> DefaultPipeline {
    let google_key =
        providers::resolve_key(providers::ProviderKind::Google, config.google_key.as_deref()).ok();
    let openai_key =
        providers::resolve_key(providers::ProviderKind::OpenAI, config.openai_key.as_deref()).ok();
    Pipeline::new(
        GoogleVision::from_key(google_key.clone()).with_feature(settings.vision_feature.clone()),
        GoogleTts::from_key(google_key),
        OpenAIImages::from_key(openai_key),
        settings,
    )
}

pub async fn run(config: Config, input: Option<String>) -> Result<String> {
    let settings = resolve_settings(&config)?;

    if !config.images.is_empty() || config.speech {
        providers::resolve_key(providers::ProviderKind::Google, config.google_key.as_deref())?;
    }
    if config.illustrate {
        providers::resolve_key(providers::ProviderKind::OpenAI, config.openai_key.as_deref())?;
    }

    let images = config
        .images
        .iter()
        .map(|path| data::load_image(Path::new(path)))
        .collect::<Result<Vec<_>>>()?;
    let pipeline = build_pipeline(&config, &settings);

    let mut draft = TextDraft::new();
    let from_images = !images.is_empty();
    if from_images {
        let texts = pipeline.extract_all(images).await?;
        draft.apply_batch(&texts, AggregateMode::Replace);
    }
    if let Some(text) = config.text.clone().or(input) {
        draft.edit(text);
    }

    if !config.speech && !config.illustrate {
        if !from_images && draft.current().is_empty() {
            return Err(anyhow!(
                "nothing to do: pass --image, --text or stdin (add --speech / --illustrate)"
            ));
        }
        return Ok(draft.current().to_string());
    }

    let text = draft.current();
    let stem = config
        .stem
        .clone()
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(paths::default_stem);
    let mut lines = Vec::new();
    if from_images && !draft.is_edited() {
        lines.push(text.to_string());
    }

    if config.speech {
        let output = AudioOutput::new(&settings.output_dir, &stem);
        let segments = pipeline.synthesize_all(text, &output).await?;
        for segment in &segments {
            lines.push(format!("audio: {}", segment.path.display()));
        }
        if config.join && !segments.is_empty() {
            let (_, ext) = data::audio_format(&settings.encoding);
            let joined = output.joined_path(ext);
            join_segments(&segments, &joined)?;
            lines.push(format!("audio (joined): {}", joined.display()));
        }
    }

    if config.illustrate {
        let image = pipeline.generate_image(text).await?;
        lines.extend(describe_image(&image));
        if config.save_image {
            let path = settings.output_dir.join(format!("{}.png", stem));
            artifacts::save_generated_image(&image, &path)
                .await
                .with_context(|| "failed to save generated image")?;
            lines.push(format!("image saved: {}", path.display()));
        }
    }

    Ok(lines.join("\n"))
}

pub fn describe_image(image: &GeneratedImage) -> Vec<String> {
    let mut lines = Vec::new();
    match &image.reference {
        ImageReference::Url(url) => lines.push(format!("image: {}", url)),
        ImageReference::Base64(data) => lines.push(format!(
            "image: <{} bytes base64, use --save-image>",
            data.len()
        )),
    }
    if let Some(revised) = image.revised_prompt.as_deref() {
        lines.push(format!("revised prompt: {}", revised));
    }
    lines
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn describe_url_image_with_revised_prompt() {
        let image = GeneratedImage {
            reference: ImageReference::Url("https://images.example.com/a.png".to_string()),
            revised_prompt: Some("a calm lake".to_string()),
        };
        assert_eq!(
            describe_image(&image),
            vec![
                "image: https://images.example.com/a.png",
                "revised prompt: a calm lake"
            ]
        );
    }

    #[test]
    fn cli_overrides_are_applied() {
        let config = Config {
            max_chunk: Some(200),
            voice: Some("cmn-TW-Wavenet-B".to_string()),
            feature: Some("document_text_detection".to_string()),
            out_dir: Some("out".to_string()),
            ..Config::default()
        };
        let settings = resolve_settings(&config).unwrap();
        assert_eq!(settings.max_chunk.get(), 200);
        assert_eq!(settings.voice, "cmn-TW-Wavenet-B");
        assert_eq!(settings.vision_feature, "DOCUMENT_TEXT_DETECTION");
        assert_eq!(settings.output_dir, PathBuf::from("out"));
    }

    #[test]
    fn zero_max_chunk_is_rejected() {
        let config = Config {
            max_chunk: Some(0),
            ..Config::default()
        };
        assert!(resolve_settings(&config).is_err());
    }

    #[tokio::test]
    async fn text_only_run_echoes_text() {
        let config = Config {
            text: Some("hello".to_string()),
            ..Config::default()
        };
        assert_eq!(run(config, None).await.unwrap(), "hello");
    }

    #[tokio::test]
    async fn empty_run_is_an_error() {
        let err = run(Config::default(), None).await.unwrap_err();
        assert!(err.to_string().starts_with("nothing to do"));
    }
}
