use std::num::NonZeroUsize;
use tracing::info;

use crate::aggregator::aggregate;
use crate::chunker::chunk;
use crate::data::RawImage;
use crate::error::PipelineError;
use crate::extractor::Extractor;
use crate::prompt::{build_prompt, require_text};
use crate::providers::{
    GeneratedImage, ImageProvider, ImageRequest, OcrProvider, SpeechProvider,
};
use crate::settings::Settings;
use crate::synthesis::{AudioOutput, AudioSegment, SpeechSynthesizer};

#[derive(Debug, Clone)]
pub struct ImageOptions {
    pub model: String,
    pub size: String,
    pub quality: String,
}

/// Entry points used by the CLI and the HTTP server. Every method is one
/// sequential chain of external calls; nothing is shared between calls.
#[derive(Clone)]
pub struct Pipeline<O: OcrProvider, S: SpeechProvider, I: ImageProvider> {
    extractor: Extractor<O>,
    synthesizer: SpeechSynthesizer<S>,
    images: I,
    image_options: ImageOptions,
    max_chunk: NonZeroUsize,
}

impl<O: OcrProvider, S: SpeechProvider, I: ImageProvider> Pipeline<O, S, I> {
    pub fn new(ocr: O, speech: S, images: I, settings: &Settings) -> Self {
        Self {
            extractor: Extractor::new(ocr),
            synthesizer: SpeechSynthesizer::new(speech, settings.voice_selection()),
            images,
            image_options: ImageOptions {
                model: settings.image_model.clone(),
                size: settings.image_size.clone(),
                quality: settings.image_quality.clone(),
            },
            max_chunk: settings.max_chunk,
        }
    }

    pub fn with_max_chunk(mut self, max_chunk: NonZeroUsize) -> Self {
        self.max_chunk = max_chunk;
        self
    }

    pub fn max_chunk(&self) -> NonZeroUsize {
        self.max_chunk
    }

    /// OCRs each image in input order, one call at a time, stopping at the
    /// first failure.
    pub async fn extract_all(&self, images: Vec<RawImage>) -> Result<Vec<String>, PipelineError> {
        info!("ocr: processing {} image(s)", images.len());
        let mut texts = Vec::with_capacity(images.len());
        for image in images {
            texts.push(self.extractor.extract(image).await?);
        }
        Ok(texts)
    }

    pub async fn process_batch(&self, images: Vec<RawImage>) -> Result<String, PipelineError> {
        let texts = self.extract_all(images).await?;
        Ok(aggregate(&texts))
    }

    pub async fn synthesize_all(
        &self,
        text: &str,
        output: &AudioOutput,
    ) -> Result<Vec<AudioSegment>, PipelineError> {
        let text = require_text(text, "speech")?;
        let segments = chunk(text, self.max_chunk);
        info!(
            "speech: {} chars in {} segment(s) of at most {}",
            text.chars().count(),
            segments.len(),
            self.max_chunk
        );
        self.synthesizer.synthesize(&segments, output).await
    }

    pub fn prompt_for(&self, text: &str) -> Result<String, PipelineError> {
        let text = require_text(text, "image generation")?;
        Ok(build_prompt(text))
    }

    pub async fn generate_image(&self, text: &str) -> Result<GeneratedImage, PipelineError> {
        let prompt = self.prompt_for(text)?;
        let request = ImageRequest {
            prompt,
            model: self.image_options.model.clone(),
            size: self.image_options.size.clone(),
            quality: self.image_options.quality.clone(),
        };
        info!(
            "image: requesting {} {} ({})",
            request.model, request.size, request.quality
        );
        self.images
            .clone()
            .generate(request)
            .await
            .map_err(PipelineError::image_generation)
    }
}
