use tracing::{info, warn};

use crate::data::RawImage;
use crate::error::PipelineError;
use crate::providers::{OcrOutcome, OcrProvider};

/// Turns one image into plain text with a single OCR call.
#[derive(Debug, Clone)]
pub struct Extractor<P: OcrProvider> {
    provider: P,
}

impl<P: OcrProvider> Extractor<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    /// Returns an empty string when the service finds no text. Transport and
    /// service failures become [`PipelineError::Extraction`]; nothing is retried.
    pub async fn extract(&self, image: RawImage) -> Result<String, PipelineError> {
        let label = image.label();
        match self.provider.clone().detect_text(image).await {
            Ok(OcrOutcome::Text(text)) => {
                info!("ocr: {} -> {} chars", label, text.chars().count());
                Ok(text)
            }
            Ok(OcrOutcome::Empty) => {
                warn!("ocr: no text detected in {}", label);
                Ok(String::new())
            }
            Err(err) => Err(PipelineError::extraction(label, err)),
        }
    }
}
