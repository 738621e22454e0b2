use std::path::PathBuf;
use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Failures surfaced by the text acquisition and synthesis pipeline.
///
/// Zero detected text regions is not represented here: the extractor reports
/// it as an empty string.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("failed to extract text from {image}: {source}")]
    Extraction {
        image: String,
        #[source]
        source: BoxError,
    },

    #[error("speech synthesis failed at segment {segment_index}: {source}")]
    Synthesis {
        segment_index: usize,
        #[source]
        source: BoxError,
    },

    #[error("image generation failed: {source}")]
    ImageGeneration {
        #[source]
        source: BoxError,
    },

    #[error("please enter a description or text ({operation} needs non-empty input)")]
    EmptyInput { operation: &'static str },

    #[error("failed to write {}: {source}", path.display())]
    Output {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl PipelineError {
    pub(crate) fn extraction(image: impl Into<String>, err: anyhow::Error) -> Self {
        PipelineError::Extraction {
            image: image.into(),
            source: err.into(),
        }
    }

    pub(crate) fn synthesis(segment_index: usize, err: anyhow::Error) -> Self {
        PipelineError::Synthesis {
            segment_index,
            source: err.into(),
        }
    }

    pub(crate) fn image_generation(err: anyhow::Error) -> Self {
        PipelineError::ImageGeneration { source: err.into() }
    }

    /// Index of the failing segment for synthesis errors.
    pub fn segment_index(&self) -> Option<usize> {
        match self {
            PipelineError::Synthesis { segment_index, .. } => Some(*segment_index),
            _ => None,
        }
    }

    /// True when the failure came from one of the external services.
    pub fn is_external(&self) -> bool {
        matches!(
            self,
            PipelineError::Extraction { .. }
                | PipelineError::Synthesis { .. }
                | PipelineError::ImageGeneration { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn synthesis_error_carries_index() {
        let err = PipelineError::synthesis(1, anyhow!("boom"));
        assert_eq!(err.segment_index(), Some(1));
        assert!(err.is_external());
        assert_eq!(
            err.to_string(),
            "speech synthesis failed at segment 1: boom"
        );
    }

    #[test]
    fn empty_input_is_not_external() {
        let err = PipelineError::EmptyInput {
            operation: "speech",
        };
        assert!(!err.is_external());
        assert_eq!(err.segment_index(), None);
    }
}
