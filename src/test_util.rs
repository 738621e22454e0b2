#![cfg(test)]

use anyhow::anyhow;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::data::RawImage;
use crate::providers::{
    GeneratedImage, ImageProvider, ImageReference, ImageRequest, OcrOutcome, OcrProvider,
    ProviderFuture, SpeechProvider, VoiceSelection,
};

/// OCR double keyed by image name. Unknown names fail like a transport error.
#[derive(Clone, Default)]
pub(crate) struct FakeOcr {
    outcomes: HashMap<String, OcrOutcome>,
    pub(crate) calls: Arc<Mutex<Vec<String>>>,
}

impl FakeOcr {
    pub(crate) fn with_text(mut self, name: &str, text: &str) -> Self {
        self.outcomes
            .insert(name.to_string(), OcrOutcome::Text(text.to_string()));
        self
    }

    pub(crate) fn with_empty(mut self, name: &str) -> Self {
        self.outcomes.insert(name.to_string(), OcrOutcome::Empty);
        self
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("calls lock").clone()
    }
}

impl OcrProvider for FakeOcr {
    fn detect_text(self, image: RawImage) -> ProviderFuture<OcrOutcome> {
        Box::pin(async move {
            let name = image.name.clone().unwrap_or_default();
            self.calls.lock().expect("calls lock").push(name.clone());
            self.outcomes
                .get(&name)
                .cloned()
                .ok_or_else(|| anyhow!("Vision API error (503 Service Unavailable): {}", name))
        })
    }
}

/// Speech double that returns `AUDIO:<text>` bytes and can fail at one index.
#[derive(Clone, Default)]
pub(crate) struct FakeSpeech {
    fail_at: Option<usize>,
    pub(crate) calls: Arc<Mutex<Vec<String>>>,
}

impl FakeSpeech {
    pub(crate) fn failing_at(index: usize) -> Self {
        Self {
            fail_at: Some(index),
            calls: Arc::default(),
        }
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("calls lock").clone()
    }
}

impl SpeechProvider for FakeSpeech {
    fn synthesize(self, text: String, _voice: VoiceSelection) -> ProviderFuture<Vec<u8>> {
        Box::pin(async move {
            let index = {
                let mut calls = self.calls.lock().expect("calls lock");
                calls.push(text.clone());
                calls.len() - 1
            };
            if self.fail_at == Some(index) {
                return Err(anyhow!("Text-to-Speech API error (500 Internal Server Error)"));
            }
            Ok(format!("AUDIO:{}", text).into_bytes())
        })
    }
}

#[derive(Clone, Default)]
pub(crate) struct FakeImages {
    pub(crate) prompts: Arc<Mutex<Vec<String>>>,
}

impl FakeImages {
    pub(crate) fn prompts(&self) -> Vec<String> {
        self.prompts.lock().expect("prompts lock").clone()
    }
}

impl ImageProvider for FakeImages {
    fn generate(self, request: ImageRequest) -> ProviderFuture<GeneratedImage> {
        Box::pin(async move {
            self.prompts
                .lock()
                .expect("prompts lock")
                .push(request.prompt.clone());
            Ok(GeneratedImage {
                reference: ImageReference::Url("https://images.example.com/1.png".to_string()),
                revised_prompt: None,
            })
        })
    }
}

pub(crate) fn named_image(name: &str) -> RawImage {
    RawImage::new(vec![0x89, b'P', b'N', b'G'], "image/png").with_name(name)
}

pub(crate) fn voice() -> VoiceSelection {
    VoiceSelection {
        language_code: "cmn-TW".to_string(),
        name: "cmn-TW-Wavenet-A".to_string(),
        gender: "NEUTRAL".to_string(),
        encoding: "MP3".to_string(),
    }
}
