use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub(crate) struct ImagePayload {
    pub(crate) data_base64: String,
    #[serde(default)]
    pub(crate) mime: Option<String>,
    #[serde(default)]
    pub(crate) name: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub(crate) struct ExtractRequest {
    pub(crate) images: Vec<ImagePayload>,
    /// `replace` (default) or `append`.
    pub(crate) mode: Option<String>,
    /// Text currently shown to the user; only used by `append`.
    pub(crate) current_text: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ExtractResponse {
    pub(crate) text: String,
    pub(crate) texts: Vec<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub(crate) struct SpeechRequest {
    pub(crate) text: String,
    /// Also return all segments concatenated.
    pub(crate) join: Option<bool>,
}

#[derive(Debug, Serialize)]
pub(crate) struct SpeechResponse {
    pub(crate) segments: Vec<SpeechSegment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) joined_base64: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct SpeechSegment {
    pub(crate) index: usize,
    pub(crate) text: String,
    pub(crate) mime: String,
    pub(crate) data_base64: String,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub(crate) struct ImageGenerationRequest {
    pub(crate) text: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct ImageGenerationResponse {
    pub(crate) prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) data_base64: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) revised_prompt: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ErrorResponse {
    pub(crate) error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) segment_index: Option<usize>,
}
