use anyhow::{Context, Result, anyhow};
use std::path::Path;

pub const PNG_MIME: &str = "image/png";
pub const JPEG_MIME: &str = "image/jpeg";
pub const MP3_MIME: &str = "audio/mpeg";
pub const WAV_MIME: &str = "audio/wav";
pub const OGG_MIME: &str = "audio/ogg";

/// An image handed to the OCR service. Never persisted.
#[derive(Debug, Clone)]
pub struct RawImage {
    pub bytes: Vec<u8>,
    pub mime: String,
    pub name: Option<String>,
}

impl RawImage {
    pub fn new(bytes: Vec<u8>, mime: impl Into<String>) -> Self {
        Self {
            bytes,
            mime: mime.into(),
            name: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Name used in logs and error messages.
    pub fn label(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("<{} bytes {}>", self.bytes.len(), self.mime))
    }
}

pub fn load_image(path: &Path) -> Result<RawImage> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("failed to read image file: {}", path.display()))?;
    let name = path
        .file_name()
        .and_then(|value| value.to_str())
        .map(|value| value.to_string())
        .unwrap_or_else(|| path.display().to_string());
    load_image_from_bytes(bytes, None, Some(&name))
}

pub fn load_image_from_bytes(
    bytes: Vec<u8>,
    mime_hint: Option<&str>,
    name: Option<&str>,
) -> Result<RawImage> {
    if bytes.is_empty() {
        return Err(anyhow!(
            "image '{}' is empty",
            name.unwrap_or("<unnamed>")
        ));
    }
    let mime = resolve_image_mime(mime_hint, &bytes, name)?;
    Ok(RawImage {
        bytes,
        mime,
        name: name.map(|value| value.to_string()),
    })
}

fn resolve_image_mime(hint: Option<&str>, bytes: &[u8], name: Option<&str>) -> Result<String> {
    if let Some(hint) = hint.map(str::trim).filter(|value| !value.is_empty()) {
        let lower = hint.to_lowercase();
        if lower != "auto" {
            if !lower.starts_with("image/") {
                return Err(anyhow!("content type '{}' is not an image", hint));
            }
            return Ok(lower);
        }
    }

    if let Some(kind) = infer::get(bytes) {
        let detected = kind.mime_type();
        if detected.starts_with("image/") {
            return Ok(detected.to_string());
        }
        return Err(anyhow!(
            "'{}' is not an image (detected '{}')",
            name.unwrap_or("<unnamed>"),
            detected
        ));
    }

    let ext = name
        .and_then(|value| Path::new(value).extension())
        .and_then(|value| value.to_str())
        .map(|value| value.to_lowercase());
    if let Some(mime) = ext.as_deref().and_then(mime_from_extension) {
        return Ok(mime.to_string());
    }

    Err(anyhow!(
        "unable to detect image type for '{}'",
        name.unwrap_or("<unnamed>")
    ))
}

fn mime_from_extension(ext: &str) -> Option<&'static str> {
    match ext {
        "png" => Some(PNG_MIME),
        "jpg" | "jpeg" => Some(JPEG_MIME),
        "webp" => Some("image/webp"),
        "gif" => Some("image/gif"),
        "bmp" => Some("image/bmp"),
        "tiff" | "tif" => Some("image/tiff"),
        "heic" => Some("image/heic"),
        _ => None,
    }
}

/// Maps a Text-to-Speech `audioEncoding` to the MIME type and file extension
/// of the bytes it produces.
pub fn audio_format(encoding: &str) -> (&'static str, &'static str) {
    match encoding.to_ascii_uppercase().as_str() {
        "LINEAR16" => (WAV_MIME, "wav"),
        "OGG_OPUS" => (OGG_MIME, "ogg"),
        _ => (MP3_MIME, "mp3"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_HEADER: &[u8] = &[
        0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0x0D, b'I', b'H', b'D', b'R',
    ];

    #[test]
    fn sniffs_png_from_bytes() {
        let image = load_image_from_bytes(PNG_HEADER.to_vec(), None, Some("甲文字.png")).unwrap();
        assert_eq!(image.mime, PNG_MIME);
        assert_eq!(image.name.as_deref(), Some("甲文字.png"));
    }

    #[test]
    fn falls_back_to_extension_when_bytes_are_unknown() {
        let image = load_image_from_bytes(vec![1, 2, 3], None, Some("scan.JPG")).unwrap();
        assert_eq!(image.mime, JPEG_MIME);
    }

    #[test]
    fn rejects_non_image_hint() {
        let err = load_image_from_bytes(vec![1, 2, 3], Some("application/pdf"), None).unwrap_err();
        assert!(err.to_string().contains("not an image"));
    }

    #[test]
    fn rejects_empty_bytes() {
        assert!(load_image_from_bytes(Vec::new(), None, Some("a.png")).is_err());
    }

    #[test]
    fn audio_format_defaults_to_mp3() {
        assert_eq!(audio_format("MP3"), (MP3_MIME, "mp3"));
        assert_eq!(audio_format("linear16"), (WAV_MIME, "wav"));
        assert_eq!(audio_format("unknown"), (MP3_MIME, "mp3"));
    }
}
