use anyhow::{Context, Result, anyhow};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use std::fs;
use std::path::Path;
use tracing::info;

use crate::providers::{GeneratedImage, ImageReference};

/// Stores a generated image at `path`, downloading it when the service
/// returned a URL.
pub async fn save_generated_image(image: &GeneratedImage, path: &Path) -> Result<()> {
    let bytes = match &image.reference {
        ImageReference::Url(url) => download(url).await?,
        ImageReference::Base64(data) => BASE64
            .decode(data.as_bytes())
            .with_context(|| "failed to decode generated image")?,
    };
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory: {}", parent.display()))?;
    }
    fs::write(path, &bytes)
        .with_context(|| format!("failed to write image: {}", path.display()))?;
    info!("image: saved {} bytes to {}", bytes.len(), path.display());
    Ok(())
}

async fn download(url: &str) -> Result<Vec<u8>> {
    let response = reqwest::get(url)
        .await
        .with_context(|| format!("failed to download image: {}", url))?;
    let status = response.status();
    if !status.is_success() {
        return Err(anyhow!("image download failed ({}): {}", status, url));
    }
    let bytes = response
        .bytes()
        .await
        .with_context(|| "failed to read image body")?;
    Ok(bytes.to_vec())
}
