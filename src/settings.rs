use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use std::fs;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use crate::paths;
use crate::providers::VoiceSelection;

const DEFAULT_SETTINGS_TOML: &str = include_str!("../settings.toml");

#[derive(Debug, Clone)]
pub struct Settings {
    pub language_code: String,
    pub voice: String,
    pub gender: String,
    pub encoding: String,
    pub max_chunk: NonZeroUsize,
    pub vision_feature: String,
    pub image_model: String,
    pub image_size: String,
    pub image_quality: String,
    pub output_dir: PathBuf,
    pub server_tmp_dir: Option<PathBuf>,
    /// Request body limit for the HTTP server. Images arrive base64 in JSON.
    pub server_max_body_mb: NonZeroUsize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            language_code: "cmn-TW".to_string(),
            voice: "cmn-TW-Wavenet-A".to_string(),
            gender: "NEUTRAL".to_string(),
            encoding: "MP3".to_string(),
            max_chunk: NonZeroUsize::new(1500).unwrap_or(NonZeroUsize::MIN),
            vision_feature: "TEXT_DETECTION".to_string(),
            image_model: "dall-e-3".to_string(),
            image_size: "1024x1024".to_string(),
            image_quality: "standard".to_string(),
            output_dir: PathBuf::from("."),
            server_tmp_dir: None,
            server_max_body_mb: NonZeroUsize::new(20).unwrap_or(NonZeroUsize::MIN),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct SettingsFile {
    speech: Option<SpeechSettings>,
    vision: Option<VisionSettings>,
    image: Option<ImageSettings>,
    output: Option<OutputSettings>,
    server: Option<ServerSettings>,
}

#[derive(Debug, Default, Deserialize)]
struct SpeechSettings {
    language_code: Option<String>,
    voice: Option<String>,
    gender: Option<String>,
    encoding: Option<String>,
    max_chunk: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct VisionSettings {
    feature: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ImageSettings {
    model: Option<String>,
    size: Option<String>,
    quality: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct OutputSettings {
    dir: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerSettings {
    tmp_dir: Option<String>,
    max_body_mb: Option<usize>,
}

/// Loads the embedded defaults, then every settings file that exists, later
/// files overriding earlier ones. `extra_path` must exist when given.
pub fn load_settings(extra_path: Option<&Path>) -> Result<Settings> {
    let mut settings = Settings::default();
    let defaults: SettingsFile =
        toml::from_str(DEFAULT_SETTINGS_TOML).with_context(|| "failed to parse default settings")?;
    settings
        .merge(defaults)
        .with_context(|| "invalid default settings")?;

    let mut ordered_paths = vec![
        PathBuf::from("settings.toml"),
        PathBuf::from("settings.local.toml"),
    ];
    if let Some(dir) = paths::settings_dir() {
        ordered_paths.push(dir.join("settings.toml"));
        ordered_paths.push(dir.join("settings.local.toml"));
    }
    if let Some(extra) = extra_path {
        if !extra.exists() {
            return Err(anyhow!("settings file not found: {}", extra.display()));
        }
        ordered_paths.push(extra.to_path_buf());
    }

    for path in ordered_paths {
        if path.exists() {
            settings.merge_file(&path)?;
        }
    }
    Ok(settings)
}

impl Settings {
    pub fn voice_selection(&self) -> VoiceSelection {
        VoiceSelection {
            language_code: self.language_code.clone(),
            name: self.voice.clone(),
            gender: self.gender.clone(),
            encoding: self.encoding.clone(),
        }
    }

    fn merge_file(&mut self, path: &Path) -> Result<()> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read settings: {}", path.display()))?;
        let parsed: SettingsFile = toml::from_str(&content)
            .with_context(|| format!("failed to parse settings: {}", path.display()))?;
        self.merge(parsed)
            .with_context(|| format!("invalid settings: {}", path.display()))
    }

    fn merge(&mut self, incoming: SettingsFile) -> Result<()> {
        if let Some(speech) = incoming.speech {
            merge_text(&mut self.language_code, speech.language_code);
            merge_text(&mut self.voice, speech.voice);
            merge_text(&mut self.gender, speech.gender.map(|v| v.to_ascii_uppercase()));
            merge_text(&mut self.encoding, speech.encoding.map(|v| v.to_ascii_uppercase()));
            if let Some(max_chunk) = speech.max_chunk {
                self.max_chunk = NonZeroUsize::new(max_chunk)
                    .ok_or_else(|| anyhow!("speech.max_chunk must be greater than zero"))?;
            }
        }
        if let Some(vision) = incoming.vision {
            merge_text(
                &mut self.vision_feature,
                vision.feature.map(|v| v.to_ascii_uppercase()),
            );
        }
        if let Some(image) = incoming.image {
            merge_text(&mut self.image_model, image.model);
            merge_text(&mut self.image_size, image.size);
            merge_text(&mut self.image_quality, image.quality);
        }
        if let Some(output) = incoming.output
            && let Some(dir) = output.dir
            && !dir.trim().is_empty()
        {
            self.output_dir = paths::expand_path(&dir);
        }
        if let Some(server) = incoming.server {
            if let Some(dir) = server.tmp_dir
                && !dir.trim().is_empty()
            {
                self.server_tmp_dir = Some(paths::expand_path(&dir));
            }
            if let Some(max_body_mb) = server.max_body_mb {
                self.server_max_body_mb = NonZeroUsize::new(max_body_mb)
                    .ok_or_else(|| anyhow!("server.max_body_mb must be greater than zero"))?;
            }
        }
        Ok(())
    }
}

fn merge_text(target: &mut String, value: Option<String>) {
    if let Some(value) = value {
        let value = value.trim();
        if !value.is_empty() {
            *target = value.to_string();
        }
    }
}
