use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::data;
use crate::error::PipelineError;
use crate::providers::{SpeechProvider, VoiceSelection};

/// Where synthesized audio is written. Supplied by the caller on every call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioOutput {
    pub dir: PathBuf,
    pub stem: String,
}

impl AudioOutput {
    pub fn new(dir: impl Into<PathBuf>, stem: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            stem: stem.into(),
        }
    }

    pub fn segment_path(&self, index: usize, ext: &str) -> PathBuf {
        self.dir.join(format!("{}-{:03}.{}", self.stem, index, ext))
    }

    pub fn joined_path(&self, ext: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", self.stem, ext))
    }
}

#[derive(Debug, Clone)]
pub struct AudioSegment {
    pub index: usize,
    pub text: String,
    pub mime: String,
    pub path: PathBuf,
    pub bytes: Vec<u8>,
}

/// Drives text segments through the speech service one at a time.
#[derive(Debug, Clone)]
pub struct SpeechSynthesizer<P: SpeechProvider> {
    provider: P,
    voice: VoiceSelection,
}

impl<P: SpeechProvider> SpeechSynthesizer<P> {
    pub fn new(provider: P, voice: VoiceSelection) -> Self {
        Self { provider, voice }
    }

    pub fn voice(&self) -> &VoiceSelection {
        &self.voice
    }

    /// Synthesizes `segments` in order and writes each result under `output`.
    ///
    /// The first failing call stops the run with
    /// [`PipelineError::Synthesis`]; files already written by this call are
    /// removed so no partial result is left behind. Segment files left in the
    /// directory by an earlier run with the same stem are removed first.
    pub async fn synthesize(
        &self,
        segments: &[&str],
        output: &AudioOutput,
    ) -> Result<Vec<AudioSegment>, PipelineError> {
        if segments.is_empty() {
            return Ok(Vec::new());
        }
        fs::create_dir_all(&output.dir).map_err(|source| PipelineError::Output {
            path: output.dir.clone(),
            source,
        })?;

        let (mime, ext) = data::audio_format(&self.voice.encoding);
        remove_stale_segments(output, ext);
        let mut produced: Vec<AudioSegment> = Vec::with_capacity(segments.len());
        for (index, segment) in segments.iter().enumerate() {
            debug!(
                "speech: segment {}/{} ({} chars)",
                index + 1,
                segments.len(),
                segment.chars().count()
            );
            let bytes = match self
                .provider
                .clone()
                .synthesize(segment.to_string(), self.voice.clone())
                .await
            {
                Ok(bytes) => bytes,
                Err(err) => {
                    discard(&produced);
                    return Err(PipelineError::synthesis(index, err));
                }
            };

            let path = output.segment_path(index, ext);
            if let Err(source) = fs::write(&path, &bytes) {
                let _ = fs::remove_file(&path);
                discard(&produced);
                return Err(PipelineError::Output { path, source });
            }
            produced.push(AudioSegment {
                index,
                text: segment.to_string(),
                mime: mime.to_string(),
                path,
                bytes,
            });
        }

        info!(
            "speech: wrote {} segment(s) to {}",
            produced.len(),
            output.dir.display()
        );
        Ok(produced)
    }
}

/// Writes all segments back to back into one file.
///
/// MP3 and OGG streams stay playable when concatenated; LINEAR16 output gets
/// one WAV header per segment, which most players tolerate but do not require.
pub fn join_segments(segments: &[AudioSegment], path: &Path) -> Result<(), PipelineError> {
    fs::write(path, joined_bytes(segments)).map_err(|source| PipelineError::Output {
        path: path.to_path_buf(),
        source,
    })
}

pub fn joined_bytes(segments: &[AudioSegment]) -> Vec<u8> {
    let total = segments.iter().map(|segment| segment.bytes.len()).sum();
    let mut joined = Vec::with_capacity(total);
    for segment in segments {
        joined.extend_from_slice(&segment.bytes);
    }
    joined
}

/// Removes `{stem}-NNN.{ext}` files, so a shorter run does not sit next to
/// the tail of a longer earlier one.
fn remove_stale_segments(output: &AudioOutput, ext: &str) {
    let Ok(entries) = fs::read_dir(&output.dir) else {
        return;
    };
    let prefix = format!("{}-", output.stem);
    let suffix = format!(".{}", ext);
    for entry in entries.flatten() {
        if !entry.file_type().map(|kind| kind.is_file()).unwrap_or(false) {
            continue;
        }
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        let is_segment = name
            .strip_prefix(&prefix)
            .and_then(|rest| rest.strip_suffix(&suffix))
            .is_some_and(|index| {
                index.len() >= 3 && index.chars().all(|c| c.is_ascii_digit())
            });
        if !is_segment {
            continue;
        }
        match fs::remove_file(entry.path()) {
            Ok(()) => debug!("speech: removed stale segment {}", name),
            Err(err) => warn!("speech: failed to remove stale segment {}: {}", name, err),
        }
    }
}

fn discard(segments: &[AudioSegment]) {
    for segment in segments {
        if let Err(err) = fs::remove_file(&segment.path) {
            warn!(
                "speech: failed to remove partial output {}: {}",
                segment.path.display(),
                err
            );
        }
    }
}
