use std::path::PathBuf;

use crate::pipeline::Pipeline;
use crate::providers::{ImageProvider, OcrProvider, SpeechProvider};
use crate::settings;

pub(crate) struct ServerState<O: OcrProvider, S: SpeechProvider, I: ImageProvider> {
    pub(crate) settings: settings::Settings,
    pub(crate) pipeline: Pipeline<O, S, I>,
    pub(crate) tmp_dir: PathBuf,
}
