use std::io::{self, BufRead, IsTerminal, Read};
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use text_to_media_rust::{AggregateMode, AudioOutput, Config, DefaultPipeline, TextDraft};

#[derive(Parser, Debug)]
#[command(
    name = "text-to-media-rust",
    version,
    about = "Extract text from images, then read it aloud or illustrate it"
)]
struct Cli {
    /// Image to OCR (repeatable, processed in order)
    #[arg(short = 'i', long = "image")]
    images: Vec<String>,

    /// Text to use instead of the OCR result (stdin is read when piped)
    #[arg(short = 't', long = "text")]
    text: Option<String>,

    /// Synthesize speech for the current text
    #[arg(short = 's', long = "speech")]
    speech: bool,

    /// Generate an illustration for the current text
    #[arg(short = 'g', long = "illustrate")]
    illustrate: bool,

    /// Directory for audio and image files (default: settings [output] dir)
    #[arg(short = 'o', long = "out-dir")]
    out_dir: Option<String>,

    /// File name stem for outputs (default: speech-<UTC timestamp>)
    #[arg(long = "stem")]
    stem: Option<String>,

    /// Also write all audio segments concatenated into one file
    #[arg(long = "join")]
    join: bool,

    /// Download or decode the generated image into the output directory
    #[arg(long = "save-image")]
    save_image: bool,

    /// Maximum characters per speech request
    #[arg(long = "max-chunk")]
    max_chunk: Option<usize>,

    /// Voice name (e.g. cmn-TW-Wavenet-A)
    #[arg(long = "voice")]
    voice: Option<String>,

    /// Speech language code (e.g. cmn-TW)
    #[arg(long = "language-code")]
    language_code: Option<String>,

    /// Vision feature (TEXT_DETECTION or DOCUMENT_TEXT_DETECTION)
    #[arg(long = "feature")]
    feature: Option<String>,

    /// Google Cloud API key (overrides GOOGLE_API_KEY)
    #[arg(long = "google-key")]
    google_key: Option<String>,

    /// OpenAI API key (overrides OPENAI_API_KEY)
    #[arg(long = "openai-key")]
    openai_key: Option<String>,

    /// Read extra settings from a local TOML file
    #[arg(short = 'r', long = "read-settings")]
    read_settings: Option<String>,

    /// Start the HTTP server on the given address (e.g. 127.0.0.1:8080)
    #[arg(long = "serve")]
    serve: Option<String>,

    /// Enable verbose logging
    #[arg(long = "verbose")]
    verbose: bool,

    /// Interactive mode
    #[arg(long = "interactive")]
    interactive: bool,
}

impl Cli {
    fn config(&self) -> Config {
        Config {
            text: self.text.clone(),
            images: self.images.clone(),
            speech: self.speech,
            illustrate: self.illustrate,
            out_dir: self.out_dir.clone(),
            stem: self.stem.clone(),
            join: self.join,
            save_image: self.save_image,
            max_chunk: self.max_chunk,
            voice: self.voice.clone(),
            language_code: self.language_code.clone(),
            feature: self.feature.clone(),
            google_key: self.google_key.clone(),
            openai_key: self.openai_key.clone(),
            settings_path: self.read_settings.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    text_to_media_rust::logging::init(cli.verbose)?;
    let config = cli.config();

    if let Some(addr) = cli.serve.clone() {
        let settings = text_to_media_rust::resolve_settings(&config)?;
        let pipeline = text_to_media_rust::build_pipeline(&config, &settings);
        return text_to_media_rust::server::run_server(settings, pipeline, addr).await;
    }
    if cli.interactive {
        return run_interactive(config).await;
    }

    let input = if cli.text.is_none() && !io::stdin().is_terminal() {
        let mut buffer = Vec::new();
        io::stdin().read_to_end(&mut buffer)?;
        let text = String::from_utf8(buffer).map_err(|_| anyhow!("stdin must be UTF-8 text"))?;
        Some(text).filter(|value| !value.trim().is_empty())
    } else {
        None
    };

    let output = text_to_media_rust::run(config, input).await?;
    println!("{}", output);
    Ok(())
}

struct InteractiveState {
    config: Config,
    settings: text_to_media_rust::settings::Settings,
    pipeline: DefaultPipeline,
    draft: TextDraft,
}

impl InteractiveState {
    fn new(config: Config) -> Result<Self> {
        let settings = text_to_media_rust::resolve_settings(&config)?;
        let pipeline = text_to_media_rust::build_pipeline(&config, &settings);
        Ok(Self {
            config,
            settings,
            pipeline,
            draft: TextDraft::new(),
        })
    }

    fn stem(&self) -> String {
        self.config
            .stem
            .clone()
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(text_to_media_rust::paths::default_stem)
    }
}

async fn run_interactive(config: Config) -> Result<()> {
    use std::io::Write;

    let mut state = InteractiveState::new(config)?;
    println!("Interactive mode. Use /quit or /exit to finish.");
    println!("Type /help to see available commands.");

    let mut line = String::new();
    let stdin = io::stdin();
    let mut stdin_lock = stdin.lock();
    loop {
        line.clear();
        print!("> ");
        io::stdout().flush()?;
        if stdin_lock.read_line(&mut line)? == 0 {
            break;
        }
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if input.starts_with('/') {
            match handle_interactive_command(input, &mut state).await {
                Ok(true) => break,
                Ok(false) => {}
                Err(err) => eprintln!("error: {:#}", err),
            }
            continue;
        }

        state.draft.edit(input);
        println!("text updated ({} chars)", state.draft.current().chars().count());
    }
    Ok(())
}

async fn handle_interactive_command(input: &str, state: &mut InteractiveState) -> Result<bool> {
    let (command, arg) = split_command(input);
    match command {
        "/quit" | "/exit" => return Ok(true),
        "/help" => print_interactive_help(),
        "/show" => {
            if state.draft.current().is_empty() {
                println!("(empty)");
            } else {
                println!("{}", state.draft.current());
            }
        }
        "/clear" => {
            state.draft.clear();
            println!("text cleared");
        }
        "/speech" => {
            let output = AudioOutput::new(&state.settings.output_dir, state.stem());
            let segments = state
                .pipeline
                .synthesize_all(state.draft.current(), &output)
                .await?;
            for segment in &segments {
                println!("audio: {}", segment.path.display());
            }
        }
        "/illustrate" => {
            let image = state.pipeline.generate_image(state.draft.current()).await?;
            for line in text_to_media_rust::describe_image(&image) {
                println!("{}", line);
            }
        }
        "/image" => extract_into_draft(arg, AggregateMode::Replace, state).await?,
        "/append" => extract_into_draft(arg, AggregateMode::Append, state).await?,
        "/stem" => {
            if arg.is_empty() {
                println!("stem: {}", state.config.stem.as_deref().unwrap_or("(timestamp)"));
            } else {
                state.config.stem = Some(arg.to_string());
                println!("stem set to {}", arg);
            }
        }
        _ => eprintln!("unknown command: {}", command),
    }
    Ok(false)
}

/// Splits `/command rest of line` at the first whitespace.
fn split_command(input: &str) -> (&str, &str) {
    let trimmed = input.trim();
    match trimmed.split_once(char::is_whitespace) {
        Some((command, arg)) => (command, arg.trim()),
        None => (trimmed, ""),
    }
}

async fn extract_into_draft(
    arg: &str,
    mode: AggregateMode,
    state: &mut InteractiveState,
) -> Result<()> {
    let paths = arg.split_whitespace().collect::<Vec<_>>();
    if paths.is_empty() {
        return Err(anyhow!("expected one or more image paths"));
    }
    let images = paths
        .iter()
        .map(|path| text_to_media_rust::data::load_image(Path::new(path)))
        .collect::<Result<Vec<_>>>()?;
    let texts = state
        .pipeline
        .extract_all(images)
        .await
        .with_context(|| "text extraction failed")?;
    state.draft.apply_batch(&texts, mode);
    println!("{}", state.draft.current());
    Ok(())
}

fn print_interactive_help() {
    println!("Commands:");
    println!("  /quit, /exit                 Exit interactive mode");
    println!("  /image <path>...             OCR images and replace the text");
    println!("  /append <path>...            OCR images and append to the text");
    println!("  /show                        Show the current text");
    println!("  /clear                       Clear the current text");
    println!("  /speech                      Synthesize speech for the text");
    println!("  /illustrate                  Generate an illustration for the text");
    println!("  /stem <name>                 Set the output file stem");
    println!("  <any other line>             Replace the text with the line");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_is_the_first_token() {
        assert_eq!(split_command("/image a.png  b.png"), ("/image", "a.png  b.png"));
        assert_eq!(split_command("  /show  "), ("/show", ""));
        assert_eq!(split_command("/append\tscan.jpg"), ("/append", "scan.jpg"));
    }

    #[test]
    fn glued_suffix_is_not_a_known_command() {
        assert_eq!(split_command("/imagefoo.png"), ("/imagefoo.png", ""));
        assert_eq!(split_command("/appendix x.png").0, "/appendix");
    }
}
