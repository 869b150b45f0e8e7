//! sanad: command-line front end for the gateway.
//!
//! Runs one gateway operation and prints the result (JSON for structured
//! operations). Credentials come from `SANAD_API_KEYS` or
//! `~/.sanad/secrets.toml`.

use std::io::{self, IsTerminal, Read};
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand, ValueEnum};
use sanad::config::{Config, Secrets};
use sanad::{Difficulty, Gateway, QuizOptions, Sanad, SanadError};

/// Sanad AI request gateway
#[derive(Parser)]
#[command(name = "sanad")]
#[command(version = sanad::PKG_VERSION)]
#[command(about = "Query the AI request gateway from the command line")]
struct Args {
    /// Path to configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Ask a free-form scholarly question
    Ask {
        /// Topic, e.g. "fiqh" or "tafsir"
        topic: String,
        /// Question (or omit to read from stdin)
        prompt: Option<String>,
    },

    /// Generate structured JSON
    Json {
        /// Prompt (or omit to read from stdin)
        prompt: Option<String>,
        /// System instruction
        #[arg(short, long)]
        system: Option<String>,
    },

    /// Translate a passage with commentary
    Translate {
        /// Text (or omit to read from stdin)
        text: Option<String>,
    },

    /// Extract text from an image
    Ocr {
        /// Image file
        image: PathBuf,
        /// MIME type (default: guessed from the extension)
        #[arg(long)]
        mime: Option<String>,
    },

    /// Generate a multiple-choice quiz
    Quiz {
        topic: String,
        #[arg(short = 'n', long, default_value_t = 5)]
        count: usize,
        #[arg(short, long, value_enum, default_value_t = Level::Medium)]
        difficulty: Level,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Level {
    Easy,
    Medium,
    Hard,
}

impl From<Level> for Difficulty {
    fn from(level: Level) -> Self {
        match level {
            Level::Easy => Difficulty::Easy,
            Level::Medium => Difficulty::Medium,
            Level::Hard => Difficulty::Hard,
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialise tracing (default: warn for CLI; override with RUST_LOG).
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let args = Args::parse();
    let gateway = build_gateway(args.config.as_deref())?;

    let outcome = run(&gateway, args.command).await;
    if let Err(SanadError::Parse { span, .. }) = &outcome {
        tracing::debug!(%span, "unparseable model output");
    }
    if let Err(e) = outcome {
        eprintln!("{}", e.user_message());
        return Err(e.into());
    }
    Ok(())
}

fn build_gateway(config_path: Option<&Path>) -> Result<Gateway, SanadError> {
    let config = Config::load(config_path)?;
    let secrets = Secrets::load()?;

    let mut builder = config.apply(Sanad::builder());
    if let Some(keys) = secrets.api_keys() {
        builder = builder.api_keys(keys);
    }
    builder.build()
}

async fn run(gateway: &Gateway, command: Command) -> Result<(), SanadError> {
    match command {
        Command::Ask { topic, prompt } => {
            let prompt = resolve_text(prompt, "ask")?;
            println!("{}", gateway.ask_open_query(&topic, &prompt).await?);
        }
        Command::Json { prompt, system } => {
            let prompt = resolve_text(prompt, "json")?;
            let value = gateway
                .generate_structured(&prompt, system.as_deref())
                .await?;
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        Command::Translate { text } => {
            let text = resolve_text(text, "translate")?;
            let record = gateway.translate(&text).await?;
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
        Command::Ocr { image, mime } => {
            let bytes = std::fs::read(&image).map_err(|e| {
                SanadError::InvalidInput(format!("cannot read {}: {e}", image.display()))
            })?;
            let mime = match mime {
                Some(mime) => mime,
                None => guess_mime(&image)?.to_string(),
            };
            println!("{}", gateway.extract_text_from_image(bytes, &mime).await?);
        }
        Command::Quiz {
            topic,
            count,
            difficulty,
        } => {
            let options = QuizOptions::new().count(count).difficulty(difficulty.into());
            let questions = gateway.generate_quiz(&topic, &options).await?;
            println!("{}", serde_json::to_string_pretty(&questions)?);
        }
    }
    Ok(())
}

/// Resolve text input from an optional CLI argument and/or stdin.
///
/// - arg only → arg
/// - stdin only → stdin
/// - both → `"{arg}\n\n{stdin}"`
/// - neither → error
fn resolve_text(arg: Option<String>, command: &str) -> Result<String, SanadError> {
    let stdin_text = if io::stdin().is_terminal() {
        None
    } else {
        let mut buf = String::new();
        io::stdin()
            .read_to_string(&mut buf)
            .map_err(|e| SanadError::InvalidInput(format!("{command}: reading stdin: {e}")))?;
        let trimmed = buf.trim().to_string();
        (!trimmed.is_empty()).then_some(trimmed)
    };

    match (arg, stdin_text) {
        (Some(a), Some(s)) => Ok(format!("{a}\n\n{s}")),
        (Some(a), None) => Ok(a),
        (None, Some(s)) => Ok(s),
        (None, None) => Err(SanadError::InvalidInput(format!(
            "{command}: no input provided (pass text as argument or via stdin)"
        ))),
    }
}

fn guess_mime(path: &Path) -> Result<&'static str, SanadError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("png") => Ok("image/png"),
        Some("jpg" | "jpeg") => Ok("image/jpeg"),
        Some("webp") => Ok("image/webp"),
        Some("heic") => Ok("image/heic"),
        Some("heif") => Ok("image/heif"),
        _ => Err(SanadError::InvalidInput(format!(
            "cannot guess MIME type of {}; pass --mime",
            path.display()
        ))),
    }
}
