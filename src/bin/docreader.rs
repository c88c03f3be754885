//! CLI binary for doc-reader.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `ReaderConfig`, runs one request through the pipeline, and prints the
//! normalized JSON response the way an HTTP layer would return it.

use anyhow::{Context, Result};
use clap::Parser;
use doc_reader::{
    DocumentReader, EnhancementPolicy, ExtractionRequest, OcrEngineKind, ReaderConfig,
    ReaderSettings,
};
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

const AFTER_HELP: &str = r#"EXAMPLES:
  # Text and confidence only (no API key needed for born-digital PDFs)
  docreader invoice.pdf

  # Per-region bounding boxes and confidences
  docreader --layout invoice.pdf

  # Instruction-guided extraction
  docreader invoice.pdf --instruction "Return the invoice number and total as JSON"

  # Instruction from a file, specific model
  docreader --provider anthropic --model claude-sonnet-4-20250514 \
            --instruction-file prompt.txt contract.pdf

  # Apply a settings file (flat or {"settings": {...}})
  docreader --config settings.json scan.pdf

OUTPUT:
  One JSON object on stdout. "success" is false on failure, together with
  "error" (validation | storage | ocr | ai | timeout) and "detail". The
  process exits with status 2 for client errors (HTTP 400/413) and 1 for
  server errors and timeouts.

ENVIRONMENT VARIABLES:
  ANTHROPIC_API_KEY       Anthropic API key
  OPENAI_API_KEY          OpenAI API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (anthropic, openai, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
  MAX_FILE_SIZE           Size ceiling in bytes (default 52428800)
  PDFIUM_LIB_PATH         Path to the pdfium shared library
  RUST_LOG                Tracing filter; overrides --verbose / --quiet
"#;

/// Read PDF documents and extract information from them with an LLM.
#[derive(Parser, Debug)]
#[command(
    name = "docreader",
    version,
    about = "Read PDF documents and extract information from them with an LLM",
    long_about = "Recognize the text of a PDF document (embedded text layer, with vision-model \
transcription for scanned pages) and optionally apply a free-form instruction to it with an LLM. \
Prints the normalized JSON response.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// PDF file to read.
    input: PathBuf,

    /// Instruction for the extraction stage.
    #[arg(short, long, env = "DOCREADER_INSTRUCTION", conflicts_with = "instruction_file")]
    instruction: Option<String>,

    /// Path to a text file containing the instruction.
    #[arg(long)]
    instruction_file: Option<PathBuf>,

    /// Return per-region bounding boxes and confidences.
    #[arg(long, conflicts_with_all = ["instruction", "instruction_file"])]
    layout: bool,

    /// JSON settings file overlaid on the defaults.
    #[arg(long, env = "DOCREADER_CONFIG")]
    config: Option<PathBuf>,

    /// OCR engine: auto, text-layer, vision.
    #[arg(long, env = "DOCREADER_ENGINE", value_enum)]
    engine: Option<EngineArg>,

    /// Language hint for recognition.
    #[arg(long, env = "DOCREADER_LANGUAGE")]
    language: Option<String>,

    /// Page preprocessing for image-based recognition: auto, off, grayscale.
    #[arg(long, env = "DOCREADER_ENHANCEMENT", value_enum)]
    enhancement: Option<EnhancementArg>,

    /// Size ceiling for the input, in bytes.
    #[arg(long, env = "MAX_FILE_SIZE")]
    max_file_size: Option<u64>,

    /// Minimum instruction length after trimming (0 only rejects blank).
    #[arg(long, env = "DOCREADER_MIN_INSTRUCTION")]
    min_instruction_chars: Option<usize>,

    /// LLM model ID (e.g. claude-sonnet-4-20250514, gpt-4.1-mini).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: anthropic, openai, gemini, ollama, azure.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// Path to a text file containing a custom extraction system prompt.
    #[arg(long, env = "DOCREADER_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,

    /// Max LLM output tokens.
    #[arg(long, env = "DOCREADER_MAX_TOKENS")]
    max_tokens: Option<usize>,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "DOCREADER_TEMPERATURE")]
    temperature: Option<f32>,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "DOCREADER_PASSWORD")]
    password: Option<String>,

    /// Directory for transient files.
    #[arg(long, env = "DOCREADER_TEMP_DIR")]
    temp_dir: Option<PathBuf>,

    /// Whole-request timeout in seconds.
    #[arg(long, env = "DOCREADER_TIMEOUT", default_value_t = 90)]
    timeout: u64,

    /// Pretty-print the JSON response.
    #[arg(long)]
    pretty: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "DOCREADER_VERBOSE")]
    verbose: bool,

    /// Suppress all logs except errors.
    #[arg(short, long, env = "DOCREADER_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum EngineArg {
    Auto,
    TextLayer,
    Vision,
}

impl From<EngineArg> for OcrEngineKind {
    fn from(v: EngineArg) -> Self {
        match v {
            EngineArg::Auto => OcrEngineKind::Auto,
            EngineArg::TextLayer => OcrEngineKind::TextLayer,
            EngineArg::Vision => OcrEngineKind::Vision,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum EnhancementArg {
    Auto,
    Off,
    Grayscale,
}

impl From<EnhancementArg> for EnhancementPolicy {
    fn from(v: EnhancementArg) -> Self {
        match v {
            EnhancementArg::Auto => EnhancementPolicy::Auto,
            EnhancementArg::Off => EnhancementPolicy::Off,
            EnhancementArg::Grayscale => EnhancementPolicy::Grayscale,
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Build reader ─────────────────────────────────────────────────────
    let config = build_config(&cli).await?;
    let reader = DocumentReader::from_config(config).context("Failed to initialise reader")?;

    // ── Build request ────────────────────────────────────────────────────
    let bytes = tokio::fs::read(&cli.input)
        .await
        .with_context(|| format!("Failed to read {:?}", cli.input))?;
    let filename = cli
        .input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let instruction = match (&cli.instruction, &cli.instruction_file) {
        (Some(text), _) => Some(text.clone()),
        (None, Some(path)) => Some(
            tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read instruction from {:?}", path))?,
        ),
        (None, None) => None,
    };

    let mut request = ExtractionRequest::new(filename, bytes);
    if let Some(instruction) = instruction {
        request = request.with_instruction(instruction);
    }
    if cli.layout {
        request = request.with_layout();
    }

    // ── Run ──────────────────────────────────────────────────────────────
    let outcome = reader
        .process_within(request, Duration::from_secs(cli.timeout))
        .await;

    let response = outcome.response();
    let json = if cli.pretty {
        serde_json::to_string_pretty(&response)
    } else {
        serde_json::to_string(&response)
    }
    .context("Failed to serialise response")?;
    println!("{json}");

    Ok(match outcome.status_code() {
        200 => ExitCode::SUCCESS,
        400..=499 => ExitCode::from(2),
        _ => ExitCode::FAILURE,
    })
}

/// Map CLI args (and an optional settings file) to `ReaderConfig`.
///
/// Precedence: explicit flag or env var, then the settings file, then the
/// library defaults.
async fn build_config(cli: &Cli) -> Result<ReaderConfig> {
    let mut builder = ReaderConfig::builder();

    if let Some(ref path) = cli.config {
        let settings = ReaderSettings::load(path)
            .with_context(|| format!("Failed to load settings from {:?}", path))?;
        builder = builder.settings(&settings);
    }

    if let Some(engine) = cli.engine {
        builder = builder.engine(engine.into());
    }
    if let Some(ref language) = cli.language {
        builder = builder.language(language);
    }
    if let Some(enhancement) = cli.enhancement {
        builder = builder.enhancement(enhancement.into());
    }
    if let Some(size) = cli.max_file_size {
        builder = builder.max_file_size(size);
    }
    if let Some(n) = cli.min_instruction_chars {
        builder = builder.min_instruction_chars(n);
    }
    if let Some(ref model) = cli.model {
        builder = builder.model(model);
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider);
    }
    if let Some(n) = cli.max_tokens {
        builder = builder.max_tokens(n);
    }
    if let Some(t) = cli.temperature {
        builder = builder.temperature(t);
    }
    if let Some(ref password) = cli.password {
        builder = builder.password(password);
    }
    if let Some(ref dir) = cli.temp_dir {
        builder = builder.temp_dir(dir);
    }
    if let Some(ref path) = cli.system_prompt {
        let prompt = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read system prompt from {:?}", path))?;
        builder = builder.system_prompt(prompt);
    }

    builder.build().context("Invalid configuration")
}
