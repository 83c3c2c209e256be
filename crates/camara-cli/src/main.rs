use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use camara_core::config_file::{self, ConfigFile, ExtractionSection, GeminiSection};
use camara_core::pipeline::{deadline_after, guarded};
use camara_core::{Config, Pipeline, PipelineError, TextExtractor};
use camara_ingest::{BackendKind, IngestConfig};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

mod output;

use output::ColorMode;

/// Câmara Aberta - Extract roll-call votes from city council session minutes
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Extract vote records from a session minutes PDF
    Extract {
        /// Path to the minutes PDF
        file_path: PathBuf,

        /// Disable colored output
        #[arg(long)]
        no_color: bool,

        /// Gemini API key
        #[arg(long)]
        api_key: Option<String>,

        /// Gemini model name
        #[arg(long)]
        model: Option<String>,

        /// Text extraction backend: mupdf or ocr
        #[arg(long)]
        backend: Option<String>,

        /// Tesseract language for the OCR backend
        #[arg(long)]
        ocr_lang: Option<String>,

        /// Overall time limit for the document, in seconds
        #[arg(long)]
        timeout: Option<u64>,

        /// Write the records as JSON to this file
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Also save the extracted text to this file
        #[arg(long)]
        save_text: Option<PathBuf>,
    },

    /// Extract only the text of a PDF, without calling the model
    Text {
        /// Path to the minutes PDF
        file_path: PathBuf,

        /// Text extraction backend: mupdf or ocr
        #[arg(long)]
        backend: Option<String>,

        /// Tesseract language for the OCR backend
        #[arg(long)]
        ocr_lang: Option<String>,

        /// Write the text to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Write a starter configuration file
    InitConfig {
        /// Where to write it (default: the platform config path)
        #[arg(long)]
        path: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

/// Values given on the command line, before env and config file fallbacks.
#[derive(Debug, Default)]
struct Overrides {
    api_key: Option<String>,
    model: Option<String>,
    deadline_secs: Option<u64>,
    backend: Option<String>,
    ocr_language: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::Extract {
            file_path,
            no_color,
            api_key,
            model,
            backend,
            ocr_lang,
            timeout,
            output,
            save_text,
        } => {
            let overrides = Overrides {
                api_key,
                model,
                deadline_secs: timeout,
                backend,
                ocr_language: ocr_lang,
            };
            extract(file_path, no_color, overrides, output, save_text).await
        }
        Command::Text {
            file_path,
            backend,
            ocr_lang,
            output,
        } => {
            let overrides = Overrides {
                backend,
                ocr_language: ocr_lang,
                ..Overrides::default()
            };
            text(file_path, overrides, output).await
        }
        Command::InitConfig { path, force } => init_config(path, force),
    }
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn extract(
    file_path: PathBuf,
    no_color: bool,
    overrides: Overrides,
    output: Option<PathBuf>,
    save_text: Option<PathBuf>,
) -> anyhow::Result<()> {
    let file = config_file::load_config();
    let config = resolve_config(&file, &overrides, |name| std::env::var(name).ok());
    let ingest = resolve_ingest(&file, &overrides)?;
    tracing::debug!(?config, backend = %ingest.kind, "resolved configuration");

    if !file_path.exists() {
        anyhow::bail!("File not found: {}", file_path.display());
    }

    let backend = camara_ingest::backend_for(&ingest)?;
    let pipeline = Pipeline::from_config(&config, backend)?;
    tracing::info!(
        backend = pipeline.text_extractor().backend_name(),
        model = pipeline.vote_extractor().model_name(),
        "starting extraction"
    );
    let cancel = cancel_on_ctrl_c();

    let spinner = spinner(format!("Extracting text from {}...", file_path.display()));
    let mut extracted_text: Option<String> = None;
    let result = pipeline
        .run_inspect(&file_path, &cancel, |text| {
            spinner.set_message(format!(
                "Asking {} for the votes ({} chars)...",
                config.model,
                text.chars().count()
            ));
            if save_text.is_some() {
                extracted_text = Some(text.to_string());
            }
        })
        .await;
    spinner.finish_and_clear();

    // Saved even when the model stage fails, so the text can be inspected.
    if let (Some(path), Some(text)) = (&save_text, &extracted_text) {
        std::fs::write(path, text)
            .with_context(|| format!("Failed to save text to {}", path.display()))?;
        eprintln!("Text saved to {}", path.display());
    }

    let extraction = result.map_err(describe_failure)?;

    match output {
        Some(path) => {
            output::write_json(&path, &extraction)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            eprintln!(
                "{} vote records written to {}",
                extraction.len(),
                path.display()
            );
        }
        None => {
            let color = ColorMode(!no_color);
            let name = file_path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| file_path.display().to_string());
            output::print_records(&mut std::io::stdout(), &name, &extraction, color)?;
        }
    }

    Ok(())
}

async fn text(
    file_path: PathBuf,
    overrides: Overrides,
    output: Option<PathBuf>,
) -> anyhow::Result<()> {
    let file = config_file::load_config();
    let config = resolve_config(&file, &overrides, |name| std::env::var(name).ok());
    let ingest = resolve_ingest(&file, &overrides)?;

    if !file_path.exists() {
        anyhow::bail!("File not found: {}", file_path.display());
    }

    let backend = camara_ingest::backend_for(&ingest)?;
    let extractor = TextExtractor::new(backend);
    let cancel = cancel_on_ctrl_c();

    let spinner = spinner(format!("Extracting text from {}...", file_path.display()));
    let result = guarded(
        extractor.extract_text(&file_path),
        &cancel,
        deadline_after(config.deadline()),
    )
    .await;
    spinner.finish_and_clear();
    let text = result.map_err(describe_failure)?;

    match output {
        Some(path) => std::fs::write(&path, &text)
            .with_context(|| format!("Failed to write {}", path.display()))?,
        None => println!("{}", text),
    }
    Ok(())
}

fn init_config(path: Option<PathBuf>, force: bool) -> anyhow::Result<()> {
    let path = match path {
        Some(p) => p,
        None => config_file::config_path()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?,
    };
    if path.exists() && !force {
        anyhow::bail!(
            "{} already exists (use --force to overwrite)",
            path.display()
        );
    }
    config_file::save_to_path(&starter_config(), &path).map_err(|e| anyhow::anyhow!(e))?;
    println!("Wrote {}", path.display());
    println!("Set GEMINI_API_KEY in your environment or .env, or add api_key under [gemini].");
    Ok(())
}

/// Defaults written by `init-config`. The API key is left out on purpose.
fn starter_config() -> ConfigFile {
    let defaults = Config::default();
    let ingest = IngestConfig::default();
    ConfigFile {
        gemini: Some(GeminiSection {
            api_key: None,
            model: Some(defaults.model),
            base_url: Some(defaults.base_url),
            timeout_secs: Some(defaults.request_timeout_secs),
            temperature: None,
        }),
        extraction: Some(ExtractionSection {
            backend: Some(ingest.kind.to_string()),
            ocr_language: Some(ingest.ocr_language),
            deadline_secs: None,
            header_exclusion: None,
            footer_exclusion: None,
        }),
    }
}

/// Resolve runtime configuration: CLI flags > env vars > config file > defaults.
fn resolve_config(
    file: &ConfigFile,
    overrides: &Overrides,
    env: impl Fn(&str) -> Option<String>,
) -> Config {
    let mut config = file.to_config();
    if let Some(key) = overrides.api_key.clone().or_else(|| env("GEMINI_API_KEY")) {
        config.api_key = Some(key);
    }
    if let Some(model) = overrides.model.clone().or_else(|| env("GEMINI_MODEL")) {
        config.model = model;
    }
    if let Some(secs) = overrides.deadline_secs {
        config.deadline_secs = Some(secs);
    }
    config
}

fn resolve_ingest(file: &ConfigFile, overrides: &Overrides) -> anyhow::Result<IngestConfig> {
    let section = file.extraction.clone().unwrap_or_default();
    let mut ingest = IngestConfig::default();
    if let Some(kind) = overrides.backend.as_deref().or(section.backend.as_deref()) {
        ingest.kind = kind.parse::<BackendKind>()?;
    }
    if let Some(lang) = overrides.ocr_language.clone().or(section.ocr_language) {
        ingest.ocr_language = lang;
    }
    if let Some(ratio) = section.header_exclusion {
        ingest.header_exclusion = ratio;
    }
    if let Some(ratio) = section.footer_exclusion {
        ingest.footer_exclusion = ratio;
    }
    Ok(ingest)
}

fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel_clone.cancel();
        }
    });
    cancel
}

fn spinner(message: String) -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner:.green} {msg}") {
        bar.set_style(style);
    }
    bar.set_message(message);
    bar.enable_steady_tick(Duration::from_millis(120));
    bar
}

/// Turn a pipeline failure into a message naming the stage that failed.
fn describe_failure(err: PipelineError) -> anyhow::Error {
    match err.stage() {
        None => anyhow::anyhow!("Interrupted: {}", err),
        Some(stage) if err.is_retryable() => {
            anyhow::anyhow!("Failed during {}: {} (running again may succeed)", stage, err)
        }
        Some(stage) => anyhow::anyhow!("Failed during {}: {}", stage, err),
    }
}
