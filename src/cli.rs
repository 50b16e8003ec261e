//! CLI parsing and orchestration. Parses args, builds a conversion request,
//! runs the job on a worker thread while rendering progress, writes the
//! resulting bytes. Maps errors to exit codes.

use crate::config;
use crate::emit::OutputFormat;
use crate::fetch::{HttpClient, HttpPageFetcher};
use crate::job::{spawn_job, JobError};
use crate::model::{ConversionRequest, Source};
use crate::translate::ProviderKind;
use clap::Parser;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

const DEFAULT_DELAY_SECS: u64 = 1;
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_RETRY_COUNT: u32 = 3;

/// CLI error carrying exit code and message.
#[derive(Debug, Error)]
pub enum CliRunError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("{0}")]
    Job(#[from] JobError),

    #[error("Cannot write output {path}: {source}")]
    OutputWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl CliRunError {
    /// 1: invalid input, 2: acquisition failure or cancellation, 3: emit or
    /// output failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            CliRunError::InvalidInput(_) | CliRunError::Job(JobError::InvalidRequest(_)) => 1,
            CliRunError::Job(JobError::Fetch(_)) | CliRunError::Job(JobError::Cancelled) => 2,
            CliRunError::Job(JobError::Emit(_))
            | CliRunError::Job(JobError::Worker(_))
            | CliRunError::OutputWrite { .. } => 3,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "webtome")]
#[command(about = "Convert a rendered web page (or a batch of linked pages) into EPUB, Markdown, DOCX, or PDF")]
#[command(
    after_help = "Config file keys (output_dir, user_agent, request_delay_secs, timeout_secs, retry_count, font_family, and translator credentials) are read from ./webtome.toml or ~/.config/webtome/config.toml. CLI flags override config; credential environment variables (PAPAGO_CLIENT_ID, PAPAGO_CLIENT_SECRET, OPENAI_API_KEY, DEEPL_API_KEY) override both."
)]
pub struct Args {
    /// Page URL to convert. Required unless --txt-file is given.
    pub url: Option<String>,

    /// Output path. Default: ./{sanitized-title}.{ext} where ext depends on --format.
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Document title. Default: derived from the URL.
    #[arg(long)]
    pub title: Option<String>,

    /// Output format: epub, markdown, docx, or pdf.
    #[arg(long, default_value = "epub", value_parser = parse_format_arg)]
    pub format: OutputFormat,

    /// CSS selector for the content subtree (e.g. "main", "article"). Whole body if omitted.
    #[arg(long)]
    pub selector: Option<String>,

    /// CSS selector for a menu; every link inside it becomes one page.
    #[arg(long)]
    pub menu_selector: Option<String>,

    /// Convert a raw text file instead of a URL. Pages split on blank lines.
    #[arg(long)]
    pub txt_file: Option<PathBuf>,

    /// Emit one output unit per page instead of a single merged document.
    #[arg(long)]
    pub split: bool,

    /// Target language code for translation (e.g. ko, en, ja).
    #[arg(long)]
    pub target_lang: Option<String>,

    /// Translator: none, browser, papago, gpt, deepl, or google.
    #[arg(long, default_value = "none", value_parser = parse_translator)]
    pub translator: ProviderKind,

    /// Body font family for EPUB and DOCX output (overrides config).
    #[arg(long)]
    pub font_family: Option<String>,

    /// HTTP User-Agent (overrides config).
    #[arg(long)]
    pub user_agent: Option<String>,

    /// Delay between page requests in seconds (overrides config; default 1).
    #[arg(long)]
    pub delay: Option<u64>,

    /// Request timeout in seconds (overrides config; default 30).
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Suppress progress output (errors only).
    #[arg(short, long)]
    pub quiet: bool,

    /// Print verbose error chain.
    #[arg(long)]
    pub verbose: bool,
}

fn parse_format_arg(s: &str) -> Result<OutputFormat, String> {
    OutputFormat::parse(s).map_err(|e| format!("Invalid --format value: {e}"))
}

fn parse_translator(s: &str) -> Result<ProviderKind, String> {
    match s.to_lowercase().as_str() {
        "none" => Ok(ProviderKind::None),
        "browser" | "client" => Ok(ProviderKind::ClientSideAuto),
        "papago" => Ok(ProviderKind::Papago),
        "gpt" | "openai" => Ok(ProviderKind::OpenAi),
        "deepl" => Ok(ProviderKind::DeepL),
        "google" => Ok(ProviderKind::GenericMt),
        _ => Err(format!(
            "Invalid --translator value: '{}'. Use none, browser, papago, gpt, deepl, or google.",
            s
        )),
    }
}

/// Ensure output path parent exists; return path.
fn validate_output_path(path: &Path) -> Result<(), CliRunError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            return Err(CliRunError::InvalidInput(format!(
                "Cannot write output: {}: parent directory does not exist.",
                path.display()
            )));
        }
    }
    Ok(())
}

fn resolve_source(args: &Args) -> Result<Source, CliRunError> {
    match (&args.url, &args.txt_file) {
        (Some(_), Some(_)) => Err(CliRunError::InvalidInput(
            "Provide either a page URL or --txt-file, not both.".to_string(),
        )),
        (None, None) => Err(CliRunError::InvalidInput(
            "Provide a page URL or --txt-file. Example: webtome https://example.com/guide"
                .to_string(),
        )),
        (Some(url), None) => Ok(Source::Url {
            url: url.clone(),
            content_selector: args.selector.clone(),
            menu_selector: args.menu_selector.clone(),
        }),
        (None, Some(path)) => {
            let content = std::fs::read_to_string(path).map_err(|e| {
                CliRunError::InvalidInput(format!("Cannot read {}: {}", path.display(), e))
            })?;
            Ok(Source::Text { content })
        }
    }
}

fn resolve_title(args: &Args) -> String {
    if let Some(title) = &args.title {
        return title.clone();
    }
    match &args.url {
        Some(url) => crate::job::title_from_url(url),
        None => "document".to_string(),
    }
}

/// Entry point for the CLI. Returns Ok(()) on success; Err with exit code and message on failure.
pub fn run(args: &Args) -> Result<(), CliRunError> {
    let source = resolve_source(args)?;
    let title = resolve_title(args);

    let config = config::load_config().map_err(CliRunError::InvalidInput)?;
    let credentials = config::resolve_credentials(config.as_ref());

    let effective_output_dir: PathBuf = config
        .as_ref()
        .and_then(|c| c.output_dir.clone())
        .unwrap_or_else(|| PathBuf::from("."));

    let delay_secs = args
        .delay
        .or_else(|| config.as_ref().and_then(|c| c.request_delay_secs))
        .unwrap_or(DEFAULT_DELAY_SECS);
    let timeout_secs = args
        .timeout
        .or_else(|| config.as_ref().and_then(|c| c.timeout_secs))
        .unwrap_or(DEFAULT_TIMEOUT_SECS);
    let retry_count = config
        .as_ref()
        .and_then(|c| c.retry_count)
        .unwrap_or(DEFAULT_RETRY_COUNT)
        .max(1);
    let user_agent = args
        .user_agent
        .clone()
        .or_else(|| config.as_ref().and_then(|c| c.user_agent.clone()));
    let font_family = args
        .font_family
        .clone()
        .or_else(|| config.as_ref().and_then(|c| c.font_family.clone()));

    let mut style = crate::emit::StyleOptions::default();
    if let Some(font) = font_family {
        style.font_family = font;
    }

    if args.translator.is_remote() && args.target_lang.is_none() {
        return Err(CliRunError::InvalidInput(
            "A remote translator requires --target-lang.".to_string(),
        ));
    }

    let build_client = |delay: u64| {
        let mut builder = HttpClient::builder()
            .delay_secs(delay)
            .timeout_secs(timeout_secs)
            .retry_count(retry_count);
        if let Some(ua) = &user_agent {
            builder = builder.user_agent(ua.clone());
        }
        builder
            .build()
            .map_err(|e| CliRunError::InvalidInput(format!("Failed to create HTTP client: {}", e)))
    };
    let fetcher = HttpPageFetcher::new(build_client(delay_secs)?);
    // Image requests skip the page delay; they hit CDNs, not the site itself.
    let images = build_client(0)?;

    let request = ConversionRequest {
        title: title.clone(),
        source,
        format: args.format,
        merge_pages: !args.split,
        target_lang: args.target_lang.clone(),
        provider: args.translator,
        style,
    };

    let handle = spawn_job(request, fetcher, images, credentials);

    if !args.quiet {
        let mut bar: Option<indicatif::ProgressBar> = None;
        for snapshot in handle.progress().iter() {
            if snapshot.total_units == 0 {
                continue;
            }
            let pb = bar.get_or_insert_with(|| {
                let bar = indicatif::ProgressBar::new(snapshot.total_units as u64);
                bar.set_style(
                    indicatif::ProgressStyle::default_bar()
                        .template("{spinner} {msg} [{bar:40}] {pos}/{len} ({elapsed})")
                        .unwrap()
                        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
                        .progress_chars("█▉▊▋▌▍▎▏ "),
                );
                bar.enable_steady_tick(Duration::from_millis(80));
                bar
            });
            pb.set_length(snapshot.total_units as u64);
            pb.set_position(snapshot.current_unit as u64);
            pb.set_message(format!(
                "Converting {}/{}",
                snapshot.current_unit, snapshot.total_units
            ));
            if snapshot.is_terminal() {
                break;
            }
        }
        if let Some(pb) = bar {
            pb.disable_steady_tick();
            pb.finish_and_clear();
        }
    }

    let output = handle.join()?;

    let output_path = match &args.output {
        Some(p) => p.clone(),
        None => effective_output_dir.join(&output.file_name),
    };
    validate_output_path(&output_path)?;
    std::fs::write(&output_path, &output.bytes).map_err(|e| CliRunError::OutputWrite {
        path: output_path.clone(),
        source: e,
    })?;

    if !args.quiet {
        eprintln!("Wrote {}", output_path.display());
    }
    Ok(())
}
