//! CLI binary for edgequake-docqa.
//!
//! A thin shim over the library crate: flags map onto `PipelineConfig`, each
//! subcommand drives one `Session`, and results go to stdout as text or JSON.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use edgequake_docqa::{
    offline_extractor, pipeline::input, DocPipeline, OcrBackend, PipelineConfig,
    PipelineObserver, ProgressObserver, Session, Stage, DEFAULT_EXPORT_NAME,
};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI observer using indicatif ─────────────────────────────────────────────

/// Terminal observer: a spinner per stage that switches to a page bar when
/// extraction falls back to OCR.
struct CliObserver {
    /// The bar for the stage currently running; replaced on every stage start.
    bar: Mutex<ProgressBar>,
}

impl CliObserver {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            bar: Mutex::new(ProgressBar::hidden()),
        })
    }

    fn spinner_style() -> ProgressStyle {
        ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  {elapsed:.dim}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS)
    }

    fn page_style() -> ProgressStyle {
        ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} pages  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS)
    }
}

impl PipelineObserver for CliObserver {
    fn on_stage_start(&self, stage: Stage) {
        let bar = ProgressBar::new_spinner();
        bar.set_style(Self::spinner_style());
        bar.set_prefix(capitalise(&stage.to_string()));
        bar.set_message(match stage {
            Stage::Extract => "reading document…",
            Stage::Reorganize => "formatting as Markdown…",
            Stage::Answer => "thinking…",
        });
        bar.enable_steady_tick(Duration::from_millis(80));
        *self.bar.lock().unwrap() = bar;
    }

    fn on_ocr_fallback(&self, reason: &str) {
        self.bar
            .lock()
            .unwrap()
            .println(format!("  {} {}", cyan("⚠"), dim(&format!("{reason}; using OCR"))));
    }

    fn on_ocr_page(&self, page_num: usize, total_pages: usize) {
        let bar = self.bar.lock().unwrap();
        if page_num == 1 {
            bar.set_style(Self::page_style());
            bar.set_length(total_pages as u64);
            bar.set_prefix("OCR");
            bar.reset_eta();
        }
        // Position is the page being recognised.
        bar.set_position(page_num as u64);
    }

    fn on_stage_complete(&self, stage: Stage, chars: usize) {
        self.bar.lock().unwrap().finish_and_clear();
        eprintln!(
            "{} {} {}",
            green("✔"),
            bold(&capitalise(&stage.to_string())),
            dim(&format!("{chars} chars")),
        );
    }

    fn on_stage_error(&self, stage: Stage, error: &str) {
        self.bar.lock().unwrap().finish_and_clear();
        // Truncate very long error messages to keep output tidy.
        let first_line = error.lines().next().unwrap_or_default();
        let msg = if first_line.chars().count() > 80 {
            format!("{}\u{2026}", first_line.chars().take(79).collect::<String>())
        } else {
            first_line.to_string()
        };
        eprintln!("{} {} {}", red("✘"), bold(&capitalise(&stage.to_string())), red(&msg));
    }
}

fn capitalise(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Print the text of a scanned PDF (no API key needed)
  docqa extract scan.pdf

  # Reorganize into Markdown and save it
  docqa organize report.pdf -o organized.md

  # Ask questions
  docqa ask invoice.png -Q "What is the total?" -Q "Who is the vendor?"

  # Ask against the raw text, skipping the reorganize call
  docqa ask --raw notes.txt -Q "When is the deadline?"

  # Interactive session
  docqa chat https://example.com/paper.pdf

  # OCR with the LLM instead of tesseract
  docqa --ocr-backend vision extract photo.jpg

SUPPORTED INPUT:
  .pdf            pdfium text layer, OCR of rendered pages if it has none
  .png .jpg .jpeg .bmp .tif .tiff
                  OCR
  .txt .md        read as UTF-8

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
  DOCQA_PDFIUM_LIB        Path to libpdfium (file or directory)
  DOCQA_TESSERACT_CMD     tesseract executable
  TESSDATA_PREFIX         tesseract language data directory

  A .env file in the working directory is loaded on startup.

SETUP:
  1. Install libpdfium and tesseract (e.g. apt install tesseract-ocr).
  2. Set API key:     export OPENAI_API_KEY=sk-...
  3. Ask:             docqa ask document.pdf -Q "What is this about?"
"#;

/// Extract, reorganize and question documents with an LLM.
#[derive(Parser, Debug)]
#[command(
    name = "docqa",
    version,
    about = "Extract, reorganize and question documents with an LLM",
    long_about = "Extract text from PDFs, images and text files (pdfium text layer with an OCR \
fallback), reorganize it into Markdown with an LLM, and answer questions using the whole \
document as context. Supports OpenAI, Anthropic, Google Gemini, Ollama and any \
OpenAI-compatible endpoint through edgequake-llm.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    opts: GlobalOpts,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the text extracted from a document.
    Extract {
        /// Local file path or HTTP/HTTPS URL.
        input: String,
    },

    /// Extract and reorganize a document into Markdown.
    Organize {
        /// Local file path or HTTP/HTTPS URL.
        input: String,

        /// Write Markdown to this file instead of stdout.
        #[arg(short, long, env = "DOCQA_OUTPUT")]
        output: Option<PathBuf>,
    },

    /// Extract a document and answer questions about it.
    Ask {
        /// Local file path or HTTP/HTTPS URL.
        input: String,

        /// Question to answer; repeat for several.
        #[arg(short = 'Q', long = "question", required = true)]
        questions: Vec<String>,

        /// Answer against the raw extracted text, skipping reorganize.
        #[arg(long)]
        raw: bool,
    },

    /// Interactive session: questions are read from stdin, one per line.
    Chat {
        /// Local file path or HTTP/HTTPS URL.
        input: String,

        /// Answer against the raw extracted text, skipping reorganize.
        #[arg(long)]
        raw: bool,
    },
}

#[derive(Args, Debug)]
struct GlobalOpts {
    /// LLM model ID (e.g. gpt-4.1-mini, gpt-4.1, claude-sonnet-4-20250514).
    #[arg(long, global = true, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, global = true, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// Rendering DPI for scanned PDFs (72–600).
    #[arg(long, global = true, env = "DOCQA_DPI", default_value_t = 300,
          value_parser = clap::value_parser!(u32).range(72..=600))]
    dpi: u32,

    /// OCR language code(s), tesseract syntax (e.g. eng, eng+deu).
    #[arg(long, global = true, env = "DOCQA_OCR_LANG", default_value = "eng")]
    ocr_lang: String,

    /// OCR engine for scanned pages and images.
    #[arg(long, global = true, env = "DOCQA_OCR_BACKEND", value_enum, default_value = "tesseract")]
    ocr_backend: OcrBackendArg,

    /// tesseract executable.
    #[arg(long, global = true, env = "DOCQA_TESSERACT_CMD", default_value = "tesseract")]
    tesseract_cmd: PathBuf,

    /// tesseract language data directory (sets TESSDATA_PREFIX for tesseract only).
    #[arg(long, global = true, env = "DOCQA_TESSDATA_PREFIX")]
    tessdata_prefix: Option<PathBuf>,

    /// Path to libpdfium, or the directory containing it.
    #[arg(long, global = true, env = "DOCQA_PDFIUM_LIB")]
    pdfium_lib: Option<PathBuf>,

    /// Path to a text file with a custom reorganize system prompt.
    #[arg(long, global = true, env = "DOCQA_REORGANIZE_PROMPT")]
    reorganize_prompt: Option<PathBuf>,

    /// Path to a text file with a custom answer instruction.
    #[arg(long, global = true, env = "DOCQA_ANSWER_PROMPT")]
    answer_prompt: Option<PathBuf>,

    /// Max LLM output tokens per call.
    #[arg(long, global = true, env = "DOCQA_MAX_TOKENS", default_value_t = 8192)]
    max_tokens: usize,

    /// LLM temperature (0.0–2.0).
    #[arg(long, global = true, env = "DOCQA_TEMPERATURE", default_value_t = 0.0)]
    temperature: f32,

    /// Per-call LLM timeout in seconds.
    #[arg(long, global = true, env = "DOCQA_API_TIMEOUT", default_value_t = 120)]
    api_timeout: u64,

    /// Per-page OCR timeout in seconds.
    #[arg(long, global = true, env = "DOCQA_OCR_TIMEOUT", default_value_t = 120)]
    ocr_timeout: u64,

    /// HTTP download timeout in seconds.
    #[arg(long, global = true, env = "DOCQA_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Output structured JSON instead of plain text.
    #[arg(long, global = true, env = "DOCQA_JSON")]
    json: bool,

    /// Disable progress spinners.
    #[arg(long, global = true, env = "DOCQA_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "DOCQA_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "DOCQA_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum OcrBackendArg {
    Tesseract,
    Vision,
}

impl From<OcrBackendArg> for OcrBackend {
    fn from(v: OcrBackendArg) -> Self {
        match v {
            OcrBackendArg::Tesseract => OcrBackend::Tesseract,
            OcrBackendArg::Vision => OcrBackend::Vision,
        }
    }
}

#[derive(Serialize)]
struct AskOutput<'a> {
    extraction: &'a edgequake_docqa::ExtractionResult,
    organized: Option<&'a edgequake_docqa::OrganizedText>,
    answers: &'a [edgequake_docqa::QaExchange],
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is normal; a malformed one is worth knowing about.
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("{} ignoring .env: {e}", cyan("⚠"));
        }
    }

    let cli = Cli::parse();
    let opts = &cli.opts;

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs when spinners are active; they
    // provide the feedback that matters to the user.
    let show_progress = !opts.quiet && !opts.no_progress && !opts.json;
    let filter = if opts.verbose {
        "debug"
    } else if opts.quiet || show_progress {
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

    let observer: Option<ProgressObserver> = if show_progress {
        Some(CliObserver::new() as Arc<dyn PipelineObserver>)
    } else {
        None
    };

    let config = build_config(opts, observer).await?;

    match &cli.command {
        Command::Extract { input } => run_extract(input, config, opts).await,
        Command::Organize { input, output } => {
            run_organize(input, output.as_ref(), config, opts).await
        }
        Command::Ask {
            input,
            questions,
            raw,
        } => run_ask(input, questions, *raw, config, opts).await,
        Command::Chat { input, raw } => run_chat(input, *raw, config, opts).await,
    }
}

/// `docqa extract`: no LLM provider is needed unless OCR uses the vision backend.
async fn run_extract(input_str: &str, config: PipelineConfig, opts: &GlobalOpts) -> Result<()> {
    let result = if matches!(config.ocr_backend, OcrBackend::Tesseract) {
        let extractor = offline_extractor(config.clone());
        let resolved = input::resolve_input(input_str, config.download_timeout_secs)
            .await
            .context("extract failed")?;
        extractor
            .extract(resolved.path())
            .await
            .context("extract failed")?
    } else {
        let pipeline = DocPipeline::from_config(config).context("Failed to set up LLM provider")?;
        pipeline
            .extract_input(input_str)
            .await
            .context("extract failed")?
    };

    if opts.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&result).context("Failed to serialise output")?
        );
    } else {
        write_stdout(&result.text)?;
        if !opts.quiet {
            eprintln!(
                "   {}",
                dim(&format!(
                    "{:?}  {} chars  {}ms",
                    result.method,
                    result.char_count(),
                    result.duration_ms
                ))
            );
        }
    }
    Ok(())
}

/// `docqa organize`: extract + reorganize, then print or save.
async fn run_organize(
    input_str: &str,
    output: Option<&PathBuf>,
    config: PipelineConfig,
    opts: &GlobalOpts,
) -> Result<()> {
    let mut session = open_session(input_str, config).await?;
    session.reorganize().await.map_err(anyhow::Error::new)?;

    if let Some(path) = output {
        session
            .export_markdown(path)
            .await
            .context("Failed to save Markdown")?;
        if !opts.quiet {
            eprintln!("{}  →  {}", green("✔"), bold(&path.display().to_string()));
        }
    }

    let organized = session
        .organized()
        .context("reorganize produced no Markdown")?;
    if opts.json {
        println!(
            "{}",
            serde_json::to_string_pretty(organized).context("Failed to serialise output")?
        );
    } else if output.is_none() {
        write_stdout(&organized.markdown)?;
    }

    if !opts.quiet && !opts.json {
        eprintln!(
            "   {} tokens in  /  {} tokens out  —  {}ms",
            dim(&organized.input_tokens.to_string()),
            dim(&organized.output_tokens.to_string()),
            organized.duration_ms,
        );
    }
    Ok(())
}

/// `docqa ask`: answer every `-Q` question against one session.
async fn run_ask(
    input_str: &str,
    questions: &[String],
    raw: bool,
    config: PipelineConfig,
    opts: &GlobalOpts,
) -> Result<()> {
    let mut session = open_session(input_str, config).await?;
    if !raw {
        reorganize_or_warn(&mut session).await;
    }

    for question in questions {
        let qa = session.ask(question).await.map_err(anyhow::Error::new)?;
        if !opts.json {
            if questions.len() > 1 {
                println!("{} {}", bold("Q:"), qa.question);
                println!("{} {}\n", bold("A:"), qa.answer);
            } else {
                write_stdout(&qa.answer)?;
            }
        }
    }

    if opts.json {
        let out = AskOutput {
            extraction: session.extraction().context("no extraction in session")?,
            organized: session.organized(),
            answers: session.history(),
        };
        println!(
            "{}",
            serde_json::to_string_pretty(&out).context("Failed to serialise output")?
        );
    }
    Ok(())
}

/// `docqa chat`: read questions from stdin until EOF or an empty line.
///
/// A failed question is reported and the loop continues; the session keeps
/// its document.
async fn run_chat(
    input_str: &str,
    raw: bool,
    config: PipelineConfig,
    opts: &GlobalOpts,
) -> Result<()> {
    let mut session = open_session(input_str, config).await?;
    if !raw {
        reorganize_or_warn(&mut session).await;
    }

    if !opts.quiet {
        eprintln!(
            "{} {}",
            cyan("◆"),
            bold("Ask a question (empty line or Ctrl-D to quit); /save [path] exports Markdown")
        );
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        if !opts.quiet {
            eprint!("{} ", cyan("?"));
            io::stderr().flush().ok();
        }
        let Some(line) = next_question(&mut lines).await? else {
            break;
        };
        let line = line.as_str();

        if let Some(rest) = line.strip_prefix("/save") {
            let rest = rest.trim();
            let path = PathBuf::from(if rest.is_empty() { DEFAULT_EXPORT_NAME } else { rest });
            match session.export_markdown(&path).await {
                Ok(()) => eprintln!("{}  →  {}", green("✔"), bold(&path.display().to_string())),
                Err(e) => eprintln!("{} {}", red("✘"), e),
            }
            continue;
        }

        match session.ask(line).await {
            Ok(qa) => {
                if opts.json {
                    println!(
                        "{}",
                        serde_json::to_string(qa).context("Failed to serialise output")?
                    );
                } else {
                    println!("{}\n", qa.answer);
                }
            }
            Err(failure) => eprintln!("{} {}", red("✘"), failure),
        }
    }
    Ok(())
}

/// The next trimmed question, or `None` at EOF or on an empty line.
async fn next_question<R: AsyncBufRead + Unpin>(lines: &mut Lines<R>) -> Result<Option<String>> {
    let line = lines.next_line().await.context("Failed to read stdin")?;
    Ok(line.map(|l| l.trim().to_string()).filter(|l| !l.is_empty()))
}

/// Build the pipeline and run the extract stage for a new session.
async fn open_session(input_str: &str, config: PipelineConfig) -> Result<Session> {
    let pipeline =
        Arc::new(DocPipeline::from_config(config).context("Failed to set up LLM provider")?);
    let mut session = Session::new(pipeline);
    session.extract(input_str).await.map_err(anyhow::Error::new)?;
    Ok(session)
}

/// Reorganize, falling back to the raw text as context on failure.
async fn reorganize_or_warn(session: &mut Session) {
    if let Err(failure) = session.reorganize().await {
        eprintln!(
            "{} {}; answering from the raw text",
            cyan("⚠"),
            failure
        );
    }
}

fn write_stdout(text: &str) -> Result<()> {
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    handle
        .write_all(text.as_bytes())
        .context("Failed to write to stdout")?;
    // Ensure a trailing newline on stdout.
    if !text.ends_with('\n') {
        handle.write_all(b"\n").ok();
    }
    Ok(())
}

/// Map CLI args to `PipelineConfig`.
async fn build_config(
    opts: &GlobalOpts,
    observer: Option<ProgressObserver>,
) -> Result<PipelineConfig> {
    let mut builder = PipelineConfig::builder()
        .dpi(opts.dpi)
        .ocr_language(opts.ocr_lang.clone())
        .ocr_backend(opts.ocr_backend.into())
        .tesseract_cmd(opts.tesseract_cmd.clone())
        .max_tokens(opts.max_tokens)
        .temperature(opts.temperature)
        .api_timeout_secs(opts.api_timeout)
        .ocr_timeout_secs(opts.ocr_timeout)
        .download_timeout_secs(opts.download_timeout);

    if let Some(ref model) = opts.model {
        builder = builder.model(model.clone());
    }
    if let Some(ref provider) = opts.provider {
        builder = builder.provider_name(provider.clone());
    }
    if let Some(ref dir) = opts.tessdata_prefix {
        builder = builder.tessdata_prefix(dir.clone());
    }
    if let Some(ref lib) = opts.pdfium_lib {
        builder = builder.pdfium_library(lib.clone());
    }
    if let Some(ref path) = opts.reorganize_prompt {
        builder = builder.reorganize_prompt(read_prompt(path).await?);
    }
    if let Some(ref path) = opts.answer_prompt {
        builder = builder.answer_prompt(read_prompt(path).await?);
    }
    if let Some(obs) = observer {
        builder = builder.observer(obs);
    }

    builder.build().context("Invalid configuration")
}

async fn read_prompt(path: &PathBuf) -> Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read prompt from {:?}", path))
}
