//! Configuration types for the extract → reorganize → answer pipeline.
//!
//! Settings that tools usually read from the process environment (the LLM
//! client, the tesseract binary, `TESSDATA_PREFIX`) are fields of
//! [`PipelineConfig`] and flows into [`crate::DocPipeline`] at construction.
//! Two sessions built from two configs never observe each other's settings.

use crate::error::DocQaError;
use crate::progress::ProgressObserver;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Default model for both the reorganize and answer calls.
pub const DEFAULT_MODEL: &str = "gpt-4.1-mini";

/// Configuration for a [`crate::DocPipeline`].
///
/// Built via [`PipelineConfig::builder()`] or using
/// [`PipelineConfig::default()`].
///
/// # Example
/// ```rust
/// use edgequake_docqa::{OcrBackend, PipelineConfig};
///
/// let config = PipelineConfig::builder()
///     .dpi(300)
///     .ocr_language("eng+deu")
///     .ocr_backend(OcrBackend::Tesseract)
///     .model("gpt-4.1-mini")
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct PipelineConfig {
    /// LLM model identifier. Default: [`DEFAULT_MODEL`].
    pub model: String,

    /// LLM provider name (e.g. "openai", "anthropic", "ollama").
    /// If None along with `provider`, the provider is auto-detected.
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature. Default: 0.0.
    ///
    /// Reorganisation must not invent content, so the model runs deterministic.
    pub temperature: f32,

    /// Maximum tokens the LLM may generate per call. Default: 8192.
    ///
    /// The reorganised document is roughly as long as the raw text, so this
    /// bounds the size of document that can be reorganised in one call.
    pub max_tokens: usize,

    /// Per-LLM-call timeout in seconds. Default: 120.
    pub api_timeout_secs: u64,

    /// Rasterisation DPI for the OCR fallback on PDFs. Range: 72–600. Default: 300.
    pub dpi: u32,

    /// Cap on the longest edge of a rendered page, in pixels. Default: 5000.
    ///
    /// 300 DPI of a US-Letter page is 2550 × 3300; the cap only bites on
    /// oversized pages (posters, drawings).
    pub max_rendered_pixels: u32,

    /// OCR language code(s), tesseract syntax (`eng`, `eng+fra`). Default: `eng`.
    pub ocr_language: String,

    /// Which OCR engine runs the fallback. Default: [`OcrBackend::Tesseract`].
    pub ocr_backend: OcrBackend,

    /// tesseract executable. Default: `tesseract` (resolved through `PATH`).
    pub tesseract_cmd: PathBuf,

    /// `TESSDATA_PREFIX` for the tesseract child process only.
    pub tessdata_prefix: Option<PathBuf>,

    /// Per-page OCR timeout in seconds. Default: 120.
    pub ocr_timeout_secs: u64,

    /// Explicit libpdfium path. If None, the system library is used.
    pub pdfium_library: Option<PathBuf>,

    /// Custom system prompt for the reorganize call.
    pub reorganize_prompt: Option<String>,

    /// Custom instruction for the answer call. The document text is appended.
    pub answer_prompt: Option<String>,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Optional progress observer. Default: None.
    pub observer: Option<ProgressObserver>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            provider_name: None,
            provider: None,
            temperature: 0.0,
            max_tokens: 8192,
            api_timeout_secs: 120,
            dpi: 300,
            max_rendered_pixels: 5000,
            ocr_language: "eng".to_string(),
            ocr_backend: OcrBackend::default(),
            tesseract_cmd: PathBuf::from("tesseract"),
            tessdata_prefix: None,
            ocr_timeout_secs: 120,
            pdfium_library: None,
            reorganize_prompt: None,
            answer_prompt: None,
            download_timeout_secs: 120,
            observer: None,
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("dpi", &self.dpi)
            .field("ocr_language", &self.ocr_language)
            .field("ocr_backend", &self.ocr_backend)
            .field("tesseract_cmd", &self.tesseract_cmd)
            .field("tessdata_prefix", &self.tessdata_prefix)
            .field("pdfium_library", &self.pdfium_library)
            .field("observer", &self.observer.as_ref().map(|_| "<dyn PipelineObserver>"))
            .finish()
    }
}

impl PipelineConfig {
    /// Create a new builder for `PipelineConfig`.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi.clamp(72, 600);
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn ocr_language(mut self, lang: impl Into<String>) -> Self {
        self.config.ocr_language = lang.into();
        self
    }

    pub fn ocr_backend(mut self, backend: OcrBackend) -> Self {
        self.config.ocr_backend = backend;
        self
    }

    pub fn tesseract_cmd(mut self, cmd: impl Into<PathBuf>) -> Self {
        self.config.tesseract_cmd = cmd.into();
        self
    }

    pub fn tessdata_prefix(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.tessdata_prefix = Some(dir.into());
        self
    }

    pub fn ocr_timeout_secs(mut self, secs: u64) -> Self {
        self.config.ocr_timeout_secs = secs;
        self
    }

    pub fn pdfium_library(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdfium_library = Some(path.into());
        self
    }

    pub fn reorganize_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.reorganize_prompt = Some(prompt.into());
        self
    }

    pub fn answer_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.answer_prompt = Some(prompt.into());
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn observer(mut self, observer: ProgressObserver) -> Self {
        self.config.observer = Some(observer);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, DocQaError> {
        let c = &self.config;
        if c.dpi < 72 || c.dpi > 600 {
            return Err(DocQaError::InvalidConfig(format!(
                "DPI must be 72–600, got {}",
                c.dpi
            )));
        }
        if c.model.trim().is_empty() {
            return Err(DocQaError::InvalidConfig("Model must not be empty".into()));
        }
        if c.ocr_language.trim().is_empty() {
            return Err(DocQaError::InvalidConfig(
                "OCR language must not be empty".into(),
            ));
        }
        if c.max_tokens == 0 {
            return Err(DocQaError::InvalidConfig("max_tokens must be ≥ 1".into()));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// OCR engine used by the extraction fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OcrBackend {
    /// Local `tesseract` executable. (default)
    #[default]
    Tesseract,
    /// Vision LLM transcription through the configured provider.
    Vision,
}
