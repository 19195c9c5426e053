//! The configurable document-QA pipeline.
//!
//! [`DocPipeline`] owns the extractor and the chat model and exposes the
//! three stages as independent calls. It holds no per-document state, so one
//! `Arc<DocPipeline>` can serve any number of [`crate::Session`]s.

use crate::config::{OcrBackend, PipelineConfig};
use crate::error::{DocQaError, Stage};
use crate::output::{ExtractionResult, OrganizedText, QaExchange};
use crate::pipeline::extract::{ExtractionBackends, Extractor};
use crate::pipeline::input;
use crate::pipeline::llm::{resolve_provider, ChatModel, ProviderChat};
use crate::pipeline::ocr::{OcrEngine, TesseractOcr, VisionOcr};
use crate::pipeline::render::PdfiumRasterizer;
use crate::pipeline::structured::PdfiumTextConverter;
use crate::pipeline::{answer, reorganize};
use crate::prompts::{DEFAULT_ANSWER_PROMPT, DEFAULT_REORGANIZE_PROMPT};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Extract → reorganize → answer, each stage callable on its own.
pub struct DocPipeline {
    config: PipelineConfig,
    extractor: Extractor,
    chat: Arc<dyn ChatModel>,
}

impl DocPipeline {
    /// Build a pipeline with the real backends: pdfium, tesseract or a vision
    /// model for OCR, and an `edgequake_llm` provider for the LLM stages.
    ///
    /// # Errors
    /// [`DocQaError::ProviderNotConfigured`] when no LLM provider resolves.
    pub fn from_config(config: PipelineConfig) -> Result<Self, DocQaError> {
        let provider = resolve_provider(&config)?;
        let chat: Arc<dyn ChatModel> = Arc::new(ProviderChat::new(Arc::clone(&provider), &config));

        let ocr: Arc<dyn OcrEngine> = match config.ocr_backend {
            OcrBackend::Tesseract => Arc::new(tesseract_from_config(&config)),
            OcrBackend::Vision => Arc::new(VisionOcr::new(
                provider,
                config.max_tokens,
                config.ocr_timeout_secs,
            )),
        };

        let backends = default_backends(&config, ocr);
        Ok(Self::with_backends(config, backends, chat))
    }

    /// Build a pipeline from explicit collaborators.
    pub fn with_backends(
        config: PipelineConfig,
        backends: ExtractionBackends,
        chat: Arc<dyn ChatModel>,
    ) -> Self {
        Self {
            extractor: Extractor::new(config.clone(), backends),
            config,
            chat,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Extract text from a local file.
    pub async fn extract(&self, path: &Path) -> Result<ExtractionResult, DocQaError> {
        self.extractor.extract(path).await
    }

    /// Extract text from a local path or HTTP(S) URL.
    pub async fn extract_input(&self, input_str: &str) -> Result<ExtractionResult, DocQaError> {
        let resolved = input::resolve_input(input_str, self.config.download_timeout_secs).await?;
        // `resolved` owns any downloaded temp file until extraction returns.
        self.extractor.extract(resolved.path()).await
    }

    /// Extract text from uploaded bytes; `filename` supplies the extension.
    ///
    /// The bytes are staged in a temp file that is deleted before this
    /// returns, on success and on error.
    pub async fn extract_bytes(
        &self,
        bytes: &[u8],
        filename: &str,
    ) -> Result<ExtractionResult, DocQaError> {
        let staged = input::stage_bytes(bytes, filename)?;
        let result = self.extractor.extract(staged.path()).await;
        drop(staged);
        result
    }

    /// Reformat raw text as Markdown without changing its content.
    pub async fn reorganize(&self, raw: &str) -> Result<OrganizedText, DocQaError> {
        let prompt = self
            .config
            .reorganize_prompt
            .as_deref()
            .unwrap_or(DEFAULT_REORGANIZE_PROMPT);

        self.observe(Stage::Reorganize, |r: &OrganizedText| r.markdown.chars().count(), async {
            reorganize::reorganize(self.chat.as_ref(), prompt, raw).await
        })
        .await
    }

    /// Answer `question` using `context` as the only source.
    pub async fn answer(&self, context: &str, question: &str) -> Result<QaExchange, DocQaError> {
        let instruction = self
            .config
            .answer_prompt
            .as_deref()
            .unwrap_or(DEFAULT_ANSWER_PROMPT);

        self.observe(Stage::Answer, |qa: &QaExchange| qa.answer.chars().count(), async {
            answer::answer(self.chat.as_ref(), instruction, context, question).await
        })
        .await
    }

    async fn observe<T, F>(
        &self,
        stage: Stage,
        chars: impl Fn(&T) -> usize,
        fut: F,
    ) -> Result<T, DocQaError>
    where
        F: std::future::Future<Output = Result<T, DocQaError>>,
    {
        let Some(ref obs) = self.config.observer else {
            return fut.await;
        };
        obs.on_stage_start(stage);
        let result = fut.await;
        match &result {
            Ok(value) => obs.on_stage_complete(stage, chars(value)),
            Err(e) => obs.on_stage_error(stage, &e.to_string()),
        }
        result
    }
}

/// Build an extraction-only [`Extractor`] with tesseract OCR.
///
/// Needs no LLM provider or API key, so `docqa extract` works offline.
pub fn offline_extractor(config: PipelineConfig) -> Extractor {
    let ocr: Arc<dyn OcrEngine> = Arc::new(tesseract_from_config(&config));
    let backends = default_backends(&config, ocr);
    Extractor::new(config, backends)
}

fn tesseract_from_config(config: &PipelineConfig) -> TesseractOcr {
    TesseractOcr::new(
        config.tesseract_cmd.clone(),
        config.tessdata_prefix.clone(),
        config.ocr_timeout_secs,
    )
}

fn default_backends(config: &PipelineConfig, ocr: Arc<dyn OcrEngine>) -> ExtractionBackends {
    ExtractionBackends {
        converter: Arc::new(PdfiumTextConverter::new(config.pdfium_library.clone())),
        rasterizer: Arc::new(PdfiumRasterizer::new(
            config.pdfium_library.clone(),
            config.max_rendered_pixels,
        )),
        ocr,
    }
}

/// Write Markdown to `path` atomically (temp file + rename).
pub async fn write_markdown(path: &Path, markdown: &str) -> Result<(), DocQaError> {
    let write_err = |e: std::io::Error| DocQaError::OutputWriteFailed {
        path: path.to_path_buf(),
        source: Arc::new(e),
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }

    let tmp_path = path.with_extension("md.tmp");
    tokio::fs::write(&tmp_path, markdown).await.map_err(write_err)?;
    tokio::fs::rename(&tmp_path, path).await.map_err(write_err)?;

    info!("Wrote {} bytes of Markdown to {}", markdown.len(), path.display());
    Ok(())
}
