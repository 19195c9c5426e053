//! OCR engines for the extraction fallback.
//!
//! [`TesseractOcr`] shells out to the `tesseract` executable. Its location
//! and `TESSDATA_PREFIX` come from [`crate::PipelineConfig`] and are applied
//! to the child process only; nothing touches this process's environment.
//!
//! [`VisionOcr`] asks a vision LLM to transcribe the page instead, for hosts
//! without tesseract or documents it reads poorly (handwriting, photos).

use crate::error::DocQaError;
use crate::pipeline::encode;
use crate::prompts::{vision_ocr_user_message, VISION_OCR_PROMPT};
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider};
use image::DynamicImage;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// Converts a raster image to text.
#[async_trait]
pub trait OcrEngine: Send + Sync {
    /// Recognise the text in `image`. `language` uses tesseract codes (`eng`).
    async fn recognize(&self, image: &DynamicImage, language: &str) -> Result<String, DocQaError>;
}

// ── tesseract ────────────────────────────────────────────────────────────

/// [`OcrEngine`] running the `tesseract` CLI.
#[derive(Debug, Clone)]
pub struct TesseractOcr {
    cmd: PathBuf,
    tessdata_prefix: Option<PathBuf>,
    timeout_secs: u64,
}

impl TesseractOcr {
    pub fn new(
        cmd: impl Into<PathBuf>,
        tessdata_prefix: Option<PathBuf>,
        timeout_secs: u64,
    ) -> Self {
        Self {
            cmd: cmd.into(),
            tessdata_prefix,
            timeout_secs,
        }
    }

    fn command(&self, image_path: &std::path::Path, language: &str) -> Command {
        let mut cmd = Command::new(&self.cmd);
        cmd.arg(image_path)
            .arg("stdout")
            .arg("-l")
            .arg(language)
            .kill_on_drop(true);
        if let Some(ref prefix) = self.tessdata_prefix {
            cmd.env("TESSDATA_PREFIX", prefix);
        }
        cmd
    }
}

#[async_trait]
impl OcrEngine for TesseractOcr {
    async fn recognize(&self, image: &DynamicImage, language: &str) -> Result<String, DocQaError> {
        let png = encode::encode_png(image).map_err(|e| DocQaError::external("ocr", e))?;

        // Lives until this function returns, then the file is deleted.
        let mut input = tempfile::Builder::new()
            .prefix("docqa-ocr-")
            .suffix(".png")
            .tempfile()
            .map_err(|e| DocQaError::Internal(format!("tempfile: {e}")))?;
        input
            .write_all(&png)
            .and_then(|_| input.flush())
            .map_err(|e| DocQaError::Internal(format!("tempfile write: {e}")))?;

        let output = tokio::time::timeout(
            Duration::from_secs(self.timeout_secs),
            self.command(input.path(), language).output(),
        )
        .await
        .map_err(|_| DocQaError::Timeout {
            service: "ocr".into(),
            secs: self.timeout_secs,
        })?
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                DocQaError::external(
                    "ocr",
                    format!(
                        "tesseract executable not found at '{}'; install tesseract-ocr or pass --tesseract-cmd",
                        self.cmd.display()
                    ),
                )
            } else {
                DocQaError::external("ocr", e)
            }
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(DocQaError::external(
                "ocr",
                format!("tesseract exited with {}: {}", output.status, stderr.trim()),
            ));
        }

        let text = String::from_utf8_lossy(&output.stdout).into_owned();
        debug!("tesseract recognised {} chars", text.len());
        Ok(text)
    }
}

// ── vision LLM ───────────────────────────────────────────────────────────

/// [`OcrEngine`] that asks a vision-capable LLM to transcribe the image.
pub struct VisionOcr {
    provider: Arc<dyn LLMProvider>,
    max_tokens: usize,
    timeout_secs: u64,
}

impl VisionOcr {
    pub fn new(provider: Arc<dyn LLMProvider>, max_tokens: usize, timeout_secs: u64) -> Self {
        Self {
            provider,
            max_tokens,
            timeout_secs,
        }
    }
}

#[async_trait]
impl OcrEngine for VisionOcr {
    async fn recognize(&self, image: &DynamicImage, language: &str) -> Result<String, DocQaError> {
        let image_data = encode::encode_page(image).map_err(|e| DocQaError::external("ocr", e))?;

        let messages = vec![
            ChatMessage::system(VISION_OCR_PROMPT),
            ChatMessage::user_with_images(&vision_ocr_user_message(language), vec![image_data]),
        ];
        let options = CompletionOptions {
            temperature: Some(0.0),
            max_tokens: Some(self.max_tokens),
            ..Default::default()
        };

        let response = tokio::time::timeout(
            Duration::from_secs(self.timeout_secs),
            self.provider.chat(&messages, Some(&options)),
        )
        .await
        .map_err(|_| DocQaError::Timeout {
            service: "ocr".into(),
            secs: self.timeout_secs,
        })?
        .map_err(|e| DocQaError::external("ocr", e))?;

        debug!(
            "vision OCR: {} input tokens, {} output tokens",
            response.prompt_tokens, response.completion_tokens
        );
        Ok(response.content)
    }
}
