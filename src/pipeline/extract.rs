//! Extraction: document → raw text.
//!
//! ## Decision order
//!
//! ```text
//! .txt/.md ─────────────────────────────▶ read UTF-8           (PlainText)
//! anything else ─▶ structured converter ─▶ non-blank? return   (Structured)
//!                        │ error / blank
//!                        ▼
//!               .pdf  ──▶ rasterise every page ─▶ OCR page by page (Ocr)
//!               image ──▶ decode ─────────────▶ OCR once           (Ocr)
//!               other ──▶ UnsupportedFormat
//! ```
//!
//! Plain text is an explicit branch, never a fallback: a `.txt` file must not
//! reach the rasteriser or the OCR engine. Pages are recognised one at a time
//! in page order and joined with a single line break.

use crate::config::PipelineConfig;
use crate::error::{DocQaError, Stage};
use crate::output::{ExtractionMethod, ExtractionResult};
use crate::pipeline::input::DocumentKind;
use crate::pipeline::ocr::OcrEngine;
use crate::pipeline::postprocess::clean_extracted_text;
use crate::pipeline::render::PageRasterizer;
use crate::pipeline::structured::DocumentConverter;
use image::DynamicImage;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// The three collaborators extraction is delegated to.
#[derive(Clone)]
pub struct ExtractionBackends {
    pub converter: Arc<dyn DocumentConverter>,
    pub rasterizer: Arc<dyn PageRasterizer>,
    pub ocr: Arc<dyn OcrEngine>,
}

/// Turns a file into raw text.
#[derive(Clone)]
pub struct Extractor {
    backends: ExtractionBackends,
    config: PipelineConfig,
}

impl Extractor {
    pub fn new(config: PipelineConfig, backends: ExtractionBackends) -> Self {
        Self { backends, config }
    }

    /// Extract text from `path`, dispatching on its extension.
    pub async fn extract(&self, path: &Path) -> Result<ExtractionResult, DocQaError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();
        self.extract_with_extension(path, ext).await
    }

    /// Extract text from `path`, treating it as a document of type `extension`.
    ///
    /// The extension is passed separately because uploads are often staged
    /// under names that do not carry the original one.
    pub async fn extract_with_extension(
        &self,
        path: &Path,
        extension: &str,
    ) -> Result<ExtractionResult, DocQaError> {
        let start = Instant::now();
        let kind = DocumentKind::from_extension(extension);
        info!("Extracting {} as {:?}", path.display(), kind);

        if let Some(ref obs) = self.config.observer {
            obs.on_stage_start(Stage::Extract);
        }

        let result = self
            .extract_kind(path, &kind)
            .await
            .map(|(text, method, ocr_pages)| ExtractionResult {
                text,
                method,
                ocr_pages,
                duration_ms: start.elapsed().as_millis() as u64,
            });

        if let Some(ref obs) = self.config.observer {
            match &result {
                Ok(r) => obs.on_stage_complete(Stage::Extract, r.char_count()),
                Err(e) => obs.on_stage_error(Stage::Extract, &e.to_string()),
            }
        }

        if let Ok(ref r) = result {
            info!(
                "Extracted {} chars via {:?} in {}ms",
                r.char_count(),
                r.method,
                r.duration_ms
            );
        }
        result
    }

    async fn extract_kind(
        &self,
        path: &Path,
        kind: &DocumentKind,
    ) -> Result<(String, ExtractionMethod, usize), DocQaError> {
        if *kind == DocumentKind::PlainText {
            let text = read_plain_text(path).await?;
            return non_empty(text, path).map(|t| (t, ExtractionMethod::PlainText, 0));
        }

        // ── Structured path ──────────────────────────────────────────────
        let reason = match self.backends.converter.convert(path, kind).await {
            Ok(text) => {
                let text = clean_extracted_text(&text);
                if !text.is_empty() {
                    debug!("Structured conversion produced {} chars", text.len());
                    return Ok((text, ExtractionMethod::Structured, 0));
                }
                "structured conversion returned no text".to_string()
            }
            Err(e) => format!("structured conversion failed: {e}"),
        };

        // ── OCR fallback ─────────────────────────────────────────────────
        match kind {
            DocumentKind::Other(ext) => {
                debug!("{}; no OCR path for .{}", reason, ext);
                return Err(DocQaError::UnsupportedFormat {
                    extension: ext.clone(),
                });
            }
            DocumentKind::Image => debug!("{}; falling back to OCR", reason),
            _ => warn!("{}; falling back to OCR", reason),
        }
        if let Some(ref obs) = self.config.observer {
            obs.on_ocr_fallback(&reason);
        }

        let images = match kind {
            DocumentKind::Pdf => {
                self.backends
                    .rasterizer
                    .render_pages(path, self.config.dpi)
                    .await?
            }
            DocumentKind::Image => vec![open_image(path).await?],
            DocumentKind::PlainText | DocumentKind::Other(_) => {
                return Err(DocQaError::Internal(format!("{:?} reached the OCR fallback", kind)))
            }
        };

        let pages = images.len();
        let text = self.recognize_pages(&images).await?;
        non_empty(text, path).map(|t| (t, ExtractionMethod::Ocr, pages))
    }

    /// OCR each page in order; page texts are joined with a line break.
    async fn recognize_pages(&self, images: &[DynamicImage]) -> Result<String, DocQaError> {
        let total = images.len();
        let mut texts = Vec::with_capacity(total);

        for (idx, image) in images.iter().enumerate() {
            let page_num = idx + 1;
            if let Some(ref obs) = self.config.observer {
                obs.on_ocr_page(page_num, total);
            }
            let text = self
                .backends
                .ocr
                .recognize(image, &self.config.ocr_language)
                .await?;
            debug!("OCR page {}/{}: {} chars", page_num, total, text.len());
            texts.push(clean_extracted_text(&text));
        }

        Ok(texts.join("\n"))
    }
}

/// Read a file as UTF-8, replacing invalid sequences and dropping a BOM.
async fn read_plain_text(path: &Path) -> Result<String, DocQaError> {
    let bytes = tokio::fs::read(path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => DocQaError::FileNotFound {
            path: path.to_path_buf(),
        },
        std::io::ErrorKind::PermissionDenied => DocQaError::PermissionDenied {
            path: path.to_path_buf(),
        },
        _ => DocQaError::Internal(format!("reading '{}': {}", path.display(), e)),
    })?;
    Ok(clean_extracted_text(&String::from_utf8_lossy(&bytes)))
}

/// Decode a single raster image off the async workers.
async fn open_image(path: &Path) -> Result<DynamicImage, DocQaError> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || image::open(&path))
        .await
        .map_err(|e| DocQaError::Internal(format!("Image decode task panicked: {}", e)))?
        .map_err(|e| DocQaError::external("image", e))
}

fn non_empty(text: String, path: &Path) -> Result<String, DocQaError> {
    if text.trim().is_empty() {
        Err(DocQaError::ExtractionEmpty {
            path: path.to_path_buf(),
        })
    } else {
        Ok(text)
    }
}
