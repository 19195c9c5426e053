//! Structured conversion: read the text a document already carries.
//!
//! For PDFs this is the embedded text layer. Scanned PDFs have none (or only
//! whitespace), which the extractor treats as the signal to fall back to OCR.

use crate::error::DocQaError;
use crate::pipeline::input::DocumentKind;
use crate::pipeline::render::{bind_pdfium, load_document};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Format-aware document-to-text conversion.
///
/// Receives every input except plain text, including extensions the crate
/// has no OCR path for. May fail for any format it does not understand; the
/// extractor then falls back to OCR, or reports the format as unsupported.
#[async_trait]
pub trait DocumentConverter: Send + Sync {
    async fn convert(&self, path: &Path, kind: &DocumentKind) -> Result<String, DocQaError>;
}

/// [`DocumentConverter`] reading the PDF text layer through pdfium.
#[derive(Debug, Clone, Default)]
pub struct PdfiumTextConverter {
    library: Option<PathBuf>,
}

impl PdfiumTextConverter {
    pub fn new(library: Option<PathBuf>) -> Self {
        Self { library }
    }
}

#[async_trait]
impl DocumentConverter for PdfiumTextConverter {
    async fn convert(&self, path: &Path, kind: &DocumentKind) -> Result<String, DocQaError> {
        if *kind != DocumentKind::Pdf {
            return Err(DocQaError::external(
                "converter",
                format!("no structured converter for {:?} input", kind),
            ));
        }

        let path = path.to_path_buf();
        let library = self.library.clone();
        tokio::task::spawn_blocking(move || pdf_text_blocking(&path, library.as_deref()))
            .await
            .map_err(|e| DocQaError::Internal(format!("Text extraction task panicked: {}", e)))?
    }
}

/// Blocking implementation: one text block per page, joined by a line break.
fn pdf_text_blocking(path: &Path, library: Option<&Path>) -> Result<String, DocQaError> {
    let pdfium = bind_pdfium(library)?;
    let document = load_document(&pdfium, path)?;

    let mut pages = Vec::new();
    for (idx, page) in document.pages().iter().enumerate() {
        let text = page
            .text()
            .map_err(|e| {
                DocQaError::external("pdfium", format!("page {} text: {:?}", idx + 1, e))
            })?
            .all();
        debug!("Page {}: {} chars in text layer", idx + 1, text.len());
        pages.push(text);
    }

    Ok(pages.join("\n"))
}
