//! Values produced by the pipeline stages.
//!
//! None of these carry identity: they are plain values handed from one stage
//! to the next and, in the CLI, serialised to JSON with `--json`.

use serde::Serialize;

/// How the text of a document was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExtractionMethod {
    /// File bytes read as UTF-8; no conversion, no OCR.
    PlainText,
    /// Format-aware conversion (PDF text layer).
    Structured,
    /// Rasterised and recognised by the OCR engine.
    Ocr,
}

/// Text extracted from one document.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractionResult {
    /// Extracted text; never blank when returned by the extractor.
    pub text: String,
    pub method: ExtractionMethod,
    /// Pages sent through OCR (0 unless `method == Ocr`).
    pub ocr_pages: usize,
    pub duration_ms: u64,
}

impl ExtractionResult {
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }

    pub fn char_count(&self) -> usize {
        self.text.chars().count()
    }
}

/// Markdown produced by the reorganize stage.
#[derive(Debug, Clone, Serialize)]
pub struct OrganizedText {
    pub markdown: String,
    pub input_tokens: usize,
    pub output_tokens: usize,
    pub duration_ms: u64,
}

/// One answered question.
#[derive(Debug, Clone, Serialize)]
pub struct QaExchange {
    pub question: String,
    pub answer: String,
    pub input_tokens: usize,
    pub output_tokens: usize,
    pub duration_ms: u64,
}
