//! Error types for the edgequake-docqa library.
//!
//! Two layers reflect two distinct questions a caller asks:
//!
//! * [`DocQaError`]: *what* went wrong. Every pipeline stage returns it as
//!   `Err(DocQaError)`; external-call failures (LLM, OCR, pdfium) are caught
//!   inside the stage and converted, never propagated as panics.
//!
//! * [`StageFailure`]: *where* it went wrong. Returned by
//!   [`crate::session::Session`] so a UI can print "reorganize failed: …"
//!   while the session stays in its last stable state.
//!
//! [`DocQaError::kind`] collapses the detailed variants onto the four-way
//! taxonomy callers actually branch on: unsupported input, nothing found,
//! backend unreachable, bad arguments.

use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// All errors returned by the edgequake-docqa library.
#[derive(Debug, Clone, Error)]
pub enum DocQaError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("File not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// Neither the structured converter nor OCR can read this extension.
    #[error("Unsupported file format: '.{extension}'\nSupported: pdf, txt, md, jpg, jpeg, png, bmp, tiff")]
    UnsupportedFormat { extension: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    // ── Extraction errors ─────────────────────────────────────────────────
    /// Structured conversion and OCR both produced no text.
    #[error("No text could be extracted from '{path}' (structured conversion and OCR were both empty)")]
    ExtractionEmpty { path: PathBuf },

    // ── Backend errors ────────────────────────────────────────────────────
    /// An external backend (LLM, OCR engine, pdfium) failed.
    #[error("{service} error: {detail}")]
    ExternalService { service: String, detail: String },

    /// An external call did not finish within its timeout.
    #[error("{service} call timed out after {secs}s")]
    Timeout { service: String, secs: u64 },

    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Install libpdfium and either place it on the library search path or\n\
pass --pdfium-lib /path/to/libpdfium (env: DOCQA_PDFIUM_LIB).\n"
    )]
    PdfiumBindingFailed(String),

    // ── Caller errors ─────────────────────────────────────────────────────
    /// Empty question, empty context, or a stage invoked out of order.
    #[error("Invalid input: {reason}")]
    InvalidInput { reason: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the output Markdown file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: Arc<std::io::Error>,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse classification of a [`DocQaError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    UnsupportedFormat,
    ExtractionEmpty,
    ExternalService,
    InvalidInput,
    Other,
}

impl DocQaError {
    pub(crate) fn invalid_input(reason: impl Into<String>) -> Self {
        DocQaError::InvalidInput {
            reason: reason.into(),
        }
    }

    pub(crate) fn external(service: &str, detail: impl fmt::Display) -> Self {
        DocQaError::ExternalService {
            service: service.to_string(),
            detail: detail.to_string(),
        }
    }

    /// Map this error onto the caller-facing taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            DocQaError::UnsupportedFormat { .. } => ErrorKind::UnsupportedFormat,
            DocQaError::ExtractionEmpty { .. } => ErrorKind::ExtractionEmpty,
            DocQaError::ExternalService { .. }
            | DocQaError::Timeout { .. }
            | DocQaError::ProviderNotConfigured { .. }
            | DocQaError::PdfiumBindingFailed(_)
            | DocQaError::DownloadFailed { .. }
            | DocQaError::DownloadTimeout { .. } => ErrorKind::ExternalService,
            DocQaError::InvalidInput { .. } => ErrorKind::InvalidInput,
            _ => ErrorKind::Other,
        }
    }
}

/// The pipeline stage a [`StageFailure`] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Stage {
    Extract,
    Reorganize,
    Answer,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Extract => "extract",
            Stage::Reorganize => "reorganize",
            Stage::Answer => "answer",
        })
    }
}

/// A failed session stage: which stage, and why.
///
/// The session that produced it is back in its previous stable state.
#[derive(Debug, Clone, Error)]
#[error("{stage} failed: {error}")]
pub struct StageFailure {
    pub stage: Stage,
    #[source]
    pub error: DocQaError,
}

impl StageFailure {
    pub fn kind(&self) -> ErrorKind {
        self.error.kind()
    }
}
