//! # edgequake-docqa
//!
//! Ask questions about a document: extract its text, let an LLM reorganize
//! it into Markdown, then answer questions with the whole document as
//! context.
//!
//! ## Pipeline Overview
//!
//! ```text
//! document (.pdf / .png / .jpg / .bmp / .tiff / .txt, path, URL or upload)
//!  │
//!  ├─ 1. Extract     plain text │ pdfium text layer │ render + OCR fallback
//!  ├─ 2. Reorganize  one LLM call: raw text → Markdown, content unchanged
//!  └─ 3. Answer      one LLM call per question, full text as context
//! ```
//!
//! Each stage is an independent call on [`DocPipeline`]. A [`Session`]
//! strings them together for one user, keeps the intermediate artifacts and
//! reports failures per stage while staying usable.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_docqa::{DocPipeline, PipelineConfig, Session};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from OPENAI_API_KEY / EDGEQUAKE_LLM_PROVIDER
//!     let pipeline = Arc::new(DocPipeline::from_config(PipelineConfig::default())?);
//!     let mut session = Session::new(pipeline);
//!
//!     session.extract("scan.pdf").await?;
//!     session.reorganize().await?;
//!     let qa = session.ask("Who signed the contract?").await?;
//!     println!("{}", qa.answer);
//!     Ok(())
//! }
//! ```
//!
//! ## External tools
//!
//! * **pdfium**: shared library for PDF text and rendering. Found on the
//!   library search path or set with [`PipelineConfigBuilder::pdfium_library`].
//! * **tesseract**: OCR executable, only needed for scanned documents and
//!   images. Use [`OcrBackend::Vision`] to OCR with the LLM instead.
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `docqa` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-docqa = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod engine;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod session;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{OcrBackend, PipelineConfig, PipelineConfigBuilder, DEFAULT_MODEL};
pub use engine::{offline_extractor, write_markdown, DocPipeline};
pub use error::{DocQaError, ErrorKind, Stage, StageFailure};
pub use output::{ExtractionMethod, ExtractionResult, OrganizedText, QaExchange};
pub use pipeline::extract::{ExtractionBackends, Extractor};
pub use pipeline::input::DocumentKind;
pub use pipeline::llm::{ChatModel, Completion};
pub use pipeline::ocr::OcrEngine;
pub use pipeline::render::PageRasterizer;
pub use pipeline::structured::DocumentConverter;
pub use progress::{NoopObserver, PipelineObserver, ProgressObserver};
pub use session::{Session, SessionState, DEFAULT_EXPORT_NAME};
