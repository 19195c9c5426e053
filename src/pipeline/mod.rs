//! Pipeline stages for document question answering.
//!
//! Each submodule implements exactly one step, and every external system sits
//! behind a trait so stages can be tested with recording fakes.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ extract ──────────────────────────▶ reorganize ──▶ answer
//! (path/URL/ (structured ─▶ render ─▶ ocr)        (LLM)        (LLM)
//!  upload)    + postprocess                      + postprocess
//! ```
//!
//! 1. [`input`]: resolve a path, URL or upload to a local file + kind
//! 2. [`structured`]: [`structured::DocumentConverter`]: text layer via pdfium
//! 3. [`render`]: [`render::PageRasterizer`]: pages → images via pdfium
//! 4. [`ocr`]: [`ocr::OcrEngine`]: tesseract CLI or a vision LLM
//! 5. [`extract`]: the decision order tying 2–4 together
//! 6. [`llm`]: [`llm::ChatModel`]: single-shot chat over edgequake-llm
//! 7. [`reorganize`] / [`answer`]: the two LLM stages
//! 8. [`postprocess`]: whitespace and fence cleanup

pub mod answer;
pub mod encode;
pub mod extract;
pub mod input;
pub mod llm;
pub mod ocr;
pub mod postprocess;
pub mod render;
pub mod reorganize;
pub mod structured;
