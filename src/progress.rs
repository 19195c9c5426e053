//! Progress-observer trait for pipeline stage events.
//!
//! Inject an [`Arc<dyn PipelineObserver>`] via
//! [`crate::config::PipelineConfigBuilder::observer`] to receive events as
//! each stage runs. The CLI forwards them to an `indicatif` spinner; a web
//! front end could forward them to a websocket.
//!
//! # Example
//!
//! ```rust
//! use edgequake_docqa::{PipelineConfig, PipelineObserver, Stage};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct PageCounter {
//!     pages: AtomicUsize,
//! }
//!
//! impl PipelineObserver for PageCounter {
//!     fn on_ocr_page(&self, page_num: usize, total_pages: usize) {
//!         self.pages.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("OCR page {}/{}", page_num, total_pages);
//!     }
//! }
//!
//! let config = PipelineConfig::builder()
//!     .observer(Arc::new(PageCounter { pages: AtomicUsize::new(0) }))
//!     .build()
//!     .unwrap();
//! ```

use crate::error::Stage;
use std::sync::Arc;

/// Called by the pipeline as it runs each stage.
///
/// All methods have default no-op implementations so callers only override
/// what they care about.
pub trait PipelineObserver: Send + Sync {
    /// Called when a stage begins.
    fn on_stage_start(&self, stage: Stage) {
        let _ = stage;
    }

    /// Called when extraction falls back to OCR.
    ///
    /// # Arguments
    /// * `reason`: why the structured path was abandoned
    fn on_ocr_fallback(&self, reason: &str) {
        let _ = reason;
    }

    /// Called before each page is sent to the OCR engine.
    ///
    /// # Arguments
    /// * `page_num`: 1-indexed page number
    /// * `total_pages`: pages that will be recognised
    fn on_ocr_page(&self, page_num: usize, total_pages: usize) {
        let _ = (page_num, total_pages);
    }

    /// Called when a stage succeeds.
    ///
    /// # Arguments
    /// * `chars`: character count of the stage output
    fn on_stage_complete(&self, stage: Stage, chars: usize) {
        let _ = (stage, chars);
    }

    /// Called when a stage fails.
    fn on_stage_error(&self, stage: Stage, error: &str) {
        let _ = (stage, error);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopObserver;

impl PipelineObserver for NoopObserver {}

/// Convenience alias matching the type stored in [`crate::config::PipelineConfig`].
pub type ProgressObserver = Arc<dyn PipelineObserver>;
