//! PDF rasterisation for the OCR fallback, via pdfium.
//!
//! ## Why spawn_blocking?
//!
//! The `pdfium-render` crate wraps the pdfium C++ library, which uses
//! thread-local state internally and is not safe to call from async contexts.
//! `tokio::task::spawn_blocking` moves the work onto the blocking pool so the
//! runtime's worker threads keep serving other sessions while a page renders.
//!
//! ## DPI and the pixel cap
//!
//! tesseract is tuned for ~300 DPI input, so pages are scaled by `dpi / 72`
//! (PDF user space is 72 points per inch). `max_rendered_pixels` caps the
//! longest edge so an A0 poster does not allocate a 10k × 14k bitmap.

use crate::error::DocQaError;
use async_trait::async_trait;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Renders every page of a multi-page document to a raster image.
#[async_trait]
pub trait PageRasterizer: Send + Sync {
    /// Render all pages, in order, at `dpi`.
    async fn render_pages(&self, path: &Path, dpi: u32) -> Result<Vec<DynamicImage>, DocQaError>;
}

/// [`PageRasterizer`] backed by pdfium.
#[derive(Debug, Clone)]
pub struct PdfiumRasterizer {
    library: Option<PathBuf>,
    max_rendered_pixels: u32,
}

impl PdfiumRasterizer {
    pub fn new(library: Option<PathBuf>, max_rendered_pixels: u32) -> Self {
        Self {
            library,
            max_rendered_pixels,
        }
    }
}

#[async_trait]
impl PageRasterizer for PdfiumRasterizer {
    async fn render_pages(&self, path: &Path, dpi: u32) -> Result<Vec<DynamicImage>, DocQaError> {
        let path = path.to_path_buf();
        let library = self.library.clone();
        let max_pixels = self.max_rendered_pixels;

        tokio::task::spawn_blocking(move || {
            render_pages_blocking(&path, library.as_deref(), dpi, max_pixels)
        })
        .await
        .map_err(|e| DocQaError::Internal(format!("Render task panicked: {}", e)))?
    }
}

/// Bind to pdfium: an explicit library file or directory, else the system library.
pub(crate) fn bind_pdfium(library: Option<&Path>) -> Result<Pdfium, DocQaError> {
    let bindings = match library {
        Some(path) if path.is_dir() => {
            Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(path))
        }
        Some(path) => Pdfium::bind_to_library(path),
        None => Pdfium::bind_to_system_library(),
    }
    .map_err(|e| DocQaError::PdfiumBindingFailed(format!("{:?}", e)))?;

    Ok(Pdfium::new(bindings))
}

/// Open a document, mapping pdfium's error to a backend failure.
pub(crate) fn load_document<'a>(
    pdfium: &'a Pdfium,
    path: &Path,
) -> Result<PdfDocument<'a>, DocQaError> {
    pdfium
        .load_pdf_from_file(path, None)
        .map_err(|e| {
            DocQaError::external(
                "pdfium",
                format!("cannot open '{}': {:?}", path.display(), e),
            )
        })
}

/// Blocking implementation of page rendering.
fn render_pages_blocking(
    path: &Path,
    library: Option<&Path>,
    dpi: u32,
    max_pixels: u32,
) -> Result<Vec<DynamicImage>, DocQaError> {
    let pdfium = bind_pdfium(library)?;
    let document = load_document(&pdfium, path)?;

    let pages = document.pages();
    info!("PDF loaded for OCR: {} pages", pages.len());

    let render_config = PdfRenderConfig::new()
        .scale_page_by_factor(dpi as f32 / 72.0)
        .set_maximum_width(max_pixels as i32)
        .set_maximum_height(max_pixels as i32);

    let mut images = Vec::with_capacity(pages.len() as usize);

    for (idx, page) in pages.iter().enumerate() {
        let bitmap = page.render_with_config(&render_config).map_err(|e| {
            DocQaError::external(
                "pdfium",
                format!("page {} rasterisation failed: {:?}", idx + 1, e),
            )
        })?;

        let image = bitmap.as_image();
        debug!(
            "Rendered page {} → {}x{} px",
            idx + 1,
            image.width(),
            image.height()
        );
        images.push(image);
    }

    Ok(images)
}
