//! Image encoding for the OCR backends.
//!
//! Both backends want PNG: tesseract reads it from a temp file, the vision
//! backend sends it base64-wrapped in the request body. PNG is lossless, and
//! JPEG artefacts around glyph edges cost recognition accuracy.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

/// Encode an image as PNG bytes.
pub fn encode_png(img: &DynamicImage) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
    debug!(
        "Encoded {}x{} image → {} bytes PNG",
        img.width(),
        img.height(),
        buf.len()
    );
    Ok(buf)
}

/// Encode a page as a base64 PNG ready for a vision API.
///
/// `detail: "high"` lets GPT-4-class models tile the image instead of
/// downscaling it to a single 512 px overview, which loses small print.
pub fn encode_page(img: &DynamicImage) -> Result<ImageData, image::ImageError> {
    let b64 = STANDARD.encode(encode_png(img)?);
    Ok(ImageData::new(b64, "image/png").with_detail("high"))
}
