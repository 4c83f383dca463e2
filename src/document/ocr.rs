//! Optional OCR fallback for image-based PDF pages.
//!
//! Rasterize with `pdfium-render`, recognize with `oar-ocr`, both optional
//! dependencies pulled in only by the `ocr` feature. With the feature
//! compiled out, any document that would need OCR fails with
//! `OcrUnavailable` rather than silently skipping recognition.

use crate::error::{CoreError, Result};

#[cfg(feature = "ocr")]
pub fn ocr_page(pdf_bytes: &[u8], page_number: u32, dpi: u32) -> Result<String> {
    use pdfium_render::prelude::*;

    let pdfium = Pdfium::default();
    let document = pdfium
        .load_pdf_from_byte_slice(pdf_bytes, None)
        .map_err(|e| CoreError::OcrUnavailable(format!("failed to bind pdfium: {e}")))?;

    let page_index = page_number.saturating_sub(1) as u16;
    let page = document
        .pages()
        .get(page_index)
        .map_err(|e| CoreError::OcrUnavailable(format!("page {page_number} not found: {e}")))?;

    let width_pt = page.width().value.max(1.0);
    let target_width = ((width_pt / 72.0) * dpi as f32).round().max(256.0) as i32;

    let render_config = PdfRenderConfig::new()
        .set_target_width(target_width)
        .rotate_if_landscape(PdfPageRenderRotation::None, true);

    let image = page
        .render_with_config(&render_config)
        .map_err(|e| CoreError::OcrUnavailable(format!("rasterize failed: {e}")))?
        .as_image()
        .into_rgb8();

    recognize(image)
}

#[cfg(feature = "ocr")]
fn recognize(image: image::RgbImage) -> Result<String> {
    // oar-ocr's detector+recognizer pipeline; a production deployment
    // would load pinned model weights once at startup rather than per call.
    let engine = oar_ocr::oarocr::OAROCRBuilder::default()
        .build()
        .map_err(|e| CoreError::OcrUnavailable(format!("failed to build OCR engine: {e}")))?;

    let mut results = engine
        .predict(vec![image])
        .map_err(|e| CoreError::OcrUnavailable(format!("OCR recognition failed: {e}")))?;

    let result = results
        .pop()
        .ok_or_else(|| CoreError::OcrUnavailable("OCR produced no result".to_string()))?;

    let mut lines = Vec::new();
    for region in result.text_regions {
        if let Some(text) = region.text {
            let text = text.trim();
            if !text.is_empty() {
                lines.push(text.to_string());
            }
        }
    }

    Ok(lines.join("\n"))
}

#[cfg(not(feature = "ocr"))]
pub fn ocr_page(_pdf_bytes: &[u8], page_number: u32, _dpi: u32) -> Result<String> {
    Err(CoreError::OcrUnavailable(format!(
        "page {page_number} requires OCR but the `ocr` feature is not compiled in"
    )))
}
