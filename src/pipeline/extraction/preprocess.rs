//! Image clean-up ahead of Tesseract.
//!
//! Grayscale, upscale small scans, boost contrast, sharpen, then binarize
//! around a threshold just below the mean luminance.

use std::io::Cursor;

use image::imageops::{self, FilterType};
use image::{DynamicImage, GenericImageView, GrayImage, ImageFormat, Luma};
use tracing::debug;

use super::ExtractionError;

/// Scans smaller than this on either side are upscaled.
const MIN_OCR_DIMENSION: u32 = 1000;
/// Upscaling never produces a side longer than this.
const MAX_OCR_DIMENSION: u32 = 5000;
/// Percentage passed to `imageops::contrast`.
const CONTRAST_BOOST: f32 = 50.0;
/// Pixels brighter than `mean * THRESHOLD_FACTOR` become white.
const THRESHOLD_FACTOR: f32 = 0.9;

/// Result of preparing an image for OCR.
#[derive(Debug, Clone)]
pub struct PreparedImage {
    pub png: Vec<u8>,
    pub original_width: u32,
    pub original_height: u32,
}

/// Decode, clean up and re-encode an image as PNG for Tesseract.
pub fn prepare_for_ocr(bytes: &[u8]) -> Result<PreparedImage, ExtractionError> {
    let img = image::load_from_memory(bytes)
        .map_err(|e| ExtractionError::ImageProcessing(e.to_string()))?;
    let (original_width, original_height) = img.dimensions();
    if original_width == 0 || original_height == 0 {
        return Err(ExtractionError::ImageProcessing("image has zero size".into()));
    }

    let gray = upscale(img.to_luma8());
    let gray = imageops::contrast(&gray, CONTRAST_BOOST);
    let gray = imageops::unsharpen(&gray, 1.0, 2);
    let gray = binarize(gray);
    debug!(
        original_width,
        original_height,
        width = gray.width(),
        height = gray.height(),
        "Image prepared for OCR"
    );

    Ok(PreparedImage {
        png: encode_png(gray)?,
        original_width,
        original_height,
    })
}

fn upscale(img: GrayImage) -> GrayImage {
    let (w, h) = img.dimensions();
    if w >= MIN_OCR_DIMENSION && h >= MIN_OCR_DIMENSION {
        return img;
    }
    let wanted = (MIN_OCR_DIMENSION as f32 / w as f32).max(MIN_OCR_DIMENSION as f32 / h as f32);
    let ceiling = MAX_OCR_DIMENSION as f32 / w.max(h) as f32;
    let scale = wanted.min(ceiling);
    if scale <= 1.0 {
        return img;
    }
    let nw = ((w as f32 * scale) as u32).max(1);
    let nh = ((h as f32 * scale) as u32).max(1);
    imageops::resize(&img, nw, nh, FilterType::Lanczos3)
}

/// Global threshold at a fraction of the mean luminance.
fn binarize(mut img: GrayImage) -> GrayImage {
    let pixels = (img.width() as u64 * img.height() as u64).max(1);
    let sum: u64 = img.pixels().map(|p| u64::from(p.0[0])).sum();
    let threshold = (sum as f32 / pixels as f32) * THRESHOLD_FACTOR;
    for p in img.pixels_mut() {
        *p = if f32::from(p.0[0]) > threshold {
            Luma([255])
        } else {
            Luma([0])
        };
    }
    img
}

fn encode_png(img: GrayImage) -> Result<Vec<u8>, ExtractionError> {
    let mut buf = Vec::new();
    DynamicImage::ImageLuma8(img)
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .map_err(|e| ExtractionError::ImageProcessing(e.to_string()))?;
    Ok(buf)
}
