use serde::Serialize;

use super::ExtractionError;

/// Tesseract page segmentation mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageSegMode {
    /// `--psm 3`: fully automatic layout analysis.
    Auto,
    /// `--psm 6`: assume a single uniform block of text.
    SingleBlock,
}

impl PageSegMode {
    pub fn as_arg(&self) -> &'static str {
        match self {
            Self::Auto => "3",
            Self::SingleBlock => "6",
        }
    }
}

/// Text and bookkeeping produced for one uploaded document.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessedDocument {
    pub extracted_text: String,
    pub total_pages: usize,
    pub word_count: usize,
    pub processing_notes: Vec<String>,
    /// Seconds spent extracting.
    pub processing_time: f64,
}

/// OCR engine abstraction (allows mocking for tests)
pub trait OcrEngine: Send + Sync {
    /// Whether the engine can actually run on this host.
    fn is_available(&self) -> bool;

    /// OCR an already pre-processed PNG.
    fn ocr_image(&self, png_bytes: &[u8], psm: PageSegMode) -> Result<String, ExtractionError>;

    /// Rasterize one PDF page (1-based) and OCR it.
    fn ocr_pdf_page(&self, pdf_bytes: &[u8], page_number: usize) -> Result<String, ExtractionError>;
}

/// PDF text extraction abstraction
pub trait PdfExtractor: Send + Sync {
    /// Native text per page, in page order.
    fn extract_pages(&self, pdf_bytes: &[u8]) -> Result<Vec<String>, ExtractionError>;
}
