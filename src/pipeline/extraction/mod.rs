pub mod types;
pub mod preprocess;
pub mod pdf;
pub mod ocr;
pub mod processor;

pub use types::*;
pub use pdf::*;
pub use ocr::*;
pub use processor::*;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("OCR not available. Please install Tesseract to process images.")]
    OcrUnavailable,

    #[error("OCR processing failed: {0}")]
    OcrProcessing(String),

    #[error("PDF page rendering failed: {0}")]
    RenderFailed(String),

    #[error("PDF parsing failed: {0}")]
    PdfParsing(String),

    #[error("Image processing error: {0}")]
    ImageProcessing(String),

    #[error("Extraction task failed: {0}")]
    Task(String),
}
