use std::sync::Arc;
use std::time::Instant;

use super::preprocess;
use super::types::{OcrEngine, PageSegMode, PdfExtractor, ProcessedDocument};
use super::ExtractionError;
use crate::models::FileKind;

/// Native text shorter than this marks a page as scanned.
pub const MIN_PAGE_CHARS: usize = 50;

const NO_TEXT_PLACEHOLDER: &str =
    "[No text could be extracted from this image. Try improving image quality or contrast.]";

/// Turns an uploaded PDF or image into plain text.
pub struct DocumentProcessor {
    pdf: Box<dyn PdfExtractor>,
    ocr: Arc<dyn OcrEngine>,
}

impl DocumentProcessor {
    pub fn new(pdf: Box<dyn PdfExtractor>, ocr: Arc<dyn OcrEngine>) -> Self {
        tracing::info!(ocr_available = ocr.is_available(), "Document processor initialized");
        Self { pdf, ocr }
    }

    pub fn ocr_available(&self) -> bool {
        self.ocr.is_available()
    }

    /// Extract on the blocking pool; PDF parsing and OCR are CPU and
    /// subprocess bound.
    pub async fn process(
        self: &Arc<Self>,
        bytes: Vec<u8>,
        kind: FileKind,
    ) -> Result<ProcessedDocument, ExtractionError> {
        let this = Arc::clone(self);
        tokio::task::spawn_blocking(move || this.process_blocking(&bytes, kind))
            .await
            .map_err(|e| ExtractionError::Task(e.to_string()))?
    }

    pub fn process_blocking(
        &self,
        bytes: &[u8],
        kind: FileKind,
    ) -> Result<ProcessedDocument, ExtractionError> {
        let started = Instant::now();
        let mut doc = match kind {
            FileKind::Pdf => self.process_pdf(bytes)?,
            FileKind::Image => self.process_image(bytes)?,
        };
        doc.processing_time = started.elapsed().as_secs_f64();
        tracing::info!(
            kind = kind.as_str(),
            pages = doc.total_pages,
            words = doc.word_count,
            processing_time = doc.processing_time,
            "Document processed"
        );
        Ok(doc)
    }

    fn process_pdf(&self, bytes: &[u8]) -> Result<ProcessedDocument, ExtractionError> {
        let pages = self.pdf.extract_pages(bytes)?;
        let total_pages = pages.len();
        let ocr_available = self.ocr.is_available();
        let mut ocr_pages = 0usize;
        let mut missing_pages = 0usize;
        let mut text = String::new();

        for (index, native) in pages.into_iter().enumerate() {
            let page_number = index + 1;
            let mut page_text = native;

            if page_text.trim().chars().count() < MIN_PAGE_CHARS {
                let ocr_outcome = if ocr_available {
                    tracing::debug!(page_number, "Little native text, attempting OCR");
                    self.ocr.ocr_pdf_page(bytes, page_number)
                } else {
                    Err(ExtractionError::OcrUnavailable)
                };
                match ocr_outcome {
                    Ok(ocr_text) if ocr_text.trim().len() > page_text.trim().len() => {
                        page_text = ocr_text;
                        ocr_pages += 1;
                    }
                    Ok(_) => {}
                    // Includes a missing page renderer: the page stays unread.
                    Err(e) => {
                        tracing::warn!(page_number, error = %e, "No usable text for page");
                        if !ocr_available || page_text.trim().is_empty() {
                            page_text = format!(
                                "[Page {page_number}: Text extraction failed - OCR not available]"
                            );
                        }
                        missing_pages += 1;
                    }
                }
            }

            text.push_str(&format!("\n--- Page {page_number} ---\n{page_text}\n"));
        }

        let mut processing_notes = Vec::new();
        if ocr_pages > 0 {
            processing_notes.push(format!("OCR applied to {ocr_pages} pages"));
        }
        if missing_pages > 0 {
            processing_notes.push("OCR unavailable - some text may be missing".to_string());
        }

        let extracted_text = text.trim().to_string();
        Ok(ProcessedDocument {
            word_count: extracted_text.split_whitespace().count(),
            extracted_text,
            total_pages,
            processing_notes,
            processing_time: 0.0,
        })
    }

    fn process_image(&self, bytes: &[u8]) -> Result<ProcessedDocument, ExtractionError> {
        if !self.ocr.is_available() {
            return Err(ExtractionError::OcrUnavailable);
        }

        let prepared = preprocess::prepare_for_ocr(bytes)?;
        let mut text = self.ocr.ocr_image(&prepared.png, PageSegMode::SingleBlock)?;
        if text.trim().is_empty() {
            tracing::warn!("No text with single-block segmentation, retrying with automatic layout");
            text = self.ocr.ocr_image(&prepared.png, PageSegMode::Auto)?;
        }

        let (extracted_text, processing_notes) = if text.trim().is_empty() {
            tracing::warn!("No text extracted from image");
            (
                NO_TEXT_PLACEHOLDER.to_string(),
                vec![
                    "No text detected in image".to_string(),
                    "Tips: Ensure text is clear, high contrast, and properly oriented".to_string(),
                ],
            )
        } else {
            (
                text.trim().to_string(),
                vec![format!(
                    "OCR processed image: {}x{}px",
                    prepared.original_width, prepared.original_height
                )],
            )
        };

        Ok(ProcessedDocument {
            word_count: extracted_text.split_whitespace().count(),
            extracted_text,
            total_pages: 1,
            processing_notes,
            processing_time: 0.0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::extraction::ocr::MockOcrEngine;
    use crate::pipeline::extraction::pdf::test_support::make_test_pdf;
    use crate::pipeline::extraction::pdf::PdfTextExtractor;
    use crate::pipeline::extraction::preprocess::test_support::make_test_png;

    const LONG_PAGE: &str = "This Services Agreement is entered into by Acme Corporation and Beta Limited";

    fn processor(ocr: MockOcrEngine) -> (DocumentProcessor, Arc<MockOcrEngine>) {
        let ocr = Arc::new(ocr);
        (
            DocumentProcessor::new(Box::new(PdfTextExtractor), ocr.clone()),
            ocr,
        )
    }

    #[test]
    fn digital_pdf_pages_joined_with_markers() {
        let (p, ocr) = processor(MockOcrEngine::new("unused"));
        let pdf = make_test_pdf(&[LONG_PAGE, LONG_PAGE]);
        let doc = p.process_blocking(&pdf, FileKind::Pdf).unwrap();

        assert_eq!(doc.total_pages, 2);
        assert!(doc.extracted_text.starts_with("--- Page 1 ---"));
        assert!(doc.extracted_text.contains("--- Page 2 ---"));
        assert!(doc.word_count > 10);
        assert!(doc.processing_notes.is_empty());
        assert_eq!(ocr.calls(), 0);
    }

    #[test]
    fn sparse_page_replaced_by_longer_ocr_text() {
        let ocr_text = "Scanned signature page: signed by both parties on the first of March.";
        let (p, ocr) = processor(MockOcrEngine::new(ocr_text));
        let pdf = make_test_pdf(&[LONG_PAGE, ""]);
        let doc = p.process_blocking(&pdf, FileKind::Pdf).unwrap();

        assert_eq!(ocr.calls(), 1);
        assert!(doc.extracted_text.contains(ocr_text));
        assert_eq!(doc.processing_notes, vec!["OCR applied to 1 pages"]);
    }

    #[test]
    fn shorter_ocr_text_is_ignored() {
        let (p, _ocr) = processor(MockOcrEngine::new(""));
        let pdf = make_test_pdf(&["Short"]);
        let doc = p.process_blocking(&pdf, FileKind::Pdf).unwrap();
        assert!(doc.extracted_text.contains("Short"));
        assert!(doc.processing_notes.is_empty());
    }

    #[test]
    fn sparse_page_without_ocr_gets_placeholder() {
        let (p, _ocr) = processor(MockOcrEngine::unavailable());
        let pdf = make_test_pdf(&[LONG_PAGE, ""]);
        let doc = p.process_blocking(&pdf, FileKind::Pdf).unwrap();

        assert!(doc
            .extracted_text
            .contains("[Page 2: Text extraction failed - OCR not available]"));
        assert_eq!(
            doc.processing_notes,
            vec!["OCR unavailable - some text may be missing"]
        );
    }

    #[test]
    fn sparse_page_without_renderer_gets_placeholder_and_note() {
        let (p, ocr) = processor(MockOcrEngine::new("unused").without_renderer());
        let pdf = make_test_pdf(&[LONG_PAGE, "", "p.3"]);
        let doc = p.process_blocking(&pdf, FileKind::Pdf).unwrap();

        assert_eq!(ocr.calls(), 2);
        assert!(doc
            .extracted_text
            .contains("[Page 2: Text extraction failed - OCR not available]"));
        // Sparse native text is kept rather than overwritten.
        assert!(doc.extracted_text.contains("p.3"));
        assert_eq!(
            doc.processing_notes,
            vec!["OCR unavailable - some text may be missing"]
        );
    }

    #[test]
    fn broken_pdf_is_an_error() {
        let (p, _ocr) = processor(MockOcrEngine::new(""));
        assert!(matches!(
            p.process_blocking(b"%PDF-1.4 truncated", FileKind::Pdf),
            Err(ExtractionError::PdfParsing(_))
        ));
    }

    #[test]
    fn image_requires_ocr() {
        let (p, _ocr) = processor(MockOcrEngine::unavailable());
        assert!(matches!(
            p.process_blocking(&make_test_png(50, 50), FileKind::Image),
            Err(ExtractionError::OcrUnavailable)
        ));
    }

    #[test]
    fn image_ocr_retries_with_auto_layout() {
        let ocr = MockOcrEngine::new("unused").with_script(&["", "Notice of termination"]);
        let (p, ocr) = processor(ocr);
        let doc = p.process_blocking(&make_test_png(120, 80), FileKind::Image).unwrap();

        assert_eq!(ocr.calls(), 2);
        assert_eq!(doc.extracted_text, "Notice of termination");
        assert_eq!(doc.total_pages, 1);
        assert_eq!(doc.word_count, 3);
        assert_eq!(doc.processing_notes, vec!["OCR processed image: 120x80px"]);
    }

    #[test]
    fn blank_image_gets_placeholder_and_tips() {
        let (p, _ocr) = processor(MockOcrEngine::new("   "));
        let doc = p.process_blocking(&make_test_png(120, 80), FileKind::Image).unwrap();
        assert_eq!(doc.extracted_text, NO_TEXT_PLACEHOLDER);
        assert_eq!(doc.processing_notes.len(), 2);
    }

    #[tokio::test]
    async fn async_process_runs_on_blocking_pool() {
        let (p, _ocr) = processor(MockOcrEngine::new("Lease terms apply"));
        let p = Arc::new(p);
        let doc = p
            .process(make_test_png(64, 64), FileKind::Image)
            .await
            .unwrap();
        assert_eq!(doc.extracted_text, "Lease terms apply");
        assert!(doc.processing_time >= 0.0);
    }
}
