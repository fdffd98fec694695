use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use super::preprocess;
use super::types::{OcrEngine, PageSegMode};
use super::ExtractionError;

/// Render resolution for scanned PDF pages.
const PDF_RENDER_DPI: &str = "200";

/// Tesseract and pdftoppm driven as system binaries.
#[derive(Debug, Clone)]
pub struct TesseractCli {
    tesseract: Option<PathBuf>,
    pdftoppm: Option<PathBuf>,
    language: String,
}

impl TesseractCli {
    /// Locate binaries: an explicit tesseract path wins, otherwise `PATH`.
    pub fn detect(configured: Option<&Path>, language: &str) -> Self {
        let tesseract = match configured {
            Some(path) => Some(path.to_path_buf()).filter(|p| responds_to_version(p)),
            None => which::which("tesseract").ok().filter(|p| responds_to_version(p)),
        };
        let pdftoppm = which::which("pdftoppm").ok();

        match &tesseract {
            Some(path) => tracing::info!(path = %path.display(), "Tesseract detected"),
            None => tracing::warn!("Tesseract OCR not detected, image uploads will be rejected"),
        }
        if pdftoppm.is_none() {
            tracing::warn!("pdftoppm not found, scanned PDF pages cannot be OCR'd");
        }

        Self {
            tesseract,
            pdftoppm,
            language: language.to_string(),
        }
    }

    /// An engine that reports itself unavailable.
    pub fn unavailable() -> Self {
        Self {
            tesseract: None,
            pdftoppm: None,
            language: "eng".into(),
        }
    }

    pub fn tesseract_path(&self) -> Option<&Path> {
        self.tesseract.as_deref()
    }

    fn tesseract(&self) -> Result<&Path, ExtractionError> {
        self.tesseract.as_deref().ok_or(ExtractionError::OcrUnavailable)
    }

    fn render_page(&self, pdf_bytes: &[u8], page_number: usize) -> Result<Vec<u8>, ExtractionError> {
        let pdftoppm = self
            .pdftoppm
            .as_deref()
            .ok_or_else(|| ExtractionError::RenderFailed("pdftoppm not installed".into()))?;

        let dir = tempfile::tempdir()?;
        let input = dir.path().join("input.pdf");
        std::fs::write(&input, pdf_bytes)?;
        let prefix = dir.path().join("page");
        let page = page_number.to_string();

        // pdftoppm -png -r 200 -f N -l N -singlefile input.pdf <prefix>
        let output = Command::new(pdftoppm)
            .arg("-png")
            .args(["-r", PDF_RENDER_DPI])
            .args(["-f", &page, "-l", &page])
            .arg("-singlefile")
            .arg(&input)
            .arg(&prefix)
            .output()?;
        if !output.status.success() {
            return Err(ExtractionError::RenderFailed(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        Ok(std::fs::read(prefix.with_extension("png"))?)
    }
}

fn responds_to_version(path: &Path) -> bool {
    Command::new(path)
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

impl OcrEngine for TesseractCli {
    fn is_available(&self) -> bool {
        self.tesseract.is_some()
    }

    fn ocr_image(&self, png_bytes: &[u8], psm: PageSegMode) -> Result<String, ExtractionError> {
        let tesseract = self.tesseract()?;
        let input = tempfile::Builder::new().suffix(".png").tempfile()?;
        std::fs::write(input.path(), png_bytes)?;

        let output = Command::new(tesseract)
            .arg(input.path())
            .arg("stdout")
            .args(["-l", &self.language])
            .args(["--psm", psm.as_arg()])
            .output()?;
        if !output.status.success() {
            return Err(ExtractionError::OcrProcessing(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    fn ocr_pdf_page(&self, pdf_bytes: &[u8], page_number: usize) -> Result<String, ExtractionError> {
        self.tesseract()?;
        let rendered = self.render_page(pdf_bytes, page_number)?;
        let prepared = preprocess::prepare_for_ocr(&rendered)?;
        self.ocr_image(&prepared.png, PageSegMode::SingleBlock)
    }
}

/// Mock OCR engine for unit testing without Tesseract.
///
/// Replies are consumed in order; once exhausted, `text` is returned.
pub struct MockOcrEngine {
    pub text: String,
    pub available: bool,
    /// Page rendering works; off simulates Tesseract without pdftoppm.
    pub renders_pages: bool,
    script: Mutex<Vec<String>>,
    calls: AtomicUsize,
}

impl MockOcrEngine {
    pub fn new(text: &str) -> Self {
        Self {
            text: text.to_string(),
            available: true,
            renders_pages: true,
            script: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::new("")
        }
    }

    pub fn with_script(self, replies: &[&str]) -> Self {
        let mut reversed: Vec<String> = replies.iter().map(|s| s.to_string()).collect();
        reversed.reverse();
        *self.script.lock().unwrap_or_else(PoisonError::into_inner) = reversed;
        self
    }

    pub fn without_renderer(mut self) -> Self {
        self.renders_pages = false;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn next(&self) -> Result<String, ExtractionError> {
        if !self.available {
            return Err(ExtractionError::OcrUnavailable);
        }
        self.calls.fetch_add(1, Ordering::SeqCst);
        let scripted = self
            .script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop();
        Ok(scripted.unwrap_or_else(|| self.text.clone()))
    }
}

impl OcrEngine for MockOcrEngine {
    fn is_available(&self) -> bool {
        self.available
    }

    fn ocr_image(&self, _png_bytes: &[u8], _psm: PageSegMode) -> Result<String, ExtractionError> {
        self.next()
    }

    fn ocr_pdf_page(&self, _pdf_bytes: &[u8], _page_number: usize) -> Result<String, ExtractionError> {
        if self.available && !self.renders_pages {
            self.calls.fetch_add(1, Ordering::SeqCst);
            return Err(ExtractionError::RenderFailed("pdftoppm not installed".into()));
        }
        self.next()
    }
}
