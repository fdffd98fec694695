//! Report rendering (JSON and PDF) and background export tasks.

pub mod json;
pub mod pdf;
pub mod tasks;

use std::str::FromStr;

use thiserror::Error;

use crate::models::AnalysisRecord;

pub use tasks::{ExportCounts, ExportStatus, ExportTask, ExportTasks};

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("Unsupported format '{0}'. Use 'json' or 'pdf'")]
    UnsupportedFormat(String),

    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("PDF generation failed: {0}")]
    Pdf(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Export task failed: {0}")]
    Task(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    Json,
    Pdf,
}

impl ReportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Pdf => "pdf",
        }
    }

    pub fn content_type(&self) -> String {
        mime_guess::from_ext(self.extension())
            .first_or_octet_stream()
            .to_string()
    }
}

impl FromStr for ReportFormat {
    type Err = ReportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "pdf" => Ok(Self::Pdf),
            other => Err(ReportError::UnsupportedFormat(other.to_string())),
        }
    }
}

/// Render a cached analysis in the requested format.
pub fn render(record: &AnalysisRecord, format: ReportFormat) -> Result<Vec<u8>, ReportError> {
    match format {
        ReportFormat::Json => json::render_json(record),
        ReportFormat::Pdf => pdf::render_pdf(record),
    }
}

/// `<stem>_analysis.<ext>` with anything outside `[A-Za-z0-9_-]` replaced.
pub fn report_file_name(stem: &str, format: ReportFormat) -> String {
    let mut safe: String = stem
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if safe.trim_matches('_').is_empty() {
        safe = "document".to_string();
    }
    format!("{safe}_analysis.{}", format.extension())
}
