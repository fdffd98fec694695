//! Shared domain types: AI analysis payload, file metadata and the
//! cache record that ties them together.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ═══════════════════════════════════════════════════════════
// Analysis payload
// ═══════════════════════════════════════════════════════════

/// How much a clause matters to the reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Importance {
    High,
    Medium,
    Low,
}

impl Importance {
    /// Lenient parse: anything unrecognised is treated as `Low`.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "high" => Self::High,
            "medium" => Self::Medium,
            _ => Self::Low,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

/// One clause extracted by the AI provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyClause {
    #[serde(rename = "type")]
    pub clause_type: String,
    pub content: String,
    pub importance: Importance,
    pub classification: String,
    pub risk_score: f32,
    pub page: Option<u32>,
    pub confidence: f32,
}

/// Structured result of a document analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub summary: String,
    pub key_clauses: Vec<KeyClause>,
    pub document_type: String,
    pub confidence: f32,
    /// Set when the result came from the reduced-input fallback path.
    #[serde(default)]
    pub partial: bool,
}

// ═══════════════════════════════════════════════════════════
// Uploaded file metadata
// ═══════════════════════════════════════════════════════════

/// Broad kind of an accepted upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Pdf,
    Image,
}

impl FileKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Image => "image",
        }
    }
}

/// Everything known about the uploaded file and how it was processed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileMetadata {
    pub original_filename: String,
    pub content_type: String,
    pub kind: FileKind,
    pub extension: String,
    pub size_bytes: u64,
    /// Where the upload is kept on disk until the record is swept.
    #[serde(skip)]
    pub stored_path: PathBuf,
    pub total_pages: usize,
    pub word_count: usize,
    pub processing_notes: Vec<String>,
    /// Seconds from upload to cached result.
    pub processing_time: f64,
}

// ═══════════════════════════════════════════════════════════
// Cache record
// ═══════════════════════════════════════════════════════════

/// A completed analysis, keyed by the SHA-256 of the uploaded bytes.
///
/// `created_at` / `expires_at` are stamped by the cache on insert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisRecord {
    pub content_hash: String,
    #[serde(skip_serializing)]
    pub extracted_text: String,
    pub result: AnalysisResult,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub metadata: FileMetadata,
}

impl AnalysisRecord {
    /// Build an unstamped record; the cache fills in the timestamps.
    pub fn new(
        content_hash: String,
        extracted_text: String,
        result: AnalysisResult,
        metadata: FileMetadata,
    ) -> Self {
        Self {
            content_hash,
            extracted_text,
            result,
            created_at: DateTime::<Utc>::MIN_UTC,
            expires_at: DateTime::<Utc>::MIN_UTC,
            metadata,
        }
    }

    /// Filename without its extension, used to name exported reports.
    pub fn file_stem(&self) -> &str {
        let name = &self.metadata.original_filename;
        match name.rsplit_once('.') {
            Some((stem, _)) if !stem.is_empty() => stem,
            _ => name,
        }
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn sample_result() -> AnalysisResult {
        AnalysisResult {
            summary: "Services agreement between Acme and Beta.".into(),
            key_clauses: vec![KeyClause {
                clause_type: "Payment Terms".into(),
                content: "Invoices are payable within 30 days.".into(),
                importance: Importance::High,
                classification: "Financial".into(),
                risk_score: 4.0,
                page: Some(1),
                confidence: 0.9,
            }],
            document_type: "Contract".into(),
            confidence: 0.85,
            partial: false,
        }
    }

    pub fn sample_metadata() -> FileMetadata {
        FileMetadata {
            original_filename: "services_agreement.pdf".into(),
            content_type: "application/pdf".into(),
            kind: FileKind::Pdf,
            extension: "pdf".into(),
            size_bytes: 2048,
            stored_path: PathBuf::from("/tmp/does-not-exist.pdf"),
            total_pages: 2,
            word_count: 350,
            processing_notes: vec![],
            processing_time: 1.5,
        }
    }

    pub fn sample_record(hash: &str) -> AnalysisRecord {
        AnalysisRecord::new(
            hash.to_string(),
            "--- Page 1 ---\nInvoices are payable within 30 days.".into(),
            sample_result(),
            sample_metadata(),
        )
    }
}
