use chrono::{DateTime, Utc};
use serde::Serialize;

use super::ReportError;
use crate::config::{APP_NAME, APP_VERSION};
use crate::models::{AnalysisRecord, Importance, KeyClause};

#[derive(Serialize)]
struct JsonReport<'a> {
    report: ReportInfo,
    document: DocumentInfo<'a>,
    summary: &'a str,
    document_type: &'a str,
    confidence: f32,
    partial: bool,
    risk_overview: RiskOverview,
    key_clauses: &'a [KeyClause],
}

#[derive(Serialize)]
struct ReportInfo {
    generator: &'static str,
    version: &'static str,
    generated_at: DateTime<Utc>,
}

#[derive(Serialize)]
struct DocumentInfo<'a> {
    analysis_id: &'a str,
    original_filename: &'a str,
    content_type: &'a str,
    size_bytes: u64,
    total_pages: usize,
    word_count: usize,
    processing_time: f64,
    processing_notes: &'a [String],
    analyzed_at: DateTime<Utc>,
}

/// Clause counts per importance and the mean risk score.
#[derive(Debug, Serialize, PartialEq)]
pub struct RiskOverview {
    pub high: usize,
    pub medium: usize,
    pub low: usize,
    pub average_risk_score: f32,
}

impl RiskOverview {
    pub fn from_clauses(clauses: &[KeyClause]) -> Self {
        let count = |level: Importance| clauses.iter().filter(|c| c.importance == level).count();
        let average_risk_score = if clauses.is_empty() {
            0.0
        } else {
            clauses.iter().map(|c| c.risk_score).sum::<f32>() / clauses.len() as f32
        };
        Self {
            high: count(Importance::High),
            medium: count(Importance::Medium),
            low: count(Importance::Low),
            average_risk_score,
        }
    }
}

pub fn render_json(record: &AnalysisRecord) -> Result<Vec<u8>, ReportError> {
    let result = &record.result;
    let meta = &record.metadata;
    let report = JsonReport {
        report: ReportInfo {
            generator: APP_NAME,
            version: APP_VERSION,
            generated_at: Utc::now(),
        },
        document: DocumentInfo {
            analysis_id: &record.content_hash,
            original_filename: &meta.original_filename,
            content_type: &meta.content_type,
            size_bytes: meta.size_bytes,
            total_pages: meta.total_pages,
            word_count: meta.word_count,
            processing_time: meta.processing_time,
            processing_notes: &meta.processing_notes,
            analyzed_at: record.created_at,
        },
        summary: &result.summary,
        document_type: &result.document_type,
        confidence: result.confidence,
        partial: result.partial,
        risk_overview: RiskOverview::from_clauses(&result.key_clauses),
        key_clauses: &result.key_clauses,
    };
    Ok(serde_json::to_vec_pretty(&report)?)
}
