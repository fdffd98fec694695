//! `GET /analysis/:id`. Also defines the analysis response shape
//! shared with `POST /analyze`.

use axum::extract::{Path, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::models::{AnalysisRecord, AnalysisResult};

#[derive(Debug, Serialize)]
pub struct AnalysisResponse {
    #[serde(flatten)]
    pub analysis: AnalysisResult,
    pub file_id: String,
    pub original_filename: String,
    pub processing_time: f64,
    pub total_pages: usize,
    pub word_count: usize,
    pub processing_notes: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub cached: bool,
}

impl AnalysisResponse {
    pub fn from_record(record: AnalysisRecord, cached: bool) -> Self {
        let meta = record.metadata;
        Self {
            analysis: record.result,
            file_id: record.content_hash,
            original_filename: meta.original_filename,
            processing_time: meta.processing_time,
            total_pages: meta.total_pages,
            word_count: meta.word_count,
            processing_notes: meta.processing_notes,
            created_at: record.created_at,
            expires_at: record.expires_at,
            cached,
        }
    }
}

/// `GET /analysis/:id`: a cached analysis, or 404 once it has expired.
pub async fn get(
    State(ctx): State<ApiContext>,
    Path(file_id): Path<String>,
) -> Result<Json<AnalysisResponse>, ApiError> {
    let record = ctx
        .cache
        .get(&file_id)
        .ok_or_else(|| ApiError::NotFound("Analysis not found or expired".into()))?;
    Ok(Json(AnalysisResponse::from_record(record, true)))
}
