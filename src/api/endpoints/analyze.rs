//! `POST /analyze`: upload, validate, extract, analyze, cache.

use std::time::Instant;

use axum::extract::multipart::MultipartError;
use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::{Extension, Json};

use super::analysis::AnalysisResponse;
use crate::api::error::ApiError;
use crate::api::types::{ApiContext, RequestId};
use crate::models::{AnalysisRecord, FileMetadata};
use crate::pipeline::content_hash;
use crate::pipeline::uploads::{remove_upload, store_upload};

const FILE_FIELD: &str = "file";

struct Upload {
    filename: Option<String>,
    content_type: Option<String>,
    bytes: Vec<u8>,
}

fn multipart_error(err: MultipartError) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge(err.body_text())
    } else {
        ApiError::BadRequest(format!("Invalid multipart body: {}", err.body_text()))
    }
}

async fn read_upload(multipart: &mut Multipart) -> Result<Upload, ApiError> {
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let filename = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        let bytes = field.bytes().await.map_err(multipart_error)?.to_vec();
        return Ok(Upload {
            filename,
            content_type,
            bytes,
        });
    }
    Err(ApiError::BadRequest(format!(
        "Missing multipart field '{FILE_FIELD}'"
    )))
}

pub async fn analyze(
    State(ctx): State<ApiContext>,
    Extension(RequestId(request_id)): Extension<RequestId>,
    mut multipart: Multipart,
) -> Result<Json<AnalysisResponse>, ApiError> {
    let started = Instant::now();
    let upload = read_upload(&mut multipart).await?;
    let original_filename = upload
        .filename
        .clone()
        .unwrap_or_else(|| "unknown_file".to_string());

    tracing::info!(
        %request_id,
        uploaded_filename = %original_filename,
        content_type = upload.content_type.as_deref().unwrap_or("unknown"),
        size = upload.bytes.len(),
        "Analysis request received"
    );

    let validated = ctx
        .validator
        .validate(upload.filename.as_deref(), &upload.bytes)
        .inspect_err(|e| tracing::warn!(%request_id, error = %e, "File validation failed"))?;

    let file_id = content_hash(&upload.bytes);
    if let Some(record) = ctx.cache.get(&file_id) {
        tracing::info!(%request_id, %file_id, "Returning cached analysis");
        return Ok(Json(AnalysisResponse::from_record(record, true)));
    }

    // Nothing expensive happens while the provider is known to be down.
    ctx.analyzer.check_available()?;

    let stored_path = store_upload(
        &ctx.settings.temp_storage_path,
        &file_id,
        &validated.extension,
        &upload.bytes,
    )
    .await?;
    tracing::debug!(%request_id, %file_id, path = %stored_path.display(), "File saved for processing");

    let outcome = async {
        let processed = ctx.processor.process(upload.bytes, validated.kind).await?;
        tracing::info!(
            %request_id,
            %file_id,
            processing_time = processed.processing_time,
            word_count = processed.word_count,
            total_pages = processed.total_pages,
            "Document processed"
        );
        let result = ctx
            .analyzer
            .analyze(
                &processed.extracted_text,
                validated.kind.as_str(),
                &original_filename,
            )
            .await?;
        Ok::<_, ApiError>((processed, result))
    }
    .await;

    let (processed, result) = match outcome {
        Ok(done) => done,
        Err(e) => {
            if let Err(io) = remove_upload(&stored_path).await {
                tracing::warn!(%request_id, %file_id, error = %io, "Failed to remove upload after error");
            }
            return Err(e);
        }
    };

    let processing_time = started.elapsed().as_secs_f64();
    let metadata = FileMetadata {
        original_filename,
        content_type: validated.mime_type,
        kind: validated.kind,
        extension: validated.extension,
        size_bytes: validated.size_bytes,
        stored_path,
        total_pages: processed.total_pages,
        word_count: processed.word_count,
        processing_notes: processed.processing_notes,
        processing_time,
    };
    let (record, replaced) = ctx.cache.replace(AnalysisRecord::new(
        file_id.clone(),
        processed.extracted_text,
        result,
        metadata,
    ));
    // A concurrent or earlier request for the same bytes left its own copy.
    if let Some(old) = replaced {
        if old.metadata.stored_path != record.metadata.stored_path {
            if let Err(e) = remove_upload(&old.metadata.stored_path).await {
                tracing::warn!(%request_id, %file_id, error = %e, "Failed to remove replaced upload");
            }
        }
    }

    tracing::info!(
        %request_id,
        %file_id,
        total_processing_time = processing_time,
        confidence = record.result.confidence,
        clauses_found = record.result.key_clauses.len(),
        partial = record.result.partial,
        "Analysis completed"
    );
    Ok(Json(AnalysisResponse::from_record(record, false)))
}
