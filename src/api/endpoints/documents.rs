//! `GET /documents/:id`: the original upload behind a cached analysis.

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, HeaderValue};
use axum::response::Response;

use crate::api::error::ApiError;
use crate::api::types::ApiContext;

/// Quote-safe filename for `Content-Disposition`.
fn disposition_name(name: &str) -> String {
    name.chars()
        .map(|c| if (c.is_ascii_graphic() && c != '"' && c != '\\') || c == ' ' { c } else { '_' })
        .collect()
}

pub async fn download(
    State(ctx): State<ApiContext>,
    Path(file_id): Path<String>,
) -> Result<Response, ApiError> {
    let record = ctx
        .cache
        .get(&file_id)
        .ok_or_else(|| ApiError::NotFound("Document not found or expired".into()))?;
    let meta = &record.metadata;

    let bytes = tokio::fs::read(&meta.stored_path).await.map_err(|e| {
        tracing::warn!(file_id = %file_id, error = %e, "Stored upload unreadable");
        ApiError::NotFound("Original document file not found".into())
    })?;

    let mut response = Response::new(Body::from(bytes));
    let headers = response.headers_mut();
    if let Ok(val) = HeaderValue::from_str(&meta.content_type) {
        headers.insert(header::CONTENT_TYPE, val);
    }
    let disposition = format!(
        "attachment; filename=\"{}\"",
        disposition_name(&meta.original_filename)
    );
    if let Ok(val) = HeaderValue::from_str(&disposition) {
        headers.insert(header::CONTENT_DISPOSITION, val);
    }
    Ok(response)
}
