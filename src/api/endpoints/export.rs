//! Report export: start a background render, then poll or download it.

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::report::{ExportStatus, ExportTask, ReportFormat};

#[derive(Debug, Serialize)]
pub struct ExportStarted {
    pub task_id: Uuid,
    pub status: ExportStatus,
    pub format: ReportFormat,
    pub file_name: String,
    pub status_url: String,
    /// Link usable without a bearer header; only issued when auth is on.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
}

/// `POST /export/:file_id/:format`
pub async fn start(
    State(ctx): State<ApiContext>,
    Path((file_id, format)): Path<(String, String)>,
) -> Result<Json<ExportStarted>, ApiError> {
    let record = ctx
        .cache
        .get(&file_id)
        .ok_or_else(|| ApiError::NotFound("Analysis not found or expired".into()))?;
    let format: ReportFormat = format.parse()?;

    let task = ctx.exports.start(record, format);
    let status_url = format!("/export/{}", task.task_id);
    let download_url = if ctx.settings.auth_required {
        let token = ctx.signer.create_signed_url_token(&task.task_id.to_string())?;
        Some(format!("{status_url}?token={token}"))
    } else {
        None
    };

    Ok(Json(ExportStarted {
        task_id: task.task_id,
        status: task.status,
        format: task.format,
        file_name: task.file_name,
        status_url,
        download_url,
    }))
}

#[derive(Debug, Serialize)]
struct ExportProgress<'a> {
    task_id: Uuid,
    status: ExportStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a str>,
}

/// `GET /export/:task_id`: the file once completed, otherwise the status.
pub async fn status(
    State(ctx): State<ApiContext>,
    Path(task_id): Path<String>,
) -> Result<Response, ApiError> {
    let not_found = || ApiError::NotFound("Export task not found".into());
    let task_id = Uuid::parse_str(&task_id).map_err(|_| not_found())?;
    let task = ctx.exports.get(&task_id).ok_or_else(not_found)?;

    match (&task.status, &task.path) {
        (ExportStatus::Completed, Some(path)) => {
            let bytes = tokio::fs::read(path).await.map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    ApiError::NotFound("Export file no longer available".into())
                } else {
                    ApiError::from(e)
                }
            })?;
            Ok(attachment(&task, bytes))
        }
        _ => {
            let code = match task.status {
                ExportStatus::Processing => StatusCode::ACCEPTED,
                _ => StatusCode::OK,
            };
            let body = ExportProgress {
                task_id: task.task_id,
                status: task.status,
                error: task.error.as_deref(),
            };
            Ok((code, Json(body)).into_response())
        }
    }
}

fn attachment(task: &ExportTask, bytes: Vec<u8>) -> Response {
    let mut response = Response::new(Body::from(bytes));
    let headers = response.headers_mut();
    if let Ok(val) = HeaderValue::from_str(&task.format.content_type()) {
        headers.insert(header::CONTENT_TYPE, val);
    }
    // file_name is already restricted to [A-Za-z0-9_.-]
    if let Ok(val) = HeaderValue::from_str(&format!("attachment; filename=\"{}\"", task.file_name)) {
        headers.insert(header::CONTENT_DISPOSITION, val);
    }
    response
}
