//! API error types with structured JSON responses.

use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::analyzer::AnalyzerError;
use crate::auth::AuthError;
use crate::pipeline::extraction::ExtractionError;
use crate::pipeline::ValidationError;
use crate::report::ReportError;

/// Structured error response body.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: &'static str,
    pub message: String,
}

/// API-level errors with HTTP status mapping.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Authentication required")]
    Unauthorized,
    #[error("Token expired")]
    TokenExpired,
    #[error("Rate limit exceeded")]
    RateLimited { retry_after: u64 },
    #[error("Invalid request: {0}")]
    BadRequest(String),
    #[error("File validation failed: {0}")]
    Validation(#[from] ValidationError),
    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),
    #[error("Unprocessable: {0}")]
    Unprocessable(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Analysis failed: {0}")]
    AnalysisFailed(String),
    #[error("AI provider unavailable")]
    ProviderUnavailable { retry_after: u64 },
    #[error("Service shutting down")]
    ShuttingDown,
    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            ApiError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "AUTH_REQUIRED",
                "Authentication required".to_string(),
            ),
            ApiError::TokenExpired => (
                StatusCode::UNAUTHORIZED,
                "TOKEN_EXPIRED",
                "Token expired, re-authenticate".to_string(),
            ),
            ApiError::RateLimited { retry_after } => (
                StatusCode::TOO_MANY_REQUESTS,
                "RATE_LIMITED",
                format!("Rate limit exceeded. Retry after {retry_after}s"),
            ),
            ApiError::BadRequest(detail) => {
                (StatusCode::BAD_REQUEST, "BAD_REQUEST", detail.clone())
            }
            ApiError::Validation(err @ ValidationError::TooLarge { .. }) => (
                StatusCode::PAYLOAD_TOO_LARGE,
                "PAYLOAD_TOO_LARGE",
                format!("File validation failed: {err}"),
            ),
            ApiError::Validation(err) => (
                StatusCode::BAD_REQUEST,
                "VALIDATION_FAILED",
                format!("File validation failed: {err}"),
            ),
            ApiError::PayloadTooLarge(detail) => (
                StatusCode::PAYLOAD_TOO_LARGE,
                "PAYLOAD_TOO_LARGE",
                detail.clone(),
            ),
            ApiError::Unprocessable(detail) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "UNPROCESSABLE",
                detail.clone(),
            ),
            ApiError::NotFound(detail) => (StatusCode::NOT_FOUND, "NOT_FOUND", detail.clone()),
            ApiError::AnalysisFailed(detail) => {
                tracing::error!(detail, "Analysis failed");
                (
                    StatusCode::BAD_GATEWAY,
                    "ANALYSIS_FAILED",
                    "Analysis failed. The AI provider did not return a usable result.".to_string(),
                )
            }
            ApiError::ProviderUnavailable { retry_after } => (
                StatusCode::SERVICE_UNAVAILABLE,
                "PROVIDER_UNAVAILABLE",
                format!("AI provider temporarily unavailable. Retry after {retry_after}s"),
            ),
            ApiError::ShuttingDown => (
                StatusCode::SERVICE_UNAVAILABLE,
                "SHUTTING_DOWN",
                "Service is shutting down".to_string(),
            ),
            ApiError::Internal(detail) => {
                tracing::error!(detail, "API internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL",
                    "An internal error occurred".to_string(),
                )
            }
        };

        let body = ErrorBody {
            error: ErrorDetail { code, message },
        };

        let mut response = (status, Json(body)).into_response();
        let retry_after = match &self {
            ApiError::RateLimited { retry_after } => Some(*retry_after),
            ApiError::ProviderUnavailable { retry_after } => Some(*retry_after),
            _ => None,
        };
        if let Some(secs) = retry_after {
            if let Ok(val) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert("Retry-After", val);
            }
        }
        response
    }
}

impl From<AnalyzerError> for ApiError {
    fn from(err: AnalyzerError) -> Self {
        match err {
            AnalyzerError::CircuitOpen { retry_after } => ApiError::ProviderUnavailable {
                retry_after: retry_after.as_secs().max(1),
            },
            AnalyzerError::Provider { .. } => ApiError::AnalysisFailed(err.to_string()),
            AnalyzerError::EmptyInput => {
                ApiError::Unprocessable("No text could be extracted from the document".into())
            }
            AnalyzerError::Closed => ApiError::ShuttingDown,
        }
    }
}

impl From<ExtractionError> for ApiError {
    fn from(err: ExtractionError) -> Self {
        match err {
            ExtractionError::OcrUnavailable => ApiError::Unprocessable(err.to_string()),
            ExtractionError::PdfParsing(_) | ExtractionError::ImageProcessing(_) => {
                ApiError::Unprocessable(format!("Document processing failed: {err}"))
            }
            _ => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<ReportError> for ApiError {
    fn from(err: ReportError) -> Self {
        match err {
            ReportError::UnsupportedFormat(_) => ApiError::BadRequest(err.to_string()),
            _ => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Expired => ApiError::TokenExpired,
            AuthError::Invalid(_) => ApiError::Unauthorized,
            AuthError::Encoding(e) => ApiError::Internal(e),
        }
    }
}

impl From<std::io::Error> for ApiError {
    fn from(err: std::io::Error) -> Self {
        ApiError::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::ProviderError;
    use axum::body::to_bytes;
    use std::time::Duration;

    async fn body_json(response: Response) -> serde_json::Value {
        let body = to_bytes(response.into_body(), 4096).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn unauthorized_returns_401() {
        let response = ApiError::Unauthorized.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(response).await["error"]["code"], "AUTH_REQUIRED");
    }

    #[tokio::test]
    async fn rate_limited_returns_429_with_retry_after() {
        let response = ApiError::RateLimited { retry_after: 60 }.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers().get("Retry-After").unwrap(), "60");
        assert_eq!(body_json(response).await["error"]["code"], "RATE_LIMITED");
    }

    #[tokio::test]
    async fn circuit_open_maps_to_503_with_retry_after() {
        let err: ApiError = AnalyzerError::CircuitOpen {
            retry_after: Duration::from_secs(42),
        }
        .into();
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.headers().get("Retry-After").unwrap(), "42");
        assert_eq!(body_json(response).await["error"]["code"], "PROVIDER_UNAVAILABLE");
    }

    #[tokio::test]
    async fn exhausted_retries_map_to_502() {
        let err: ApiError = AnalyzerError::Provider {
            attempts: 3,
            source: ProviderError::Timeout(120),
        }
        .into();
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let json = body_json(response).await;
        assert_eq!(json["error"]["code"], "ANALYSIS_FAILED");
        assert!(json["error"]["message"]
            .as_str()
            .unwrap()
            .starts_with("Analysis failed"));
    }

    #[tokio::test]
    async fn validation_error_returns_400() {
        let response = ApiError::from(ValidationError::Empty).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        assert_eq!(json["error"]["message"], "File validation failed: File is empty");
    }

    #[tokio::test]
    async fn ocr_unavailable_returns_422() {
        let response = ApiError::from(ExtractionError::OcrUnavailable).into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn internal_hides_details() {
        let response = ApiError::Internal("disk on fire".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body_json(response).await["error"]["message"],
            "An internal error occurred"
        );
    }

    #[test]
    fn auth_errors_map_to_401_variants() {
        assert!(matches!(ApiError::from(AuthError::Expired), ApiError::TokenExpired));
        assert!(matches!(
            ApiError::from(AuthError::Invalid("bad".into())),
            ApiError::Unauthorized
        ));
    }

    #[test]
    fn unsupported_format_is_bad_request() {
        assert!(matches!(
            ApiError::from(ReportError::UnsupportedFormat("docx".into())),
            ApiError::BadRequest(_)
        ));
    }
}
