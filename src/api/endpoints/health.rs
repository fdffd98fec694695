//! Service descriptor and health check.

use axum::extract::State;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::analyzer::{BreakerSnapshot, BreakerState};
use crate::api::types::ApiContext;
use crate::config::APP_VERSION;

#[derive(Serialize)]
pub struct ServicesStatus {
    pub document_processor: &'static str,
    pub ai_analyzer: &'static str,
    pub report_generator: &'static str,
    pub tesseract_ocr: bool,
    pub ai_model: String,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: DateTime<Utc>,
    pub version: &'static str,
    pub cache_size: usize,
    pub active_analyses: usize,
    pub max_concurrent_analyses: usize,
    pub services: ServicesStatus,
    pub circuit_breaker: BreakerSnapshot,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disk_space_gb: Option<f64>,
}

/// `GET /health`. Reports `degraded` while the provider breaker is open.
pub async fn check(State(ctx): State<ApiContext>) -> Json<HealthResponse> {
    let breaker = ctx.analyzer.breaker_snapshot();
    let status = match ctx.analyzer.breaker_state() {
        BreakerState::Open { .. } => "degraded",
        _ => "healthy",
    };

    let disk_space_gb = match fs2::available_space(&ctx.settings.temp_storage_path) {
        Ok(bytes) => Some((bytes as f64 / 1_073_741_824.0 * 100.0).round() / 100.0),
        Err(e) => {
            tracing::debug!(error = %e, "Free disk space unknown");
            None
        }
    };

    Json(HealthResponse {
        status,
        timestamp: ctx.clock.now(),
        version: APP_VERSION,
        cache_size: ctx.cache.len(),
        active_analyses: ctx.analyzer.in_flight(),
        max_concurrent_analyses: ctx.analyzer.max_concurrent(),
        services: ServicesStatus {
            document_processor: "healthy",
            ai_analyzer: breaker.state,
            report_generator: "healthy",
            tesseract_ocr: ctx.processor.ocr_available(),
            ai_model: ctx.analyzer.model().to_string(),
        },
        circuit_breaker: breaker,
        disk_space_gb,
    })
}

#[derive(Serialize)]
pub struct Endpoints {
    pub health: &'static str,
    pub analyze: &'static str,
    pub analysis: &'static str,
    pub export: &'static str,
    pub export_status: &'static str,
    pub documents: &'static str,
    pub stats: &'static str,
    pub supported_formats: &'static str,
}

#[derive(Serialize)]
pub struct ServiceInfo {
    pub name: &'static str,
    pub version: &'static str,
    pub description: &'static str,
    pub status: &'static str,
    pub timestamp: DateTime<Utc>,
    pub endpoints: Endpoints,
}

/// `GET /`
pub async fn root(State(ctx): State<ApiContext>) -> Json<ServiceInfo> {
    Json(ServiceInfo {
        name: "Legal Document Analyzer API",
        version: APP_VERSION,
        description: "AI-powered legal document analysis with report export",
        status: "active",
        timestamp: ctx.clock.now(),
        endpoints: Endpoints {
            health: "/health",
            analyze: "/analyze",
            analysis: "/analysis/{file_id}",
            export: "/export/{file_id}/{format}",
            export_status: "/export/{task_id}",
            documents: "/documents/{file_id}",
            stats: "/stats",
            supported_formats: "/supported-formats",
        },
    })
}
