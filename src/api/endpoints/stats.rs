//! `GET /stats`: cache, export and concurrency counters.

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::analyzer::BreakerSnapshot;
use crate::api::types::ApiContext;
use crate::report::ExportCounts;

#[derive(Serialize)]
pub struct StatsResponse {
    pub analysis_cache_size: usize,
    pub cache_ttl_hours: i64,
    pub export_tasks_size: usize,
    pub export_tasks: ExportCounts,
    pub max_concurrent_analyses: usize,
    pub active_analyses: usize,
    pub circuit_breaker: BreakerSnapshot,
}

pub async fn get(State(ctx): State<ApiContext>) -> Json<StatsResponse> {
    Json(StatsResponse {
        analysis_cache_size: ctx.cache.len(),
        cache_ttl_hours: ctx.cache.ttl().num_hours(),
        export_tasks_size: ctx.exports.len(),
        export_tasks: ctx.exports.counts(),
        max_concurrent_analyses: ctx.analyzer.max_concurrent(),
        active_analyses: ctx.analyzer.in_flight(),
        circuit_breaker: ctx.analyzer.breaker_snapshot(),
    })
}
