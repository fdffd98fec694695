//! `GET /supported-formats`

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::api::types::ApiContext;
use crate::pipeline::SupportedFormats;

#[derive(Serialize)]
pub struct FormatsResponse {
    /// Upper-case extensions, e.g. `PDF`, `PNG`.
    pub formats: Vec<String>,
    #[serde(flatten)]
    pub groups: SupportedFormats,
    pub max_file_size_mb: u64,
}

pub async fn list(State(ctx): State<ApiContext>) -> Json<FormatsResponse> {
    let groups = ctx.validator.supported_formats();
    let mut formats: Vec<String> = Vec::new();
    for ext in groups.pdf.extensions.iter().chain(&groups.images.extensions) {
        let name = ext.trim_start_matches('.').to_ascii_uppercase();
        if !formats.contains(&name) {
            formats.push(name);
        }
    }
    Json(FormatsResponse {
        formats,
        max_file_size_mb: ctx.validator.max_size_bytes() / (1024 * 1024),
        groups,
    })
}
