//! HTTP router.
//!
//! Middleware stack (outermost → innermost):
//! 1. Request id → 2. Trace → 3. CORS → 4. Body limit → 5. Rate limiter
//! → 6. Auth (protected routes only)

use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderName, HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::api::endpoints;
use crate::api::middleware;
use crate::api::types::ApiContext;
use crate::config::Settings;

/// Headroom above the file limit for multipart framing.
const MULTIPART_OVERHEAD: usize = 1024 * 1024;

fn cors_layer(settings: &Settings) -> CorsLayer {
    let origins: Vec<HeaderValue> = settings
        .origins()
        .into_iter()
        .filter_map(|origin| match HeaderValue::from_str(&origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            HeaderName::from_static("x-request-id"),
        ])
        .expose_headers([
            HeaderName::from_static("x-request-id"),
            header::RETRY_AFTER,
            header::CONTENT_DISPOSITION,
        ])
        .allow_credentials(true)
}

/// Build the full router.
///
/// Middleware uses `Extension<ApiContext>` (injected outside rate and auth).
/// Endpoint handlers use `State<ApiContext>` (provided via `with_state`).
///
/// NOTE: Path params use `:param` syntax (matchit 0.7 / axum 0.7).
pub fn build_router(ctx: ApiContext) -> Router {
    let body_limit = ctx.settings.max_file_size_bytes() as usize + MULTIPART_OVERHEAD;

    // Protected when AUTH_REQUIRED is set
    let protected = Router::new()
        .route("/analyze", post(endpoints::analyze::analyze))
        .route("/analysis/:file_id", get(endpoints::analysis::get))
        .route("/export/:file_id/:format", post(endpoints::export::start))
        .route("/export/:task_id", get(endpoints::export::status))
        .route("/documents/:file_id", get(endpoints::documents::download))
        .route("/stats", get(endpoints::stats::get))
        .with_state(ctx.clone())
        .layer(axum::middleware::from_fn(middleware::auth::require_auth));

    let public = Router::new()
        .route("/", get(endpoints::health::root))
        .route("/health", get(endpoints::health::check))
        .route("/supported-formats", get(endpoints::formats::list))
        .with_state(ctx.clone());

    Router::new()
        .merge(public)
        .merge(protected)
        .layer(axum::middleware::from_fn(middleware::rate::limit))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(cors_layer(&ctx.settings))
        // Extension must wrap rate + auth so they can extract ApiContext
        .layer(axum::Extension(ctx))
        .layer(TraceLayer::new_for_http())
        .layer(axum::middleware::from_fn(middleware::request_id::tag))
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use crate::analyzer::{Analyzer, AnalyzerConfig, MockProvider};
    use crate::api::types::ApiContext;
    use crate::clock::ManualClock;
    use crate::config::Settings;
    use crate::pipeline::extraction::{DocumentProcessor, MockOcrEngine, PdfTextExtractor};

    pub const GOOD_REPLY: &str = r#"{"summary": "Lease of office space for two years.",
        "key_clauses": [{"type": "Termination", "content": "Either party may terminate with 90 days notice.",
        "importance": "high", "classification": "Termination", "risk_score": 7, "page": 1}],
        "document_type": "Lease Agreement", "confidence": 0.88}"#;

    pub struct TestApp {
        pub ctx: ApiContext,
        pub provider: Arc<MockProvider>,
        pub clock: Arc<ManualClock>,
        pub _dir: tempfile::TempDir,
    }

    pub fn test_settings(dir: &std::path::Path) -> Settings {
        let mut settings = Settings::default();
        settings.temp_storage_path = dir.join("uploads");
        settings.export_path = dir.join("exports");
        settings.ai_max_retries = 1;
        settings.ai_retry_base_ms = 1;
        settings.ai_retry_max_ms = 10;
        settings.openrouter_api_key = "test-key".into();
        settings
    }

    pub fn test_app_with(
        provider: MockProvider,
        ocr: MockOcrEngine,
        configure: impl FnOnce(&mut Settings),
    ) -> TestApp {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = test_settings(dir.path());
        configure(&mut settings);

        let clock = Arc::new(ManualClock::starting_now());
        let provider = Arc::new(provider);
        let analyzer = Arc::new(Analyzer::new(
            provider.clone(),
            AnalyzerConfig::from_settings(&settings),
            clock.clone(),
        ));
        let processor = Arc::new(DocumentProcessor::new(
            Box::new(PdfTextExtractor),
            Arc::new(ocr),
        ));
        TestApp {
            ctx: ApiContext::new(settings, analyzer, processor, clock.clone()),
            provider,
            clock,
            _dir: dir,
        }
    }

    pub fn test_app() -> TestApp {
        test_app_with(MockProvider::new(GOOD_REPLY), MockOcrEngine::unavailable(), |_| {})
    }
}
