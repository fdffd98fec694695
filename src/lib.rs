pub mod analyzer;
pub mod api;
pub mod auth;
pub mod cache;
pub mod clock;
pub mod config;
pub mod models;
pub mod pipeline;
pub mod report;
pub mod retention;

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use crate::analyzer::{AiProvider, Analyzer, AnalyzerConfig, OpenRouterProvider, ProviderError};
use crate::api::ApiContext;
use crate::auth::{AuthError, TokenSigner};
use crate::clock::{SharedClock, SystemClock};
use crate::config::{Cli, Command, ConfigError, LogFormat, Settings};
use crate::pipeline::extraction::{DocumentProcessor, PdfTextExtractor, TesseractCli};

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("AI provider setup failed: {0}")]
    Provider(#[from] ProviderError),
    #[error("Token error: {0}")]
    Auth(#[from] AuthError),
}

/// Install the global subscriber. `RUST_LOG` wins over the default filter.
pub fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter()));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let result = match format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().flatten_event(true).try_init(),
    };
    if let Err(e) = result {
        eprintln!("tracing already initialized: {e}");
    }
}

/// Wire the production services into an API context.
pub fn build_context(settings: Settings) -> Result<ApiContext, StartupError> {
    let clock: SharedClock = Arc::new(SystemClock);

    let provider: Arc<dyn AiProvider> = Arc::new(OpenRouterProvider::new(
        &settings.openrouter_base_url,
        &settings.openrouter_api_key,
        &settings.http_referer,
        &settings.app_title,
        settings.ai_timeout(),
    )?);
    let analyzer = Arc::new(Analyzer::new(
        provider,
        AnalyzerConfig::from_settings(&settings),
        clock.clone(),
    ));

    let ocr = TesseractCli::detect(settings.tesseract_cmd.as_deref(), &settings.ocr_language);
    let processor = Arc::new(DocumentProcessor::new(Box::new(PdfTextExtractor), Arc::new(ocr)));

    Ok(ApiContext::new(settings, analyzer, processor, clock))
}

/// Run the selected command to completion.
pub async fn run(cli: Cli) -> Result<(), StartupError> {
    let settings = cli.settings;
    settings.validate()?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Token { subject, ttl_secs } => {
            let signer = TokenSigner::new(settings.jwt_secret());
            let ttl = i64::try_from(ttl_secs).unwrap_or(i64::MAX);
            println!("{}", signer.create_token(&subject, ttl)?);
            Ok(())
        }
        Command::Serve => serve(settings).await,
    }
}

async fn serve(settings: Settings) -> Result<(), StartupError> {
    settings.validate_for_serve()?;
    if settings.jwt_secret.is_empty() {
        tracing::warn!("JWT_SECRET not set, using the insecure development secret");
    }

    tokio::fs::create_dir_all(&settings.temp_storage_path).await?;
    tokio::fs::create_dir_all(&settings.export_path).await?;

    tracing::info!(
        version = config::APP_VERSION,
        model = %settings.ai_model,
        max_concurrent = settings.max_concurrent_analyses,
        auth_required = settings.auth_required,
        "{} starting",
        config::APP_NAME
    );

    let bind_addr = settings.bind_addr;
    let cleanup_interval = settings.cleanup_interval();
    let retention_window = settings.cache_retention();
    let ctx = build_context(settings)?;

    let retention = retention::spawn(
        ctx.cache.clone(),
        ctx.exports.clone(),
        cleanup_interval,
        retention_window,
    );
    let analyzer = ctx.analyzer.clone();
    let server = api::start_server(ctx, bind_addr).await?;

    api::shutdown_signal().await;

    analyzer.close();
    server.shutdown().await;
    retention.shutdown().await;
    tracing::info!("Shutdown complete");
    Ok(())
}
