use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Application-level constants
pub const APP_NAME: &str = "Legal Analyser";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Minimum HS256 secret length accepted outside development.
pub const MIN_JWT_SECRET_LEN: usize = 32;

/// Signing secret used in development when JWT_SECRET is unset.
const DEV_JWT_SECRET: &str = "legal-analyzer-development-secret-do-not-deploy";

/// Default tracing filter when `RUST_LOG` is unset.
pub fn default_log_filter() -> &'static str {
    "info,legal_analyzer_lib=debug"
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
    #[error("JWT_SECRET must be at least {MIN_JWT_SECRET_LEN} characters in production")]
    WeakJwtSecret,
    #[error("OPENROUTER_API_KEY is required to serve")]
    MissingApiKey,
    #[error("AI_RETRY_BASE_MS ({base}) exceeds AI_RETRY_MAX_MS ({max})")]
    BackoffRange { base: u64, max: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "legal-analyzer")]
#[command(about = "Legal document analysis service")]
#[command(version)]
pub struct Cli {
    #[command(flatten)]
    pub settings: Settings,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Run the HTTP server (default)
    Serve,
    /// Mint a bearer token signed with JWT_SECRET
    Token {
        #[arg(long)]
        subject: String,
        #[arg(long, default_value_t = 3600)]
        ttl_secs: u64,
    },
}

/// Runtime settings. Every field can come from a flag or its env var.
#[derive(Debug, Clone, Args)]
pub struct Settings {
    #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0:8000")]
    pub bind_addr: SocketAddr,

    // ── AI provider ──────────────────────────────────────────
    #[arg(long, env = "OPENROUTER_API_KEY", default_value = "", hide_env_values = true)]
    pub openrouter_api_key: String,
    #[arg(long, env = "OPENROUTER_BASE_URL", default_value = "https://openrouter.ai/api/v1")]
    pub openrouter_base_url: String,
    #[arg(long, env = "AI_MODEL", default_value = "google/gemini-flash-1.5")]
    pub ai_model: String,
    #[arg(long, env = "HTTP_REFERER", default_value = "http://localhost:3000")]
    pub http_referer: String,
    #[arg(long, env = "APP_TITLE", default_value = APP_NAME)]
    pub app_title: String,
    #[arg(long, env = "AI_TIMEOUT_SECS", default_value_t = 120)]
    pub ai_timeout_secs: u64,

    // ── Analyzer resilience ──────────────────────────────────
    #[arg(long, env = "MAX_CONCURRENT_ANALYSES", default_value_t = 5)]
    pub max_concurrent_analyses: usize,
    #[arg(long, env = "AI_MAX_RETRIES", default_value_t = 3)]
    pub ai_max_retries: u32,
    #[arg(long, env = "AI_RETRY_BASE_MS", default_value_t = 2000)]
    pub ai_retry_base_ms: u64,
    #[arg(long, env = "AI_RETRY_MAX_MS", default_value_t = 30_000)]
    pub ai_retry_max_ms: u64,
    #[arg(long, env = "BREAKER_FAILURE_THRESHOLD", default_value_t = 5)]
    pub breaker_failure_threshold: u32,
    #[arg(long, env = "BREAKER_OPEN_SECS", default_value_t = 60)]
    pub breaker_open_secs: u64,

    // ── Storage & retention ──────────────────────────────────
    #[arg(long, env = "CACHE_RETENTION_HOURS", default_value_t = 24)]
    pub cache_retention_hours: u64,
    #[arg(long, env = "CLEANUP_INTERVAL_HOURS", default_value_t = 1)]
    pub cleanup_interval_hours: u64,
    #[arg(long, env = "TEMP_STORAGE_PATH", default_value = "temp_uploads")]
    pub temp_storage_path: PathBuf,
    #[arg(long, env = "EXPORT_PATH", default_value = "exports")]
    pub export_path: PathBuf,
    #[arg(long, env = "MAX_FILE_SIZE_MB", default_value_t = 50)]
    pub max_file_size_mb: u64,

    // ── HTTP surface ─────────────────────────────────────────
    /// Comma-separated list; empty means same-origin only.
    #[arg(long, env = "ALLOWED_ORIGINS", value_delimiter = ',', default_value = "http://localhost:5173,http://localhost:3000")]
    pub allowed_origins: Vec<String>,
    #[arg(long, env = "RATE_LIMIT_PER_MINUTE", default_value_t = 60)]
    pub rate_limit_per_minute: u32,

    // ── OCR ──────────────────────────────────────────────────
    /// Explicit tesseract binary; looked up on PATH when unset.
    #[arg(long, env = "TESSERACT_CMD")]
    pub tesseract_cmd: Option<PathBuf>,
    #[arg(long, env = "OCR_LANGUAGE", default_value = "eng")]
    pub ocr_language: String,

    // ── Auth ─────────────────────────────────────────────────
    #[arg(long, env = "AUTH_REQUIRED", default_value_t = false)]
    pub auth_required: bool,
    #[arg(long, env = "JWT_SECRET", default_value = "", hide_env_values = true)]
    pub jwt_secret: String,
    #[arg(long, env = "APP_ENV", default_value = "development")]
    pub app_env: String,

    // ── Logging ──────────────────────────────────────────────
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

impl Settings {
    /// Reject settings the service cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let non_zero: [(&'static str, u64); 9] = [
            ("MAX_CONCURRENT_ANALYSES", self.max_concurrent_analyses as u64),
            ("AI_MAX_RETRIES", u64::from(self.ai_max_retries)),
            ("AI_TIMEOUT_SECS", self.ai_timeout_secs),
            ("BREAKER_FAILURE_THRESHOLD", u64::from(self.breaker_failure_threshold)),
            ("BREAKER_OPEN_SECS", self.breaker_open_secs),
            ("CACHE_RETENTION_HOURS", self.cache_retention_hours),
            ("CLEANUP_INTERVAL_HOURS", self.cleanup_interval_hours),
            ("MAX_FILE_SIZE_MB", self.max_file_size_mb),
            ("RATE_LIMIT_PER_MINUTE", u64::from(self.rate_limit_per_minute)),
        ];
        if let Some((name, _)) = non_zero.iter().find(|(_, v)| *v == 0) {
            return Err(ConfigError::Zero(*name));
        }
        if self.ai_retry_base_ms > self.ai_retry_max_ms {
            return Err(ConfigError::BackoffRange {
                base: self.ai_retry_base_ms,
                max: self.ai_retry_max_ms,
            });
        }
        if self.is_production() && self.jwt_secret.len() < MIN_JWT_SECRET_LEN {
            return Err(ConfigError::WeakJwtSecret);
        }
        Ok(())
    }

    /// Extra check for the `serve` command, which needs a provider key.
    pub fn validate_for_serve(&self) -> Result<(), ConfigError> {
        self.validate()?;
        if self.openrouter_api_key.trim().is_empty() {
            return Err(ConfigError::MissingApiKey);
        }
        Ok(())
    }

    /// JWT signing secret, falling back to a fixed development value.
    /// `validate` refuses the fallback in production.
    pub fn jwt_secret(&self) -> &str {
        if self.jwt_secret.is_empty() {
            DEV_JWT_SECRET
        } else {
            &self.jwt_secret
        }
    }

    pub fn is_production(&self) -> bool {
        self.app_env.eq_ignore_ascii_case("production")
    }

    pub fn max_file_size_bytes(&self) -> u64 {
        self.max_file_size_mb * 1024 * 1024
    }

    pub fn ai_timeout(&self) -> Duration {
        Duration::from_secs(self.ai_timeout_secs)
    }

    pub fn retry_base(&self) -> Duration {
        Duration::from_millis(self.ai_retry_base_ms)
    }

    pub fn retry_max(&self) -> Duration {
        Duration::from_millis(self.ai_retry_max_ms)
    }

    pub fn breaker_open_timeout(&self) -> Duration {
        Duration::from_secs(self.breaker_open_secs)
    }

    pub fn cache_retention(&self) -> chrono::Duration {
        chrono::Duration::hours(self.cache_retention_hours as i64)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_hours * 3600)
    }

    /// Non-empty origins, trimmed.
    pub fn origins(&self) -> Vec<String> {
        self.allowed_origins
            .iter()
            .map(|o| o.trim().to_string())
            .filter(|o| !o.is_empty())
            .collect()
    }
}

impl Default for Settings {
    /// Defaults as if no flags or env vars were given.
    fn default() -> Self {
        #[derive(Parser)]
        struct Bare {
            #[command(flatten)]
            settings: Settings,
        }
        Bare::parse_from(["legal-analyzer"]).settings
    }
}
