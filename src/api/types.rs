//! Shared state and helper types for the HTTP API.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::analyzer::Analyzer;
use crate::auth::TokenSigner;
use crate::cache::AnalysisCache;
use crate::clock::SharedClock;
use crate::config::Settings;
use crate::pipeline::extraction::DocumentProcessor;
use crate::pipeline::FileValidator;
use crate::report::ExportTasks;

// ═══════════════════════════════════════════════════════════
// API context
// ═══════════════════════════════════════════════════════════

/// Shared context for all API routes and middleware.
///
/// Handlers receive it through `State`, middleware through `Extension`.
#[derive(Clone)]
pub struct ApiContext {
    pub settings: Arc<Settings>,
    pub clock: SharedClock,
    pub cache: Arc<AnalysisCache>,
    pub analyzer: Arc<Analyzer>,
    pub processor: Arc<DocumentProcessor>,
    pub validator: Arc<FileValidator>,
    pub exports: Arc<ExportTasks>,
    pub signer: Arc<TokenSigner>,
    pub rate_limiter: Arc<Mutex<RateLimiter>>,
}

impl ApiContext {
    pub fn new(
        settings: Settings,
        analyzer: Arc<Analyzer>,
        processor: Arc<DocumentProcessor>,
        clock: SharedClock,
    ) -> Self {
        Self {
            cache: Arc::new(AnalysisCache::new(settings.cache_retention(), clock.clone())),
            validator: Arc::new(FileValidator::new(settings.max_file_size_bytes())),
            exports: Arc::new(ExportTasks::new(settings.export_path.clone(), clock.clone())),
            signer: Arc::new(TokenSigner::new(settings.jwt_secret())),
            rate_limiter: Arc::new(Mutex::new(RateLimiter::new(settings.rate_limit_per_minute))),
            settings: Arc::new(settings),
            clock,
            analyzer,
            processor,
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Request metadata (injected by middleware)
// ═══════════════════════════════════════════════════════════

/// Correlation id for the current request, echoed as `X-Request-ID`.
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

/// Authenticated caller, injected by the auth middleware.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub subject: String,
}

// ═══════════════════════════════════════════════════════════
// Rate limiter
// ═══════════════════════════════════════════════════════════

const WINDOW: Duration = Duration::from_secs(60);

/// Sliding one-minute window of request timestamps per client key.
pub struct RateLimiter {
    windows: HashMap<String, Vec<Instant>>,
    per_minute: u32,
}

impl RateLimiter {
    pub fn new(per_minute: u32) -> Self {
        Self {
            windows: HashMap::new(),
            per_minute,
        }
    }

    /// `Ok(())` when the request is admitted, otherwise the number of
    /// seconds until the oldest request leaves the window.
    pub fn check(&mut self, key: &str) -> Result<(), u64> {
        self.check_at(key, Instant::now())
    }

    fn check_at(&mut self, key: &str, now: Instant) -> Result<(), u64> {
        let entries = self.windows.entry(key.to_string()).or_default();
        entries.retain(|ts| now.duration_since(*ts) < WINDOW);

        if entries.len() as u32 >= self.per_minute {
            let oldest = entries.first().copied().unwrap_or(now);
            let wait = WINDOW.saturating_sub(now.duration_since(oldest));
            return Err(wait.as_secs().max(1));
        }

        entries.push(now);
        Ok(())
    }

    /// Forget keys with no requests in the current window.
    pub fn prune(&mut self) {
        let now = Instant::now();
        self.windows
            .retain(|_, entries| entries.iter().any(|ts| now.duration_since(*ts) < WINDOW));
    }

    pub fn tracked_clients(&self) -> usize {
        self.windows.len()
    }
}
