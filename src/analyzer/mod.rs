//! AI analysis with retry, circuit breaker and a concurrency bound.

pub mod breaker;
pub mod parser;
pub mod prompt;
pub mod provider;
pub mod retry;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;

use crate::clock::SharedClock;
use crate::config::Settings;
use crate::models::AnalysisResult;

pub use breaker::{BreakerConfig, BreakerSnapshot, BreakerState, CircuitBreaker, CircuitOpen};
pub use parser::{ParseError, ParseMode};
pub use prompt::PromptMode;
pub use provider::{AiProvider, MockProvider, OpenRouterProvider, ProviderError};
pub use retry::RetryPolicy;

#[derive(Debug, thiserror::Error)]
pub enum AnalyzerError {
    #[error("AI provider unavailable, retry after {}s", retry_after.as_secs())]
    CircuitOpen { retry_after: Duration },
    #[error("Analysis failed after {attempts} attempt(s): {source}")]
    Provider {
        attempts: u32,
        #[source]
        source: ProviderError,
    },
    #[error("No text to analyze")]
    EmptyInput,
    #[error("Analyzer is shutting down")]
    Closed,
}

impl From<CircuitOpen> for AnalyzerError {
    fn from(open: CircuitOpen) -> Self {
        Self::CircuitOpen {
            retry_after: open.retry_after,
        }
    }
}

/// Outcome of a single guarded provider call.
enum CallError {
    Open(CircuitOpen),
    Provider(ProviderError),
    Closed,
}

/// Tunables for the analyzer.
#[derive(Debug, Clone)]
pub struct AnalyzerConfig {
    pub model: String,
    pub max_concurrent: usize,
    pub retry: RetryPolicy,
    pub breaker: BreakerConfig,
}

impl AnalyzerConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            model: settings.ai_model.clone(),
            max_concurrent: settings.max_concurrent_analyses,
            retry: RetryPolicy {
                max_attempts: settings.ai_max_retries,
                base_delay: settings.retry_base(),
                max_delay: settings.retry_max(),
            },
            breaker: BreakerConfig {
                failure_threshold: settings.breaker_failure_threshold,
                open_timeout: settings.breaker_open_timeout(),
            },
        }
    }
}

/// Sends document text to the AI provider and shapes the reply.
///
/// Every provider call holds one semaphore permit for its duration, so
/// at most `max_concurrent` calls are outstanding at once. Permits are
/// not held across backoff sleeps.
pub struct Analyzer {
    provider: Arc<dyn AiProvider>,
    model: String,
    retry: RetryPolicy,
    breaker: CircuitBreaker,
    semaphore: Semaphore,
    max_concurrent: usize,
}

impl Analyzer {
    pub fn new(provider: Arc<dyn AiProvider>, config: AnalyzerConfig, clock: SharedClock) -> Self {
        let max_concurrent = config.max_concurrent.max(1);
        Self {
            breaker: CircuitBreaker::new(provider.name().to_string(), config.breaker, clock),
            provider,
            model: config.model,
            retry: config.retry,
            semaphore: Semaphore::new(max_concurrent),
            max_concurrent,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Provider calls currently holding a permit.
    pub fn in_flight(&self) -> usize {
        self.max_concurrent
            .saturating_sub(self.semaphore.available_permits())
    }

    pub fn breaker_state(&self) -> BreakerState {
        self.breaker.state()
    }

    pub fn breaker_snapshot(&self) -> BreakerSnapshot {
        self.breaker.snapshot()
    }

    /// Fail-fast probe used before doing expensive work for a request.
    pub fn check_available(&self) -> Result<(), AnalyzerError> {
        self.breaker.check().map_err(AnalyzerError::from)
    }

    /// Stop admitting new provider calls; queued callers get `Closed`.
    pub fn close(&self) {
        self.semaphore.close();
    }

    /// Analyze document text.
    ///
    /// Unparseable replies are retried like provider failures. If the last
    /// attempt still could not be parsed, one reduced-input fallback call is
    /// made and its (partial) result returned.
    pub async fn analyze(
        &self,
        text: &str,
        document_type: &str,
        filename: &str,
    ) -> Result<AnalysisResult, AnalyzerError> {
        if text.trim().is_empty() {
            return Err(AnalyzerError::EmptyInput);
        }
        self.check_available()?;

        let excerpt = prompt::truncate_chars(text, prompt::PRIMARY_CHAR_LIMIT);
        let request = prompt::analysis_prompt(excerpt, PromptMode::Full);
        let max_attempts = self.retry.max_attempts.max(1);
        tracing::info!(
            filename,
            chars = text.len(),
            sent_chars = excerpt.len(),
            "Starting document analysis"
        );

        let mut last_provider_error: Option<ProviderError> = None;
        for attempt in 1..=max_attempts {
            let mut retry_hint = None;
            match self.call_provider(&request).await {
                Ok(raw) => match parser::parse_analysis(&raw, document_type, ParseMode::Primary) {
                    Ok(result) => {
                        tracing::info!(filename, attempt, "Analysis completed");
                        return Ok(result);
                    }
                    Err(e) => {
                        tracing::warn!(filename, attempt, error = %e, "AI response parse failed");
                        last_provider_error = None;
                    }
                },
                Err(CallError::Open(open)) => {
                    tracing::warn!(filename, attempt, "Circuit opened during analysis");
                    return Err(open.into());
                }
                Err(CallError::Closed) => return Err(AnalyzerError::Closed),
                Err(CallError::Provider(e)) => {
                    tracing::warn!(filename, attempt, error = %e, "AI provider call failed");
                    if !e.is_retryable() {
                        return Err(AnalyzerError::Provider {
                            attempts: attempt,
                            source: e,
                        });
                    }
                    retry_hint = e.retry_after();
                    last_provider_error = Some(e);
                }
            }

            if attempt < max_attempts {
                let delay = self.retry.delay_for(attempt, retry_hint);
                tracing::debug!(filename, attempt, delay_ms = delay.as_millis() as u64, "Backing off");
                tokio::time::sleep(delay).await;
            }
        }

        match last_provider_error {
            Some(source) => {
                tracing::error!(filename, attempts = max_attempts, error = %source, "Analysis failed");
                Err(AnalyzerError::Provider {
                    attempts: max_attempts,
                    source,
                })
            }
            None => Ok(self.fallback(text, document_type, filename).await),
        }
    }

    /// Reduced-input attempt after repeated unparseable replies.
    async fn fallback(&self, text: &str, document_type: &str, filename: &str) -> AnalysisResult {
        tracing::info!(filename, "Attempting fallback analysis on document excerpt");
        let excerpt = prompt::truncate_chars(text, prompt::FALLBACK_CHAR_LIMIT);
        let request = prompt::analysis_prompt(excerpt, PromptMode::Partial);

        match self.call_provider(&request).await {
            Ok(raw) => match parser::parse_analysis(&raw, document_type, ParseMode::Fallback) {
                Ok(result) => result,
                Err(e) => {
                    tracing::warn!(filename, error = %e, "Fallback response unparseable, returning limited analysis");
                    parser::limited_analysis(excerpt, document_type)
                }
            },
            Err(CallError::Provider(e)) => {
                tracing::warn!(filename, error = %e, "Fallback call failed, returning limited analysis");
                parser::limited_analysis(excerpt, document_type)
            }
            Err(CallError::Open(_)) | Err(CallError::Closed) => {
                tracing::warn!(filename, "Fallback call not admitted, returning limited analysis");
                parser::limited_analysis(excerpt, document_type)
            }
        }
    }

    /// One provider call under a semaphore permit and breaker admission.
    async fn call_provider(&self, request: &str) -> Result<String, CallError> {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| CallError::Closed)?;
        let admission = self.breaker.try_acquire().map_err(CallError::Open)?;

        match self.provider.generate(request, &self.model).await {
            Ok(reply) => {
                admission.success();
                Ok(reply)
            }
            Err(e) => {
                admission.failure();
                Err(CallError::Provider(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    const GOOD_REPLY: &str = r#"```json
{"summary": "NDA between two parties.", "key_clauses": [
  {"type": "Confidentiality", "content": "Keep it secret.", "importance": "high",
   "classification": "Confidentiality", "risk_score": 6, "page": 1}
], "document_type": "NDA", "confidence": 0.9}
```"#;

    fn config(max_concurrent: usize, attempts: u32, threshold: u32) -> AnalyzerConfig {
        AnalyzerConfig {
            model: "test/model".into(),
            max_concurrent,
            retry: RetryPolicy {
                max_attempts: attempts,
                base_delay: Duration::from_millis(100),
                max_delay: Duration::from_secs(1),
            },
            breaker: BreakerConfig {
                failure_threshold: threshold,
                open_timeout: Duration::from_secs(60),
            },
        }
    }

    fn analyzer(mock: MockProvider, cfg: AnalyzerConfig) -> (Analyzer, Arc<MockProvider>, Arc<ManualClock>) {
        let mock = Arc::new(mock);
        let clock = Arc::new(ManualClock::starting_now());
        let a = Analyzer::new(mock.clone(), cfg, clock.clone());
        (a, mock, clock)
    }

    #[tokio::test(start_paused = true)]
    async fn successful_analysis() {
        let (a, mock, _) = analyzer(MockProvider::new(GOOD_REPLY), config(2, 3, 5));
        let result = a.analyze("This NDA binds both parties.", "pdf", "nda.pdf").await.unwrap();
        assert_eq!(result.document_type, "NDA");
        assert_eq!(result.key_clauses.len(), 1);
        assert_eq!(mock.calls(), 1);
        assert_eq!(a.in_flight(), 0);
    }

    #[tokio::test]
    async fn empty_text_rejected_without_call() {
        let (a, mock, _) = analyzer(MockProvider::new(GOOD_REPLY), config(2, 3, 5));
        assert!(matches!(a.analyze("  \n", "pdf", "x.pdf").await, Err(AnalyzerError::EmptyInput)));
        assert_eq!(mock.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn retries_transient_failures_then_succeeds() {
        let mock = MockProvider::new(GOOD_REPLY).with_script(vec![
            Err(ProviderError::Timeout(120)),
            Err(ProviderError::Http { status: 502, body: "bad gateway".into() }),
        ]);
        let (a, mock, _) = analyzer(mock, config(2, 3, 5));
        let start = tokio::time::Instant::now();
        let result = a.analyze("text", "pdf", "a.pdf").await.unwrap();
        assert_eq!(result.document_type, "NDA");
        assert_eq!(mock.calls(), 3);
        // 100ms + 200ms of backoff
        assert_eq!(start.elapsed(), Duration::from_millis(300));
        assert!(matches!(a.breaker_state(), BreakerState::Closed { consecutive_failures: 0 }));
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_return_provider_error() {
        let (a, mock, _) = analyzer(
            MockProvider::failing(ProviderError::Connection("http://x".into())),
            config(2, 3, 10),
        );
        match a.analyze("text", "pdf", "a.pdf").await {
            Err(AnalyzerError::Provider { attempts, source }) => {
                assert_eq!(attempts, 3);
                assert!(matches!(source, ProviderError::Connection(_)));
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(mock.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn non_retryable_error_stops_immediately() {
        let (a, mock, _) = analyzer(
            MockProvider::failing(ProviderError::Http { status: 401, body: "no key".into() }),
            config(2, 3, 10),
        );
        let err = a.analyze("text", "pdf", "a.pdf").await.unwrap_err();
        assert!(matches!(err, AnalyzerError::Provider { attempts: 1, .. }));
        assert_eq!(mock.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn open_circuit_fails_fast_without_provider_call() {
        let (a, mock, clock) = analyzer(
            MockProvider::failing(ProviderError::Timeout(5)),
            config(2, 2, 2),
        );
        assert!(a.analyze("text", "pdf", "a.pdf").await.is_err());
        assert!(matches!(a.breaker_state(), BreakerState::Open { .. }));
        let calls = mock.calls();

        let err = a.analyze("text", "pdf", "a.pdf").await.unwrap_err();
        assert!(matches!(err, AnalyzerError::CircuitOpen { .. }));
        assert_eq!(mock.calls(), calls, "provider not invoked while open");

        // After the open timeout a single probe goes through.
        clock.advance(chrono::Duration::seconds(60));
        assert!(a.check_available().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn breaker_opens_mid_retry_loop() {
        let (a, mock, _) = analyzer(
            MockProvider::failing(ProviderError::Timeout(5)),
            config(2, 5, 2),
        );
        let err = a.analyze("text", "pdf", "a.pdf").await.unwrap_err();
        assert!(matches!(err, AnalyzerError::CircuitOpen { .. }));
        assert_eq!(mock.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn half_open_probe_success_closes() {
        let mock = MockProvider::new(GOOD_REPLY).with_script(vec![
            Err(ProviderError::Timeout(5)),
        ]);
        let (a, _mock, clock) = analyzer(mock, config(2, 1, 1));
        assert!(a.analyze("text", "pdf", "a.pdf").await.is_err());
        clock.advance(chrono::Duration::seconds(61));
        assert!(a.analyze("text", "pdf", "a.pdf").await.is_ok());
        assert!(matches!(a.breaker_state(), BreakerState::Closed { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn unparseable_replies_fall_back_to_partial_analysis() {
        let fallback_reply = r#"{"summary": "Excerpt reviewed.", "key_clauses": [], "confidence": 0.9}"#;
        let mock = MockProvider::new(fallback_reply).with_script(vec![
            Ok("not json".into()),
            Ok("still not json".into()),
        ]);
        let (a, mock, _) = analyzer(mock, config(2, 2, 5));
        let text = "z".repeat(20_000);
        let result = a.analyze(&text, "pdf", "big.pdf").await.unwrap();

        assert!(result.partial);
        assert_eq!(result.summary, "[Partial Analysis] Excerpt reviewed.");
        assert!((result.confidence - 0.7).abs() < f32::EPSILON);
        assert_eq!(mock.calls(), 3);

        let prompts = mock.prompts();
        assert!(prompts[0].ends_with(&"z".repeat(prompt::PRIMARY_CHAR_LIMIT)));
        assert!(!prompts[0].contains(&"z".repeat(prompt::PRIMARY_CHAR_LIMIT + 1)));
        assert!(prompts[2].contains("size limits"));
        assert!(!prompts[2].contains(&"z".repeat(prompt::FALLBACK_CHAR_LIMIT + 1)));
        assert!(matches!(a.breaker_state(), BreakerState::Closed { consecutive_failures: 0 }));
    }

    #[tokio::test(start_paused = true)]
    async fn unparseable_fallback_yields_limited_analysis() {
        let (a, _mock, _) = analyzer(MockProvider::new("garbage"), config(2, 2, 5));
        let result = a.analyze("Short contract text.", "Contract", "c.pdf").await.unwrap();
        assert_eq!(result.confidence, 0.5);
        assert_eq!(result.document_type, "Contract");
        assert_eq!(result.key_clauses[0].content, "Short contract text.");
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_calls_bounded_by_semaphore() {
        let mock = MockProvider::new(GOOD_REPLY).with_latency(Duration::from_millis(50));
        let (a, mock, _) = analyzer(mock, config(2, 1, 5));
        let a = Arc::new(a);

        let handles: Vec<_> = (0..6)
            .map(|i| {
                let a = a.clone();
                tokio::spawn(async move { a.analyze("text", "pdf", &format!("{i}.pdf")).await })
            })
            .collect();
        for h in handles {
            assert!(h.await.unwrap().is_ok());
        }

        assert_eq!(mock.calls(), 6);
        assert_eq!(mock.max_in_flight(), 2);
        assert_eq!(a.in_flight(), 0);
    }

    #[tokio::test]
    async fn closed_analyzer_rejects_calls() {
        let (a, _mock, _) = analyzer(MockProvider::new(GOOD_REPLY), config(1, 1, 5));
        a.close();
        assert!(matches!(a.analyze("text", "pdf", "a.pdf").await, Err(AnalyzerError::Closed)));
    }
}
