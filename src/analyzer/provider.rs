use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, RETRY_AFTER};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProviderError {
    #[error("Cannot reach AI provider at {0}")]
    Connection(String),
    #[error("AI provider request timed out after {0}s")]
    Timeout(u64),
    #[error("AI provider quota exceeded")]
    Quota { retry_after: Option<Duration> },
    #[error("AI provider returned HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error("Empty response from AI provider")]
    EmptyResponse,
    #[error("Unreadable provider response: {0}")]
    Malformed(String),
    #[error("HTTP client error: {0}")]
    Client(String),
}

impl ProviderError {
    /// Worth another attempt. Client-side 4xx rejections are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http { status, .. } => *status >= 500 || *status == 408,
            Self::Client(_) => false,
            _ => true,
        }
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Quota { retry_after } => *retry_after,
            _ => None,
        }
    }
}

/// Text-generation backend for document analysis.
#[async_trait]
pub trait AiProvider: Send + Sync {
    async fn generate(&self, prompt: &str, model: &str) -> Result<String, ProviderError>;

    fn name(&self) -> &str;
}

// ═══════════════════════════════════════════════════════════
// OpenRouter (OpenAI-compatible chat completions)
// ═══════════════════════════════════════════════════════════

pub struct OpenRouterProvider {
    base_url: String,
    client: reqwest::Client,
    timeout_secs: u64,
}

impl OpenRouterProvider {
    pub fn new(
        base_url: &str,
        api_key: &str,
        referer: &str,
        app_title: &str,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let mut headers = HeaderMap::new();
        let bearer = HeaderValue::from_str(&format!("Bearer {api_key}"))
            .map_err(|e| ProviderError::Client(format!("invalid API key header: {e}")))?;
        headers.insert(reqwest::header::AUTHORIZATION, bearer);
        for (name, value) in [("http-referer", referer), ("x-title", app_title)] {
            let value = HeaderValue::from_str(value)
                .map_err(|e| ProviderError::Client(format!("invalid {name} header: {e}")))?;
            headers.insert(HeaderName::from_static(name), value);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::Client(e.to_string()))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            timeout_secs: timeout.as_secs(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

#[async_trait]
impl AiProvider for OpenRouterProvider {
    async fn generate(&self, prompt: &str, model: &str) -> Result<String, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = ChatRequest {
            model,
            messages: [ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: 0.1,
            max_tokens: 8192,
        };

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    ProviderError::Connection(self.base_url.clone())
                } else if e.is_timeout() {
                    ProviderError::Timeout(self.timeout_secs)
                } else {
                    ProviderError::Client(e.to_string())
                }
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(ProviderError::Quota {
                retry_after: parse_retry_after(response.headers()),
            });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatResponse = response.json().await.map_err(|e| {
            if e.is_timeout() {
                ProviderError::Timeout(self.timeout_secs)
            } else {
                ProviderError::Malformed(e.to_string())
            }
        })?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|c| c.trim().to_string())
            .unwrap_or_default();
        if content.is_empty() {
            return Err(ProviderError::EmptyResponse);
        }
        Ok(content)
    }

    fn name(&self) -> &str {
        "openrouter"
    }
}

// ═══════════════════════════════════════════════════════════
// Mock provider
// ═══════════════════════════════════════════════════════════

/// Scripted provider for tests. Replies are consumed in order; once the
/// script is empty the default reply is returned.
pub struct MockProvider {
    script: Mutex<VecDeque<Result<String, ProviderError>>>,
    default_reply: Result<String, ProviderError>,
    latency: Duration,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl MockProvider {
    pub fn new(reply: &str) -> Self {
        Self::with_default(Ok(reply.to_string()))
    }

    pub fn failing(error: ProviderError) -> Self {
        Self::with_default(Err(error))
    }

    fn with_default(default_reply: Result<String, ProviderError>) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            default_reply,
            latency: Duration::ZERO,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Queue replies served before the default one.
    pub fn with_script(self, replies: Vec<Result<String, ProviderError>>) -> Self {
        *self.script.lock().unwrap_or_else(PoisonError::into_inner) = replies.into();
        self
    }

    /// Simulated response time.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of overlapping `generate` calls observed.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl AiProvider for MockProvider {
    async fn generate(&self, prompt: &str, _model: &str) -> Result<String, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(prompt.to_string());

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let scripted = self
            .script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        scripted.unwrap_or_else(|| self.default_reply.clone())
    }

    fn name(&self) -> &str {
        "mock"
    }
}
