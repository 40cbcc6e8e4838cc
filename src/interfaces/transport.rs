//! HTTP transport used by the dispatcher.
//!
//! `HttpTransport` is the seam tests stub out; `ReqwestTransport` is the real
//! client and `RetryingTransport` wraps any transport with exponential backoff.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::error::ErrorType;

/// Maximum number of response-body bytes kept in an HTTP error.
const ERROR_BODY_LIMIT: usize = 500;

/// Transport-level failures.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TransportError {
    #[error("request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("transport error: {0}")]
    Unknown(String),
}

impl TransportError {
    pub fn error_type(&self) -> ErrorType {
        match self {
            TransportError::Timeout { .. } => ErrorType::Timeout,
            TransportError::Http { .. } => ErrorType::HttpError,
            TransportError::Unknown(_) => ErrorType::Unknown,
        }
    }

    pub fn status_code(&self) -> Option<u16> {
        match self {
            TransportError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Timeouts, rate limiting and server errors may succeed on a later attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            TransportError::Timeout { .. } => true,
            TransportError::Http { status, .. } => *status == 429 || *status >= 500,
            TransportError::Unknown(_) => false,
        }
    }
}

/// POST a JSON body and decode a JSON reply.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn post_json(
        &self,
        url: &str,
        body: &Value,
        timeout: Duration,
    ) -> Result<Value, TransportError>;
}

/// reqwest-backed transport. The timeout is applied per request.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("deckhand/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| TransportError::Unknown(e.to_string()))?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

fn classify(err: reqwest::Error, timeout: Duration) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout {
            timeout_ms: timeout.as_millis() as u64,
        }
    } else {
        TransportError::Unknown(err.to_string())
    }
}

fn truncate(text: &str) -> String {
    match text.char_indices().nth(ERROR_BODY_LIMIT) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn post_json(
        &self,
        url: &str,
        body: &Value,
        timeout: Duration,
    ) -> Result<Value, TransportError> {
        let response = self
            .client
            .post(url)
            .timeout(timeout)
            .json(body)
            .send()
            .await
            .map_err(|e| classify(e, timeout))?;

        let status = response.status();
        let text = response.text().await.map_err(|e| classify(e, timeout))?;

        if !status.is_success() {
            return Err(TransportError::Http {
                status: status.as_u16(),
                body: truncate(&text),
            });
        }

        serde_json::from_str(&text).map_err(|e| {
            TransportError::Unknown(format!(
                "invalid JSON response: {} - Body: {}",
                e,
                truncate(&text)
            ))
        })
    }
}

/// Retries retryable failures with exponential backoff: `base_delay * 2^attempt`.
#[derive(Debug, Clone)]
pub struct RetryingTransport<T> {
    inner: T,
    max_retries: u32,
    base_delay: Duration,
}

impl<T: HttpTransport> RetryingTransport<T> {
    pub fn new(inner: T, max_retries: u32) -> Self {
        Self {
            inner,
            max_retries,
            base_delay: Duration::from_millis(500),
        }
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }
}

#[async_trait]
impl<T: HttpTransport> HttpTransport for RetryingTransport<T> {
    async fn post_json(
        &self,
        url: &str,
        body: &Value,
        timeout: Duration,
    ) -> Result<Value, TransportError> {
        let mut retry_delay = self.base_delay;
        let mut attempt = 0;
        loop {
            match self.inner.post_json(url, body, timeout).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    attempt += 1;
                    log::warn!(
                        "POST {} failed ({}); retry attempt {} after {:?}",
                        url,
                        e,
                        attempt,
                        retry_delay
                    );
                    tokio::time::sleep(retry_delay).await;
                    retry_delay *= 2;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
