//! Structured error model for fetch operations.
//!
//! [`FetchError`] carries classification and retry metadata. A fetch error
//! is always scoped to one record: the run pipeline records it as an error
//! result and moves on. Construct via category-specific factory methods.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Broad classification of a fetch failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
#[serde(rename_all = "snake_case")]
pub enum FetchErrorCategory {
    /// Non-2xx response that is not a rate limit.
    Http,
    /// HTTP 429 or an explicit throttle (retryable).
    RateLimit,
    /// Connection reset, DNS failure and similar (retryable).
    Transport,
    /// The connector gave up waiting (retryable).
    Timeout,
    /// The record cannot be turned into a request.
    Data,
}

impl fmt::Display for FetchErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Http => "http",
            Self::RateLimit => "rate_limit",
            Self::Transport => "transport",
            Self::Timeout => "timeout",
            Self::Data => "data",
        };
        f.write_str(s)
    }
}

/// Retry backoff strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffClass {
    /// Millisecond-scale retry.
    Fast,
    /// Second-scale retry.
    Normal,
    /// Multi-second retry.
    Slow,
}

/// Structured error from one fetch attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("[{category}] {code}: {message}")]
pub struct FetchError {
    pub category: FetchErrorCategory,
    pub code: String,
    pub message: String,
    pub retryable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after_ms: Option<u64>,
    pub backoff_class: BackoffClass,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl FetchError {
    fn new(
        category: FetchErrorCategory,
        retryable: bool,
        backoff_class: BackoffClass,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            category,
            code: code.into(),
            message: message.into(),
            retryable,
            retry_after_ms: None,
            backoff_class,
            status_code: None,
            details: None,
        }
    }

    /// Classify a non-2xx response.
    ///
    /// 429 becomes a rate limit, 5xx a retryable HTTP error, anything else
    /// a permanent HTTP error.
    #[must_use]
    pub fn from_status(status_code: u16, body: &str) -> Self {
        let snippet: String = body.chars().take(200).collect();
        let mut err = match status_code {
            429 => Self::rate_limit("HTTP_429", format!("rate limited: {snippet}"), None),
            500..=599 => Self::new(
                FetchErrorCategory::Http,
                true,
                BackoffClass::Normal,
                format!("HTTP_{status_code}"),
                format!("server error: {snippet}"),
            ),
            _ => Self::new(
                FetchErrorCategory::Http,
                false,
                BackoffClass::Normal,
                format!("HTTP_{status_code}"),
                format!("request failed: {snippet}"),
            ),
        };
        err.status_code = Some(status_code);
        err
    }

    /// Rate limit error (retryable, slow backoff).
    #[must_use]
    pub fn rate_limit(
        code: impl Into<String>,
        message: impl Into<String>,
        retry_after_ms: Option<u64>,
    ) -> Self {
        let mut err = Self::new(FetchErrorCategory::RateLimit, true, BackoffClass::Slow, code, message);
        err.retry_after_ms = retry_after_ms;
        err
    }

    /// Transport failure (retryable, normal backoff).
    #[must_use]
    pub fn transport(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(FetchErrorCategory::Transport, true, BackoffClass::Normal, code, message)
    }

    /// Timeout (retryable, fast backoff).
    #[must_use]
    pub fn timeout(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(FetchErrorCategory::Timeout, true, BackoffClass::Fast, code, message)
    }

    /// Record cannot produce a request (not retryable).
    #[must_use]
    pub fn data(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(FetchErrorCategory::Data, false, BackoffClass::Normal, code, message)
    }

    /// Attach structured diagnostic details.
    #[must_use]
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}
