//! Uploader configuration.
//!
//! Every field has a default so a partial TOML or JSON document is enough.

use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::header::{HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use tuskit_transfer::{DEFAULT_BULK_THRESHOLD, DEFAULT_CHUNK_SIZE};

use crate::error::UploadError;

/// Values the embedding application may tune.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Per-request byte ceiling; larger files are streamed individually.
    pub bulk_threshold: u64,
    /// Size of each resumable write.
    pub chunk_size: usize,
    /// Headers added to every request (authorization, organization).
    pub shared_headers: BTreeMap<String, String>,
    /// Individual files streamed at the same time. Never more than one
    /// writer per upload URL.
    pub max_parallel_streams: usize,
    /// Per-request timeout handed to the HTTP client.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_timeout_secs: Option<u64>,
    pub retry: RetryConfig,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            bulk_threshold: DEFAULT_BULK_THRESHOLD,
            chunk_size: DEFAULT_CHUNK_SIZE,
            shared_headers: BTreeMap::new(),
            max_parallel_streams: 1,
            request_timeout_secs: None,
            retry: RetryConfig::default(),
        }
    }
}

impl UploadConfig {
    /// Adds a shared header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.shared_headers.insert(name.into(), value.into());
        self
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }

    /// Rejects values that would make the driver misbehave.
    pub fn validate(&self) -> Result<(), UploadError> {
        if self.chunk_size == 0 {
            return Err(UploadError::Configuration("chunk_size must be positive".into()));
        }
        if self.max_parallel_streams == 0 {
            return Err(UploadError::Configuration(
                "max_parallel_streams must be at least 1".into(),
            ));
        }
        if self.retry.backoff_factor < 1.0 {
            return Err(UploadError::Configuration(
                "retry.backoff_factor must be at least 1.0".into(),
            ));
        }
        for (name, value) in &self.shared_headers {
            HeaderName::from_bytes(name.as_bytes()).map_err(|_| {
                UploadError::Configuration(format!("invalid shared header name: {name:?}"))
            })?;
            HeaderValue::from_str(value).map_err(|_| {
                UploadError::Configuration(format!("invalid value for shared header {name}"))
            })?;
        }
        Ok(())
    }
}

/// Backoff between retries after transport failures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Consecutive transport failures tolerated per file before giving up.
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    /// Backoff cap.
    pub max_delay_ms: u64,
    pub backoff_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 250,
            max_delay_ms: 15_000,
            backoff_factor: 2.0,
        }
    }
}

impl RetryConfig {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    /// Calculates the delay for a given attempt number (1-based),
    /// with ±25% jitter.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .subsec_nanos();
        self.jittered_delay(attempt, jitter_unit(nanos))
    }

    /// Delay for `attempt` with `unit` in `[0.0, 1.0)` picking the point
    /// inside the jitter window.
    fn jittered_delay(&self, attempt: u32, unit: f64) -> Duration {
        let exp = attempt.saturating_sub(1).min(63) as i32;
        let secs = self.initial_delay().as_secs_f64() * self.backoff_factor.powi(exp);
        let capped = secs.min(self.max_delay().as_secs_f64());
        let offset = unit * 2.0 - 1.0; // [-1.0, 1.0)
        Duration::from_secs_f64((capped + capped * 0.25 * offset).max(0.0))
    }
}

/// Maps the sub-second nanoseconds of a timestamp onto `[0.0, 1.0)`.
fn jitter_unit(nanos: u32) -> f64 {
    f64::from(nanos.min(999_999_999)) / 1_000_000_000.0
}
