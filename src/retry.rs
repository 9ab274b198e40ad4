//! Retry logic with exponential backoff
//!
//! Image fetches that fail transiently are retried before the page is marked as
//! failed. With the default [`RetryConfig`] an operation is attempted once and
//! then retried three times, waiting 2, 4 and 8 seconds.
//!
//! # Example
//!
//! ```no_run
//! use chapter_dl::retry::{IsRetryable, with_retry};
//! use chapter_dl::config::RetryConfig;
//!
//! #[derive(Debug)]
//! enum MyError {
//!     Transient,
//!     Permanent,
//! }
//!
//! impl std::fmt::Display for MyError {
//!     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
//!         write!(f, "{:?}", self)
//!     }
//! }
//!
//! impl IsRetryable for MyError {
//!     fn is_retryable(&self) -> bool {
//!         matches!(self, MyError::Transient)
//!     }
//! }
//!
//! # async fn example() -> Result<(), MyError> {
//! let config = RetryConfig::default();
//! with_retry(&config, || async { Ok::<_, MyError>(()) }).await?;
//! # Ok(())
//! # }
//! ```

use crate::config::RetryConfig;
use crate::error::{Error, SourceError};
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Trait for errors that can be classified as retryable or not
///
/// Transient failures (timeouts, connection resets, 5xx, 429) return `true`.
/// Permanent failures (404, disk full, corrupt data) return `false`.
pub trait IsRetryable {
    /// Returns true if the error is transient and the operation should be retried
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for SourceError {
    fn is_retryable(&self) -> bool {
        match self {
            SourceError::Network(e) => !e.is_builder() && !e.is_redirect(),
            SourceError::Http { status, .. } => {
                *status >= 500 || *status == 408 || *status == 429
            }
            SourceError::Parse(_) => false,
            // Unknown source failures get the benefit of the doubt
            SourceError::Other(_) => true,
        }
    }
}

impl IsRetryable for Error {
    fn is_retryable(&self) -> bool {
        match self {
            Error::Source(e) => e.is_retryable(),
            Error::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::NotConnected
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::Interrupted
                    | std::io::ErrorKind::UnexpectedEof
            ),
            Error::Config { .. }
            | Error::Database(_)
            | Error::Sqlx(_)
            | Error::Download(_)
            | Error::Serialization(_)
            | Error::Archive(_)
            | Error::Image(_)
            | Error::UnknownSource(_)
            | Error::ShuttingDown
            | Error::InsufficientSpace { .. }
            | Error::Other(_) => false,
        }
    }
}

/// Execute an async operation with exponential backoff retry logic
///
/// Returns the successful result, the first non-retryable error, or the last
/// error once `config.max_attempts` retries are exhausted.
pub async fn with_retry<F, Fut, T, E>(config: &RetryConfig, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + std::fmt::Display,
{
    let mut delays = backoff_schedule(config);
    let mut attempt = 0;

    loop {
        let e = match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    tracing::debug!(attempts = attempt + 1, "Operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) => e,
        };

        if !e.is_retryable() {
            tracing::debug!(error = %e, "Operation failed with non-retryable error");
            return Err(e);
        }
        let Some(delay) = delays.next() else {
            tracing::warn!(
                error = %e,
                attempts = attempt + 1,
                "Operation failed after all retry attempts exhausted"
            );
            return Err(e);
        };
        attempt += 1;

        tracing::warn!(
            error = %e,
            attempt = attempt,
            max_attempts = config.max_attempts,
            delay_ms = delay.as_millis(),
            "Operation failed, retrying"
        );

        let wait = if config.jitter { add_jitter(delay) } else { delay };
        tokio::time::sleep(wait).await;
    }
}

/// Jitter is uniform between 0% and 100% of the delay
fn add_jitter(delay: Duration) -> Duration {
    let mut rng = rand::thread_rng();
    let jitter_factor: f64 = rng.gen_range(0.0..=1.0);
    Duration::from_secs_f64(delay.as_secs_f64() * (1.0 + jitter_factor))
}

/// Delays `with_retry` waits between attempts, in order
///
/// Starts at `initial_delay`, grows by `backoff_multiplier` and is capped at
/// `max_delay`; one delay per allowed retry.
fn backoff_schedule(config: &RetryConfig) -> impl Iterator<Item = Duration> + '_ {
    std::iter::successors(Some(config.initial_delay), move |delay| {
        Some(
            Duration::from_secs_f64(delay.as_secs_f64() * config.backoff_multiplier)
                .min(config.max_delay),
        )
    })
    .take(config.max_attempts as usize)
}
