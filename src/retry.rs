//! Retry logic with exponential backoff
//!
//! Used for requests whose failure cannot be routed around by switching
//! mirrors, such as asking a bootstrap server for its peer list. Mirror
//! attempts themselves are never retried against the same mirror.
//!
//! # Example
//!
//! ```no_run
//! use nanopub_fetch::config::RetryConfig;
//! use nanopub_fetch::retry::with_retry;
//!
//! # async fn example(client: &reqwest::Client) -> nanopub_fetch::Result<String> {
//! let peers = with_retry(&RetryConfig::default(), || async move {
//!     let response = client.get("https://bootstrap.example.org/peers").send().await?;
//!     Ok::<_, nanopub_fetch::Error>(response.error_for_status()?.text().await?)
//! })
//! .await?;
//! # Ok(peers)
//! # }
//! ```

use crate::config::RetryConfig;
use crate::error::Error;
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Trait for errors that can be classified as retryable or not
///
/// Transient failures (timeouts, refused connections, 5xx answers) should return `true`.
/// Permanent failures (bad input, unreadable payloads) should return `false`.
pub trait IsRetryable {
    /// Returns true if the error is transient and the operation should be retried
    fn is_retryable(&self) -> bool;
}

fn reqwest_is_transient(e: &reqwest::Error) -> bool {
    e.is_timeout()
        || e.is_connect()
        || e.status().is_some_and(|s| s.is_server_error() || s.as_u16() == 429)
}

impl IsRetryable for Error {
    fn is_retryable(&self) -> bool {
        match self {
            Error::Network(e) => reqwest_is_transient(e),
            Error::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::Interrupted
            ),
            // Everything else is a property of the input or the data
            Error::Config { .. }
            | Error::InvalidIdentifier { .. }
            | Error::NoServers
            | Error::ServersExhausted { .. }
            | Error::NotAnIndex(_)
            | Error::MalformedIndex { .. }
            | Error::IndexCycle(_)
            | Error::Parse(_)
            | Error::Serialization(_)
            | Error::TaskFailed(_)
            | Error::Other(_) => false,
        }
    }
}

/// Run `operation`, retrying transient failures with exponential backoff
///
/// At most `config.max_attempts` retries follow the first try. The error of
/// the last try is returned unchanged.
pub async fn with_retry<F, Fut, T, E>(config: &RetryConfig, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + std::fmt::Display,
{
    let mut retries = 0;
    let mut delay = config.initial_delay;

    loop {
        let error = match operation().await {
            Err(e) if e.is_retryable() && retries < config.max_attempts => e,
            done => return done,
        };
        retries += 1;

        let wait = if config.jitter { add_jitter(delay) } else { delay };
        tracing::debug!(error = %error, retry = retries, wait_ms = wait.as_millis() as u64, "Transient failure, retrying");
        tokio::time::sleep(wait).await;

        delay = Duration::try_from_secs_f64(delay.as_secs_f64() * config.backoff_multiplier)
            .unwrap_or(config.max_delay)
            .min(config.max_delay);
    }
}

/// Add random jitter to a delay to prevent thundering herd
///
/// The result lies between `delay` and `2 * delay`.
fn add_jitter(delay: Duration) -> Duration {
    let mut rng = rand::thread_rng();
    let jitter_factor: f64 = rng.gen_range(0.0..=1.0);
    Duration::from_secs_f64(delay.as_secs_f64() * (1.0 + jitter_factor))
}
