//! Retry with exponential backoff for downloads

use std::time::Duration;

use indicatif::ProgressBar;

use crate::error::FetchError;
use crate::shutdown::is_shutdown_requested;
use crate::stream::http_config;

/// Exponential backoff: 2^attempt seconds (2s, 4s, 8s, ...)
pub const fn backoff_duration(attempt: u32) -> Duration {
    Duration::from_secs(2u64.pow(attempt))
}

/// Retry a fallible fetch with exponential backoff.
///
/// On retryable errors, logs the failure, updates the progress bar, sleeps,
/// and retries up to `max_retries` (from the global `HttpConfig`).
pub fn retry_with_backoff<T>(
    label: &str,
    pb: &ProgressBar,
    attempt_fn: impl FnMut() -> Result<T, FetchError>,
) -> Result<T, FetchError> {
    retry_with_policy(label, pb, http_config().max_retries, backoff_duration, attempt_fn)
}

/// [`retry_with_backoff`] with explicit retry count and delay function.
pub fn retry_with_policy<T>(
    label: &str,
    pb: &ProgressBar,
    max_retries: u32,
    delay: impl Fn(u32) -> Duration,
    mut attempt_fn: impl FnMut() -> Result<T, FetchError>,
) -> Result<T, FetchError> {
    let mut attempt = 0u32;
    loop {
        match attempt_fn() {
            Ok(v) => return Ok(v),
            Err(e) if attempt < max_retries && e.is_retryable() && !is_shutdown_requested() => {
                attempt += 1;
                pb.set_message(format!("retry {attempt}/{max_retries}..."));
                log::warn!("{label}: attempt {attempt}/{max_retries} failed: {e}, retrying...");
                std::thread::sleep(delay(attempt));
            }
            Err(e) => {
                log::error!("{label}: failed permanently: {e}");
                return Err(e);
            }
        }
    }
}
