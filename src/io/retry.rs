//! Fixed-delay retry for transient connection failures.

use crate::config::{POST_COMMIT_CONNECT_ATTEMPTS, POST_COMMIT_RETRY_DELAY};
use crate::error::{ErrorKind, Result};
use std::time::Duration;
use tracing::warn;

/// Configuration for retry behavior
#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: POST_COMMIT_CONNECT_ATTEMPTS,
            delay: POST_COMMIT_RETRY_DELAY,
        }
    }
}

impl RetryConfig {
    /// No waiting between attempts. Used by tests.
    #[must_use]
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            delay: Duration::ZERO,
        }
    }
}

/// Run `operation` until it succeeds, fails with an error whose kind is not in
/// `retry_on`, or `max_attempts` is used up. The last error is returned.
///
/// # Errors
/// Returns the error of the final attempt.
pub fn retry_fixed<F, T>(
    config: &RetryConfig,
    retry_on: &[ErrorKind],
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Result<T>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match operation() {
            Ok(result) => return Ok(result),
            Err(err) => {
                if !retry_on.contains(&err.kind) || attempt >= config.max_attempts {
                    return Err(err);
                }
                warn!(
                    attempt,
                    max_attempts = config.max_attempts,
                    error = %err,
                    "attempt failed, retrying"
                );
                if !config.delay.is_zero() {
                    std::thread::sleep(config.delay);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::WriterError;

    #[test]
    fn retries_transient_errors_until_success() {
        let mut attempts = 0;
        let result = retry_fixed(&RetryConfig::immediate(4), &[ErrorKind::ConnectDb], || {
            attempts += 1;
            if attempts < 3 {
                Err(WriterError::new(ErrorKind::ConnectDb, "refused"))
            } else {
                Ok(42)
            }
        });
        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts, 3);
    }

    #[test]
    fn gives_up_after_max_attempts() {
        let mut attempts = 0;
        let result: Result<()> =
            retry_fixed(&RetryConfig::immediate(4), &[ErrorKind::ConnectDb], || {
                attempts += 1;
                Err(WriterError::new(ErrorKind::ConnectDb, "refused"))
            });
        assert_eq!(result.unwrap_err().kind, ErrorKind::ConnectDb);
        assert_eq!(attempts, 4);
    }

    #[test]
    fn other_kinds_fail_immediately() {
        let mut attempts = 0;
        let result: Result<()> =
            retry_fixed(&RetryConfig::immediate(4), &[ErrorKind::ConnectDb], || {
                attempts += 1;
                Err(WriterError::new(ErrorKind::Sql, "syntax error"))
            });
        assert_eq!(result.unwrap_err().kind, ErrorKind::Sql);
        assert_eq!(attempts, 1);
    }

    #[test]
    fn default_matches_post_commit_policy() {
        let config = RetryConfig::default();
        assert_eq!(config.max_attempts, 4);
        assert_eq!(config.delay, Duration::from_millis(1000));
    }
}
