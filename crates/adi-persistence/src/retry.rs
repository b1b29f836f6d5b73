//! Retry-with-backoff for transient storage errors.
//!
//! The async counterpart of the teacher's `chem-persistence::pg::with_retry`
//! / `is_retryable`, generalised from a blocking `std::thread::sleep` loop
//! to `tokio::time::sleep` since every caller here runs on the async
//! worker pool. Per spec.md §4.1: up to 5 attempts, exponential backoff,
//! connection-reset is transient, an integrity violation is not.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::PersistenceError;

const MAX_ATTEMPTS: u32 = 5;
const BASE_DELAY_MS: u64 = 20;

fn is_retryable(e: &PersistenceError) -> bool {
    matches!(e, PersistenceError::TransientIo(_))
}

pub async fn with_retry<F, Fut, T>(mut f: F) -> Result<T, PersistenceError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, PersistenceError>>,
{
    let mut attempt = 0;
    loop {
        match f().await {
            Err(e) if is_retryable(&e) && attempt + 1 < MAX_ATTEMPTS => {
                let delay_ms = BASE_DELAY_MS * 2u64.pow(attempt);
                warn!(attempt = attempt + 1, delay_ms, error = %e, "retrying transient storage error");
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                attempt += 1;
            }
            other => return other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn retries_transient_errors_until_success() {
        let calls = AtomicU32::new(0);
        let result = with_retry(|| async {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            if n < 2 {
                Err(PersistenceError::TransientIo("connection reset".into()))
            } else {
                Ok(42)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn does_not_retry_integrity_violations() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_retry(|| async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(PersistenceError::UniqueViolation("dup".into()))
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_retry(|| async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(PersistenceError::TransientIo("timeout".into()))
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), MAX_ATTEMPTS);
    }
}
