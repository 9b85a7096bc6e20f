//! Timeout Helpers
//!
//! Wraps suspension points (generative-service calls, data-store queries)
//! so an expired deadline surfaces as `TransitError::Timeout`, which the
//! retry policy treats as recoverable.

use std::future::Future;
use std::time::Duration;

use crate::types::{Result, TransitError};

/// Execute an async operation with a timeout
///
/// The inner future is dropped on expiry, cancelling any request it owns.
pub async fn with_timeout<T, F>(timeout: Duration, future: F, operation_name: &str) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(timeout, future).await {
        Ok(result) => result,
        Err(_) => Err(TransitError::timeout(operation_name, timeout)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_with_timeout_success() {
        let result = with_timeout(
            Duration::from_secs(1),
            async { Ok::<_, TransitError>(42) },
            "test operation",
        )
        .await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_with_timeout_expires() {
        let result = with_timeout(
            Duration::from_millis(10),
            async {
                tokio::time::sleep(Duration::from_secs(1)).await;
                Ok::<_, TransitError>(42)
            },
            "schema generation",
        )
        .await;
        let err = result.unwrap_err();
        assert!(matches!(err, TransitError::Timeout { .. }));
        assert!(err.is_recoverable());
        assert!(err.to_string().contains("schema generation"));
    }
}
