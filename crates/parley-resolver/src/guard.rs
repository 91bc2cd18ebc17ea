use std::future::Future;
use std::time::Duration;

use thiserror::Error;

/// A store call that did not settle before its deadline.
#[derive(Debug, Clone, Error)]
#[error("{label} timed out after {}ms", .after.as_millis())]
pub struct DeadlineElapsed {
    pub label: &'static str,
    pub after: Duration,
}

/// Race `operation` against a timer. On expiry the operation is dropped, so a
/// late completion is discarded rather than observed.
pub async fn with_deadline<T, F>(operation: F, deadline: Duration, label: &'static str) -> anyhow::Result<T>
where
    F: Future<Output = anyhow::Result<T>>,
{
    match tokio::time::timeout(deadline, operation).await {
        Ok(result) => result,
        Err(_) => Err(DeadlineElapsed { label, after: deadline }.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn hung_operation_becomes_labeled_failure() {
        let err = with_deadline(
            std::future::pending::<anyhow::Result<()>>(),
            Duration::from_millis(250),
            "participant lookup",
        )
        .await
        .unwrap_err();

        let elapsed = err.downcast_ref::<DeadlineElapsed>().unwrap();
        assert_eq!(elapsed.label, "participant lookup");
        assert_eq!(elapsed.after, Duration::from_millis(250));
        assert_eq!(err.to_string(), "participant lookup timed out after 250ms");
    }

    #[tokio::test(start_paused = true)]
    async fn fast_operation_passes_through() {
        let value = with_deadline(
            async {
                tokio::time::sleep(Duration::from_millis(10)).await;
                Ok(7)
            },
            Duration::from_secs(1),
            "conversation insert",
        )
        .await
        .unwrap();

        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn inner_error_is_not_rewritten() {
        let err = with_deadline(
            async { Err::<(), _>(anyhow::anyhow!("disk on fire")) },
            Duration::from_secs(1),
            "conversation insert",
        )
        .await
        .unwrap_err();

        assert!(err.downcast_ref::<DeadlineElapsed>().is_none());
        assert_eq!(err.to_string(), "disk on fire");
    }
}
