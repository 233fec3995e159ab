//! Cancellation and timeouts around network calls.

use crate::error::ProverError;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Await `fut`, giving up when `cancel` fires or after `timeout`.
///
/// # Errors
/// [`ProverError::Cancelled`], [`ProverError::Timeout`] or the future's own error.
pub async fn guarded<T, E, F>(
    cancel: &CancellationToken,
    timeout: Duration,
    what: &'static str,
    fut: F,
) -> Result<T, ProverError>
where
    F: Future<Output = Result<T, E>>,
    ProverError: From<E>,
{
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(ProverError::Cancelled),
        res = tokio::time::timeout(timeout, fut) => match res {
            Ok(result) => result.map_err(ProverError::from),
            Err(_) => Err(ProverError::Timeout { what, timeout }),
        },
    }
}

/// Await `fut` until `cancel` fires.
///
/// # Errors
/// [`ProverError::Cancelled`] or the future's own error.
pub async fn cancellable<T, E, F>(cancel: &CancellationToken, fut: F) -> Result<T, ProverError>
where
    F: Future<Output = Result<T, E>>,
    ProverError: From<E>,
{
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(ProverError::Cancelled),
        res = fut => res.map_err(ProverError::from),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::ContractError;

    #[tokio::test]
    async fn test_guarded_passes_result() {
        let cancel = CancellationToken::new();
        let value = guarded(&cancel, Duration::from_secs(1), "read", async {
            Ok::<_, ContractError>(7)
        })
        .await
        .unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_guarded_times_out() {
        let cancel = CancellationToken::new();
        let result = guarded(&cancel, Duration::from_secs(5), "read", async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok::<_, ContractError>(())
        })
        .await;
        assert!(matches!(result, Err(ProverError::Timeout { what: "read", .. })));
    }

    #[tokio::test]
    async fn test_cancelled_before_completion() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = cancellable(&cancel, std::future::pending::<Result<(), ContractError>>()).await;
        assert!(matches!(result, Err(ProverError::Cancelled)));
    }
}
