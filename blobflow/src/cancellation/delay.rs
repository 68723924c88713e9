//! Cancellable delay used between retry attempts.

use super::CancellationToken;
use crate::errors::PipelineError;
use std::time::Duration;

fn aborted(token: &CancellationToken) -> PipelineError {
    token
        .reason()
        .map_or_else(PipelineError::aborted, PipelineError::Aborted)
}

/// Sleeps for `duration` unless `token` fires first.
///
/// On cancellation the timer is dropped and `PipelineError::Aborted` is
/// returned immediately.
pub async fn delay(duration: Duration, token: Option<&CancellationToken>) -> Result<(), PipelineError> {
    let Some(token) = token else {
        tokio::time::sleep(duration).await;
        return Ok(());
    };

    if token.is_cancelled() {
        return Err(aborted(token));
    }

    tokio::select! {
        () = tokio::time::sleep(duration) => Ok(()),
        () = token.cancelled() => Err(aborted(token)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn test_delay_completes() {
        let start = Instant::now();
        delay(Duration::from_secs(3), None).await.unwrap();
        assert!(start.elapsed() >= Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_with_idle_token_completes() {
        let token = CancellationToken::new();
        delay(Duration::from_millis(200), Some(&token)).await.unwrap();
    }

    #[tokio::test]
    async fn test_delay_rejects_when_already_cancelled() {
        let token = CancellationToken::new();
        token.cancel("gone");

        let err = delay(Duration::from_secs(60), Some(&token)).await.unwrap_err();
        assert!(matches!(err, PipelineError::Aborted(ref reason) if reason == "gone"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_rejects_mid_wait() {
        let token = Arc::new(CancellationToken::new());
        let canceller = {
            let token = token.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(100)).await;
                token.cancel("user abort");
            })
        };

        let start = Instant::now();
        let result = delay(Duration::from_secs(30), Some(&token)).await;
        canceller.await.unwrap();

        assert!(result.unwrap_err().is_aborted());
        assert!(start.elapsed() < Duration::from_secs(30));
    }
}
