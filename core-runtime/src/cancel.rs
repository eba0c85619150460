//! Cancellation and deadlines for network-bound futures.
//!
//! Every remote call in the core goes through [`guard`]: the future is raced
//! against a [`CancellationToken`] and an optional deadline, and dropped as
//! soon as either fires. Dropping a reqwest future aborts the request.

use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Why a guarded future did not complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Interrupted {
    #[error("operation cancelled")]
    Cancelled,
    #[error("operation timed out after {0:?}")]
    TimedOut(Duration),
}

/// Run `fut` until it completes, `cancel` fires, or `limit` elapses.
///
/// An already-cancelled token short-circuits without polling `fut`.
pub async fn guard<F, T>(
    cancel: &CancellationToken,
    limit: Option<Duration>,
    fut: F,
) -> Result<T, Interrupted>
where
    F: Future<Output = T>,
{
    if cancel.is_cancelled() {
        return Err(Interrupted::Cancelled);
    }

    let bounded = async {
        match limit {
            Some(limit) => tokio::time::timeout(limit, fut)
                .await
                .map_err(|_| Interrupted::TimedOut(limit)),
            None => Ok(fut.await),
        }
    };

    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Interrupted::Cancelled),
        result = bounded => result,
    }
}
