//! Timeout enforcement.
//!
//! # Responsibilities
//! - Bound a whole `send` (every redirect hop) by the request timeout
//! - Abort promptly when the caller cancels
//!
//! # Design Decisions
//! - Uses Tokio's timer and a `CancellationToken`, raced with `select!`
//! - The losing future is dropped, which drops any connection it held
//! - Cancellation wins over a simultaneous timeout

use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::error::{EngineError, EngineResult};

/// Run `fut` until it finishes, `timeout` elapses or `cancel` fires.
pub async fn with_deadline<T, F>(fut: F, timeout: Duration, cancel: &CancellationToken) -> EngineResult<T>
where
    F: Future<Output = EngineResult<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(EngineError::Cancelled),
        res = tokio::time::timeout(timeout, fut) => match res {
            Ok(res) => res,
            Err(_) => Err(EngineError::TimedOut(timeout)),
        },
    }
}

/// Wait for `fut` unless `cancel` fires first.
pub async fn cancellable<T, F>(fut: F, cancel: &CancellationToken) -> EngineResult<T>
where
    F: Future<Output = T>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(EngineError::Cancelled),
        value = fut => Ok(value),
    }
}
