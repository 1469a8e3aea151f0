use std::future::Future;
use std::time::Duration;

use crate::error::{AppError, Result};

/// Awaits `fut` for at most `limit`.
pub async fn with_timeout<T>(
    op: &'static str,
    limit: Duration,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(AppError::Timeout(op)),
    }
}

/// Runs a store mutation on its own task and waits at most `limit` for it.
///
/// Dropping the caller (a client disconnect) or hitting the limit does not
/// cancel the task: the transaction still commits or rolls back on its own.
pub async fn detached<T, F>(op: &'static str, limit: Duration, fut: F) -> Result<T>
where
    T: Send + 'static,
    F: Future<Output = Result<T>> + Send + 'static,
{
    let handle = tokio::spawn(fut);
    match tokio::time::timeout(limit, handle).await {
        Ok(Ok(result)) => result,
        Ok(Err(e)) => Err(AppError::Internal(format!("{} task failed: {}", op, e))),
        Err(_) => Err(AppError::Timeout(op)),
    }
}
