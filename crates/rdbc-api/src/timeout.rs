use rdbc_core::{RdbcError, Result};
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Runs `fut` under `timeout`. On expiry the future is dropped, which only
/// abandons the work locally; an engine may keep executing it.
pub async fn with_timeout<T, F>(timeout: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(outcome) => outcome,
        Err(_) => {
            debug!("operation timed out after {timeout:?}");
            Err(RdbcError::Timeout(timeout))
        }
    }
}
