use std::future::Future;
use std::time::Duration;

use storage::repository::StorageError;
use tracing::warn;

pub(crate) const READ_RETRY_BACKOFF: Duration = Duration::from_millis(200);

/// Run a read, retrying once after a short pause when the store is unreachable.
///
/// Writes never go through here.
pub(crate) async fn read_with_retry<T, F, Fut>(op: &'static str, mut read: F) -> Result<T, StorageError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StorageError>>,
{
    match read().await {
        Err(StorageError::Connection(reason)) => {
            warn!(op, %reason, "store unreachable, retrying read once");
            tokio::time::sleep(READ_RETRY_BACKOFF).await;
            read().await
        }
        other => other,
    }
}
