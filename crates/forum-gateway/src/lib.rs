pub mod connection;
pub mod dispatcher;
pub mod distribution;
pub mod presence;

#[cfg(test)]
pub(crate) mod testing;

use forum_types::error::{ForumError, ForumResult};
use tracing::error;

/// Run a storage call on the blocking pool.
pub async fn blocking<F, T>(f: F) -> ForumResult<T>
where
    F: FnOnce() -> ForumResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await.map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        ForumError::Internal(anyhow::anyhow!("storage task failed: {}", e))
    })?
}
