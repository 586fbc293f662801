use std::{future::Future, time::Duration};

use sqlx::{Database, Pool};
use tokio::sync::OnceCell;

use crate::error::{Error, Result};

/// Connection pool opened (and its schema bootstrapped) on first use.
pub(super) struct PoolState<DB: Database> {
    store: String,
    timeout: Duration,
    pool: OnceCell<Pool<DB>>,
}

impl<DB: Database> std::fmt::Debug for PoolState<DB> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolState")
            .field("store", &self.store)
            .field("timeout", &self.timeout)
            .field("connected", &self.pool.initialized())
            .finish()
    }
}

impl<DB: Database> PoolState<DB> {
    pub(super) fn new(store: String, timeout: Duration) -> Self {
        Self {
            store,
            timeout,
            pool: OnceCell::new(),
        }
    }

    pub(super) fn store(&self) -> &str {
        &self.store
    }

    pub(super) fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Return the pool, running `connect` first if no attempt has succeeded yet.
    /// A failed attempt leaves the cell empty so the next call retries.
    pub(super) async fn pool<F, Fut>(&self, connect: F) -> Result<&Pool<DB>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<Pool<DB>, sqlx::Error>>,
    {
        self.pool
            .get_or_try_init(|| async {
                tracing::debug!(store = %self.store, "Opening connection pool");
                self.bounded(connect()).await
            })
            .await
    }

    /// Run a store call under the configured timeout, mapping every failure to
    /// `StoreUnavailable`.
    pub(super) async fn bounded<T, Fut>(&self, fut: Fut) -> Result<T>
    where
        Fut: Future<Output = std::result::Result<T, sqlx::Error>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(self.unavailable(e)),
            Err(_) => Err(self.unavailable(format!("timed out after {:?}", self.timeout))),
        }
    }

    pub(super) fn unavailable(&self, message: impl std::fmt::Display) -> Error {
        let err = Error::store_unavailable(&self.store, message);
        tracing::warn!(store = %self.store, error = %err, "Store call failed");
        err
    }

    /// Close the pool if it was ever opened.
    pub(super) async fn close(&self) {
        if let Some(pool) = self.pool.get() {
            pool.close().await;
        }
    }
}
