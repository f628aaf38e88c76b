use async_trait::async_trait;

use super::{IdGenError, IdGenerator};
use crate::admission::DoneSignal;
use crate::db::CachePool;
use crate::pool::Manager;

/// A cache connection that supports an atomic integer increment.
#[async_trait]
pub trait CounterConn: Send {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Increment `key` by one and return the new value. A missing key counts from 0.
    async fn incr(&mut self, key: &str) -> Result<i64, Self::Error>;
}

/// Ids from an INCR-style counter in a cache.
pub struct CacheIdGen<M: Manager> {
    pool: CachePool<M>,
    key: String,
}

impl<M> CacheIdGen<M>
where
    M: Manager,
    M::Connection: CounterConn,
{
    pub fn new(pool: CachePool<M>, key: impl Into<String>) -> Self {
        Self { pool, key: key.into() }
    }
}

#[async_trait]
impl<M> IdGenerator for CacheIdGen<M>
where
    M: Manager,
    M::Connection: CounterConn,
{
    async fn next_id(&self, cancel: Option<&DoneSignal>) -> Result<i64, IdGenError> {
        let mut conn = self
            .pool
            .get(cancel)
            .await
            .map_err(|e| IdGenError::Cache(Box::new(e)))?;
        conn.incr(&self.key).await.map_err(|e| IdGenError::Cache(Box::new(e)))
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}
