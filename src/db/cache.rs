//! Admission-controlled cache connections.
//!
//! The cache protocol itself is left to the [`Manager`] implementation; this
//! module only bounds how many connections are lent at once and recycles them.

use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::admission::{AdmissionControl, AdmissionError, DoneSignal, Session};
use crate::config::CacheConfig;
use crate::pool::{idle_capacity, IdlePool, Manager};

const DEFAULT_IDLE: usize = 2;

/// Errors from a [`CachePool`].
#[derive(Debug, Error)]
pub enum CacheError<E>
where
    E: std::error::Error + 'static,
{
    #[error(transparent)]
    Admission(AdmissionError),

    #[error("cache backend error: {0}")]
    Backend(#[source] E),
}

impl<E: std::error::Error + 'static> From<AdmissionError<E>> for CacheError<E> {
    fn from(err: AdmissionError<E>) -> Self {
        match err {
            AdmissionError::Refused(refusal) => CacheError::Admission(AdmissionError::Refused(refusal)),
            AdmissionError::Borrow(e) => CacheError::Backend(e),
            AdmissionError::Fault(fault) => CacheError::Admission(AdmissionError::Fault(fault)),
        }
    }
}

/// Admission-controlled pool of cache connections.
pub struct CachePool<M: Manager> {
    admission: AdmissionControl,
    pool: Arc<IdlePool<M>>,
}

impl<M: Manager> CachePool<M> {
    pub fn new(manager: M, config: &CacheConfig) -> Self {
        let max_idle = idle_capacity(config.admission.capacity, DEFAULT_IDLE);
        let pool = IdlePool::new(manager, max_idle, Duration::from_secs(config.idle_timeout_secs));
        Self {
            admission: AdmissionControl::new("cache", &config.admission),
            pool: Arc::new(pool),
        }
    }

    pub fn admission(&self) -> &AdmissionControl {
        &self.admission
    }

    pub fn idle_connections(&self) -> usize {
        self.pool.idle_count()
    }

    /// Borrow a connection. It holds an admission slot until closed or dropped.
    pub async fn get(&self, cancel: Option<&DoneSignal>) -> Result<CacheConn<M>, CacheError<M::Error>> {
        let session = self.admission.open(&self.pool, cancel).await?;
        Ok(CacheConn { session })
    }

    /// Stop lending, wait for borrowed connections to come back, then close idle ones.
    pub async fn close(&self) {
        self.admission.stop();
        self.admission.wait_drain().await;
        self.pool.clear();
    }
}

impl<M: Manager> Clone for CachePool<M> {
    fn clone(&self) -> Self {
        Self {
            admission: self.admission.clone(),
            pool: Arc::clone(&self.pool),
        }
    }
}

/// A lent cache connection. Returns to the pool on drop.
pub struct CacheConn<M: Manager> {
    session: Session<IdlePool<M>>,
}

impl<M: Manager> CacheConn<M> {
    /// Return the connection to the pool.
    pub fn close(self) {
        self.session.close();
    }

    /// Close the connection instead of returning it.
    pub fn discard(self) {
        self.session.discard();
    }
}

impl<M: Manager> Deref for CacheConn<M> {
    type Target = M::Connection;

    fn deref(&self) -> &Self::Target {
        &self.session
    }
}

impl<M: Manager> DerefMut for CacheConn<M> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.session
    }
}
