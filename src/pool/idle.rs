//! Idle-connection pool.
//!
//! # Responsibilities
//! - Keep up to `max_idle` connections for reuse
//! - Test connections on borrow; drop stale or failing ones
//! - Dial a fresh connection when nothing reusable is left
//!
//! # Design Decisions
//! - LIFO reuse: the most recently returned connection is the warmest
//! - No active-connection limit here; the admission gate in front bounds that
//! - Connections are only ever owned by one borrower at a time

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

use crate::admission::ResourcePool;

/// Creates and validates connections for an [`IdlePool`].
#[async_trait]
pub trait Manager: Send + Sync + 'static {
    type Connection: Send + 'static;
    type Error: std::error::Error + Send + Sync + 'static;

    /// Open a new connection.
    async fn connect(&self) -> Result<Self::Connection, Self::Error>;

    /// Test an idle connection before lending it. `idle_for` is how long it sat unused.
    async fn check(&self, conn: &mut Self::Connection, idle_for: Duration) -> Result<(), Self::Error> {
        let _ = (conn, idle_for);
        Ok(())
    }

    /// Whether a returned connection must be dropped instead of kept idle.
    fn has_broken(&self, conn: &mut Self::Connection) -> bool {
        let _ = conn;
        false
    }
}

struct IdleConn<C> {
    conn: C,
    since: Instant,
}

/// A pool of idle connections in front of a [`Manager`].
pub struct IdlePool<M: Manager> {
    manager: M,
    idle: Mutex<VecDeque<IdleConn<M::Connection>>>,
    max_idle: usize,
    idle_timeout: Duration,
}

impl<M: Manager> IdlePool<M> {
    /// Create a pool keeping at most `max_idle` connections.
    /// A zero `idle_timeout` keeps idle connections indefinitely.
    pub fn new(manager: M, max_idle: usize, idle_timeout: Duration) -> Self {
        Self {
            manager,
            idle: Mutex::new(VecDeque::with_capacity(max_idle)),
            max_idle,
            idle_timeout,
        }
    }

    pub fn manager(&self) -> &M {
        &self.manager
    }

    pub fn max_idle(&self) -> usize {
        self.max_idle
    }

    /// Connections currently idle.
    pub fn idle_count(&self) -> usize {
        self.lock().len()
    }

    /// Drop every idle connection.
    pub fn clear(&self) {
        let drained: Vec<_> = self.lock().drain(..).collect();
        if !drained.is_empty() {
            tracing::debug!(closed = drained.len(), "Idle pool cleared");
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<IdleConn<M::Connection>>> {
        // A panic while holding this lock cannot leave the deque inconsistent.
        self.idle.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn pop_idle(&self) -> Option<IdleConn<M::Connection>> {
        self.lock().pop_back()
    }

    fn is_stale(&self, since: Instant) -> bool {
        !self.idle_timeout.is_zero() && since.elapsed() >= self.idle_timeout
    }
}

#[async_trait]
impl<M: Manager> ResourcePool for IdlePool<M> {
    type Handle = M::Connection;
    type Error = M::Error;

    async fn borrow(&self) -> Result<M::Connection, M::Error> {
        while let Some(IdleConn { mut conn, since }) = self.pop_idle() {
            if self.is_stale(since) {
                tracing::trace!("Dropping stale idle connection");
                continue;
            }
            match self.manager.check(&mut conn, since.elapsed()).await {
                Ok(()) => return Ok(conn),
                Err(e) => tracing::debug!(error = %e, "Idle connection failed check"),
            }
        }
        self.manager.connect().await
    }

    fn release(&self, mut conn: M::Connection) {
        if self.manager.has_broken(&mut conn) {
            tracing::debug!("Dropping broken connection");
            return;
        }
        let mut idle = self.lock();
        if idle.len() < self.max_idle {
            idle.push_back(IdleConn {
                conn,
                since: Instant::now(),
            });
        }
    }
}

/// Idle connections to keep for a gate of `capacity`: a fifth of it, or
/// `fallback` when that rounds to zero.
pub fn idle_capacity(capacity: usize, fallback: usize) -> usize {
    match capacity / 5 {
        0 => fallback,
        n => n,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Debug, thiserror::Error)]
    #[error("connection refused")]
    pub(crate) struct Refused;

    #[derive(Debug, PartialEq, Eq)]
    pub(crate) struct FakeConn {
        pub(crate) id: usize,
        pub(crate) broken: bool,
    }

    #[derive(Default)]
    pub(crate) struct FakeManager {
        pub(crate) dialed: AtomicUsize,
        pub(crate) checked: AtomicUsize,
        pub(crate) fail_checks: AtomicBool,
        pub(crate) fail_connect: AtomicBool,
    }

    #[async_trait]
    impl Manager for FakeManager {
        type Connection = FakeConn;
        type Error = Refused;

        async fn connect(&self) -> Result<FakeConn, Refused> {
            if self.fail_connect.load(Ordering::SeqCst) {
                return Err(Refused);
            }
            let id = self.dialed.fetch_add(1, Ordering::SeqCst);
            Ok(FakeConn { id, broken: false })
        }

        async fn check(&self, _conn: &mut FakeConn, _idle_for: Duration) -> Result<(), Refused> {
            self.checked.fetch_add(1, Ordering::SeqCst);
            if self.fail_checks.load(Ordering::SeqCst) {
                Err(Refused)
            } else {
                Ok(())
            }
        }

        fn has_broken(&self, conn: &mut FakeConn) -> bool {
            conn.broken
        }
    }

    #[tokio::test]
    async fn reuses_most_recent_connection() {
        let pool = IdlePool::new(FakeManager::default(), 2, Duration::ZERO);
        let a = pool.borrow().await.unwrap();
        let b = pool.borrow().await.unwrap();
        pool.release(a);
        pool.release(b);
        assert_eq!(pool.idle_count(), 2);

        let again = pool.borrow().await.unwrap();
        assert_eq!(again.id, 1);
        assert_eq!(pool.manager().dialed.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn idle_list_is_bounded() {
        let pool = IdlePool::new(FakeManager::default(), 1, Duration::ZERO);
        let a = pool.borrow().await.unwrap();
        let b = pool.borrow().await.unwrap();
        pool.release(a);
        pool.release(b);
        assert_eq!(pool.idle_count(), 1);
    }

    #[tokio::test]
    async fn failed_check_falls_back_to_dial() {
        let pool = IdlePool::new(FakeManager::default(), 2, Duration::ZERO);
        let a = pool.borrow().await.unwrap();
        pool.release(a);

        pool.manager().fail_checks.store(true, Ordering::SeqCst);
        let fresh = pool.borrow().await.unwrap();
        assert_eq!(fresh.id, 1);
        assert_eq!(pool.idle_count(), 0);
    }

    #[tokio::test]
    async fn broken_connections_are_not_kept() {
        let pool = IdlePool::new(FakeManager::default(), 2, Duration::ZERO);
        let mut a = pool.borrow().await.unwrap();
        a.broken = true;
        pool.release(a);
        assert_eq!(pool.idle_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_connections_are_skipped() {
        let pool = IdlePool::new(FakeManager::default(), 2, Duration::from_secs(60));
        let a = pool.borrow().await.unwrap();
        pool.release(a);

        tokio::time::advance(Duration::from_secs(61)).await;
        let fresh = pool.borrow().await.unwrap();
        assert_eq!(fresh.id, 1);
        assert_eq!(pool.manager().checked.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn idle_capacity_is_a_fifth() {
        assert_eq!(idle_capacity(100, 2), 20);
        assert_eq!(idle_capacity(4, 2), 2);
        assert_eq!(idle_capacity(0, 7), 7);
    }
}
