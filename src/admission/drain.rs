//! In-flight tracking for graceful drain.
//!
//! # Responsibilities
//! - Count admitted, not yet finished units of work
//! - Let a shutdown sequence wait for the count to reach zero
//!
//! # Design Decisions
//! - Count lives in a watch channel so waiters wake on change instead of polling
//! - Increments happen through `track()` only; the guard's drop is the only decrement

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use super::error::DrainError;

/// Join-able in-flight counter.
#[derive(Debug, Clone)]
pub struct DrainCoordinator {
    in_flight: Arc<watch::Sender<usize>>,
}

impl DrainCoordinator {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(0);
        Self {
            in_flight: Arc::new(tx),
        }
    }

    /// Record a new unit of work. Returns a guard that decrements on drop.
    pub fn track(&self) -> InFlightGuard {
        self.in_flight.send_modify(|n| *n += 1);
        InFlightGuard {
            in_flight: Arc::clone(&self.in_flight),
        }
    }

    /// Current in-flight count.
    pub fn in_flight(&self) -> usize {
        *self.in_flight.borrow()
    }

    /// Wait until no work is in flight.
    pub async fn wait_drained(&self) {
        let mut rx = self.in_flight.subscribe();
        let _ = rx.wait_for(|n| *n == 0).await;
    }

    /// Wait until drained or `timeout` elapses.
    pub async fn wait_drained_timeout(&self, timeout: Duration) -> Result<(), DrainError> {
        match tokio::time::timeout(timeout, self.wait_drained()).await {
            Ok(()) => Ok(()),
            Err(_) => Err(DrainError::Timeout {
                waited: timeout,
                remaining: self.in_flight(),
            }),
        }
    }
}

impl Default for DrainCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

/// Guard for one in-flight unit of work.
#[derive(Debug)]
#[must_use = "dropping the guard ends the unit of work"]
pub struct InFlightGuard {
    in_flight: Arc<watch::Sender<usize>>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.in_flight.send_modify(|n| *n -= 1);
    }
}
