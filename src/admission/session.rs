//! Bounded resource sessions.
//!
//! # Responsibilities
//! - Pair a gate slot and an in-flight registration with a borrowed resource
//! - Guarantee the slot is released exactly once, on every exit path
//!
//! # Lifecycle
//! ```text
//! Acquiring ──admitted──▶ borrow ──ok──▶ Active ──close/drop──▶ Released
//!     │                     │
//!     └─refused             └─failed: slot released before returning
//! ```

use async_trait::async_trait;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::Duration;

use super::drain::{DrainCoordinator, InFlightGuard};
use super::error::{AdmissionError, Refusal};
use super::gate::{Gate, GatePermit};
use super::signal::Cancel;

/// An external pool that lends resource handles.
///
/// Cancellation of `borrow` is expressed by dropping its future; sessions race
/// it against the caller's cancel signal.
#[async_trait]
pub trait ResourcePool: Send + Sync + 'static {
    type Handle: Send + 'static;
    type Error: std::error::Error + Send + Sync + 'static;

    /// Lend a handle.
    async fn borrow(&self) -> Result<Self::Handle, Self::Error>;

    /// Take a handle back.
    fn release(&self, handle: Self::Handle);
}

/// An admitted slot with no resource attached.
///
/// Used by facades whose unit of work brings its own resource (an inbound
/// request, an outbound HTTP call).
#[derive(Debug)]
#[must_use = "dropping the ticket ends the admission"]
pub struct Ticket {
    permit: GatePermit,
    flight: Option<InFlightGuard>,
}

impl Ticket {
    /// Acquire a gate slot and register it as in flight.
    pub async fn acquire(
        gate: &Gate,
        drain: &DrainCoordinator,
        cancel: Cancel<'_>,
        hesitation: Duration,
    ) -> Result<Self, Refusal> {
        let permit = gate.acquire(cancel, hesitation).await?;
        // Registered before any work can start, so a drain waiter never sees a false zero.
        let flight = Some(drain.track());
        Ok(Self { permit, flight })
    }

    /// Deregister, then release the slot (reverse of acquisition). Idempotent.
    pub fn release(&mut self) {
        self.flight.take();
        self.permit.release();
    }

    pub fn is_released(&self) -> bool {
        self.flight.is_none()
    }
}

impl Drop for Ticket {
    fn drop(&mut self) {
        self.release();
    }
}

/// An admitted unit of work holding one borrowed resource handle.
///
/// Dereferences to the handle. Closing (or dropping) returns the handle to its
/// pool, then deregisters from the drain, then releases the gate slot.
pub struct Session<P: ResourcePool> {
    pool: Arc<P>,
    handle: Option<P::Handle>,
    ticket: Ticket,
}

impl<P: ResourcePool> Session<P> {
    /// Acquire a slot and borrow a handle from `pool`.
    ///
    /// A refused acquisition never touches the pool. A failed or cancelled
    /// borrow releases the slot before returning.
    pub async fn open(
        gate: &Gate,
        drain: &DrainCoordinator,
        cancel: Cancel<'_>,
        hesitation: Duration,
        pool: &Arc<P>,
    ) -> Result<Self, AdmissionError<P::Error>> {
        let ticket = Ticket::acquire(gate, drain, cancel, hesitation).await?;

        let handle = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(AdmissionError::Refused(Refusal::Cancelled)),
            res = pool.borrow() => res.map_err(AdmissionError::Borrow)?,
        };

        Ok(Self {
            pool: Arc::clone(pool),
            handle: Some(handle),
            ticket,
        })
    }

    /// End the session, returning the handle to the pool.
    pub fn close(mut self) {
        self.finish(true);
    }

    /// End the session without returning the handle (e.g. it is broken).
    pub fn discard(mut self) {
        self.finish(false);
    }

    fn finish(&mut self, give_back: bool) {
        if let Some(handle) = self.handle.take() {
            if give_back {
                self.pool.release(handle);
            }
        }
        self.ticket.release();
    }
}

impl<P: ResourcePool> Deref for Session<P> {
    type Target = P::Handle;

    fn deref(&self) -> &Self::Target {
        self.handle.as_ref().expect("session handle is held until close")
    }
}

impl<P: ResourcePool> DerefMut for Session<P> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.handle.as_mut().expect("session handle is held until close")
    }
}

impl<P: ResourcePool> Drop for Session<P> {
    fn drop(&mut self) {
        self.finish(true);
    }
}

impl<P: ResourcePool> std::fmt::Debug for Session<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("active", &self.handle.is_some())
            .field("ticket", &self.ticket)
            .finish()
    }
}
