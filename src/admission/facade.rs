//! Admission-controlled service facade.
//!
//! # Responsibilities
//! - Front inbound requests and outbound calls with a gate
//! - Translate refusals into caller-visible outcomes (Unavailable / Busy)
//! - Catch panics in admitted work as typed faults
//! - Coordinate stop and drain for graceful shutdown
//!
//! # Shutdown Protocol
//! ```text
//! stop()        → stop signal fires; waiting and new callers are refused
//! transport     → stops accepting raw connections (observes stop_signal())
//! wait_drain()  → returns once every admitted unit of work has closed
//! teardown      → pooled resources may now be closed
//! ```

use futures_util::FutureExt;
use serde::Serialize;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use super::drain::DrainCoordinator;
use super::error::{AdmissionError, DrainError, ExecutionFault, Outcome, Refusal};
use super::gate::Gate;
use super::session::{ResourcePool, Session, Ticket};
use super::signal::{Cancel, DoneSignal};
use crate::config::AdmissionConfig;
use crate::observability::metrics;

/// Side effects run when a call is refused.
pub trait RejectionNotifier: Send + Sync {
    /// The facade is stopping or the caller cancelled.
    fn on_unavailable(&self) {}
    /// No slot became free within the hesitation window.
    fn on_busy(&self) {}
}

/// Default notifier: a warning and a rejection counter per refusal.
#[derive(Debug, Clone)]
pub struct LogNotifier {
    gate: Arc<str>,
}

impl LogNotifier {
    pub fn new(gate: impl Into<Arc<str>>) -> Self {
        Self { gate: gate.into() }
    }
}

impl RejectionNotifier for LogNotifier {
    fn on_unavailable(&self) {
        tracing::warn!(gate = %self.gate, reason = "unavailable", "Admission refused");
        metrics::record_rejected(&self.gate, "unavailable");
    }

    fn on_busy(&self) {
        tracing::warn!(gate = %self.gate, reason = "busy", "Admission refused");
        metrics::record_rejected(&self.gate, "busy");
    }
}

/// Serializable state of one facade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AdmissionSnapshot {
    pub name: String,
    /// 0 when unbounded.
    pub capacity: usize,
    pub held: usize,
    pub in_flight: usize,
    pub stopping: bool,
}

/// Admission control in front of a service or a pooled resource.
///
/// Cheap to clone; clones share the gate, stop signal and drain counter.
#[derive(Clone)]
pub struct AdmissionControl {
    name: Arc<str>,
    gate: Gate,
    stop: DoneSignal,
    drain: DrainCoordinator,
    hesitation: Duration,
    notifier: Arc<dyn RejectionNotifier>,
}

impl AdmissionControl {
    /// Create a facade named `name` (used in logs and metrics labels).
    pub fn new(name: impl Into<Arc<str>>, config: &AdmissionConfig) -> Self {
        let name: Arc<str> = name.into();
        Self {
            notifier: Arc::new(LogNotifier::new(Arc::clone(&name))),
            name,
            gate: Gate::new(config.capacity),
            stop: DoneSignal::new(),
            drain: DrainCoordinator::new(),
            hesitation: config.hesitation(),
        }
    }

    /// Replace the rejection side effect.
    pub fn with_notifier(mut self, notifier: Arc<dyn RejectionNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Share an externally owned stop signal instead of a private one.
    pub fn with_stop_signal(mut self, stop: DoneSignal) -> Self {
        self.stop = stop;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capacity(&self) -> usize {
        self.gate.capacity()
    }

    pub fn hesitation(&self) -> Duration {
        self.hesitation
    }

    /// Slots currently held.
    pub fn held(&self) -> usize {
        self.gate.held()
    }

    /// Admitted units of work not yet finished.
    pub fn in_flight(&self) -> usize {
        self.drain.in_flight()
    }

    /// Point-in-time view for status endpoints.
    pub fn snapshot(&self) -> AdmissionSnapshot {
        AdmissionSnapshot {
            name: self.name.to_string(),
            capacity: self.gate.capacity(),
            held: self.gate.held(),
            in_flight: self.drain.in_flight(),
            stopping: self.stop.is_set(),
        }
    }

    /// Serve an inbound call.
    ///
    /// A stopping facade answers `Unavailable` without consulting the gate.
    /// Panics in `work` are returned as [`ExecutionFault`]; the slot is
    /// released and the drain counter decremented before this returns.
    pub async fn handle<F, Fut, T>(
        &self,
        cancel: Option<&DoneSignal>,
        work: F,
    ) -> Result<Outcome<T>, ExecutionFault>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        if self.stop.is_set() {
            self.notify(Refusal::Cancelled);
            return Ok(Outcome::Unavailable);
        }

        let ticket = match self.admit(cancel).await {
            Ok(ticket) => ticket,
            Err(refusal) => return Ok(Outcome::from_refusal(refusal)),
        };

        self.execute(ticket, work).await.map(Outcome::Admitted)
    }

    /// Issue an outbound call under admission control.
    pub async fn call<F, Fut, T>(&self, cancel: Option<&DoneSignal>, work: F) -> Result<T, AdmissionError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let ticket = self.admit(cancel).await?;
        Ok(self.execute(ticket, work).await?)
    }

    /// Acquire a slot for work the caller runs itself.
    ///
    /// Waiting is cancelled by `cancel` or by the facade stopping.
    pub async fn admit(&self, cancel: Option<&DoneSignal>) -> Result<Ticket, Refusal> {
        let cancel = self.cancel(cancel);
        // An unbounded gate never consults the signals; fail closed here instead.
        if cancel.is_cancelled() {
            self.notify(Refusal::Cancelled);
            return Err(Refusal::Cancelled);
        }
        let res = Ticket::acquire(&self.gate, &self.drain, cancel, self.hesitation).await;
        match &res {
            Ok(_) => {
                tracing::trace!(gate = %self.name, held = self.gate.held(), "Admitted");
                metrics::record_admitted(&self.name, self.drain.in_flight());
            }
            Err(refusal) => self.notify(*refusal),
        }
        res
    }

    /// Acquire a slot and borrow a handle from `pool`.
    pub async fn open<P: ResourcePool>(
        &self,
        pool: &Arc<P>,
        cancel: Option<&DoneSignal>,
    ) -> Result<Session<P>, AdmissionError<P::Error>> {
        let cancel = self.cancel(cancel);
        if cancel.is_cancelled() {
            self.notify(Refusal::Cancelled);
            return Err(AdmissionError::Refused(Refusal::Cancelled));
        }
        let res = Session::open(&self.gate, &self.drain, cancel, self.hesitation, pool).await;
        match &res {
            Ok(_) => metrics::record_admitted(&self.name, self.drain.in_flight()),
            Err(AdmissionError::Refused(refusal)) => self.notify(*refusal),
            Err(e) => tracing::debug!(gate = %self.name, error = %e, "Resource borrow failed"),
        }
        res
    }

    /// Refuse all new admissions and fire the stop signal.
    ///
    /// Returns `true` for the call that performed the transition.
    pub fn stop(&self) -> bool {
        let first = self.stop.fire();
        if first {
            tracing::info!(gate = %self.name, in_flight = self.drain.in_flight(), "Admission stopped");
        }
        first
    }

    pub fn is_stopping(&self) -> bool {
        self.stop.is_set()
    }

    /// The signal fired by [`AdmissionControl::stop`].
    pub fn stop_signal(&self) -> DoneSignal {
        self.stop.clone()
    }

    /// Wait until every admitted unit of work has finished.
    pub async fn wait_drain(&self) {
        self.drain.wait_drained().await;
        tracing::debug!(gate = %self.name, "Drained");
    }

    pub async fn wait_drain_timeout(&self, timeout: Duration) -> Result<(), DrainError> {
        self.drain.wait_drained_timeout(timeout).await
    }

    fn cancel<'a>(&'a self, caller: Option<&'a DoneSignal>) -> Cancel<'a> {
        let cancel = Cancel::on(&self.stop);
        match caller {
            Some(signal) => cancel.or(signal),
            None => cancel,
        }
    }

    async fn execute<F, Fut, T>(&self, mut ticket: Ticket, work: F) -> Result<T, ExecutionFault>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let res = AssertUnwindSafe(async move { work().await }).catch_unwind().await;
        ticket.release();
        metrics::set_in_flight(&self.name, self.drain.in_flight());

        res.map_err(|payload| {
            let fault = ExecutionFault::from_panic(payload);
            tracing::error!(gate = %self.name, error = %fault, "Admitted work panicked");
            metrics::record_fault(&self.name);
            fault
        })
    }

    fn notify(&self, refusal: Refusal) {
        match refusal {
            Refusal::Cancelled => self.notifier.on_unavailable(),
            Refusal::TimedOut => self.notifier.on_busy(),
        }
    }
}

impl std::fmt::Debug for AdmissionControl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdmissionControl")
            .field("name", &self.name)
            .field("capacity", &self.gate.capacity())
            .field("held", &self.gate.held())
            .field("in_flight", &self.drain.in_flight())
            .field("stopping", &self.stop.is_set())
            .finish()
    }
}
