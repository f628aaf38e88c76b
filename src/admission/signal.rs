//! Lifecycle signals.
//!
//! # Responsibilities
//! - One-shot broadcast signal (`DoneSignal`) for "shutdown requested" / "work finished"
//! - Re-arming notifier (`Notifier`) for "state changed, check again"
//! - Borrowed cancellation view (`Cancel`) combining a caller signal with a stop signal

use std::future::pending;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Notify};

/// One-shot signal that transitions from unset to set exactly once.
///
/// Clones share the same underlying state, so any clone may fire it and any
/// number of tasks may wait on it.
#[derive(Debug, Clone)]
pub struct DoneSignal {
    tx: Arc<watch::Sender<bool>>,
}

impl DoneSignal {
    /// Create a new unset signal.
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Fire the signal.
    ///
    /// Returns `true` only for the call that performed the transition.
    /// Firing an already fired signal is a no-op.
    pub fn fire(&self) -> bool {
        self.tx.send_if_modified(|fired| {
            if *fired {
                false
            } else {
                *fired = true;
                true
            }
        })
    }

    /// Check whether the signal has fired, without blocking.
    pub fn is_set(&self) -> bool {
        *self.tx.borrow()
    }

    /// Wait until the signal fires. Returns immediately if it already has.
    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives as long as `self`, so this cannot observe a closed channel.
        let _ = rx.wait_for(|fired| *fired).await;
    }

    /// Fire the signal once `after` has elapsed.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn fire_after(&self, after: Duration) {
        let signal = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(after).await;
            signal.fire();
        });
    }
}

impl Default for DoneSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Coalescing "please re-check" notification.
///
/// Any number of `notify` calls made while a notification is pending collapse
/// into a single pending notification. Carries no payload.
#[derive(Debug, Clone, Default)]
pub struct Notifier {
    inner: Arc<NotifierInner>,
}

#[derive(Debug, Default)]
struct NotifierInner {
    pending: AtomicBool,
    notify: Notify,
}

impl Notifier {
    /// Create a notifier with nothing pending.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a notification as pending and wake a waiting consumer.
    pub fn notify(&self) {
        if !self.inner.pending.swap(true, Ordering::AcqRel) {
            self.inner.notify.notify_one();
        }
    }

    /// Whether a notification is waiting to be consumed.
    pub fn is_pending(&self) -> bool {
        self.inner.pending.load(Ordering::Acquire)
    }

    /// Consume a pending notification without blocking.
    pub fn try_consume(&self) -> bool {
        self.inner.pending.swap(false, Ordering::AcqRel)
    }

    /// Wait until a notification is pending, then clear it.
    pub async fn consume(&self) {
        loop {
            if self.try_consume() {
                return;
            }
            // A stale wakeup left behind by an earlier try_consume just loops once more.
            self.inner.notify.notified().await;
        }
    }
}

/// A borrowed set of signals that cancel a wait when any of them fires.
///
/// Holds at most two signals: the caller's own and a facade's stop signal.
#[derive(Debug, Clone, Copy, Default)]
pub struct Cancel<'a> {
    signals: [Option<&'a DoneSignal>; 2],
}

impl<'a> Cancel<'a> {
    /// A cancellation that never fires.
    pub fn never() -> Self {
        Self::default()
    }

    /// Cancel when `signal` fires.
    pub fn on(signal: &'a DoneSignal) -> Self {
        Self {
            signals: [Some(signal), None],
        }
    }

    /// Also cancel when `signal` fires. Replaces the second slot if both are taken.
    pub fn or(mut self, signal: &'a DoneSignal) -> Self {
        if self.signals[0].is_none() {
            self.signals[0] = Some(signal);
        } else {
            self.signals[1] = Some(signal);
        }
        self
    }

    /// Whether any of the signals has already fired.
    pub fn is_cancelled(&self) -> bool {
        self.signals.iter().flatten().any(|s| s.is_set())
    }

    /// Resolve once any signal fires. Never resolves for [`Cancel::never`].
    pub async fn cancelled(self) {
        match self.signals {
            [Some(a), Some(b)] => {
                tokio::select! {
                    _ = a.wait() => {}
                    _ = b.wait() => {}
                }
            }
            [Some(s), None] | [None, Some(s)] => s.wait().await,
            [None, None] => pending::<()>().await,
        }
    }
}

impl<'a> From<&'a DoneSignal> for Cancel<'a> {
    fn from(signal: &'a DoneSignal) -> Self {
        Self::on(signal)
    }
}
