//! Shutdown coordination across admission-controlled components.

use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;

use crate::admission::{AdmissionControl, DoneSignal};

/// Errors from a coordinated shutdown.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShutdownError {
    #[error("grace period of {grace:?} elapsed with work still in flight in: {}", .pending.join(", "))]
    Timeout { grace: Duration, pending: Vec<String> },
}

/// Coordinator for graceful shutdown.
///
/// Holds a root signal that long-running tasks can watch, and the admission
/// facades that must be stopped and drained before exit.
pub struct Shutdown {
    root: DoneSignal,
    members: Mutex<Vec<AdmissionControl>>,
}

impl Shutdown {
    /// Create a new shutdown coordinator.
    pub fn new() -> Self {
        Self {
            root: DoneSignal::new(),
            members: Mutex::new(Vec::new()),
        }
    }

    /// Add a facade to stop and drain. Registering after the trigger stops it at once.
    pub fn register(&self, admission: &AdmissionControl) {
        self.lock().push(admission.clone());
        if self.root.is_set() {
            admission.stop();
        }
    }

    /// Fire the root signal and stop every registered facade.
    ///
    /// Returns `true` for the call that performed the transition.
    pub fn trigger(&self) -> bool {
        let first = self.root.fire();
        if first {
            tracing::info!("Shutdown triggered");
        }
        for admission in self.members() {
            admission.stop();
        }
        first
    }

    /// The root signal.
    pub fn signal(&self) -> DoneSignal {
        self.root.clone()
    }

    pub fn is_triggered(&self) -> bool {
        self.root.is_set()
    }

    /// Wait for every registered facade to drain, up to `grace`.
    pub async fn drain(&self, grace: Duration) -> Result<(), ShutdownError> {
        let members = self.members();
        let all = futures_util::future::join_all(members.iter().map(|m| m.wait_drain()));

        match tokio::time::timeout(grace, all).await {
            Ok(_) => {
                tracing::info!(components = members.len(), "Shutdown drained");
                Ok(())
            }
            Err(_) => {
                let pending: Vec<String> = members
                    .iter()
                    .filter(|m| m.in_flight() > 0)
                    .map(|m| m.name().to_string())
                    .collect();
                tracing::warn!(grace = ?grace, pending = ?pending, "Shutdown grace period elapsed");
                Err(ShutdownError::Timeout { grace, pending })
            }
        }
    }

    fn members(&self) -> Vec<AdmissionControl> {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<AdmissionControl>> {
        self.members.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}
