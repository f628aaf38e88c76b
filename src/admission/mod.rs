//! Admission control subsystem.
//!
//! # Data Flow
//! ```text
//! caller
//!     → facade.rs (stopping pre-check, outcome mapping, panic capture)
//!     → gate.rs (slot / cancel / hesitation race)
//!     → session.rs (gate slot + in-flight guard + borrowed handle)
//!     → [work runs against the handle]
//!     → session close: handle back to pool → slot released → drain.rs decrement
//!
//! Shutdown:
//!     stop() → signal.rs DoneSignal fires → waiters refused
//!     wait_drain() → drain.rs observes zero in flight
//! ```
//!
//! # Design Decisions
//! - One gate/session/drain core shared by the HTTP server, HTTP client, SQL and cache wrappers
//! - Release is tied to guard drops, so every exit path (error, cancel, panic) releases
//! - Once admitted, cancellation does not abort work; work checks the signal itself

pub mod drain;
pub mod error;
pub mod facade;
pub mod gate;
pub mod session;
pub mod signal;

pub use drain::{DrainCoordinator, InFlightGuard};
pub use error::{AdmissionError, DrainError, ExecutionFault, Outcome, Refusal};
pub use facade::{AdmissionControl, AdmissionSnapshot, LogNotifier, RejectionNotifier};
pub use gate::{Gate, GatePermit};
pub use session::{ResourcePool, Session, Ticket};
pub use signal::{Cancel, DoneSignal, Notifier};
