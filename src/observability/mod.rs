//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (admission counters and gauges)
//!
//! Consumers:
//!     → stderr (pretty or JSON) and an optional JSON log file
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing
//! - Every admission event carries the gate name
//! - Metrics are cheap (atomic increments); without an installed
//!   recorder they are no-ops

pub mod logging;
pub mod metrics;

pub use logging::{init_logging, spawn_reopen_task, LogFile, LoggingError, LoggingGuard};
