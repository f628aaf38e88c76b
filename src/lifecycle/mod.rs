//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Shutdown (shutdown.rs):
//!     Signal received → stop admission everywhere → drain in-flight work → exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → trigger graceful shutdown
//!     SIGUSR1 → reopen the log file
//!
//! Pid file (pidfile.rs):
//!     written at startup, removed when dropped
//! ```
//!
//! # Design Decisions
//! - Ordered shutdown: stop admitting, drain, then close pooled resources
//! - Shutdown has a grace period; stragglers are reported by name

pub mod pidfile;
pub mod shutdown;
pub mod signals;

pub use pidfile::PidFile;
pub use shutdown::{Shutdown, ShutdownError};
pub use signals::shutdown_signal;
#[cfg(unix)]
pub use signals::spawn_reopen_on_sigusr1;
