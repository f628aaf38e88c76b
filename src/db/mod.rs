//! Pooled database and cache access.
//!
//! # Data Flow
//! ```text
//! caller
//!     → AdmissionControl::open (gate slot + borrow)
//!     → IdlePool (reuse idle, else Manager::connect)
//!     → [statement runs on the blocking pool]
//!     → session close: connection back to idle list → slot released
//! ```

pub mod cache;
pub mod sql;

pub use cache::{CacheConn, CacheError, CachePool};
pub use sql::{ExecResult, SqlConn, SqlDb, SqlError, SqlStmt, SqlTx, SqliteManager};
