//! HTTP service and client under admission control.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum serve loop, graceful shutdown)
//!     → TraceLayer → TimeoutLayer → admission middleware
//!     → application router
//!
//! outbound request
//!     → client.rs (gate slot, caller cancel race)
//!     → reqwest connection pool
//! ```

pub mod client;
pub mod server;

pub use client::{ClientError, HttpClient};
pub use server::{HttpService, ServiceError, BUSY_BODY, UNAVAILABLE_BODY};
