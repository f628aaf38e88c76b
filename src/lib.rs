//! Admission-controlled service toolkit.
//!
//! Every resource (inbound HTTP, outbound HTTP, SQL, cache) sits behind the
//! same admission core: a bounded gate, a stop signal and a drain counter.

// Admission core
pub mod admission;

// Resources behind admission
pub mod db;
pub mod http;
pub mod idgen;
pub mod pool;

// Cross-cutting concerns
pub mod config;
pub mod lifecycle;
pub mod observability;

// Helpers
pub mod cmdset;
pub mod util;

pub use admission::{AdmissionControl, DoneSignal, Outcome};
pub use config::ToolkitConfig;
pub use http::{HttpClient, HttpService};
pub use lifecycle::Shutdown;
