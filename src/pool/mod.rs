//! Resource pools behind the admission gate.
//!
//! # Design Decisions
//! - `IdlePool` only caches idle connections; concurrency is bounded by the
//!   facade's gate, so the two limits never disagree
//! - `BufPool` is independent of admission and shared by value

pub mod buffer;
pub mod idle;

pub use buffer::BufPool;
pub use idle::{idle_capacity, IdlePool, Manager};
