//! Sequential id generation.
//!
//! Every backend hands out ids starting at 1 and never repeats one for the
//! lifetime of its store.

pub mod cache;
pub mod memory;
pub mod sql;

use async_trait::async_trait;
use thiserror::Error;

use crate::admission::DoneSignal;
use crate::db::SqlError;

pub use cache::{CacheIdGen, CounterConn};
pub use memory::MemoryIdGen;
pub use sql::SqlIdGen;

/// Errors from id generation.
#[derive(Debug, Error)]
pub enum IdGenError {
    #[error(transparent)]
    Sql(#[from] SqlError),

    #[error("cache error: {0}")]
    Cache(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("invalid table name {0:?}")]
    InvalidTable(String),
}

/// A source of unique, increasing ids.
#[async_trait]
pub trait IdGenerator: Send + Sync {
    /// Next id. The first is 1.
    async fn next_id(&self, cancel: Option<&DoneSignal>) -> Result<i64, IdGenError>;

    /// Release the backend. Later calls fail (except for the memory backend).
    async fn close(&self);
}
