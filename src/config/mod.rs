//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ToolkitConfig (validated, immutable)
//!     → sections handed to each facade at construction
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; gates are never resized
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    AdmissionConfig, CacheConfig, ClientConfig, LogFormat, ObservabilityConfig, ServiceConfig,
    ShutdownConfig, SqlConfig, ToolkitConfig,
};
pub use validation::ValidationError;
