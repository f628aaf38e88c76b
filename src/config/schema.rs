//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the toolkit.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ToolkitConfig {
    /// Inbound HTTP service.
    pub service: ServiceConfig,

    /// Outbound HTTP client.
    pub client: ClientConfig,

    /// SQL connection pool.
    pub sql: SqlConfig,

    /// Cache connection pool.
    pub cache: CacheConfig,

    /// Logging and metrics.
    pub observability: ObservabilityConfig,

    /// Shutdown sequencing.
    pub shutdown: ShutdownConfig,

    /// Optional pid file written at startup and removed on exit.
    pub pid_file: Option<String>,
}

/// Admission gate settings shared by every facade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct AdmissionConfig {
    /// Maximum concurrent admissions. 0 disables gating.
    pub capacity: usize,

    /// How long to wait for a slot before answering busy, in milliseconds.
    /// 0 waits indefinitely (until a slot frees or the caller cancels).
    pub hesitation_ms: u64,
}

impl AdmissionConfig {
    pub fn hesitation(&self) -> Duration {
        Duration::from_millis(self.hesitation_ms)
    }

    /// Unbounded, no hesitation window.
    pub fn unbounded() -> Self {
        Self {
            capacity: 0,
            hesitation_ms: 0,
        }
    }
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self::unbounded()
    }
}

/// Inbound HTTP service configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Concurrent request admission.
    pub admission: AdmissionConfig,

    /// Status answered when no slot frees within the hesitation window.
    pub busy_status: u16,

    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            admission: AdmissionConfig {
                capacity: 0,
                hesitation_ms: 50,
            },
            busy_status: 408,
            request_timeout_secs: 10,
        }
    }
}

/// Outbound HTTP client configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Concurrent outbound call admission.
    pub admission: AdmissionConfig,

    /// Total per-request timeout in seconds. 0 disables it.
    pub timeout_secs: u64,

    /// TCP connect timeout in seconds.
    pub connect_timeout_secs: u64,

    /// TCP keep-alive interval in seconds.
    pub tcp_keepalive_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            admission: AdmissionConfig::unbounded(),
            timeout_secs: 30,
            connect_timeout_secs: 10,
            tcp_keepalive_secs: 60,
        }
    }
}

/// SQL (SQLite) pool configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SqlConfig {
    /// Database file path, or ":memory:".
    pub path: String,

    /// Concurrent statement admission.
    pub admission: AdmissionConfig,

    /// Idle connections older than this are closed on borrow. 0 keeps them forever.
    pub idle_timeout_secs: u64,
}

impl Default for SqlConfig {
    fn default() -> Self {
        Self {
            path: "svckit.db".to_string(),
            admission: AdmissionConfig::unbounded(),
            idle_timeout_secs: 60,
        }
    }
}

/// Cache pool configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Concurrent connection admission.
    pub admission: AdmissionConfig,

    /// Idle connections older than this are closed on borrow. 0 keeps them forever.
    pub idle_timeout_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            admission: AdmissionConfig::unbounded(),
            idle_timeout_secs: 60,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level filter (trace, debug, info, warn, error, or an EnvFilter directive).
    pub log_level: String,

    /// Stderr log format.
    pub log_format: LogFormat,

    /// Optional JSON log file, reopened on SIGUSR1.
    pub log_file: Option<String>,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            log_file: None,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Shutdown configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ShutdownConfig {
    /// Time allowed for in-flight work to drain, in seconds.
    pub grace_period_secs: u64,
}

impl ShutdownConfig {
    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_period_secs)
    }
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            grace_period_secs: 30,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config: ToolkitConfig = toml::from_str("").unwrap();
        assert_eq!(config.service.admission.hesitation_ms, 50);
        assert_eq!(config.service.busy_status, 408);
        assert_eq!(config.client.admission, AdmissionConfig::unbounded());
        assert!(config.pid_file.is_none());
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config: ToolkitConfig = toml::from_str(
            r#"
            [service]
            bind_address = "127.0.0.1:9000"

            [service.admission]
            capacity = 64

            [observability]
            log_format = "json"
            "#,
        )
        .unwrap();
        assert_eq!(config.service.bind_address, "127.0.0.1:9000");
        assert_eq!(config.service.admission.capacity, 64);
        assert_eq!(config.service.admission.hesitation_ms, 0);
        assert_eq!(config.service.request_timeout_secs, 10);
        assert_eq!(config.observability.log_format, LogFormat::Json);
    }
}
