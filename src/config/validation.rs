//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate addresses, ranges and status codes
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ToolkitConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;
use tokio::sync::Semaphore;

use crate::config::schema::{AdmissionConfig, ToolkitConfig};

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a configuration, collecting every error.
pub fn validate_config(config: &ToolkitConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.service.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "service.bind_address",
            format!("not a socket address: {:?}", config.service.bind_address),
        ));
    }
    if !(400..=599).contains(&config.service.busy_status) {
        errors.push(ValidationError::new(
            "service.busy_status",
            format!("must be a 4xx or 5xx status, got {}", config.service.busy_status),
        ));
    }
    if config.service.request_timeout_secs == 0 {
        errors.push(ValidationError::new("service.request_timeout_secs", "must be greater than 0"));
    }

    check_admission(&mut errors, "service.admission", &config.service.admission);
    check_admission(&mut errors, "client.admission", &config.client.admission);
    check_admission(&mut errors, "sql.admission", &config.sql.admission);
    check_admission(&mut errors, "cache.admission", &config.cache.admission);

    if config.sql.path.trim().is_empty() {
        errors.push(ValidationError::new("sql.path", "must not be empty"));
    }

    let obs = &config.observability;
    if obs.metrics_enabled && obs.metrics_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("not a socket address: {:?}", obs.metrics_address),
        ));
    }
    if matches!(&obs.log_file, Some(path) if path.trim().is_empty()) {
        errors.push(ValidationError::new("observability.log_file", "must not be empty when set"));
    }

    if config.shutdown.grace_period_secs == 0 {
        errors.push(ValidationError::new("shutdown.grace_period_secs", "must be greater than 0"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_admission(errors: &mut Vec<ValidationError>, field: &str, admission: &AdmissionConfig) {
    if admission.capacity > Semaphore::MAX_PERMITS {
        errors.push(ValidationError::new(
            format!("{field}.capacity"),
            format!("must not exceed {}", Semaphore::MAX_PERMITS),
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert_eq!(validate_config(&ToolkitConfig::default()), Ok(()));
    }

    #[test]
    fn collects_every_error() {
        let mut config = ToolkitConfig::default();
        config.service.bind_address = "nowhere".into();
        config.service.busy_status = 200;
        config.sql.path = " ".into();
        config.shutdown.grace_period_secs = 0;
        config.client.admission.capacity = usize::MAX;

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(
            fields,
            vec![
                "service.bind_address",
                "service.busy_status",
                "client.admission.capacity",
                "sql.path",
                "shutdown.grace_period_secs",
            ]
        );
    }

    #[test]
    fn metrics_address_checked_only_when_enabled() {
        let mut config = ToolkitConfig::default();
        config.observability.metrics_address = "bad".into();
        assert!(validate_config(&config).is_ok());

        config.observability.metrics_enabled = true;
        assert!(validate_config(&config).is_err());
    }
}
