//! Configuration validation
//!
//! Validates configuration values and ensures consistency before any node
//! is contacted.

use slonictl_types::ClusterName;
use thiserror::Error;

use crate::{ClusterDefaults, Config, ObservabilityConfig, SlonikConfig, StoreSection};

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Invalid port number: {0}")]
    InvalidPort(u16),

    #[error("Invalid cluster name: {0}")]
    InvalidClusterName(String),

    #[error("Invalid replication user: must not be empty")]
    EmptyReplicationUser,

    #[error("Invalid slonik binary path: must not be empty")]
    EmptySlonikBinary,

    #[error("Invalid store backend: {0} (must be one of: memory, postgres)")]
    InvalidBackend(String),

    #[error("Invalid log level: {0} (must be one of: trace, debug, info, warn, error)")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0} (must be one of: pretty, compact, json)")]
    InvalidLogFormat(String),

    #[error("Invalid temporary set id: {0} (must be > 0)")]
    InvalidTempSetId(u32),

    #[error("Multiple validation errors: {0:?}")]
    Multiple(Vec<ValidationError>),
}

/// Validation result type
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Validate complete configuration
pub fn validate(config: &Config) -> ValidationResult<()> {
    let mut errors = Vec::new();

    if let Err(e) = validate_cluster(&config.cluster) {
        errors.push(e);
    }

    if let Err(e) = validate_slonik(&config.slonik) {
        errors.push(e);
    }

    if let Err(e) = validate_store(&config.store) {
        errors.push(e);
    }

    if let Err(e) = validate_observability(&config.observability) {
        errors.push(e);
    }

    if config.temp_set_id == 0 {
        errors.push(ValidationError::InvalidTempSetId(config.temp_set_id));
    }

    if errors.is_empty() {
        Ok(())
    } else if errors.len() == 1 {
        Err(errors.into_iter().next().unwrap())
    } else {
        Err(ValidationError::Multiple(errors))
    }
}

/// Validate cluster defaults
pub fn validate_cluster(config: &ClusterDefaults) -> ValidationResult<()> {
    if ClusterName::parse(config.name.clone()).is_err() {
        return Err(ValidationError::InvalidClusterName(config.name.clone()));
    }

    if config.port == 0 {
        return Err(ValidationError::InvalidPort(config.port));
    }

    if config.replication_user.is_empty() {
        return Err(ValidationError::EmptyReplicationUser);
    }

    Ok(())
}

/// Validate slonik interpreter configuration
pub fn validate_slonik(config: &SlonikConfig) -> ValidationResult<()> {
    if config.binary.is_empty() {
        return Err(ValidationError::EmptySlonikBinary);
    }

    Ok(())
}

/// Validate store configuration
pub fn validate_store(config: &StoreSection) -> ValidationResult<()> {
    match config.backend.to_lowercase().as_str() {
        "memory" | "postgres" | "postgresql" | "pg" => Ok(()),
        other => Err(ValidationError::InvalidBackend(other.to_string())),
    }
}

/// Validate observability configuration
pub fn validate_observability(config: &ObservabilityConfig) -> ValidationResult<()> {
    match config.log_level.to_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => {}
        other => return Err(ValidationError::InvalidLogLevel(other.to_string())),
    }

    match config.log_format.to_lowercase().as_str() {
        "pretty" | "compact" | "json" => {}
        other => return Err(ValidationError::InvalidLogFormat(other.to_string())),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_default_config() {
        assert!(validate(&Config::default()).is_ok());
    }

    #[test]
    fn test_invalid_cluster_name() {
        let mut config = Config::default();
        config.cluster.name = "not a name".to_string();
        assert!(matches!(
            validate(&config),
            Err(ValidationError::InvalidClusterName(_))
        ));
    }

    #[test]
    fn test_invalid_port() {
        let mut config = Config::default();
        config.cluster.port = 0;
        assert!(matches!(validate(&config), Err(ValidationError::InvalidPort(0))));
    }

    #[test]
    fn test_invalid_backend() {
        let mut config = Config::default();
        config.store.backend = "oracle".to_string();
        assert!(matches!(
            validate(&config),
            Err(ValidationError::InvalidBackend(_))
        ));
    }

    #[test]
    fn test_invalid_log_level() {
        let mut config = Config::default();
        config.observability.log_level = "loud".to_string();
        assert!(matches!(
            validate(&config),
            Err(ValidationError::InvalidLogLevel(_))
        ));
    }

    #[test]
    fn test_zero_temp_set_id() {
        let mut config = Config::default();
        config.temp_set_id = 0;
        assert!(matches!(
            validate(&config),
            Err(ValidationError::InvalidTempSetId(0))
        ));
    }

    #[test]
    fn test_multiple_errors_aggregate() {
        let mut config = Config::default();
        config.cluster.port = 0;
        config.slonik.binary = String::new();
        config.temp_set_id = 0;
        match validate(&config) {
            Err(ValidationError::Multiple(errors)) => assert_eq!(errors.len(), 3),
            other => panic!("expected Multiple, got {:?}", other),
        }
    }
}
