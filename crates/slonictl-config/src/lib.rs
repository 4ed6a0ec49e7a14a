//! # Slonictl Config - Configuration Management
//!
//! Handles runtime configuration loading from files, environment variables,
//! and CLI args, plus the desired-state manifest describing what the
//! cluster should look like.

pub mod manifest;
pub mod secrets;
pub mod validation;

use std::path::Path;

use config::{Config as ConfigBuilder, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub cluster: ClusterDefaults,
    #[serde(default)]
    pub slonik: SlonikConfig,
    #[serde(default)]
    pub store: StoreSection,
    #[serde(default)]
    pub observability: ObservabilityConfig,
    /// Scratch set id used by the merge orchestration. Validated against
    /// existing sets at plan time; collision is fatal.
    #[serde(default = "default_temp_set_id")]
    pub temp_set_id: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterDefaults {
    #[serde(default = "default_cluster_name")]
    pub name: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_replication_user")]
    pub replication_user: String,
}

fn default_cluster_name() -> String {
    "replication".to_string()
}

fn default_port() -> u16 {
    5432
}

fn default_replication_user() -> String {
    "postgres".to_string()
}

fn default_temp_set_id() -> u32 {
    99
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlonikConfig {
    /// Path to the slonik binary.
    #[serde(default = "default_slonik_binary")]
    pub binary: String,
}

fn default_slonik_binary() -> String {
    "slonik".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSection {
    #[serde(default = "default_backend")]
    pub backend: String,
}

fn default_backend() -> String {
    "postgres".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default = "default_log_format")]
    pub log_format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for ClusterDefaults {
    fn default() -> Self {
        Self {
            name: default_cluster_name(),
            port: default_port(),
            replication_user: default_replication_user(),
        }
    }
}

impl Default for SlonikConfig {
    fn default() -> Self {
        Self { binary: default_slonik_binary() }
    }
}

impl Default for StoreSection {
    fn default() -> Self {
        Self { backend: default_backend() }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cluster: ClusterDefaults::default(),
            slonik: SlonikConfig::default(),
            store: StoreSection::default(),
            observability: ObservabilityConfig::default(),
            temp_set_id: default_temp_set_id(),
        }
    }
}

impl Config {
    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), validation::ValidationError> {
        validation::validate(self)
    }
}

/// Load configuration from file and environment.
pub fn load<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let builder = ConfigBuilder::builder()
        .add_source(File::from(path.as_ref()).required(false))
        .add_source(Environment::with_prefix("SLONICTL").separator("__"))
        .build()?;

    builder.try_deserialize()
}

/// Load configuration with defaults.
pub fn load_or_default<P: AsRef<Path>>(path: P) -> Config {
    load(path).unwrap_or_default()
}
