//! Store factory for creating control-store backends.
//!
//! Keeps backend construction in one place so consumers never name a
//! concrete implementation.

use std::str::FromStr;
use std::sync::Arc;

use slonictl_types::StoreError;

use crate::memory::MemoryBackend;
use crate::ControlStore;

#[cfg(feature = "postgres")]
use crate::postgres::PostgresBackend;

/// Control-store backend type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendType {
    /// In-memory store (for testing and development)
    Memory,
    /// Live PostgreSQL control schema (for production)
    #[cfg(feature = "postgres")]
    Postgres,
}

impl FromStr for BackendType {
    type Err = StoreError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "memory" => Ok(BackendType::Memory),
            #[cfg(feature = "postgres")]
            "postgres" | "postgresql" | "pg" => Ok(BackendType::Postgres),
            _ => Err(StoreError::UnknownBackend(s.to_string())),
        }
    }
}

impl BackendType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendType::Memory => "memory",
            #[cfg(feature = "postgres")]
            BackendType::Postgres => "postgres",
        }
    }
}

impl Default for BackendType {
    /// Postgres when compiled in, memory otherwise.
    fn default() -> Self {
        #[cfg(feature = "postgres")]
        {
            BackendType::Postgres
        }
        #[cfg(not(feature = "postgres"))]
        {
            BackendType::Memory
        }
    }
}

/// Factory for control-store backends.
pub struct StoreFactory;

impl StoreFactory {
    /// Create a backend from its type.
    pub fn create(backend: BackendType) -> Arc<dyn ControlStore> {
        match backend {
            BackendType::Memory => Arc::new(MemoryBackend::new()),
            #[cfg(feature = "postgres")]
            BackendType::Postgres => Arc::new(PostgresBackend::new()),
        }
    }

    /// Create a backend from its string name.
    pub fn from_name(name: &str) -> Result<Arc<dyn ControlStore>, StoreError> {
        Ok(Self::create(BackendType::from_str(name)?))
    }

    /// Create the default backend for this build.
    pub fn default_backend() -> Arc<dyn ControlStore> {
        Self::create(BackendType::default())
    }

    /// Shorthand for an in-memory store.
    pub fn memory() -> Arc<dyn ControlStore> {
        Arc::new(MemoryBackend::new())
    }
}
