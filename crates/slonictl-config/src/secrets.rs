//! Secrets management
//!
//! Node passwords never live in the manifest; they are referenced by name
//! and resolved at load time from the environment or from mounted secret
//! files.

use std::{fs, path::Path};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SecretError {
    #[error("Secret not found: {0}")]
    NotFound(String),

    #[error("Failed to read secret file: {0}")]
    FileReadError(#[from] std::io::Error),
}

/// Secret provider interface
pub trait SecretProvider: Send + Sync {
    /// Get a secret by key
    fn get(&self, key: &str) -> Result<String, SecretError>;

    /// Check if a secret exists
    fn has(&self, key: &str) -> bool;
}

/// Environment variable secret provider
pub struct EnvSecretProvider;

impl SecretProvider for EnvSecretProvider {
    fn get(&self, key: &str) -> Result<String, SecretError> {
        std::env::var(key).map_err(|_| SecretError::NotFound(key.to_string()))
    }

    fn has(&self, key: &str) -> bool {
        std::env::var(key).is_ok()
    }
}

/// File-based secret provider
///
/// Reads secrets from individual files in a directory
/// (useful for Docker secrets or Kubernetes mounted secrets)
pub struct FileSecretProvider {
    base_path: String,
}

impl FileSecretProvider {
    pub fn new(base_path: impl Into<String>) -> Self {
        Self { base_path: base_path.into() }
    }
}

impl SecretProvider for FileSecretProvider {
    fn get(&self, key: &str) -> Result<String, SecretError> {
        let path = Path::new(&self.base_path).join(key);

        if !path.exists() {
            return Err(SecretError::NotFound(key.to_string()));
        }

        let content = fs::read_to_string(&path)?;

        // Trim whitespace and newlines
        Ok(content.trim().to_string())
    }

    fn has(&self, key: &str) -> bool {
        Path::new(&self.base_path).join(key).exists()
    }
}

/// Composite secret provider
///
/// Tries multiple providers in order
pub struct CompositeSecretProvider {
    providers: Vec<Box<dyn SecretProvider>>,
}

impl CompositeSecretProvider {
    pub fn new(providers: Vec<Box<dyn SecretProvider>>) -> Self {
        Self { providers }
    }
}

impl SecretProvider for CompositeSecretProvider {
    fn get(&self, key: &str) -> Result<String, SecretError> {
        for provider in &self.providers {
            if let Ok(value) = provider.get(key) {
                return Ok(value);
            }
        }
        Err(SecretError::NotFound(key.to_string()))
    }

    fn has(&self, key: &str) -> bool {
        self.providers.iter().any(|p| p.has(key))
    }
}

/// The default provider chain: environment first, then `/run/secrets`.
pub fn default_provider() -> CompositeSecretProvider {
    CompositeSecretProvider::new(vec![
        Box::new(EnvSecretProvider),
        Box::new(FileSecretProvider::new("/run/secrets")),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_provider() {
        std::env::set_var("SLONICTL_TEST_SECRET", "hunter2");
        let provider = EnvSecretProvider;
        assert!(provider.has("SLONICTL_TEST_SECRET"));
        assert_eq!(provider.get("SLONICTL_TEST_SECRET").unwrap(), "hunter2");
        std::env::remove_var("SLONICTL_TEST_SECRET");
    }

    #[test]
    fn test_env_provider_missing() {
        let provider = EnvSecretProvider;
        assert!(!provider.has("SLONICTL_TEST_SECRET_MISSING"));
        assert!(matches!(
            provider.get("SLONICTL_TEST_SECRET_MISSING"),
            Err(SecretError::NotFound(_))
        ));
    }

    #[test]
    fn test_composite_provider_falls_through() {
        std::env::set_var("SLONICTL_TEST_COMPOSITE", "from-env");
        let provider = CompositeSecretProvider::new(vec![
            Box::new(FileSecretProvider::new("/nonexistent")),
            Box::new(EnvSecretProvider),
        ]);
        assert_eq!(provider.get("SLONICTL_TEST_COMPOSITE").unwrap(), "from-env");
        std::env::remove_var("SLONICTL_TEST_COMPOSITE");
    }
}
