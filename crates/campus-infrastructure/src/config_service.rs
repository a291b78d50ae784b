//! Configuration service implementation.
//!
//! Loads [`ClientConfig`] from `config.toml` (missing file means defaults),
//! then applies environment overrides.

use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};

use campus_core::config::ClientConfig;
use campus_core::error::Result;

use crate::paths::CampusPaths;

/// Overrides `api_base_url`.
pub const API_URL_ENV: &str = "CAMPUS_API_URL";

/// Configuration service that loads and caches the client configuration.
#[derive(Debug, Clone)]
pub struct ConfigService {
    path: Option<PathBuf>,
    /// Cached configuration; cleared by `invalidate_cache`.
    config: Arc<RwLock<Option<ClientConfig>>>,
}

impl ConfigService {
    /// Uses the platform config file location.
    pub fn new() -> Self {
        Self {
            path: CampusPaths::config_file().ok(),
            config: Arc::new(RwLock::new(None)),
        }
    }

    /// Uses an explicit config file.
    pub fn with_path(path: PathBuf) -> Self {
        Self {
            path: Some(path),
            config: Arc::new(RwLock::new(None)),
        }
    }

    /// Gets the configuration, loading from file if not cached.
    pub fn get_config(&self) -> Result<ClientConfig> {
        {
            let read_lock = self.config.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(ref cached) = *read_lock {
                return Ok(cached.clone());
            }
        }

        let loaded = self.load(|name| std::env::var(name).ok())?;

        {
            let mut write_lock = self.config.write().unwrap_or_else(PoisonError::into_inner);
            *write_lock = Some(loaded.clone());
        }

        Ok(loaded)
    }

    /// Invalidates the cache, forcing a reload on next access.
    pub fn invalidate_cache(&self) {
        let mut write_lock = self.config.write().unwrap_or_else(PoisonError::into_inner);
        *write_lock = None;
    }

    fn load<F>(&self, env: F) -> Result<ClientConfig>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match &self.path {
            Some(path) if path.exists() => {
                let content = std::fs::read_to_string(path)?;
                let config: ClientConfig = toml::from_str(&content)?;
                tracing::debug!("config: loaded {}", path.display());
                config
            }
            Some(path) => {
                tracing::debug!("config: {} not found, using defaults", path.display());
                ClientConfig::default()
            }
            None => {
                tracing::warn!("config: no config directory, using defaults");
                ClientConfig::default()
            }
        };

        if let Some(url) = env(API_URL_ENV).filter(|v| !v.trim().is_empty()) {
            config.api_base_url = url;
        }

        config.validate()?;
        Ok(config)
    }
}

impl Default for ConfigService {
    fn default() -> Self {
        Self::new()
    }
}
