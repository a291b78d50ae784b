use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{CampusError, Result};
use crate::storage::StorageKeys;

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:3000/api/auth";

/// Client configuration, read from `config.toml`.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Base URL of the auth routes, e.g. `https://campus.example/api/auth`.
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct StorageConfig {
    #[serde(default = "default_token_key")]
    pub token_key: String,
    #[serde(default = "default_role_key")]
    pub role_key: String,
    /// Overrides the default session file location.
    #[serde(default)]
    pub file: Option<PathBuf>,
}

fn default_api_base_url() -> String {
    DEFAULT_API_BASE_URL.to_string()
}

fn default_token_key() -> String {
    "token".to_string()
}

fn default_role_key() -> String {
    "role".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            token_key: default_token_key(),
            role_key: default_role_key(),
            file: None,
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            storage: StorageConfig::default(),
        }
    }
}

impl ClientConfig {
    pub fn storage_keys(&self) -> StorageKeys {
        StorageKeys::new(&self.storage.token_key, &self.storage.role_key)
    }

    pub fn validate(&self) -> Result<()> {
        let url = self.api_base_url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(CampusError::config(format!(
                "api_base_url must be an http(s) URL, got '{}'",
                self.api_base_url
            )));
        }
        if self.storage.token_key.is_empty() || self.storage.role_key.is_empty() {
            return Err(CampusError::config("storage keys must not be empty"));
        }
        if self.storage.token_key == self.storage.role_key {
            return Err(CampusError::config(
                "token_key and role_key must be different",
            ));
        }
        Ok(())
    }
}
