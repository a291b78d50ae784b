//! Durable key-value persistence port.
//!
//! The session core only needs a handful of string pairs that survive a
//! process restart: the session token and its role tag. Implementations live
//! in the infrastructure crate.

use async_trait::async_trait;
use thiserror::Error;

use crate::session::{Identity, IdentityError};

/// Failure of the underlying storage medium.
///
/// The core never surfaces this to the UI: reads that fail count as "nothing
/// stored" and failed writes/removes are logged.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),
}

impl StorageError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::StorageUnavailable(message.into())
    }
}

/// Asynchronous string key-value storage that survives restarts.
#[async_trait]
pub trait DurablePersistence: Send + Sync {
    /// Reads a value; `Ok(None)` when the key is absent.
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Writes a single value.
    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Writes several values together.
    ///
    /// The default writes them one by one; adapters that can commit a batch
    /// atomically should override it.
    async fn set_all(&self, entries: &[(&str, &str)]) -> Result<(), StorageError> {
        for (key, value) in entries {
            self.set(key, value).await?;
        }
        Ok(())
    }

    /// Removes every listed key. Absent keys are not an error.
    async fn remove_all(&self, keys: &[&str]) -> Result<(), StorageError>;
}

/// Names of the two keys holding the persisted session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageKeys {
    pub token: String,
    pub role: String,
}

impl StorageKeys {
    pub fn new(token: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            role: role.into(),
        }
    }

    pub fn as_slice(&self) -> [&str; 2] {
        [self.token.as_str(), self.role.as_str()]
    }
}

impl Default for StorageKeys {
    fn default() -> Self {
        Self::new("token", "role")
    }
}

/// What a storage read found for the token/role pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoredLookup {
    /// Both keys present and valid.
    Present(Identity),
    /// Neither key present, or the medium could not be read.
    Absent,
    /// Something was stored but it does not form a valid identity.
    Malformed(String),
}

impl StoredLookup {
    pub fn identity(&self) -> Option<&Identity> {
        match self {
            StoredLookup::Present(identity) => Some(identity),
            _ => None,
        }
    }
}

/// Reads, writes and clears the persisted session pair.
///
/// Token and role are always written and cleared together.
#[derive(Clone)]
pub struct StoredCredentials<'a> {
    storage: &'a dyn DurablePersistence,
    keys: &'a StorageKeys,
}

impl<'a> StoredCredentials<'a> {
    pub fn new(storage: &'a dyn DurablePersistence, keys: &'a StorageKeys) -> Self {
        Self { storage, keys }
    }

    /// Loads the pair. Storage failures degrade to `Absent`.
    pub async fn load(&self) -> StoredLookup {
        let token = match self.storage.get(&self.keys.token).await {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!("stored credentials: token read failed, treating as absent: {}", e);
                return StoredLookup::Absent;
            }
        };
        let role = match self.storage.get(&self.keys.role).await {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!("stored credentials: role read failed, treating as absent: {}", e);
                return StoredLookup::Absent;
            }
        };

        match (token, role) {
            (None, None) => StoredLookup::Absent,
            (Some(_), None) => StoredLookup::Malformed("token stored without role".into()),
            (None, Some(_)) => StoredLookup::Malformed("role stored without token".into()),
            (Some(token), Some(role)) => match Identity::parse(token, &role) {
                Ok(identity) => StoredLookup::Present(identity),
                Err(IdentityError::EmptyToken) => {
                    StoredLookup::Malformed("stored token is empty".into())
                }
                Err(IdentityError::Role(e)) => StoredLookup::Malformed(e.to_string()),
            },
        }
    }

    /// Persists the pair in one batch.
    pub async fn save(&self, identity: &Identity) -> Result<(), StorageError> {
        self.storage
            .set_all(&[
                (self.keys.token.as_str(), identity.token()),
                (self.keys.role.as_str(), identity.role().as_str()),
            ])
            .await
    }

    /// Removes both keys.
    pub async fn clear(&self) -> Result<(), StorageError> {
        self.storage.remove_all(&self.keys.as_slice()).await
    }
}
