//! Error types for the campus session core.

use thiserror::Error;

use crate::auth::AuthError;
use crate::identity::SubscriptionError;
use crate::session::IdentityError;
use crate::storage::StorageError;

/// A shared error type for the campus workspace.
///
/// Most of these never reach the UI layer: storage, subscription and
/// reconciliation failures are absorbed and logged by the core. Only
/// [`AuthError`] is handed back to callers as a value they must handle.
#[derive(Error, Debug, Clone)]
pub enum CampusError {
    /// Durable key-value storage could not be read or written
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Backend login/signup/profile failure
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// External identity stream delivered an error
    #[error(transparent)]
    Subscription(#[from] SubscriptionError),

    /// Identity could not be constructed from the supplied fields
    #[error(transparent)]
    Identity(#[from] IdentityError),

    /// External identity and durable storage disagreed; precedence decided the outcome
    #[error("Reconciliation conflict: {0}")]
    ReconciliationConflict(String),

    /// Local file access failed (config file, session file)
    #[error("I/O failure: {message}")]
    Io { message: String },

    /// A config or session document could not be encoded or decoded
    #[error("Malformed {format} data: {message}")]
    Serialization {
        format: &'static str,
        message: String,
    },

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl CampusError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::ReconciliationConflict(message.into())
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Auth(_))
    }

    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }

    /// Returns true when the error must be shown to the user.
    ///
    /// Everything except `Auth` is recovered inside the core.
    pub fn crosses_ui_boundary(&self) -> bool {
        self.is_auth()
    }

    fn malformed(format: &'static str, err: impl std::fmt::Display) -> Self {
        Self::Serialization {
            format,
            message: err.to_string(),
        }
    }
}

impl From<std::io::Error> for CampusError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: format!("{err} ({:?})", err.kind()),
        }
    }
}

impl From<serde_json::Error> for CampusError {
    fn from(err: serde_json::Error) -> Self {
        Self::malformed("JSON", err)
    }
}

impl From<toml::de::Error> for CampusError {
    fn from(err: toml::de::Error) -> Self {
        Self::malformed("TOML", err)
    }
}

impl From<toml::ser::Error> for CampusError {
    fn from(err: toml::ser::Error) -> Self {
        Self::malformed("TOML", err)
    }
}

pub type Result<T> = std::result::Result<T, CampusError>;
