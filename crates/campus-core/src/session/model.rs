//! Session domain model.
//!
//! A [`Session`] is either logged out or carries exactly one [`Identity`].
//! The logged-in flag is derived from the identity, so a session can never
//! claim to be logged in without a non-empty token.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Role of the authenticated principal.
///
/// The set is closed: anything else coming from storage or a provider is
/// rejected with [`RoleParseError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Driver,
    Admin,
}

impl Role {
    /// Returns the wire/storage tag for this role.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Driver => "driver",
            Role::Admin => "admin",
        }
    }

    /// Drivers sign in with a phone number; everyone else uses email.
    pub fn signs_in_with_phone(&self) -> bool {
        matches!(self, Role::Driver)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = RoleParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "student" => Ok(Role::Student),
            "driver" => Ok(Role::Driver),
            "admin" => Ok(Role::Admin),
            _ => Err(RoleParseError(s.to_string())),
        }
    }
}

/// A role tag outside the closed set.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Unrecognized role: '{0}'")]
pub struct RoleParseError(pub String);

/// Reasons an [`Identity`] cannot be built.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdentityError {
    #[error("Session token must not be empty")]
    EmptyToken,

    #[error(transparent)]
    Role(#[from] RoleParseError),
}

/// The authenticated principal: token, role and an optional display name.
#[derive(Clone, PartialEq, Eq)]
pub struct Identity {
    token: String,
    role: Role,
    display_name: Option<String>,
}

impl Identity {
    /// Creates an identity, rejecting empty (or whitespace-only) tokens.
    pub fn new(token: impl Into<String>, role: Role) -> Result<Self, IdentityError> {
        let token = token.into();
        if token.trim().is_empty() {
            return Err(IdentityError::EmptyToken);
        }
        Ok(Self {
            token,
            role,
            display_name: None,
        })
    }

    /// Creates an identity from an untyped role tag.
    pub fn parse(token: impl Into<String>, role: &str) -> Result<Self, IdentityError> {
        let role = role.parse::<Role>()?;
        Self::new(token, role)
    }

    /// Attaches a display name.
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.display_name = if name.trim().is_empty() {
            None
        } else {
            Some(name)
        };
        self
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn display_name(&self) -> Option<&str> {
        self.display_name.as_deref()
    }

    /// Same principal, ignoring the display name.
    pub fn same_principal(&self, other: &Identity) -> bool {
        self.token == other.token && self.role == other.role
    }
}

// Tokens stay out of logs and panic messages.
impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("token", &"<redacted>")
            .field("role", &self.role)
            .field("display_name", &self.display_name)
            .finish()
    }
}

/// The authoritative logged-in/out state shown to the rest of the app.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Session {
    identity: Option<Identity>,
}

impl Session {
    /// The logged-out session every process starts with.
    pub fn logged_out() -> Self {
        Self::default()
    }

    pub fn logged_in(identity: Identity) -> Self {
        Self {
            identity: Some(identity),
        }
    }

    pub fn is_logged_in(&self) -> bool {
        self.identity.is_some()
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    pub fn role(&self) -> Option<Role> {
        self.identity.as_ref().map(Identity::role)
    }

    pub fn token(&self) -> Option<&str> {
        self.identity.as_ref().map(Identity::token)
    }
}
