use thiserror::Error;

use crate::session::Role;

/// Errors returned by login, signup and the authenticated profile calls.
///
/// This is the only error kind that crosses from the core to the UI layer.
/// It is never retried automatically.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Input rejected before any request was sent
    #[error("Validation error: {0}")]
    Validation(String),

    /// Backend answered with a non-2xx status
    #[error("Request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// Backend answered with a body that could not be understood
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Request never completed
    #[error("Network error: {0}")]
    Network(String),

    /// An authenticated call was made without a session
    #[error("Not logged in")]
    NotLoggedIn,

    /// The session role does not grant access
    #[error("Access denied: {required} only")]
    Forbidden { required: Role, actual: Option<Role> },
}

impl AuthError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::InvalidResponse(message.into())
    }

    /// Text suitable for an alert dialog.
    pub fn user_message(&self) -> String {
        match self {
            AuthError::Validation(message) => message.clone(),
            AuthError::Rejected { message, .. } => message.clone(),
            AuthError::InvalidResponse(message) => message.clone(),
            AuthError::Network(_) => "Network error".to_string(),
            AuthError::NotLoggedIn => "Please log in first".to_string(),
            AuthError::Forbidden { required, .. } => {
                let mut label = required.as_str().to_string();
                if let Some(first) = label.get_mut(0..1) {
                    first.make_ascii_uppercase();
                }
                format!("Access denied. {label} only.")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_message_uses_backend_text() {
        let err = AuthError::Rejected {
            status: 401,
            message: "Invalid credentials".into(),
        };
        assert_eq!(err.user_message(), "Invalid credentials");
    }

    #[test]
    fn test_forbidden_message() {
        let err = AuthError::Forbidden {
            required: Role::Admin,
            actual: Some(Role::Student),
        };
        assert_eq!(err.user_message(), "Access denied. Admin only.");
    }
}
