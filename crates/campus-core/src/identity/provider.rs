use thiserror::Error;
use tokio::sync::mpsc;

use crate::session::{Identity, IdentityError};

/// Identity as reported by the external provider.
///
/// The role arrives as an untyped tag; validating it is the reconciler's job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalIdentity {
    pub token: String,
    pub role: String,
    pub display_name: Option<String>,
}

impl ExternalIdentity {
    pub fn new(token: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            role: role.into(),
            display_name: None,
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    /// Validates the reported fields into a session identity.
    pub fn to_identity(&self) -> Result<Identity, IdentityError> {
        let identity = Identity::parse(self.token.clone(), &self.role)?;
        Ok(match &self.display_name {
            Some(name) => identity.with_display_name(name.clone()),
            None => identity,
        })
    }
}

/// One push from the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityNotification {
    Present(ExternalIdentity),
    Absent,
}

/// An error raised on the notification stream.
///
/// Logged by the consumer; the subscription stays active.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SubscriptionError {
    #[error("Identity listener failed: {0}")]
    Listener(String),
}

/// Receiving end of a provider subscription.
///
/// Dropping it unsubscribes.
pub type IdentityFeed = mpsc::UnboundedReceiver<Result<IdentityNotification, SubscriptionError>>;

/// Sending end used by provider implementations.
pub type IdentityFeedSender = mpsc::UnboundedSender<Result<IdentityNotification, SubscriptionError>>;

/// Source of external identity notifications.
pub trait IdentityProvider: Send + Sync {
    /// Opens a new subscription. Notifications are pushed in the order the
    /// provider emits them.
    fn subscribe(&self) -> IdentityFeed;
}
