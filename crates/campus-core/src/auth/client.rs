use async_trait::async_trait;

use super::error::AuthError;
use super::model::{Credentials, DeviceSession, SignupRequest, UserProfile};
use crate::session::Identity;

/// Port to the campus authentication backend.
///
/// Implementations treat any non-2xx status and any body that is not JSON as
/// an [`AuthError`].
#[async_trait]
pub trait AuthClient: Send + Sync {
    /// Exchanges credentials for a token/role pair.
    async fn login(&self, credentials: &Credentials) -> Result<Identity, AuthError>;

    /// Creates an account. Does not log in.
    async fn signup(&self, request: &SignupRequest) -> Result<(), AuthError>;

    /// Fetches the account behind `token`.
    async fn profile(&self, token: &str) -> Result<UserProfile, AuthError>;

    /// Lists devices signed in to the account behind `token`.
    async fn sessions(&self, token: &str) -> Result<Vec<DeviceSession>, AuthError>;
}
