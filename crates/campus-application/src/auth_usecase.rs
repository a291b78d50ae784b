//! Auth use case.
//!
//! `AuthUseCase` coordinates the backend client, the durable token/role pair and
//! the reconciler so that login, signup and logout keep the session consistent
//! with storage.

use std::sync::Arc;

use campus_core::auth::{AuthClient, AuthError, Credentials, DeviceSession, SignupRequest, UserProfile};
use campus_core::session::{Identity, Role, Session};

use crate::reconciler::IdentityReconciler;

/// Use case for the login / signup / logout flows and the authenticated
/// profile calls.
///
/// # Ordering
///
/// - Login writes the durable pair before publishing the session, so a crash in
///   between is recovered by the next start-up pass.
/// - Logout publishes the logged-out session before touching storage, so a
///   storage failure never leaves the user logged in.
pub struct AuthUseCase {
    client: Arc<dyn AuthClient>,
    reconciler: Arc<IdentityReconciler>,
}

impl AuthUseCase {
    pub fn new(client: Arc<dyn AuthClient>, reconciler: Arc<IdentityReconciler>) -> Self {
        Self { client, reconciler }
    }

    /// Validates `credentials`, authenticates against the backend and
    /// publishes the new session.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Validation` before any request when the input is
    /// incomplete, or the backend error otherwise. A failed durable write is
    /// logged and does not fail the login.
    pub async fn login(&self, credentials: &Credentials) -> Result<Identity, AuthError> {
        credentials.validate()?;

        let identity = match self.client.login(credentials).await {
            Ok(identity) => identity,
            Err(e) => {
                tracing::warn!(role = %credentials.role, "auth: login failed: {}", e);
                return Err(e);
            }
        };

        self.reconciler.persist_login(identity.clone()).await;
        tracing::info!(role = %identity.role(), "auth: logged in");
        Ok(identity)
    }

    /// Registers a new account. Does not log in.
    pub async fn signup(&self, request: &SignupRequest) -> Result<(), AuthError> {
        request.validate()?;
        self.client.signup(request).await?;
        tracing::info!(role = %request.credentials.role, "auth: account created");
        Ok(())
    }

    /// Logs out. Safe to call when already logged out.
    pub async fn logout(&self) -> Session {
        let session = self.reconciler.logout().await;
        tracing::info!("auth: logged out");
        session
    }

    pub fn session(&self) -> Session {
        self.reconciler.store().read()
    }

    /// The logged-in identity, or `NotLoggedIn`.
    pub fn current_identity(&self) -> Result<Identity, AuthError> {
        self.session().identity().cloned().ok_or(AuthError::NotLoggedIn)
    }

    /// Checks that the session role is `required`.
    pub fn require_role(&self, required: Role) -> Result<Identity, AuthError> {
        let session = self.session();
        match session.identity() {
            Some(identity) if identity.role() == required => Ok(identity.clone()),
            _ => Err(AuthError::Forbidden {
                required,
                actual: session.role(),
            }),
        }
    }

    pub async fn profile(&self) -> Result<UserProfile, AuthError> {
        let identity = self.current_identity()?;
        self.client.profile(identity.token()).await
    }

    pub async fn sessions(&self) -> Result<Vec<DeviceSession>, AuthError> {
        let identity = self.current_identity()?;
        self.client.sessions(identity.token()).await
    }
}
