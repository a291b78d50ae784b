//! Wiring for a running session core.

use std::sync::Arc;

use campus_core::auth::AuthClient;
use campus_core::config::ClientConfig;
use campus_core::error::{CampusError, Result};
use campus_core::identity::IdentityProvider;
use campus_core::session::{Session, SessionStore, SessionWatcher};
use campus_core::storage::{DurablePersistence, StorageKeys};
use campus_infrastructure::{HttpAuthClient, TomlKeyValueStore};

use crate::auth_usecase::AuthUseCase;
use crate::reconciler::{IdentityReconciler, Subscription};

/// Owns the session store, the reconciler, the identity provider and the
/// subscription to it.
///
/// There is exactly one `SessionStore` per runtime; consumers read it through
/// [`SessionRuntime::session`] or [`SessionRuntime::watch`].
pub struct SessionRuntime {
    reconciler: Arc<IdentityReconciler>,
    auth: AuthUseCase,
    provider: Arc<dyn IdentityProvider>,
    subscription: Subscription,
}

impl SessionRuntime {
    /// Builds the runtime and runs the start-up pass.
    ///
    /// The runtime keeps `provider` alive for as long as the subscription runs.
    pub async fn start(
        storage: Arc<dyn DurablePersistence>,
        client: Arc<dyn AuthClient>,
        provider: Arc<dyn IdentityProvider>,
        keys: StorageKeys,
    ) -> Self {
        let reconciler = Arc::new(IdentityReconciler::new(SessionStore::new(), storage, keys));
        let subscription = reconciler.start(provider.as_ref()).await;
        let auth = AuthUseCase::new(client, Arc::clone(&reconciler));

        Self {
            reconciler,
            auth,
            provider,
            subscription,
        }
    }

    /// Builds the runtime with the file-backed store and the HTTP client.
    pub async fn from_config(
        config: &ClientConfig,
        provider: Arc<dyn IdentityProvider>,
    ) -> Result<Self> {
        let storage = match &config.storage.file {
            Some(path) => TomlKeyValueStore::new(path.clone()),
            None => TomlKeyValueStore::open_default().map_err(|e| CampusError::config(e.to_string()))?,
        };
        tracing::debug!(path = %storage.path().display(), "session store location");

        let storage = Arc::new(storage);
        let client = Arc::new(HttpAuthClient::from_config(config));
        Ok(Self::start(storage, client, provider, config.storage_keys()).await)
    }

    pub fn auth(&self) -> &AuthUseCase {
        &self.auth
    }

    pub fn reconciler(&self) -> &Arc<IdentityReconciler> {
        &self.reconciler
    }

    pub fn provider(&self) -> &Arc<dyn IdentityProvider> {
        &self.provider
    }

    /// Whether provider notifications are still being reconciled.
    pub fn is_subscribed(&self) -> bool {
        self.subscription.is_active()
    }

    pub fn session(&self) -> Session {
        self.reconciler.store().read()
    }

    pub fn watch(&self) -> SessionWatcher {
        self.reconciler.store().subscribe()
    }

    /// Releases the provider subscription.
    pub async fn shutdown(self) {
        self.subscription.release().await;
    }
}
