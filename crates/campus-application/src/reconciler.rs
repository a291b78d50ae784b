//! Identity reconciliation.
//!
//! Decides the authoritative session from two sources: the durable
//! token/role pair and the external identity provider. Precedence:
//!
//! 1. An external identity that is present wins over whatever is stored.
//! 2. An external "absent" does not log out by itself; the stored pair is
//!    consulted and only an empty store means logged out.
//! 3. A malformed stored pair counts as empty.
//!
//! Every pass takes a ticket when it is triggered. A pass that completes after
//! a newer pass has already committed is discarded, and a superseded pass never
//! touches durable storage.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use campus_core::error::CampusError;
use campus_core::identity::{IdentityNotification, IdentityProvider};
use campus_core::session::{Identity, Session, SessionStore};
use campus_core::storage::{DurablePersistence, StorageKeys, StoredCredentials, StoredLookup};
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Reconciler state machine. There is no terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcilerState {
    Unknown,
    Authenticated,
    Unauthenticated,
}

/// What started a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassTrigger {
    Startup,
    ExternalPresent,
    ExternalAbsent,
    AfterLogout,
    Login,
    Logout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Source {
    Storage,
    External,
    Login,
}

enum Outcome {
    Authenticated(Identity, Source),
    Unauthenticated,
}

struct Committed {
    ticket: u64,
    state: ReconcilerState,
}

pub struct IdentityReconciler {
    store: SessionStore,
    storage: Arc<dyn DurablePersistence>,
    keys: StorageKeys,
    next_ticket: AtomicU64,
    committed: Mutex<Committed>,
    /// Serialises writes and removals of the durable pair.
    durable: AsyncMutex<()>,
}

impl IdentityReconciler {
    pub fn new(
        store: SessionStore,
        storage: Arc<dyn DurablePersistence>,
        keys: StorageKeys,
    ) -> Self {
        Self {
            store,
            storage,
            keys,
            next_ticket: AtomicU64::new(0),
            committed: Mutex::new(Committed {
                ticket: 0,
                state: ReconcilerState::Unknown,
            }),
            durable: AsyncMutex::new(()),
        }
    }

    pub fn state(&self) -> ReconcilerState {
        self.lock().state
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Accessor for the durable token/role pair.
    pub fn credentials(&self) -> StoredCredentials<'_> {
        StoredCredentials::new(self.storage.as_ref(), &self.keys)
    }

    /// Runs the start-up pass, then subscribes to `provider`.
    ///
    /// The start-up ticket is taken before the subscription opens, so any
    /// notification received meanwhile outranks the stored pair.
    pub async fn start(self: &Arc<Self>, provider: &dyn IdentityProvider) -> Subscription {
        let ticket = self.take_ticket();
        let subscription = self.subscribe(provider);
        self.storage_pass(ticket, PassTrigger::Startup).await;
        subscription
    }

    /// Start-up pass on its own: read storage, decide.
    pub async fn reconcile_startup(&self) -> Session {
        let ticket = self.take_ticket();
        self.storage_pass(ticket, PassTrigger::Startup).await
    }

    /// Reconciles one notification from the external provider.
    pub async fn handle_notification(&self, notification: IdentityNotification) -> Session {
        let ticket = self.take_ticket();
        match notification {
            IdentityNotification::Present(external) => match external.to_identity() {
                Ok(identity) => self.commit(
                    ticket,
                    PassTrigger::ExternalPresent,
                    Outcome::Authenticated(identity, Source::External),
                ),
                Err(e) => {
                    tracing::warn!(
                        "reconciler: external identity rejected ({}), checking stored credentials",
                        e
                    );
                    self.storage_pass(ticket, PassTrigger::ExternalPresent).await
                }
            },
            IdentityNotification::Absent => self.storage_pass(ticket, PassTrigger::ExternalAbsent).await,
        }
    }

    /// Confirms a logout. Never resurrects the session: a pair still on disk
    /// (an earlier removal failed) is removed again, unless a newer pass has
    /// committed in the meantime.
    pub async fn reconcile_after_logout(&self) -> Session {
        let ticket = self.take_ticket();
        self.after_logout_pass(ticket).await
    }

    /// Persists `identity`, then publishes it.
    ///
    /// A failed durable write is logged; the session is still published.
    pub async fn persist_login(&self, identity: Identity) -> Session {
        let _durable = self.durable.lock().await;
        if let Err(e) = self.credentials().save(&identity).await {
            tracing::warn!("reconciler: could not persist credentials, session is memory-only: {}", e);
        }
        self.record_login(identity)
    }

    /// Publishes the logged-out session, removes the durable pair and runs the
    /// after-logout pass under the same ticket.
    ///
    /// A login that commits meanwhile supersedes the whole logout.
    pub async fn logout(&self) -> Session {
        let ticket = self.take_ticket();
        self.commit(ticket, PassTrigger::Logout, Outcome::Unauthenticated);

        {
            let _durable = self.durable.lock().await;
            if !self.superseded(ticket) {
                if let Err(e) = self.credentials().clear().await {
                    tracing::warn!("reconciler: could not remove stored credentials: {}", e);
                }
            }
        }

        self.after_logout_pass(ticket).await
    }

    /// Applies a successful login through the sequence counter.
    pub fn record_login(&self, identity: Identity) -> Session {
        let ticket = self.take_ticket();
        self.commit(
            ticket,
            PassTrigger::Login,
            Outcome::Authenticated(identity, Source::Login),
        )
    }

    /// Applies an explicit logout through the sequence counter.
    pub fn record_logout(&self) -> Session {
        let ticket = self.take_ticket();
        self.commit(ticket, PassTrigger::Logout, Outcome::Unauthenticated)
    }

    /// Opens a subscription and reconciles each notification in order.
    ///
    /// Stream errors are logged and the subscription stays open.
    pub fn subscribe(self: &Arc<Self>, provider: &dyn IdentityProvider) -> Subscription {
        let mut feed = provider.subscribe();
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let reconciler = Arc::clone(self);

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => {
                        tracing::debug!("reconciler: subscription released");
                        break;
                    }
                    item = feed.recv() => match item {
                        Some(Ok(notification)) => {
                            reconciler.handle_notification(notification).await;
                        }
                        Some(Err(e)) => {
                            tracing::warn!("reconciler: identity stream error, staying subscribed: {}", e);
                        }
                        None => {
                            tracing::warn!("reconciler: identity provider closed the stream");
                            break;
                        }
                    }
                }
            }
        });

        Subscription {
            cancel,
            task: Some(task),
        }
    }

    fn take_ticket(&self) -> u64 {
        self.next_ticket.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn superseded(&self, ticket: u64) -> bool {
        ticket < self.lock().ticket
    }

    async fn after_logout_pass(&self, ticket: u64) -> Session {
        {
            let _durable = self.durable.lock().await;
            let credentials = self.credentials();
            if credentials.load().await != StoredLookup::Absent && !self.superseded(ticket) {
                tracing::warn!("reconciler: stored credentials survived logout, clearing again");
                if let Err(e) = credentials.clear().await {
                    tracing::warn!("reconciler: retry of credential removal failed: {}", e);
                }
            }
        }
        self.commit(ticket, PassTrigger::AfterLogout, Outcome::Unauthenticated)
    }

    async fn storage_pass(&self, ticket: u64, trigger: PassTrigger) -> Session {
        let outcome = match self.credentials().load().await {
            StoredLookup::Present(identity) => Outcome::Authenticated(identity, Source::Storage),
            StoredLookup::Absent => Outcome::Unauthenticated,
            StoredLookup::Malformed(reason) => {
                tracing::warn!(
                    "reconciler: stored credentials malformed ({}), treating as logged out",
                    reason
                );
                Outcome::Unauthenticated
            }
        };
        self.commit(ticket, trigger, outcome)
    }

    fn commit(&self, ticket: u64, trigger: PassTrigger, outcome: Outcome) -> Session {
        let mut committed = self.lock();
        if ticket < committed.ticket {
            tracing::debug!(
                ticket,
                latest = committed.ticket,
                ?trigger,
                "reconciler: discarding stale pass"
            );
            return self.store.read();
        }
        committed.ticket = ticket;

        let session = match outcome {
            Outcome::Authenticated(identity, source) => {
                if source == Source::External {
                    if let Some(current) = self.store.read().identity() {
                        if !current.same_principal(&identity) {
                            let conflict = CampusError::conflict(format!(
                                "external {} identity overrides local {} identity",
                                identity.role(),
                                current.role()
                            ));
                            tracing::info!("reconciler: {}", conflict);
                        }
                    }
                }
                committed.state = ReconcilerState::Authenticated;
                self.store.apply_login(identity)
            }
            Outcome::Unauthenticated => {
                committed.state = ReconcilerState::Unauthenticated;
                self.store.apply_logout()
            }
        };

        tracing::info!(?trigger, state = ?committed.state, "reconciler: pass committed");
        session
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Committed> {
        self.committed.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Handle for an identity-provider subscription.
///
/// `release` cancels and waits for the listener to stop; dropping the handle
/// cancels without waiting.
pub struct Subscription {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    pub fn is_active(&self) -> bool {
        !self.cancel.is_cancelled()
            && self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Cancels the listener and waits for it to exit.
    pub async fn release(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    tracing::warn!("reconciler: listener task ended abnormally: {}", e);
                }
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use campus_core::identity::{ExternalIdentity, SubscriptionError};
    use campus_core::session::Role;
    use campus_core::storage::StorageError;
    use campus_infrastructure::{ChannelIdentityProvider, InMemoryKeyValueStore, TomlKeyValueStore};
    use std::time::Duration;
    use tokio::sync::{Notify, Semaphore};

    fn reconciler_with(storage: Arc<dyn DurablePersistence>) -> Arc<IdentityReconciler> {
        Arc::new(IdentityReconciler::new(
            SessionStore::new(),
            storage,
            StorageKeys::default(),
        ))
    }

    fn stored(token: &str, role: &str) -> Arc<InMemoryKeyValueStore> {
        Arc::new(InMemoryKeyValueStore::with_entries([
            ("token", token),
            ("role", role),
        ]))
    }

    fn present(token: &str, role: &str) -> IdentityNotification {
        IdentityNotification::Present(ExternalIdentity::new(token, role))
    }

    fn assert_invariant(session: &Session) {
        assert_eq!(
            session.is_logged_in(),
            session.identity().is_some_and(|i| !i.token().is_empty())
        );
    }

    async fn wait_for_change(watcher: &mut campus_core::session::SessionWatcher) {
        tokio::time::timeout(Duration::from_secs(2), watcher.changed())
            .await
            .expect("session did not change in time")
            .unwrap();
    }

    // Storage whose reads block until the test hands out permits.
    struct GatedStorage {
        inner: InMemoryKeyValueStore,
        gate: Semaphore,
        entered: Notify,
    }

    impl GatedStorage {
        fn new(inner: InMemoryKeyValueStore) -> Self {
            Self {
                inner,
                gate: Semaphore::new(0),
                entered: Notify::new(),
            }
        }
    }

    #[async_trait]
    impl DurablePersistence for GatedStorage {
        async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
            self.entered.notify_one();
            let permit = self.gate.acquire().await.unwrap();
            permit.forget();
            self.inner.get(key).await
        }

        async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
            self.inner.set(key, value).await
        }

        async fn remove_all(&self, keys: &[&str]) -> Result<(), StorageError> {
            self.inner.remove_all(keys).await
        }
    }

    #[tokio::test]
    async fn test_initial_state_is_unknown() {
        let reconciler = reconciler_with(Arc::new(InMemoryKeyValueStore::new()));
        assert_eq!(reconciler.state(), ReconcilerState::Unknown);
        assert!(!reconciler.store().read().is_logged_in());
    }

    #[tokio::test]
    async fn test_cold_start_with_empty_storage() {
        let reconciler = reconciler_with(Arc::new(InMemoryKeyValueStore::new()));

        let session = reconciler.reconcile_startup().await;

        assert_eq!(session, Session::logged_out());
        assert_eq!(reconciler.state(), ReconcilerState::Unauthenticated);
    }

    #[tokio::test]
    async fn test_startup_restores_stored_pair() {
        let reconciler = reconciler_with(stored("A", "student"));

        let session = reconciler.reconcile_startup().await;

        assert_eq!(session.token(), Some("A"));
        assert_eq!(session.role(), Some(Role::Student));
        assert_eq!(reconciler.state(), ReconcilerState::Authenticated);
    }

    #[tokio::test]
    async fn test_startup_with_malformed_pair_is_logged_out() {
        let storage = Arc::new(InMemoryKeyValueStore::with_entries([
            ("token", "A"),
            ("role", "janitor"),
        ]));
        let reconciler = reconciler_with(storage);

        let session = reconciler.reconcile_startup().await;

        assert!(!session.is_logged_in());
        assert_eq!(reconciler.state(), ReconcilerState::Unauthenticated);
    }

    #[tokio::test]
    async fn test_startup_with_unavailable_storage_is_logged_out() {
        let storage = stored("A", "student");
        storage.set_available(false);
        let reconciler = reconciler_with(storage);

        let session = reconciler.reconcile_startup().await;

        assert!(!session.is_logged_in());
        assert_eq!(reconciler.state(), ReconcilerState::Unauthenticated);
    }

    #[tokio::test]
    async fn test_external_identity_wins_over_storage() {
        let reconciler = reconciler_with(stored("A", "student"));
        reconciler.reconcile_startup().await;

        let session = reconciler.handle_notification(present("B", "admin")).await;

        assert_eq!(session.token(), Some("B"));
        assert_eq!(session.role(), Some(Role::Admin));
        assert_eq!(reconciler.state(), ReconcilerState::Authenticated);
        assert_invariant(&session);
    }

    #[tokio::test]
    async fn test_absent_notification_falls_back_to_storage() {
        let reconciler = reconciler_with(stored("A", "driver"));

        let session = reconciler
            .handle_notification(IdentityNotification::Absent)
            .await;

        assert!(session.is_logged_in());
        assert_eq!(session.token(), Some("A"));
        assert_eq!(session.role(), Some(Role::Driver));
    }

    #[tokio::test]
    async fn test_absent_notification_with_empty_storage_logs_out() {
        let reconciler = reconciler_with(Arc::new(InMemoryKeyValueStore::new()));
        reconciler.handle_notification(present("B", "admin")).await;

        let session = reconciler
            .handle_notification(IdentityNotification::Absent)
            .await;

        assert!(!session.is_logged_in());
        assert_eq!(reconciler.state(), ReconcilerState::Unauthenticated);
    }

    #[tokio::test]
    async fn test_external_identity_with_unknown_role_falls_back() {
        let reconciler = reconciler_with(stored("A", "driver"));

        let session = reconciler.handle_notification(present("B", "wizard")).await;

        assert_eq!(session.token(), Some("A"));
        assert_eq!(session.role(), Some(Role::Driver));
    }

    #[tokio::test]
    async fn test_stale_startup_pass_is_discarded() {
        let gated = Arc::new(GatedStorage::new(InMemoryKeyValueStore::with_entries([
            ("token", "A"),
            ("role", "student"),
        ])));
        let reconciler = reconciler_with(gated.clone());

        // P1: start-up pass, blocked inside its storage read
        let p1 = {
            let reconciler = Arc::clone(&reconciler);
            tokio::spawn(async move { reconciler.reconcile_startup().await })
        };
        gated.entered.notified().await;

        // P2: triggered later, completes first
        let p2 = reconciler.handle_notification(present("B", "admin")).await;
        assert_eq!(p2.token(), Some("B"));

        gated.gate.add_permits(2);
        let p1 = p1.await.unwrap();

        let session = reconciler.store().read();
        assert_eq!(p1, session);
        assert_eq!(session.token(), Some("B"));
        assert_eq!(session.role(), Some(Role::Admin));
        assert_eq!(reconciler.state(), ReconcilerState::Authenticated);
    }

    #[tokio::test]
    async fn test_passes_completing_in_order_both_apply() {
        let reconciler = reconciler_with(stored("A", "student"));

        let first = reconciler.reconcile_startup().await;
        assert_eq!(first.token(), Some("A"));

        let second = reconciler.handle_notification(present("B", "admin")).await;
        assert_eq!(second.token(), Some("B"));
    }

    #[tokio::test]
    async fn test_record_login_outranks_in_flight_startup() {
        let gated = Arc::new(GatedStorage::new(InMemoryKeyValueStore::new()));
        let reconciler = reconciler_with(gated.clone());

        let startup = {
            let reconciler = Arc::clone(&reconciler);
            tokio::spawn(async move { reconciler.reconcile_startup().await })
        };
        gated.entered.notified().await;

        reconciler.record_login(Identity::new("C", Role::Driver).unwrap());
        gated.gate.add_permits(2);
        startup.await.unwrap();

        assert_eq!(reconciler.store().read().token(), Some("C"));
    }

    #[tokio::test]
    async fn test_after_logout_clears_leftover_pair() {
        let storage = stored("A", "student");
        let reconciler = reconciler_with(storage.clone());
        reconciler.reconcile_startup().await;

        reconciler.record_logout();
        let session = reconciler.reconcile_after_logout().await;

        assert!(!session.is_logged_in());
        assert!(storage.snapshot().await.is_empty());
        assert_eq!(reconciler.state(), ReconcilerState::Unauthenticated);
    }

    #[tokio::test]
    async fn test_stale_after_logout_pass_keeps_fresh_login_pair() {
        let gated = Arc::new(GatedStorage::new(InMemoryKeyValueStore::new()));
        let reconciler = reconciler_with(gated.clone());
        reconciler.record_logout();

        let after_logout = {
            let reconciler = Arc::clone(&reconciler);
            tokio::spawn(async move { reconciler.reconcile_after_logout().await })
        };
        gated.entered.notified().await;

        // A login lands while the after-logout read is in flight
        let fresh = Identity::new("C", Role::Driver).unwrap();
        reconciler.credentials().save(&fresh).await.unwrap();
        reconciler.record_login(fresh);

        gated.gate.add_permits(2);
        after_logout.await.unwrap();

        assert_eq!(reconciler.store().read().token(), Some("C"));
        let stored = gated.inner.snapshot().await;
        assert_eq!(stored.get("token").map(String::as_str), Some("C"));
        assert_eq!(stored.get("role").map(String::as_str), Some("driver"));
    }

    #[tokio::test]
    async fn test_login_waiting_on_after_logout_pass_is_persisted() {
        let gated = Arc::new(GatedStorage::new(InMemoryKeyValueStore::with_entries([
            ("token", "A"),
            ("role", "student"),
        ])));
        let reconciler = reconciler_with(gated.clone());
        reconciler.record_logout();

        let after_logout = {
            let reconciler = Arc::clone(&reconciler);
            tokio::spawn(async move { reconciler.reconcile_after_logout().await })
        };
        gated.entered.notified().await;

        let login = {
            let reconciler = Arc::clone(&reconciler);
            tokio::spawn(async move {
                reconciler
                    .persist_login(Identity::new("C", Role::Driver).unwrap())
                    .await
            })
        };
        tokio::task::yield_now().await;

        gated.gate.add_permits(2);
        after_logout.await.unwrap();
        login.await.unwrap();

        assert_eq!(reconciler.store().read().token(), Some("C"));
        assert_eq!(reconciler.state(), ReconcilerState::Authenticated);
        let stored = gated.inner.snapshot().await;
        assert_eq!(stored.get("token").map(String::as_str), Some("C"));
    }

    #[tokio::test]
    async fn test_logout_superseded_by_login_leaves_login_intact() {
        let gated = Arc::new(GatedStorage::new(InMemoryKeyValueStore::new()));
        let reconciler = reconciler_with(gated.clone());
        reconciler
            .persist_login(Identity::new("A", Role::Student).unwrap())
            .await;

        let logout = {
            let reconciler = Arc::clone(&reconciler);
            tokio::spawn(async move { reconciler.logout().await })
        };
        // logout removes the pair, then blocks in the after-logout read
        gated.entered.notified().await;
        assert!(!reconciler.store().read().is_logged_in());

        let fresh = Identity::new("C", Role::Driver).unwrap();
        reconciler.credentials().save(&fresh).await.unwrap();
        reconciler.record_login(fresh);

        gated.gate.add_permits(2);
        logout.await.unwrap();

        assert_eq!(reconciler.store().read().token(), Some("C"));
        assert_eq!(reconciler.state(), ReconcilerState::Authenticated);
        assert_eq!(
            gated.inner.snapshot().await.get("token").map(String::as_str),
            Some("C")
        );
    }

    #[tokio::test]
    async fn test_crash_between_durable_write_and_apply_login_recovers() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("session.toml");

        // First process: durable write happens, then the process dies.
        {
            let reconciler = reconciler_with(Arc::new(TomlKeyValueStore::new(path.clone())));
            reconciler
                .credentials()
                .save(&Identity::new("A", Role::Driver).unwrap())
                .await
                .unwrap();
            assert!(!reconciler.store().read().is_logged_in());
        }

        // Next process start
        let reconciler = reconciler_with(Arc::new(TomlKeyValueStore::new(path)));
        let session = reconciler.reconcile_startup().await;

        assert_eq!(reconciler.state(), ReconcilerState::Authenticated);
        assert_eq!(session.token(), Some("A"));
        assert_eq!(session.role(), Some(Role::Driver));
    }

    #[tokio::test]
    async fn test_subscription_applies_notifications_and_survives_errors() {
        let provider = ChannelIdentityProvider::new();
        let reconciler = reconciler_with(Arc::new(InMemoryKeyValueStore::new()));
        let mut watcher = reconciler.store().subscribe();

        let subscription = reconciler.start(&provider).await;
        wait_for_change(&mut watcher).await;
        assert_eq!(reconciler.state(), ReconcilerState::Unauthenticated);

        provider.publish_error(SubscriptionError::Listener("callback threw".into()));
        provider.publish(present("B", "admin"));
        wait_for_change(&mut watcher).await;

        assert!(subscription.is_active());
        assert_eq!(reconciler.store().read().token(), Some("B"));

        subscription.release().await;
    }

    #[tokio::test]
    async fn test_release_unsubscribes_exactly_once() {
        let provider = ChannelIdentityProvider::new();
        let reconciler = reconciler_with(stored("A", "student"));

        let subscription = reconciler.start(&provider).await;
        assert_eq!(provider.subscriber_count(), 1);

        subscription.release().await;
        assert_eq!(provider.subscriber_count(), 0);

        // Nothing fires after teardown
        assert_eq!(provider.publish(present("B", "admin")), 0);
        assert_eq!(reconciler.store().read().token(), Some("A"));
    }

    #[tokio::test]
    async fn test_invariant_holds_across_transitions() {
        let reconciler = reconciler_with(stored("A", "student"));

        let mut sessions = vec![reconciler.reconcile_startup().await];
        sessions.push(reconciler.handle_notification(present("B", "admin")).await);
        sessions.push(reconciler.handle_notification(present("", "admin")).await);
        sessions.push(reconciler.record_logout());
        sessions.push(reconciler.reconcile_after_logout().await);
        sessions.push(
            reconciler
                .handle_notification(IdentityNotification::Absent)
                .await,
        );

        for session in &sessions {
            assert_invariant(session);
        }
        assert!(!sessions.last().unwrap().is_logged_in());
    }
}
