//! In-memory session store.

use std::sync::Arc;

use tokio::sync::watch;

use super::model::{Identity, Session};

/// Receiver side of a [`SessionStore`] subscription.
///
/// `borrow()` yields the latest snapshot; `changed().await` resolves on the
/// next mutation.
pub type SessionWatcher = watch::Receiver<Session>;

/// Holds the canonical session for the process.
///
/// Cloning yields another handle onto the same state. The store never does
/// I/O, so every method is synchronous. Mutations publish the new snapshot to
/// all subscribers before returning, which means a consumer that reads after
/// an awaited login call never sees the previous session.
#[derive(Clone)]
pub struct SessionStore {
    sender: Arc<watch::Sender<Session>>,
}

impl SessionStore {
    /// Creates a store holding the logged-out session.
    pub fn new() -> Self {
        let (sender, _initial) = watch::channel(Session::logged_out());
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Returns the current session.
    pub fn read(&self) -> Session {
        self.sender.borrow().clone()
    }

    /// Marks the session as logged in with `identity`.
    ///
    /// Pair this with a durable write; the store itself persists nothing.
    pub fn apply_login(&self, identity: Identity) -> Session {
        tracing::debug!(role = %identity.role(), "session: apply login");
        self.publish(Session::logged_in(identity))
    }

    /// Clears the session.
    pub fn apply_logout(&self) -> Session {
        tracing::debug!("session: apply logout");
        self.publish(Session::logged_out())
    }

    /// Registers a new subscriber.
    pub fn subscribe(&self) -> SessionWatcher {
        self.sender.subscribe()
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    fn publish(&self, next: Session) -> Session {
        self.sender.send_replace(next.clone());
        next
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Role;

    fn identity(token: &str, role: Role) -> Identity {
        Identity::new(token, role).unwrap()
    }

    #[test]
    fn test_new_store_is_logged_out() {
        let store = SessionStore::new();
        assert_eq!(store.read(), Session::logged_out());
    }

    #[test]
    fn test_apply_login_then_logout() {
        let store = SessionStore::new();

        let session = store.apply_login(identity("A", Role::Student));
        assert!(session.is_logged_in());
        assert_eq!(store.read().token(), Some("A"));

        let session = store.apply_logout();
        assert!(!session.is_logged_in());
        assert!(store.read().identity().is_none());
    }

    #[test]
    fn test_subscribers_see_mutation_before_call_returns() {
        let store = SessionStore::new();
        let mut first = store.subscribe();
        let mut second = store.subscribe();
        assert_eq!(store.subscriber_count(), 2);

        store.apply_login(identity("A", Role::Driver));

        assert!(first.has_changed().unwrap());
        assert!(second.has_changed().unwrap());
        assert_eq!(first.borrow_and_update().role(), Some(Role::Driver));
        assert_eq!(second.borrow_and_update().token(), Some("A"));
    }

    #[test]
    fn test_clones_share_state() {
        let store = SessionStore::new();
        let handle = store.clone();

        handle.apply_login(identity("B", Role::Admin));
        assert_eq!(store.read().role(), Some(Role::Admin));
    }

    #[tokio::test]
    async fn test_watcher_wakes_on_logout() {
        let store = SessionStore::new();
        store.apply_login(identity("A", Role::Student));

        let mut watcher = store.subscribe();
        let waiter = tokio::spawn(async move {
            watcher.changed().await.unwrap();
            watcher.borrow().is_logged_in()
        });

        store.apply_logout();
        assert!(!waiter.await.unwrap());
    }

    #[test]
    fn test_dropped_subscriber_is_released() {
        let store = SessionStore::new();
        let watcher = store.subscribe();
        assert_eq!(store.subscriber_count(), 1);
        drop(watcher);
        assert_eq!(store.subscriber_count(), 0);
    }
}
