//! In-process identity provider backed by tokio channels.
//!
//! The bridge between a third-party identity SDK (or a test) and the
//! reconciler: whoever owns the SDK callback calls [`ChannelIdentityProvider::publish`],
//! every open subscription receives the notification in order.

use std::sync::{Arc, Mutex, PoisonError};

use campus_core::identity::{
    IdentityFeed, IdentityFeedSender, IdentityNotification, IdentityProvider, SubscriptionError,
};
use tokio::sync::mpsc;

#[derive(Clone, Default)]
pub struct ChannelIdentityProvider {
    subscribers: Arc<Mutex<Vec<IdentityFeedSender>>>,
}

impl ChannelIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pushes a notification to every live subscriber.
    ///
    /// Returns the number of subscribers reached.
    pub fn publish(&self, notification: IdentityNotification) -> usize {
        self.broadcast(Ok(notification))
    }

    /// Pushes an error, as an SDK callback that threw would.
    pub fn publish_error(&self, error: SubscriptionError) -> usize {
        self.broadcast(Err(error))
    }

    /// Number of subscriptions that have not been dropped.
    pub fn subscriber_count(&self) -> usize {
        let mut subscribers = self.lock();
        subscribers.retain(|tx| !tx.is_closed());
        subscribers.len()
    }

    fn broadcast(&self, item: Result<IdentityNotification, SubscriptionError>) -> usize {
        let mut subscribers = self.lock();
        subscribers.retain(|tx| tx.send(item.clone()).is_ok());
        subscribers.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<IdentityFeedSender>> {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl IdentityProvider for ChannelIdentityProvider {
    fn subscribe(&self) -> IdentityFeed {
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock().push(tx);
        rx
    }
}
