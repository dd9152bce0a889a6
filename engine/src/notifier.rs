//! Change notifications.
//!
//! Consumers subscribe explicitly and receive a [`ChangeEvent`] every time
//! the store commits a write to a collection.

use crate::{Namespace, Table};
use dashmap::DashMap;
use tokio::sync::mpsc;

/// Identifier handed out by [`ChangeNotifier::subscribe`].
pub type SubscriptionId = String;

/// Receiving half of a subscription.
pub type ChangeReceiver = mpsc::UnboundedReceiver<ChangeEvent>;

/// A collection changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub namespace: Namespace,
    pub table: Table,
}

/// Observer list the store publishes to.
#[derive(Debug, Default)]
pub struct ChangeNotifier {
    subscribers: DashMap<SubscriptionId, mpsc::UnboundedSender<ChangeEvent>>,
}

impl ChangeNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber.
    ///
    /// Returns the subscription ID and the channel events arrive on.
    pub fn subscribe(&self) -> (SubscriptionId, ChangeReceiver) {
        let id = uuid::Uuid::new_v4().to_string();
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.insert(id.clone(), tx);

        tracing::debug!(subscription = %id, "change subscriber registered");

        (id, rx)
    }

    /// Remove a subscriber. Returns whether it was registered.
    pub fn unsubscribe(&self, id: &str) -> bool {
        self.subscribers.remove(id).is_some()
    }

    /// Deliver `event` to every live subscriber.
    ///
    /// Subscribers whose receiver was dropped are pruned. Returns the number
    /// of subscribers that received the event.
    pub fn notify(&self, event: ChangeEvent) -> usize {
        let mut delivered = 0;
        self.subscribers.retain(|_, tx| {
            let alive = tx.send(event.clone()).is_ok();
            if alive {
                delivered += 1;
            }
            alive
        });
        delivered
    }

    /// Number of registered subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}
