use std::collections::HashMap;
use std::fmt;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Mutex, MutexGuard,
};
use tokio::sync::mpsc as tokio_mpsc;
use tracing::debug;

type SubscriptionId = u64;

/// Fan-out of change notifications to any number of subscribers
///
/// Each subscriber gets its own unbounded receiver. Subscriptions are removed
/// on the next publish after their receiver is dropped.
pub struct EventHub<T> {
    subscriptions: Arc<Mutex<HashMap<SubscriptionId, tokio_mpsc::UnboundedSender<T>>>>,
    next_id: Arc<AtomicU64>,
}

impl<T> Clone for EventHub<T> {
    fn clone(&self) -> Self {
        Self {
            subscriptions: self.subscriptions.clone(),
            next_id: self.next_id.clone(),
        }
    }
}

impl<T> Default for EventHub<T> {
    fn default() -> Self {
        Self {
            subscriptions: Arc::new(Mutex::new(HashMap::new())),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }
}

impl<T> fmt::Debug for EventHub<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventHub")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

impl<T: Clone> EventHub<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to every event published after this call
    pub fn subscribe(&self) -> tokio_mpsc::UnboundedReceiver<T> {
        let (tx, rx) = tokio_mpsc::unbounded_channel();
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.lock().insert(id, tx);
        rx
    }

    pub fn publish(&self, event: T) {
        let mut subs = self.lock();
        let mut to_remove = Vec::new();

        for (id, tx) in subs.iter() {
            // If send fails, receiver was dropped - mark for removal
            if tx.send(event.clone()).is_err() {
                to_remove.push(*id);
            }
        }

        for id in to_remove {
            debug!("Dropping closed subscription {}", id);
            subs.remove(&id);
        }
    }
}

impl<T> EventHub<T> {
    pub fn subscriber_count(&self) -> usize {
        self.lock().len()
    }

    // A panic while holding the lock cannot leave the map half-updated.
    fn lock(&self) -> MutexGuard<'_, HashMap<SubscriptionId, tokio_mpsc::UnboundedSender<T>>> {
        self.subscriptions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
