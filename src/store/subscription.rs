// Subscription channels for store notifications
//
// Notifications are queued on an unbounded channel inside the mutating call
// and drained by the subscriber afterwards, so a subscriber that mutates the
// store while handling a notification never re-enters the notifier.

use log::debug;
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::mpsc;

type SubscriberId = u64;

/// Registry of live subscribers for one kind of notification
pub struct Subscribers<T> {
    next_id: SubscriberId,
    entries: Vec<(SubscriberId, mpsc::UnboundedSender<T>)>,
}

impl<T: Clone> Subscribers<T> {
    pub fn new() -> Self {
        Subscribers {
            next_id: 0,
            entries: Vec::new(),
        }
    }

    /// Number of registered subscribers
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Queue `value` for every subscriber, in registration order.
    /// Subscribers whose receiver is gone are pruned.
    pub fn notify(&mut self, value: &T) {
        self.entries.retain(|(id, tx)| match tx.send(value.clone()) {
            Ok(_) => true,
            Err(_) => {
                debug!("Pruning closed subscriber {}", id);
                false
            }
        });
    }

    fn remove(&mut self, id: SubscriberId) {
        self.entries.retain(|(entry_id, _)| *entry_id != id);
    }
}

impl<T: Clone> Default for Subscribers<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Add a subscriber to a shared registry and hand back its handle
pub fn subscribe<T: Clone>(registry: &Arc<Mutex<Subscribers<T>>>) -> Subscription<T> {
    let (tx, rx) = mpsc::unbounded_channel();
    let id = {
        let mut subscribers = registry.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let id = subscribers.next_id;
        subscribers.next_id += 1;
        subscribers.entries.push((id, tx));
        id
    };

    Subscription {
        id,
        registry: Arc::downgrade(registry),
        rx,
        active: true,
    }
}

/// Receiving end of a store subscription.
///
/// Dropping the handle unsubscribes it.
pub struct Subscription<T: Clone> {
    id: SubscriberId,
    registry: Weak<Mutex<Subscribers<T>>>,
    rx: mpsc::UnboundedReceiver<T>,
    active: bool,
}

impl<T: Clone> Subscription<T> {
    /// Next queued notification, if any
    pub fn try_recv(&mut self) -> Option<T> {
        self.rx.try_recv().ok()
    }

    /// Wait for the next notification. Returns `None` once unsubscribed
    /// and drained, or when the store is gone.
    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    /// All notifications queued so far
    pub fn drain(&mut self) -> Vec<T> {
        let mut queued = Vec::new();
        while let Ok(value) = self.rx.try_recv() {
            queued.push(value);
        }
        queued
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Stop receiving notifications. Calling this more than once is a no-op
    /// and only ever removes this handle's own registration.
    pub fn unsubscribe(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;

        if let Some(registry) = self.registry.upgrade() {
            registry
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .remove(self.id);
        }
        self.rx.close();
    }
}

impl<T: Clone> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notify_reaches_every_subscriber_in_order() {
        let registry = Arc::new(Mutex::new(Subscribers::<u32>::new()));
        let mut first = subscribe(&registry);
        let mut second = subscribe(&registry);

        registry.lock().unwrap().notify(&1);
        registry.lock().unwrap().notify(&2);

        assert_eq!(first.drain(), vec![1, 2]);
        assert_eq!(second.drain(), vec![1, 2]);
    }

    #[test]
    fn test_unsubscribe_is_idempotent_and_targets_one_handle() {
        let registry = Arc::new(Mutex::new(Subscribers::<u32>::new()));
        let mut first = subscribe(&registry);
        let mut second = subscribe(&registry);

        first.unsubscribe();
        first.unsubscribe();
        assert_eq!(registry.lock().unwrap().len(), 1);

        registry.lock().unwrap().notify(&7);
        assert_eq!(first.try_recv(), None);
        assert_eq!(second.try_recv(), Some(7));
    }

    #[test]
    fn test_dropping_handle_removes_registration() {
        let registry = Arc::new(Mutex::new(Subscribers::<u32>::new()));
        {
            let _sub = subscribe(&registry);
            assert_eq!(registry.lock().unwrap().len(), 1);
        }
        assert!(registry.lock().unwrap().is_empty());
    }
}
