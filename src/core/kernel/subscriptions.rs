use crate::core::traits::MessageHandler;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// One registered stream
#[derive(Clone)]
pub struct Subscription {
    /// Client-chosen request id sent with the subscribe frame
    pub id: String,
    pub topic: String,
    pub handler: Arc<dyn MessageHandler>,
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("topic", &self.topic)
            .finish_non_exhaustive()
    }
}

/// Result of `SubscriptionRegistry::add`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    Inserted,
    /// The topic was already registered; only its handler changed
    Replaced,
}

/// What should be active on a logical session, in insertion order.
///
/// Topics are unique keys. The registry is shared between the caller side
/// and the session driver, so every operation takes the internal lock for
/// its own duration only.
#[derive(Default)]
pub struct SubscriptionRegistry {
    entries: Mutex<Vec<Subscription>>,
    next_id: AtomicU64,
}

impl std::fmt::Debug for SubscriptionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.lock().iter()).finish()
    }
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Subscription>> {
        // handlers never run under this lock, so a poisoned guard still holds consistent data
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Upsert `topic`. A re-add keeps the entry's position and id and swaps the handler.
    pub fn add(&self, topic: &str, handler: Arc<dyn MessageHandler>) -> AddOutcome {
        let mut entries = self.lock();

        if let Some(existing) = entries.iter_mut().find(|s| s.topic == topic) {
            existing.handler = handler;
            return AddOutcome::Replaced;
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        entries.push(Subscription {
            id: id.to_string(),
            topic: topic.to_string(),
            handler,
        });
        AddOutcome::Inserted
    }

    /// Remove `topic`, returning the entry if it was registered
    pub fn remove(&self, topic: &str) -> Option<Subscription> {
        let mut entries = self.lock();
        let index = entries.iter().position(|s| s.topic == topic)?;
        Some(entries.remove(index))
    }

    /// Snapshot of every entry in insertion order
    pub fn all(&self) -> Vec<Subscription> {
        self.lock().clone()
    }

    pub fn get(&self, topic: &str) -> Option<Subscription> {
        self.lock().iter().find(|s| s.topic == topic).cloned()
    }

    pub fn get_by_id(&self, id: &str) -> Option<Subscription> {
        self.lock().iter().find(|s| s.id == id).cloned()
    }

    pub fn handler(&self, topic: &str) -> Option<Arc<dyn MessageHandler>> {
        self.lock()
            .iter()
            .find(|s| s.topic == topic)
            .map(|s| s.handler.clone())
    }

    pub fn contains(&self, topic: &str) -> bool {
        self.lock().iter().any(|s| s.topic == topic)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
