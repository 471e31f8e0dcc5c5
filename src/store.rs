//! The snapshot store: one current immutable snapshot, atomic
//! transform-and-publish, and change fan-out.

use crate::events::{SubscriptionConfig, SubscriptionHandle, SubscriptionId, SubscriptionManager, SyncEvent};
use crate::types::Snapshot;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;

/// Holds the current snapshot.
///
/// Reads never observe a partially-built snapshot: every update builds a
/// complete new value and swaps the `Arc`. Updates are serialized by
/// `write_lock`, and events are broadcast while it is held so subscribers
/// see changes in the order they were installed.
pub struct SnapshotStore {
    /// Current snapshot.
    current: RwLock<Arc<Snapshot>>,

    /// Serializes read-transform-install-notify.
    write_lock: Mutex<()>,

    /// Change subscribers.
    events: SubscriptionManager,
}

impl SnapshotStore {
    pub fn new(initial: Snapshot) -> Self {
        Self {
            current: RwLock::new(Arc::new(initial)),
            write_lock: Mutex::new(()),
            events: SubscriptionManager::new(),
        }
    }

    /// The current snapshot.
    pub fn current(&self) -> Arc<Snapshot> {
        Arc::clone(&self.current.read())
    }

    /// Apply `transform` to the current snapshot, install the result, and
    /// notify subscribers. Returns the installed snapshot.
    ///
    /// `transform` runs with the write lock held and must not call back
    /// into the store.
    pub fn update<F>(&self, transform: F) -> Arc<Snapshot>
    where
        F: FnOnce(Snapshot) -> Snapshot,
    {
        let _lock = self.write_lock.lock();

        let previous = self.current();
        let next = Arc::new(transform((*previous).clone()));
        *self.current.write() = Arc::clone(&next);

        self.publish(&previous, &next);

        next
    }

    /// Like [`update`](Self::update), but `transform` may decline by
    /// returning `None`; nothing is installed or published then.
    pub fn try_update<F>(&self, transform: F) -> Option<Arc<Snapshot>>
    where
        F: FnOnce(&Snapshot) -> Option<Snapshot>,
    {
        let _lock = self.write_lock.lock();

        let previous = self.current();
        let next = Arc::new(transform(&*previous)?);
        *self.current.write() = Arc::clone(&next);

        self.publish(&previous, &next);

        Some(next)
    }

    fn publish(&self, previous: &Snapshot, next: &Arc<Snapshot>) {
        self.events.broadcast(SyncEvent::SnapshotChanged {
            snapshot: Arc::clone(next),
        });

        if previous.subscription_state != next.subscription_state {
            self.events.broadcast(SyncEvent::SubscriptionStateChanged {
                previous: previous.subscription_state,
                current: next.subscription_state,
            });
        }

        if previous.purchase_differs(next) {
            self.events.broadcast(SyncEvent::PurchaseStateChanged {
                state: next.purchase_state,
                error: next.last_error_message.clone(),
            });
        }

        if previous.network_available != next.network_available
            || previous.availability != next.availability
        {
            self.events.broadcast(SyncEvent::NetworkChanged {
                available: next.network_available,
            });
        }
    }

    /// Subscribe to change events.
    pub fn subscribe(&self, config: SubscriptionConfig) -> SubscriptionHandle {
        if config.replay_current {
            // Hold the write lock so no update slips between the replay and
            // the registration.
            let _lock = self.write_lock.lock();
            let initial = SyncEvent::Initial {
                snapshot: self.current(),
            };
            self.events.subscribe_with(config, Some(initial))
        } else {
            self.events.subscribe(config)
        }
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.events.unsubscribe(id);
    }

    pub fn subscription_count(&self) -> usize {
        self.events.subscription_count()
    }
}

impl Default for SnapshotStore {
    fn default() -> Self {
        Self::new(Snapshot::default())
    }
}
