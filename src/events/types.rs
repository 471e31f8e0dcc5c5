//! Event types published on every snapshot change.

use crate::types::{PurchaseState, Snapshot, SubscriptionState};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Configuration for a subscription.
#[derive(Clone, Debug)]
pub struct SubscriptionConfig {
    /// Max buffered events before dropping subscriber.
    /// Default: 1000
    pub buffer_size: usize,

    /// Send the current snapshot as an `Initial` event on subscribe.
    pub replay_current: bool,

    /// Filter criteria.
    pub filter: SubscriptionFilter,
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            buffer_size: 1000,
            replay_current: false,
            filter: SubscriptionFilter::all(),
        }
    }
}

impl SubscriptionConfig {
    pub fn with_filter(filter: SubscriptionFilter) -> Self {
        Self {
            filter,
            ..Default::default()
        }
    }
}

/// Which event kinds a subscriber receives.
#[derive(Clone, Debug, Default)]
pub struct SubscriptionFilter {
    pub include_snapshots: bool,
    pub include_subscription_state: bool,
    pub include_purchase_state: bool,
    pub include_network: bool,
}

impl SubscriptionFilter {
    /// Every whole-snapshot change.
    pub fn snapshots() -> Self {
        Self {
            include_snapshots: true,
            ..Default::default()
        }
    }

    /// Entitlement transitions only.
    pub fn subscription_state() -> Self {
        Self {
            include_subscription_state: true,
            ..Default::default()
        }
    }

    /// Purchase/restore flow transitions only.
    pub fn purchase_state() -> Self {
        Self {
            include_purchase_state: true,
            ..Default::default()
        }
    }

    /// Reachability transitions only.
    pub fn network() -> Self {
        Self {
            include_network: true,
            ..Default::default()
        }
    }

    /// Subscribe to everything.
    pub fn all() -> Self {
        Self {
            include_snapshots: true,
            include_subscription_state: true,
            include_purchase_state: true,
            include_network: true,
        }
    }

    pub(crate) fn matches(&self, event: &SyncEvent) -> bool {
        match event {
            SyncEvent::SnapshotChanged { .. } | SyncEvent::Initial { .. } => {
                self.include_snapshots
            }
            SyncEvent::SubscriptionStateChanged { .. } => self.include_subscription_state,
            SyncEvent::PurchaseStateChanged { .. } => self.include_purchase_state,
            SyncEvent::NetworkChanged { .. } => self.include_network,
            SyncEvent::Dropped { .. } => true,
        }
    }
}

/// Events emitted to subscribers.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SyncEvent {
    /// Current snapshot at subscribe time (only with `replay_current`).
    Initial { snapshot: Arc<Snapshot> },

    /// Fired once per snapshot update.
    SnapshotChanged { snapshot: Arc<Snapshot> },

    /// Entitlement status differs from the previous snapshot.
    SubscriptionStateChanged {
        previous: SubscriptionState,
        current: SubscriptionState,
    },

    /// Purchase state or error message differs from the previous snapshot.
    PurchaseStateChanged {
        state: PurchaseState,
        error: Option<String>,
    },

    /// Reachability differs from the previous snapshot.
    NetworkChanged { available: bool },

    /// Subscription was dropped.
    Dropped { reason: DropReason },
}

/// Why a subscription was dropped.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    /// Send buffer overflowed (slow consumer).
    BufferOverflow,
    /// Explicitly unsubscribed.
    Unsubscribed,
}

/// Unique identifier for a subscription.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

/// Handle to manage a subscription.
pub struct SubscriptionHandle {
    pub id: SubscriptionId,
    /// Channel to receive events.
    pub receiver: crossbeam_channel::Receiver<SyncEvent>,
}

impl SubscriptionHandle {
    /// Receive the next event (blocking).
    pub fn recv(&self) -> Result<SyncEvent, crossbeam_channel::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive an event (non-blocking).
    pub fn try_recv(&self) -> Result<SyncEvent, crossbeam_channel::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Receive with timeout.
    pub fn recv_timeout(
        &self,
        timeout: std::time::Duration,
    ) -> Result<SyncEvent, crossbeam_channel::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    /// Drain everything currently buffered.
    pub fn drain(&self) -> Vec<SyncEvent> {
        self.receiver.try_iter().collect()
    }
}
