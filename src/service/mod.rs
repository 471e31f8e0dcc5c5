//! The subscription sync service.
//!
//! One explicitly constructed instance owns the snapshot, the refresh
//! policy and every worker thread. Refresh triggers (startup, foreground,
//! network recovery, store pushes, purchase/restore) all funnel through
//! the gated entry points in `sync`.

mod flow;
mod sync;
mod workers;

use crate::config::SyncConfig;
use crate::error::{Result, SyncError};
use crate::events::{SubscriptionConfig, SubscriptionFilter, SubscriptionHandle, SubscriptionId};
use crate::identity::{
    AccountTokenResolver, IdentityProvider, KeyValueStore, MemoryKeyValueStore,
    NoopIdentityProvider,
};
use crate::network::{PathMonitor, ReachabilityTracker};
use crate::oracle::{RawProduct, StoreOracle, Transaction, Verification};
use crate::refresh::RefreshPolicy;
use crate::store::SnapshotStore;
use crate::types::{Snapshot, SubscriptionState};
use crate::upload::{IdentifierUploader, NoopUploader};
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tracing::{info, warn};
use uuid::Uuid;

use workers::Worker;

/// Policy state guarded by the service's synchronization lock.
struct ServiceState {
    policy: RefreshPolicy,
    /// Store entries behind `Snapshot::products`, needed to start a purchase.
    raw_products: Vec<RawProduct>,
}

#[derive(Default)]
struct Workers {
    network: Option<Worker>,
    transactions: Option<Worker>,
    storefront: Option<Worker>,
    startup: Option<Worker>,
}

impl Workers {
    fn take_all(&mut self) -> Vec<Worker> {
        [
            self.network.take(),
            self.transactions.take(),
            self.storefront.take(),
            self.startup.take(),
        ]
        .into_iter()
        .flatten()
        .collect()
    }
}

pub(crate) struct Inner {
    config: SyncConfig,
    oracle: Arc<dyn StoreOracle>,
    path_monitor: Option<Arc<dyn PathMonitor>>,
    identity: Arc<dyn IdentityProvider>,
    tokens: AccountTokenResolver,
    uploader: Arc<dyn IdentifierUploader>,

    snapshots: SnapshotStore,

    /// Serializes all policy reads and writes.
    state: Mutex<ServiceState>,
    /// Signalled whenever a catalog refresh finishes.
    products_done: Condvar,

    reachability: Mutex<ReachabilityTracker>,

    workers: Mutex<Workers>,
    started: AtomicBool,
}

impl Drop for Inner {
    fn drop(&mut self) {
        for worker in self.workers.get_mut().take_all() {
            worker.stop();
        }
    }
}

/// Builder for [`SubscriptionService`].
pub struct SubscriptionServiceBuilder {
    config: SyncConfig,
    oracle: Arc<dyn StoreOracle>,
    path_monitor: Option<Arc<dyn PathMonitor>>,
    identity: Arc<dyn IdentityProvider>,
    storage: Arc<dyn KeyValueStore>,
    uploader: Arc<dyn IdentifierUploader>,
}

impl SubscriptionServiceBuilder {
    pub fn path_monitor(mut self, monitor: Arc<dyn PathMonitor>) -> Self {
        self.path_monitor = Some(monitor);
        self
    }

    pub fn identity(mut self, identity: Arc<dyn IdentityProvider>) -> Self {
        self.identity = identity;
        self
    }

    pub fn storage(mut self, storage: Arc<dyn KeyValueStore>) -> Self {
        self.storage = storage;
        self
    }

    pub fn uploader(mut self, uploader: Arc<dyn IdentifierUploader>) -> Self {
        self.uploader = uploader;
        self
    }

    /// Validate the config and assemble the service. Workers are not
    /// started until [`SubscriptionService::start`].
    pub fn build(self) -> Result<SubscriptionService> {
        self.config.validate()?;

        let tokens = AccountTokenResolver::new(Arc::clone(&self.identity), self.storage);

        let initial = Snapshot {
            last_order_id: tokens.last_order_id()?,
            ..Snapshot::default()
        };

        let inner = Inner {
            config: self.config,
            oracle: self.oracle,
            path_monitor: self.path_monitor,
            identity: self.identity,
            tokens,
            uploader: self.uploader,
            snapshots: SnapshotStore::new(initial),
            state: Mutex::new(ServiceState {
                policy: RefreshPolicy::new(),
                raw_products: Vec::new(),
            }),
            products_done: Condvar::new(),
            reachability: Mutex::new(ReachabilityTracker::new()),
            workers: Mutex::new(Workers::default()),
            started: AtomicBool::new(false),
        };

        Ok(SubscriptionService {
            inner: Arc::new(inner),
        })
    }
}

/// Client-side subscription state manager.
///
/// Cheap to clone; clones share the same snapshot and workers.
#[derive(Clone)]
pub struct SubscriptionService {
    inner: Arc<Inner>,
}

impl SubscriptionService {
    /// Start building a service around a store oracle. Identity, storage
    /// and upload default to no-op/in-memory implementations.
    pub fn builder(config: SyncConfig, oracle: Arc<dyn StoreOracle>) -> SubscriptionServiceBuilder {
        SubscriptionServiceBuilder {
            config,
            oracle,
            path_monitor: None,
            identity: Arc::new(NoopIdentityProvider),
            storage: Arc::new(MemoryKeyValueStore::new()),
            uploader: Arc::new(NoopUploader),
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.inner.config
    }

    // --- Reads ---

    /// The current snapshot. Never blocks on an in-flight refresh.
    pub fn current_snapshot(&self) -> Arc<Snapshot> {
        self.inner.snapshots.current()
    }

    pub fn subscription_state(&self) -> SubscriptionState {
        self.current_snapshot().subscription_state
    }

    pub fn is_pro_active(&self) -> bool {
        self.subscription_state().is_active()
    }

    /// Token attached to purchases for this account.
    pub fn account_token(&self) -> Result<Uuid> {
        self.inner.tokens.resolve()
    }

    // --- Events ---

    pub fn subscribe(&self, config: SubscriptionConfig) -> SubscriptionHandle {
        self.inner.snapshots.subscribe(config)
    }

    /// Subscribe with the configured `event_buffer_size`.
    pub fn subscribe_filtered(&self, filter: SubscriptionFilter) -> SubscriptionHandle {
        self.subscribe(SubscriptionConfig {
            buffer_size: self.inner.config.event_buffer_size,
            replay_current: false,
            filter,
        })
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.inner.snapshots.unsubscribe(id);
    }

    /// Apply a transform through the single snapshot entry point.
    pub fn update_snapshot<F>(&self, transform: F) -> Arc<Snapshot>
    where
        F: FnOnce(Snapshot) -> Snapshot,
    {
        self.inner.snapshots.update(transform)
    }

    // --- Refresh entry points ---

    /// Refresh the catalog. See [`RefreshPolicy::products_gate`] for gating.
    pub fn refresh_products(&self, force: bool) {
        self.inner.refresh_products(force);
    }

    /// Refresh entitlement status and return the resulting state.
    pub fn refresh_subscription_state(&self, force: bool) -> SubscriptionState {
        self.inner.refresh_subscription_state(force)
    }

    /// Feed a raw path update from a network monitor.
    pub fn handle_path_update(&self, available: bool) {
        self.inner.handle_path_update(available);
    }

    /// The app returned to the foreground.
    pub fn on_app_foreground(&self) {
        self.inner.refresh_if_stale();
    }

    // --- Lifecycle ---

    /// Start the network monitor, the store listeners and the initial
    /// coordinated refresh.
    pub fn start(&self) -> Result<()> {
        if self.inner.started.swap(true, Ordering::SeqCst) {
            return Err(SyncError::AlreadyStarted);
        }

        let result = self.spawn_workers();
        if result.is_err() {
            self.stop();
        }
        result
    }

    fn spawn_workers(&self) -> Result<()> {
        let weak = Arc::downgrade(&self.inner);
        let mut workers = self.inner.workers.lock();

        if let Some(monitor) = &self.inner.path_monitor {
            let updates = monitor.path_updates();
            let weak = Weak::clone(&weak);
            workers.network = Some(Worker::spawn("network", move |token| {
                token.for_each(updates, |available| match weak.upgrade() {
                    Some(inner) => {
                        inner.handle_path_update(available);
                        true
                    }
                    None => false,
                });
            })?);
        }

        workers.transactions = Some(Inner::spawn_transaction_listener(&self.inner)?);
        workers.storefront = Some(Inner::spawn_storefront_listener(&self.inner)?);

        let delay = self.inner.config.startup_delay;
        workers.startup = Some(Worker::spawn("startup", move |token| {
            if !token.sleep(delay) {
                return;
            }
            if let Some(inner) = weak.upgrade() {
                inner.refresh_products(false);
                if token.is_cancelled() {
                    return;
                }
                inner.refresh_subscription_state(false);
            }
        })?);

        info!("subscription service started");
        Ok(())
    }

    /// Cancel and replace both store listeners.
    pub fn restart_listeners(&self) -> Result<()> {
        let previous = {
            let mut workers = self.inner.workers.lock();
            [workers.transactions.take(), workers.storefront.take()]
        };
        for worker in previous.into_iter().flatten() {
            worker.stop();
        }

        let transactions = Inner::spawn_transaction_listener(&self.inner)?;
        let storefront = Inner::spawn_storefront_listener(&self.inner)?;

        let mut workers = self.inner.workers.lock();
        workers.transactions = Some(transactions);
        workers.storefront = Some(storefront);
        Ok(())
    }

    /// Cancel and join every worker. The service can be started again.
    pub fn stop(&self) {
        let workers = self.inner.workers.lock().take_all();
        if workers.is_empty() && !self.inner.started.load(Ordering::SeqCst) {
            return;
        }
        for worker in workers {
            worker.stop();
        }
        self.inner.started.store(false, Ordering::SeqCst);
        info!("subscription service stopped");
    }

    pub fn is_started(&self) -> bool {
        self.inner.started.load(Ordering::SeqCst)
    }
}

impl Inner {
    fn spawn_transaction_listener(this: &Arc<Inner>) -> Result<Worker> {
        let updates = this.oracle.transaction_updates();
        let weak = Arc::downgrade(this);
        Ok(Worker::spawn("transactions", move |token| {
            token.for_each(updates, |update| match weak.upgrade() {
                Some(inner) => {
                    inner.handle_transaction_update(update);
                    true
                }
                None => false,
            });
        })?)
    }

    fn spawn_storefront_listener(this: &Arc<Inner>) -> Result<Worker> {
        let updates = this.oracle.storefront_updates();
        let weak = Arc::downgrade(this);
        Ok(Worker::spawn("storefront", move |token| {
            token.for_each(updates, |storefront| match weak.upgrade() {
                Some(inner) => {
                    info!(country = %storefront.country_code, "storefront changed");
                    inner.refresh_products(true);
                    true
                }
                None => false,
            });
        })?)
    }

    fn handle_transaction_update(&self, update: Verification<Transaction>) {
        match update {
            Verification::Verified { value: transaction } => {
                self.refresh_subscription_state(true);
                self.oracle.finish(&transaction);
            }
            Verification::Unverified { value, reason } => {
                warn!(transaction = %value.id, %reason, "ignoring unverified transaction update")
            }
        }
    }
}
