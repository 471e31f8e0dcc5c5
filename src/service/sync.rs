//! Gated catalog and entitlement refreshes, and reachability handling.

use super::Inner;
use crate::catalog::{build_models, rank_products};
use crate::error::SyncError;
use crate::oracle::Verification;
use crate::refresh::{EntitlementsGate, ProductsGate};
use crate::types::{ProductsState, SubscriptionState};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Clears the recovery flag however the recovery refresh exits.
struct RecoveryGuard<'a>(&'a Inner);

impl Drop for RecoveryGuard<'_> {
    fn drop(&mut self) {
        self.0.state.lock().policy.finish_recovery();
    }
}

/// Releases the catalog in-flight flag if the lookup unwinds, so
/// coalesced waiters are not left blocked.
struct ProductsRefreshGuard<'a> {
    inner: &'a Inner,
    completed: bool,
}

impl Drop for ProductsRefreshGuard<'_> {
    fn drop(&mut self) {
        if self.completed {
            return;
        }
        let mut state = self.inner.state.lock();
        state.policy.finish_products(None);
        let message = SyncError::Oracle("catalog lookup aborted".into()).to_string();
        warn!("{}", message);
        self.inner.snapshots.update(|mut s| {
            s.products_state = ProductsState::Failed;
            s.last_error_message = Some(message);
            s
        });
        drop(state);
        self.inner.products_done.notify_all();
    }
}

impl Inner {
    /// Refresh the catalog from the store.
    ///
    /// Concurrent callers coalesce onto the in-flight call and return once
    /// it completes, without a result of their own.
    pub(crate) fn refresh_products(&self, force: bool) {
        let mut state = self.state.lock();
        let snapshot = self.snapshots.current();

        let gate = state.policy.products_gate(
            Instant::now(),
            force,
            snapshot.products_state,
            !snapshot.products.is_empty(),
            &self.config,
        );

        match gate {
            ProductsGate::Coalesce => {
                let generation = state.policy.products_generation;
                debug!("catalog refresh in flight, waiting");
                while state.policy.refreshing_products
                    && state.policy.products_generation == generation
                {
                    self.products_done.wait(&mut state);
                }
                return;
            }
            ProductsGate::Backoff => {
                debug!("catalog refresh skipped: backing off after failure");
                return;
            }
            ProductsGate::Fresh => {
                debug!("catalog refresh skipped: within ttl");
                return;
            }
            ProductsGate::Proceed => {}
        }

        state.policy.begin_products(Instant::now());
        self.snapshots.update(|mut s| {
            s.products_state = ProductsState::Loading;
            s
        });
        drop(state);

        let mut guard = ProductsRefreshGuard {
            inner: self,
            completed: false,
        };
        let result = self.oracle.lookup_products(&self.config.product_ids);

        let mut state = self.state.lock();
        guard.completed = true;
        match result {
            Ok(list) if list.is_empty() => {
                state.policy.finish_products(None);
                warn!("catalog lookup returned no products");
                self.snapshots.update(|mut s| {
                    s.products_state = ProductsState::Failed;
                    s.last_error_message = Some(SyncError::NoProductsReturned.to_string());
                    s
                });
            }
            Ok(mut list) => {
                rank_products(&mut list, &self.config);
                let models = build_models(&list);
                state.raw_products = list;
                state.policy.finish_products(Some(Instant::now()));
                info!(count = models.len(), "catalog ready");
                self.snapshots.update(|mut s| {
                    s.products = models;
                    s.products_state = ProductsState::Ready;
                    s
                });
            }
            Err(e) => {
                state.policy.finish_products(None);
                warn!(error = %e, "catalog lookup failed");
                // Keep the previous list so the paywall does not flicker.
                self.snapshots.update(|mut s| {
                    s.products_state = ProductsState::Failed;
                    s.last_error_message = Some(e.to_string());
                    s
                });
            }
        }
        drop(state);

        self.products_done.notify_all();
    }

    /// Refresh entitlement status and return the resulting state.
    pub(crate) fn refresh_subscription_state(&self, force: bool) -> SubscriptionState {
        let mut state = self.state.lock();
        let snapshot = self.snapshots.current();

        match state.policy.entitlements_gate(
            Instant::now(),
            force,
            snapshot.subscription_state,
            &self.config,
        ) {
            EntitlementsGate::Debounced => {
                debug!("entitlement refresh skipped: debounced");
                return snapshot.subscription_state;
            }
            EntitlementsGate::Fresh => {
                debug!("entitlement refresh skipped: within ttl");
                return snapshot.subscription_state;
            }
            EntitlementsGate::Proceed => {}
        }

        state.policy.last_entitlements_attempt_at = Some(Instant::now());
        drop(state);

        let entitlements = match self.oracle.current_entitlements() {
            Ok(entitlements) => entitlements,
            Err(e) => {
                warn!(error = %e, "entitlement enumeration failed");
                return self.snapshots.current().subscription_state;
            }
        };

        let mut active = false;
        for entitlement in &entitlements {
            match entitlement {
                Verification::Verified { value } => {
                    if self.config.is_configured_product(&value.product_id) {
                        active = true;
                    }
                }
                Verification::Unverified { value, reason } => {
                    warn!(transaction = %value.id, %reason, "ignoring unverified entitlement");
                }
            }
        }

        let mut state = self.state.lock();
        let current = self.snapshots.current();

        if !active && !force && !current.network_available
            && current.subscription_state == SubscriptionState::Unknown
        {
            debug!("offline with no prior entitlement state, deferring");
            return SubscriptionState::Unknown;
        }

        let next = if active {
            SubscriptionState::Active
        } else {
            SubscriptionState::Inactive
        };

        state.policy.last_entitlements_refresh_at = Some(Instant::now());
        let installed = self.snapshots.update(|mut s| {
            s.subscription_state = next;
            s
        });
        drop(state);

        if current.subscription_state != next {
            info!(previous = ?current.subscription_state, current = ?next, "entitlement changed");
        }
        installed.subscription_state
    }

    /// Publish a reachability transition; refresh if the network came back.
    pub(crate) fn handle_path_update(&self, available: bool) {
        let transition = {
            let mut tracker = self.reachability.lock();
            let transition = tracker.observe(available);
            if let Some(t) = transition {
                self.snapshots.update(|s| s.with_network(t.available));
            }
            transition
        };

        let Some(transition) = transition else {
            return;
        };

        info!(available = transition.available, "network changed");
        if transition.recovered {
            self.refresh_if_stale();
        }
    }

    /// Staleness-aware refresh of catalog and entitlement. Overlapping
    /// calls collapse into the one already running.
    pub(crate) fn refresh_if_stale(&self) {
        if !self.state.lock().policy.try_begin_recovery() {
            debug!("recovery refresh already running");
            return;
        }
        let _guard = RecoveryGuard(self);

        self.refresh_products(false);
        self.refresh_subscription_state(false);
    }
}
