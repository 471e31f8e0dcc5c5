//! Refresh-policy bookkeeping: TTL, failure backoff, debounce and
//! in-flight tracking for catalog and entitlement refreshes.

use crate::config::SyncConfig;
use crate::types::{ProductsState, SubscriptionState};
use std::time::{Duration, Instant};

/// Decision for a catalog refresh request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProductsGate {
    /// Another refresh is running; wait for it instead of calling the store.
    Coalesce,
    /// Last attempt failed too recently.
    Backoff,
    /// Last success is still within TTL.
    Fresh,
    Proceed,
}

/// Decision for an entitlement refresh request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntitlementsGate {
    /// Last attempt is within the debounce window.
    Debounced,
    /// Last determination is still within TTL.
    Fresh,
    Proceed,
}

/// Timestamps and in-flight flags. Owned by the service and only touched
/// with its state lock held.
#[derive(Debug, Default)]
pub struct RefreshPolicy {
    pub last_products_success_at: Option<Instant>,
    pub last_products_attempt_at: Option<Instant>,
    pub last_entitlements_refresh_at: Option<Instant>,
    pub last_entitlements_attempt_at: Option<Instant>,

    pub refreshing_products: bool,
    /// Bumped each time a catalog refresh completes; waiters block until it moves.
    pub products_generation: u64,

    pub refreshing_after_network: bool,
}

fn within(since: Option<Instant>, now: Instant, window: Duration) -> bool {
    match since {
        Some(at) => now.saturating_duration_since(at) < window,
        None => false,
    }
}

impl RefreshPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Gate a catalog refresh. Checks run in order: in-flight, backoff, TTL.
    pub fn products_gate(
        &self,
        now: Instant,
        force: bool,
        state: ProductsState,
        has_products: bool,
        config: &SyncConfig,
    ) -> ProductsGate {
        if self.refreshing_products {
            return ProductsGate::Coalesce;
        }
        if force {
            return ProductsGate::Proceed;
        }

        if state == ProductsState::Failed
            && within(self.last_products_attempt_at, now, config.min_products_retry_interval)
        {
            return ProductsGate::Backoff;
        }

        let usable = has_products && !matches!(state, ProductsState::Idle | ProductsState::Failed);
        if usable && within(self.last_products_success_at, now, config.products_ttl) {
            return ProductsGate::Fresh;
        }

        ProductsGate::Proceed
    }

    /// Mark a catalog refresh as started.
    pub fn begin_products(&mut self, now: Instant) {
        self.refreshing_products = true;
        self.last_products_attempt_at = Some(now);
    }

    /// Mark the in-flight catalog refresh as finished.
    pub fn finish_products(&mut self, succeeded_at: Option<Instant>) {
        if succeeded_at.is_some() {
            self.last_products_success_at = succeeded_at;
        }
        self.refreshing_products = false;
        self.products_generation = self.products_generation.wrapping_add(1);
    }

    /// Gate an entitlement refresh.
    pub fn entitlements_gate(
        &self,
        now: Instant,
        force: bool,
        state: SubscriptionState,
        config: &SyncConfig,
    ) -> EntitlementsGate {
        if force {
            return EntitlementsGate::Proceed;
        }

        if within(
            self.last_entitlements_attempt_at,
            now,
            config.min_entitlements_retry_interval,
        ) {
            return EntitlementsGate::Debounced;
        }

        if state != SubscriptionState::Unknown
            && within(self.last_entitlements_refresh_at, now, config.entitlements_ttl)
        {
            return EntitlementsGate::Fresh;
        }

        EntitlementsGate::Proceed
    }

    /// Whether the network-recovery refresh may start. Marks it running if so.
    pub fn try_begin_recovery(&mut self) -> bool {
        if self.refreshing_after_network {
            return false;
        }
        self.refreshing_after_network = true;
        true
    }

    pub fn finish_recovery(&mut self) {
        self.refreshing_after_network = false;
    }
}
