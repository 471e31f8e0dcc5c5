//! Purchase and restore flows.
//!
//! `idle -> purchasing -> {succeeded | pending | cancelled | failed}`
//! `idle -> restoring -> {restored | failed}`

use super::{Inner, SubscriptionService};
use crate::error::SyncError;
use crate::oracle::{PurchaseResult, RawProduct, Verification};
use crate::types::PurchaseState;
use crate::upload::{spawn_upload, UploadPayload};
use std::sync::Arc;
use std::thread;
use tracing::{info, warn};
use uuid::Uuid;

/// Fails the running flow if it unwinds before reaching a terminal state.
struct FlowGuard<'a> {
    inner: &'a Inner,
    finished: bool,
}

impl Drop for FlowGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            let message = SyncError::Oracle("purchase flow aborted".into()).to_string();
            self.inner.finish_flow(PurchaseState::Failed, Some(message));
        }
    }
}

impl Inner {
    fn loaded_product(&self, product_id: &str) -> Option<RawProduct> {
        self.state
            .lock()
            .raw_products
            .iter()
            .find(|p| p.id == product_id)
            .cloned()
    }

    /// Install a terminal flow state and return it.
    fn finish_flow(&self, state: PurchaseState, error: Option<String>) -> PurchaseState {
        info!(%state, error = error.as_deref().unwrap_or(""), "purchase flow finished");
        self.snapshots.update(|s| s.with_purchase(state, error));
        state
    }

    fn purchase_token(&self) -> Uuid {
        match self.tokens.resolve() {
            Ok(token) => token,
            Err(e) => {
                warn!(error = %e, "account token unavailable, using an ephemeral one");
                Uuid::new_v4()
            }
        }
    }

    /// Install `state` unless a flow is already running. On refusal the
    /// running flow's state is returned and nothing is published.
    fn begin_flow(&self, state: PurchaseState) -> std::result::Result<(), PurchaseState> {
        let mut running = None;
        self.snapshots.try_update(|s| {
            if s.purchase_state.is_in_flight() {
                running = Some(s.purchase_state);
                None
            } else {
                Some(s.clone().with_purchase(state, None))
            }
        });

        match running {
            Some(running) => {
                warn!(requested = %state, %running, "flow already running, ignoring request");
                Err(running)
            }
            None => Ok(()),
        }
    }

    /// Run `flow` to its terminal state once `state` has been admitted.
    fn run_flow<F>(&self, state: PurchaseState, flow: F) -> PurchaseState
    where
        F: FnOnce() -> PurchaseState,
    {
        if let Err(running) = self.begin_flow(state) {
            return running;
        }

        let mut guard = FlowGuard {
            inner: self,
            finished: false,
        };
        let outcome = flow();
        guard.finished = true;
        outcome
    }

    pub(crate) fn purchase(&self, product_id: &str) -> PurchaseState {
        self.run_flow(PurchaseState::Purchasing, || self.purchase_admitted(product_id))
    }

    pub(crate) fn restore(&self) -> PurchaseState {
        self.run_flow(PurchaseState::Restoring, || self.restore_admitted())
    }

    fn purchase_admitted(&self, product_id: &str) -> PurchaseState {
        spawn_upload(
            Arc::clone(&self.uploader),
            UploadPayload::collect(&self.config.bundle_id, self.identity.as_ref()),
        );

        let product = match self.loaded_product(product_id) {
            Some(product) => product,
            None => {
                if self.snapshots.current().network_available {
                    self.refresh_products(true);
                }
                match self.loaded_product(product_id) {
                    Some(product) => product,
                    None => {
                        let error = SyncError::ProductNotLoaded(product_id.to_string());
                        return self.finish_flow(PurchaseState::Failed, Some(error.to_string()));
                    }
                }
            }
        };

        let token = self.purchase_token();

        match self.oracle.purchase(&product, token) {
            Ok(PurchaseResult::Success(Verification::Verified { value: transaction })) => {
                let order_id = transaction.order_id().to_string();

                self.refresh_subscription_state(true);
                self.oracle.finish(&transaction);

                if let Err(e) = self.tokens.save_last_order_id(&order_id) {
                    warn!(error = %e, "could not persist order id");
                }

                info!(product = product_id, order = %order_id, "purchase verified");
                self.snapshots.update(|s| {
                    let mut s = s.with_purchase(PurchaseState::Succeeded, None);
                    s.last_order_id = Some(order_id);
                    s
                });
                PurchaseState::Succeeded
            }
            Ok(PurchaseResult::Success(Verification::Unverified { value, reason })) => {
                warn!(transaction = %value.id, %reason, "purchase failed verification");
                self.finish_flow(
                    PurchaseState::Failed,
                    Some(SyncError::FailedVerification.to_string()),
                )
            }
            Ok(PurchaseResult::Pending) => self.finish_flow(PurchaseState::Pending, None),
            Ok(PurchaseResult::UserCancelled) => self.finish_flow(PurchaseState::Cancelled, None),
            Err(e) => self.finish_flow(PurchaseState::Failed, Some(e.to_string())),
        }
    }

    fn restore_admitted(&self) -> PurchaseState {
        // Restore's effect shows up in the entitlement refresh below.
        if let Err(e) = self.oracle.restore_sync() {
            warn!(error = %e, "restore sync failed");
        }

        if self.refresh_subscription_state(true).is_active() {
            self.finish_flow(PurchaseState::Restored, None)
        } else {
            self.finish_flow(
                PurchaseState::Failed,
                Some(SyncError::NoActiveSubscription.to_string()),
            )
        }
    }
}

impl SubscriptionService {
    /// Run the purchase flow for `product_id` and return its terminal state.
    ///
    /// The same terminal state is published once as a purchase-state event.
    /// If a purchase or restore is already running, nothing starts and the
    /// running flow's state (`Purchasing` or `Restoring`) is returned.
    pub fn purchase(&self, product_id: &str) -> PurchaseState {
        self.inner.purchase(product_id)
    }

    /// Run the restore flow and return its terminal state. Refused the same
    /// way as [`purchase`](Self::purchase) while another flow is running.
    pub fn restore(&self) -> PurchaseState {
        self.inner.restore()
    }

    /// Run the purchase flow on a worker thread; `completion` receives
    /// whether it succeeded.
    pub fn purchase_with_callback<F>(&self, product_id: &str, completion: F)
    where
        F: FnOnce(bool) + Send + 'static,
    {
        let service = self.clone();
        let product_id = product_id.to_string();
        Self::run_detached("purchase", move || {
            completion(service.purchase(&product_id).is_success())
        });
    }

    /// Run the restore flow on a worker thread; `completion` receives
    /// whether an active subscription was restored.
    pub fn restore_with_callback<F>(&self, completion: F)
    where
        F: FnOnce(bool) + Send + 'static,
    {
        let service = self.clone();
        Self::run_detached("restore", move || completion(service.restore().is_success()));
    }

    fn run_detached<F>(name: &'static str, body: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if let Err(e) = thread::Builder::new()
            .name(format!("paywall-{}", name))
            .spawn(body)
        {
            warn!(error = %e, flow = name, "could not spawn flow thread");
        }
    }
}
