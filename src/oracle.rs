//! Interface presented by the platform in-app-purchase store.
//!
//! The store is a trusted oracle: its verification verdict is taken as
//! given, and no cryptographic checking happens on this side.

use crate::error::Result;
use crate::types::SubscriptionPeriod;
use crossbeam_channel::Receiver;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A product definition as the store returns it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawProduct {
    pub id: String,
    pub display_name: String,
    pub display_price: String,
    pub currency_code: String,
    /// Explicit symbol when the store provides one; otherwise it is
    /// extracted from `display_price`.
    pub currency_symbol: Option<String>,
    pub price: Decimal,
    /// None for non-subscription products.
    pub period: Option<SubscriptionPeriod>,
}

/// A store transaction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Per-transaction identifier.
    pub id: String,
    /// Identifier stable across renewals of the same subscription.
    pub original_id: Option<String>,
    pub product_id: String,
}

impl Transaction {
    /// Order identifier to record, preferring the renewal-stable one.
    pub fn order_id(&self) -> &str {
        self.original_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .unwrap_or(&self.id)
    }
}

/// Store verification verdict for a signed payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Verification<T> {
    Verified { value: T },
    Unverified { value: T, reason: String },
}

impl<T> Verification<T> {
    pub fn verified(value: T) -> Self {
        Verification::Verified { value }
    }

    pub fn unverified(value: T, reason: impl Into<String>) -> Self {
        Verification::Unverified {
            value,
            reason: reason.into(),
        }
    }

    /// The payload, only if the store verified it.
    pub fn into_verified(self) -> Option<T> {
        match self {
            Verification::Verified { value } => Some(value),
            Verification::Unverified { .. } => None,
        }
    }

    pub fn as_verified(&self) -> Option<&T> {
        match self {
            Verification::Verified { value } => Some(value),
            Verification::Unverified { .. } => None,
        }
    }
}

/// Outcome of the store purchase sheet.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PurchaseResult {
    Success(Verification<Transaction>),
    /// Awaiting external approval (e.g. parental consent).
    Pending,
    UserCancelled,
}

/// Region/account the store is currently serving.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Storefront {
    pub id: String,
    pub country_code: String,
}

/// The platform store. All calls may block; none are made while
/// service state is locked.
pub trait StoreOracle: Send + Sync {
    /// Look up product definitions for the given identifiers.
    fn lookup_products(&self, ids: &[String]) -> Result<Vec<RawProduct>>;

    /// Enumerate the account's current entitlements.
    fn current_entitlements(&self) -> Result<Vec<Verification<Transaction>>>;

    /// Present the purchase sheet for `product`, tagging it with `account_token`.
    fn purchase(&self, product: &RawProduct, account_token: Uuid) -> Result<PurchaseResult>;

    /// Acknowledge a delivered transaction.
    fn finish(&self, transaction: &Transaction);

    /// Re-sync purchases with the store (restore).
    fn restore_sync(&self) -> Result<()>;

    /// Transactions pushed by the store outside a purchase call.
    /// The channel disconnects when the store stops publishing.
    fn transaction_updates(&self) -> Receiver<Verification<Transaction>>;

    /// Storefront changes (region or account switch).
    fn storefront_updates(&self) -> Receiver<Storefront>;
}
