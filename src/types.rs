//! Core types for the subscription state snapshot.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Network availability as last reported by the path monitor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Availability {
    /// No path update has been observed yet.
    #[default]
    Unknown,
    Available,
    Unavailable,
}

impl Availability {
    pub fn from_network(available: bool) -> Self {
        if available {
            Availability::Available
        } else {
            Availability::Unavailable
        }
    }
}

/// Lifecycle of the product catalog.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProductsState {
    #[default]
    Idle,
    Loading,
    Ready,
    Failed,
}

/// Entitlement status for the configured product set.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionState {
    #[default]
    Unknown,
    Inactive,
    Active,
}

impl SubscriptionState {
    pub fn is_active(self) -> bool {
        self == SubscriptionState::Active
    }
}

/// State of the purchase or restore flow.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PurchaseState {
    #[default]
    Idle,
    Purchasing,
    Pending,
    Cancelled,
    Succeeded,
    Failed,
    Restoring,
    Restored,
}

impl PurchaseState {
    /// Whether this state ends a purchase or restore flow.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            PurchaseState::Pending
                | PurchaseState::Cancelled
                | PurchaseState::Succeeded
                | PurchaseState::Failed
                | PurchaseState::Restored
        )
    }

    /// Whether a purchase or restore is currently running.
    pub fn is_in_flight(self) -> bool {
        matches!(self, PurchaseState::Purchasing | PurchaseState::Restoring)
    }

    /// Terminal states that count as a successful outcome for callers.
    pub fn is_success(self) -> bool {
        matches!(self, PurchaseState::Succeeded | PurchaseState::Restored)
    }
}

impl fmt::Display for PurchaseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PurchaseState::Idle => "idle",
            PurchaseState::Purchasing => "purchasing",
            PurchaseState::Pending => "pending",
            PurchaseState::Cancelled => "cancelled",
            PurchaseState::Succeeded => "succeeded",
            PurchaseState::Failed => "failed",
            PurchaseState::Restoring => "restoring",
            PurchaseState::Restored => "restored",
        };
        f.write_str(name)
    }
}

/// Unit of a subscription billing period.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PeriodUnit {
    Day,
    Week,
    Month,
    Year,
    #[default]
    Unknown,
}

impl PeriodUnit {
    /// Paywall rank used when the product is neither the weekly nor the yearly plan.
    pub fn rank(self) -> u32 {
        match self {
            PeriodUnit::Week => 0,
            PeriodUnit::Year => 1,
            PeriodUnit::Month => 2,
            PeriodUnit::Day => 3,
            PeriodUnit::Unknown => 99,
        }
    }
}

/// Billing period of a subscription product, e.g. 1 week or 3 months.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionPeriod {
    pub unit: PeriodUnit,
    pub value: u32,
}

impl SubscriptionPeriod {
    pub fn new(unit: PeriodUnit, value: u32) -> Self {
        Self { unit, value }
    }

    pub fn unknown() -> Self {
        Self {
            unit: PeriodUnit::Unknown,
            value: 0,
        }
    }
}

impl Default for SubscriptionPeriod {
    fn default() -> Self {
        Self::unknown()
    }
}

/// A product as presented to the paywall. Rebuilt wholesale on every
/// successful catalog fetch.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProductModel {
    pub product_id: String,
    pub display_name: String,
    /// Localized price string as the store formats it, e.g. "$9.99".
    pub display_price: String,
    /// ISO 4217 code, e.g. "USD".
    pub currency_code: String,
    pub currency_symbol: String,
    pub price: Decimal,
    pub period: SubscriptionPeriod,
}

impl ProductModel {
    pub fn is_weekly(&self) -> bool {
        self.period.unit == PeriodUnit::Week
    }

    pub fn is_yearly(&self) -> bool {
        self.period.unit == PeriodUnit::Year
    }
}

/// The single composite view of network, catalog, entitlement and
/// purchase-flow status. Replaced wholesale on every update.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub network_available: bool,
    pub availability: Availability,
    pub products_state: ProductsState,
    /// Paywall display order.
    pub products: Vec<ProductModel>,
    pub subscription_state: SubscriptionState,
    pub purchase_state: PurchaseState,
    pub last_error_message: Option<String>,
    pub last_order_id: Option<String>,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self {
            network_available: true,
            availability: Availability::Unknown,
            products_state: ProductsState::Idle,
            products: Vec::new(),
            subscription_state: SubscriptionState::Unknown,
            purchase_state: PurchaseState::Idle,
            last_error_message: None,
            last_order_id: None,
        }
    }
}

impl Snapshot {
    /// Find a loaded product by identifier.
    pub fn product(&self, product_id: &str) -> Option<&ProductModel> {
        self.products.iter().find(|p| p.product_id == product_id)
    }

    /// Copy of this snapshot with network fields set together.
    pub fn with_network(mut self, available: bool) -> Self {
        self.network_available = available;
        self.availability = Availability::from_network(available);
        self
    }

    /// Copy of this snapshot with a new purchase state and error message.
    pub fn with_purchase(mut self, state: PurchaseState, error: Option<String>) -> Self {
        self.purchase_state = state;
        self.last_error_message = error;
        self
    }

    /// Whether the purchase-state notification should fire between `self` and `next`.
    pub fn purchase_differs(&self, next: &Snapshot) -> bool {
        self.purchase_state != next.purchase_state
            || self.last_error_message != next.last_error_message
    }
}
