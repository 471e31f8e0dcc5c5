//! # Paywall Sync
//!
//! Client-side subscription state for apps selling through a platform
//! in-app-purchase store.
//!
//! ## Core Concepts
//!
//! - **Snapshot**: one immutable view of network, catalog, entitlement and
//!   purchase-flow status, replaced wholesale on every change
//! - **Refresh policy**: TTLs, failure backoff, debouncing and coalescing of
//!   concurrent catalog refreshes
//! - **Flows**: purchase and restore, each ending in exactly one terminal state
//! - **Events**: per-instance fan-out of snapshot, entitlement, purchase and
//!   network changes
//!
//! ## Example
//!
//! ```ignore
//! use paywall_sync::{SubscriptionService, SyncConfig, SubscriptionConfig};
//!
//! let config = SyncConfig::with_plans("com.demo.pro.weekly", "com.demo.pro.yearly");
//! let service = SubscriptionService::builder(config, Arc::new(platform_store))
//!     .path_monitor(Arc::new(path_monitor))
//!     .build()?;
//!
//! let events = service.subscribe(SubscriptionConfig::default());
//! service.start()?;
//!
//! if !service.is_pro_active() {
//!     let outcome = service.purchase("com.demo.pro.weekly");
//! }
//! ```

pub mod catalog;
pub mod config;
pub mod error;
pub mod events;
pub mod identity;
pub mod network;
pub mod oracle;
pub mod refresh;
pub mod service;
pub mod store;
pub mod types;
pub mod upload;

// Re-exports
pub use config::SyncConfig;
pub use error::{Result, SyncError};
pub use events::{
    DropReason, SubscriptionConfig, SubscriptionFilter, SubscriptionHandle, SubscriptionId,
    SubscriptionManager, SyncEvent,
};
pub use identity::{
    derive_account_token, AccountTokenResolver, FileKeyValueStore, IdentityProvider, KeyValueStore,
    MemoryKeyValueStore, NoopIdentityProvider, StaticIdentityProvider,
};
pub use network::{PathMonitor, ReachabilityTracker, Transition};
pub use oracle::{PurchaseResult, RawProduct, StoreOracle, Storefront, Transaction, Verification};
pub use refresh::{EntitlementsGate, ProductsGate, RefreshPolicy};
pub use service::{SubscriptionService, SubscriptionServiceBuilder};
pub use store::SnapshotStore;
pub use types::*;
pub use upload::{HttpIdentifierUploader, IdentifierUploader, NoopUploader, UploadPayload};
