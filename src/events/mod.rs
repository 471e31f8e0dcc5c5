//! Instance-scoped fan-out of snapshot changes.
//!
//! Every snapshot update publishes:
//! - `SnapshotChanged`, always
//! - `SubscriptionStateChanged`, when the entitlement status differs
//! - `PurchaseStateChanged`, when the flow state or error message differs
//! - `NetworkChanged`, when reachability differs
//!
//! Subscribers get a bounded buffer and are dropped when they fall behind.
//!
//! # Example
//!
//! ```ignore
//! let handle = service.subscribe(SubscriptionConfig::with_filter(
//!     SubscriptionFilter::purchase_state(),
//! ));
//!
//! loop {
//!     match handle.recv() {
//!         Ok(SyncEvent::PurchaseStateChanged { state, error }) => println!("{state} {error:?}"),
//!         Ok(SyncEvent::Dropped { .. }) | Err(_) => break,
//!         Ok(_) => {}
//!     }
//! }
//! ```

mod manager;
mod types;

pub use manager::SubscriptionManager;
pub use types::{
    DropReason, SubscriptionConfig, SubscriptionFilter, SubscriptionHandle, SubscriptionId,
    SyncEvent,
};
