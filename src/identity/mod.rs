//! Device, advertising and analytics identifiers, plus the stable
//! purchase token derived from them.
//!
//! Attribution and analytics SDKs are optional on the host app. The
//! capability is expressed as the `IdentityProvider` trait and selected at
//! composition time; `NoopIdentityProvider` stands in when no SDK is linked.

mod kv;
mod token;

pub use kv::{FileKeyValueStore, KeyValueStore, MemoryKeyValueStore};
pub use token::{
    derive_account_token, AccountTokenResolver, ACCOUNT_TOKEN_KEY, LAST_ORDER_ID_KEY,
};

/// Opaque identifier source.
pub trait IdentityProvider: Send + Sync {
    /// Analytics distinct id.
    fn distinct_id(&self) -> Option<String>;

    /// Attribution SDK id.
    fn appsflyer_id(&self) -> Option<String>;

    /// Advertising identifier (IDFA). None unless tracking is authorized.
    fn advertising_id(&self) -> Option<String>;

    /// Identifier for vendor (IDFV).
    fn vendor_id(&self) -> Option<String>;
}

/// Provider used when no analytics or attribution SDK is present.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopIdentityProvider;

impl IdentityProvider for NoopIdentityProvider {
    fn distinct_id(&self) -> Option<String> {
        None
    }

    fn appsflyer_id(&self) -> Option<String> {
        None
    }

    fn advertising_id(&self) -> Option<String> {
        None
    }

    fn vendor_id(&self) -> Option<String> {
        None
    }
}

/// Provider with fixed values, for hosts that resolve ids up front.
#[derive(Clone, Debug, Default)]
pub struct StaticIdentityProvider {
    pub distinct_id: Option<String>,
    pub appsflyer_id: Option<String>,
    pub advertising_id: Option<String>,
    pub vendor_id: Option<String>,
}

impl IdentityProvider for StaticIdentityProvider {
    fn distinct_id(&self) -> Option<String> {
        self.distinct_id.clone()
    }

    fn appsflyer_id(&self) -> Option<String> {
        self.appsflyer_id.clone()
    }

    fn advertising_id(&self) -> Option<String> {
        self.advertising_id.clone()
    }

    fn vendor_id(&self) -> Option<String> {
        self.vendor_id.clone()
    }
}
