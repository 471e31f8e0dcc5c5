//! Stable per-account purchase token.

use super::kv::KeyValueStore;
use super::IdentityProvider;
use crate::error::Result;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Key under which the random fallback token is persisted.
pub const ACCOUNT_TOKEN_KEY: &str = "account_token";

/// Key under which the last order identifier is persisted.
pub const LAST_ORDER_ID_KEY: &str = "last_order_id";

/// Domain separator for token derivation.
const TOKEN_NAMESPACE: &str = "purchase-token:";

/// Derive a token from an external distinct id.
///
/// SHA-256 of the namespaced id, truncated to 16 bytes, with RFC 4122
/// name-based version and variant bits set.
pub fn derive_account_token(distinct_id: &str) -> Uuid {
    let mut hasher = Sha256::new();
    hasher.update(TOKEN_NAMESPACE.as_bytes());
    hasher.update(distinct_id.as_bytes());
    let digest = hasher.finalize();

    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest[..16]);
    bytes[6] = (bytes[6] & 0x0f) | 0x50;
    bytes[8] = (bytes[8] & 0x3f) | 0x80;
    Uuid::from_bytes(bytes)
}

/// Resolves the account token attached to purchases.
pub struct AccountTokenResolver {
    identity: Arc<dyn IdentityProvider>,
    storage: Arc<dyn KeyValueStore>,
}

impl AccountTokenResolver {
    pub fn new(identity: Arc<dyn IdentityProvider>, storage: Arc<dyn KeyValueStore>) -> Self {
        Self { identity, storage }
    }

    /// Derived token when a distinct id is available, otherwise the
    /// persisted random token (created on first use).
    pub fn resolve(&self) -> Result<Uuid> {
        if let Some(distinct_id) = self.identity.distinct_id().filter(|id| !id.is_empty()) {
            return Ok(derive_account_token(&distinct_id));
        }
        self.persisted_token()
    }

    fn persisted_token(&self) -> Result<Uuid> {
        if let Some(stored) = self.storage.get(ACCOUNT_TOKEN_KEY)? {
            match Uuid::parse_str(&stored) {
                Ok(token) => return Ok(token),
                Err(e) => warn!(error = %e, "discarding malformed persisted account token"),
            }
        }

        let token = Uuid::new_v4();
        self.storage.set(ACCOUNT_TOKEN_KEY, &token.to_string())?;
        debug!(%token, "generated account token");
        Ok(token)
    }

    /// Persist the order id of the latest successful purchase.
    pub fn save_last_order_id(&self, order_id: &str) -> Result<()> {
        self.storage.set(LAST_ORDER_ID_KEY, order_id)
    }

    pub fn last_order_id(&self) -> Result<Option<String>> {
        self.storage.get(LAST_ORDER_ID_KEY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{MemoryKeyValueStore, NoopIdentityProvider, StaticIdentityProvider};

    #[test]
    fn test_derivation_is_stable() {
        let a = derive_account_token("user-42");
        let b = derive_account_token("user-42");
        let c = derive_account_token("user-43");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.get_version_num(), 5);
        assert_eq!(a.get_variant(), uuid::Variant::RFC4122);
    }

    #[test]
    fn test_resolve_prefers_distinct_id() {
        let storage = Arc::new(MemoryKeyValueStore::new());
        let identity = Arc::new(StaticIdentityProvider {
            distinct_id: Some("user-42".into()),
            ..Default::default()
        });
        let resolver = AccountTokenResolver::new(identity, storage.clone());

        assert_eq!(resolver.resolve().unwrap(), derive_account_token("user-42"));
        assert_eq!(storage.get(ACCOUNT_TOKEN_KEY).unwrap(), None);
    }

    #[test]
    fn test_fallback_token_is_persisted() {
        let storage = Arc::new(MemoryKeyValueStore::new());
        let resolver = AccountTokenResolver::new(Arc::new(NoopIdentityProvider), storage.clone());

        let first = resolver.resolve().unwrap();
        let second = resolver.resolve().unwrap();
        assert_eq!(first, second);
        assert_eq!(
            storage.get(ACCOUNT_TOKEN_KEY).unwrap(),
            Some(first.to_string())
        );
    }

    #[test]
    fn test_malformed_token_is_replaced() {
        let storage = Arc::new(MemoryKeyValueStore::new());
        storage.set(ACCOUNT_TOKEN_KEY, "garbage").unwrap();
        let resolver = AccountTokenResolver::new(Arc::new(NoopIdentityProvider), storage.clone());

        let token = resolver.resolve().unwrap();
        assert_eq!(storage.get(ACCOUNT_TOKEN_KEY).unwrap(), Some(token.to_string()));
    }

    #[test]
    fn test_empty_distinct_id_falls_back() {
        let storage = Arc::new(MemoryKeyValueStore::new());
        let identity = Arc::new(StaticIdentityProvider {
            distinct_id: Some(String::new()),
            ..Default::default()
        });
        let resolver = AccountTokenResolver::new(identity, storage.clone());

        let token = resolver.resolve().unwrap();
        assert_eq!(token.get_version_num(), 4);
    }
}
