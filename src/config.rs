//! Service configuration.

use crate::error::{Result, SyncError};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Sync service configuration.
///
/// Loaded from the app's constants, never computed. Durations are
/// serialized as integer milliseconds.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Product identifiers to look up and to match entitlements against.
    pub product_ids: Vec<String>,

    /// Identifier that always ranks first on the paywall.
    pub weekly_product_id: Option<String>,

    /// Identifier that always ranks second on the paywall.
    pub yearly_product_id: Option<String>,

    /// Base URL of the identifier upload endpoint.
    pub upload_base_url: String,

    /// Bundle identifier reported with uploads.
    pub bundle_id: String,

    /// Max age of a successful catalog fetch.
    /// Default: 60s
    #[serde(with = "duration_ms")]
    pub products_ttl: Duration,

    /// Min delay after a failed catalog fetch before a non-forced retry.
    /// Default: 10s
    #[serde(with = "duration_ms")]
    pub min_products_retry_interval: Duration,

    /// Max age of an entitlement determination.
    /// Default: 30s
    #[serde(with = "duration_ms")]
    pub entitlements_ttl: Duration,

    /// Debounce window between non-forced entitlement refreshes.
    /// Default: 2s
    #[serde(with = "duration_ms")]
    pub min_entitlements_retry_interval: Duration,

    /// Delay before the first coordinated refresh after `start()`.
    /// Default: 300ms
    #[serde(with = "duration_ms")]
    pub startup_delay: Duration,

    /// Timeout for the identifier upload request.
    /// Default: 15s
    #[serde(with = "duration_ms")]
    pub upload_timeout: Duration,

    /// Buffered events per subscriber before it is dropped.
    /// Default: 1000
    pub event_buffer_size: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            product_ids: Vec::new(),
            weekly_product_id: None,
            yearly_product_id: None,
            upload_base_url: String::new(),
            bundle_id: String::new(),
            products_ttl: Duration::from_secs(60),
            min_products_retry_interval: Duration::from_secs(10),
            entitlements_ttl: Duration::from_secs(30),
            min_entitlements_retry_interval: Duration::from_secs(2),
            startup_delay: Duration::from_millis(300),
            upload_timeout: Duration::from_secs(15),
            event_buffer_size: 1000,
        }
    }
}

impl SyncConfig {
    /// Config with a weekly and a yearly plan, in that order.
    pub fn with_plans(weekly: &str, yearly: &str) -> Self {
        Self {
            product_ids: vec![weekly.to_string(), yearly.to_string()],
            weekly_product_id: Some(weekly.to_string()),
            yearly_product_id: Some(yearly.to_string()),
            ..Default::default()
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: SyncConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Check the invariants the service relies on.
    pub fn validate(&self) -> Result<()> {
        if self.product_ids.is_empty() {
            return Err(SyncError::InvalidConfig("product_ids is empty".into()));
        }

        for id in [&self.weekly_product_id, &self.yearly_product_id]
            .into_iter()
            .flatten()
        {
            if !self.product_ids.contains(id) {
                return Err(SyncError::InvalidConfig(format!(
                    "ranked product {} is not in product_ids",
                    id
                )));
            }
        }

        if !self.upload_base_url.is_empty()
            && !self.upload_base_url.starts_with("https://")
            && !self.upload_base_url.starts_with("http://")
        {
            return Err(SyncError::InvalidConfig(format!(
                "upload_base_url must be http(s): {}",
                self.upload_base_url
            )));
        }

        if self.event_buffer_size == 0 {
            return Err(SyncError::InvalidConfig("event_buffer_size must be > 0".into()));
        }

        Ok(())
    }

    /// Whether `product_id` belongs to the configured set.
    pub fn is_configured_product(&self, product_id: &str) -> bool {
        self.product_ids.iter().any(|id| id == product_id)
    }

    /// URL of the identifier upload endpoint.
    pub fn upload_url(&self) -> String {
        format!("{}/iap/upload", self.upload_base_url.trim_end_matches('/'))
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let ms = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(ms))
    }
}
