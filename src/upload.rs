//! Best-effort identifier upload before a purchase.
//!
//! Failures are logged and never reach the purchase flow.

use crate::config::SyncConfig;
use crate::error::{Result, SyncError};
use crate::identity::IdentityProvider;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

/// Request body for `POST {base}/iap/upload`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadPayload {
    pub bundleid: String,
    pub distinctid: String,
    pub appsflyer_id: String,
    pub idfa: String,
    pub idfv: String,
}

impl UploadPayload {
    /// Collect identifiers; missing ones are sent as empty strings.
    pub fn collect(bundle_id: &str, identity: &dyn IdentityProvider) -> Self {
        Self {
            bundleid: bundle_id.to_string(),
            distinctid: identity.distinct_id().unwrap_or_default(),
            appsflyer_id: identity.appsflyer_id().unwrap_or_default(),
            idfa: identity.advertising_id().unwrap_or_default(),
            idfv: identity.vendor_id().unwrap_or_default(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    result: i64,
}

/// Sends identifier payloads to the backend.
pub trait IdentifierUploader: Send + Sync {
    /// Upload and return the server's `result` code (0 = success).
    fn upload(&self, payload: &UploadPayload) -> Result<i64>;
}

/// Uploader for hosts without a backend.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopUploader;

impl IdentifierUploader for NoopUploader {
    fn upload(&self, _payload: &UploadPayload) -> Result<i64> {
        Ok(0)
    }
}

/// JSON-over-HTTP uploader.
pub struct HttpIdentifierUploader {
    url: String,
    client: reqwest::blocking::Client,
}

impl HttpIdentifierUploader {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()?;
        Ok(Self {
            url: url.into(),
            client,
        })
    }

    pub fn from_config(config: &SyncConfig) -> Result<Self> {
        if config.upload_base_url.is_empty() {
            return Err(SyncError::InvalidConfig("upload_base_url is empty".into()));
        }
        Self::new(config.upload_url(), config.upload_timeout)
    }
}

impl IdentifierUploader for HttpIdentifierUploader {
    fn upload(&self, payload: &UploadPayload) -> Result<i64> {
        let response = self.client.post(&self.url).json(payload).send()?;

        if !response.status().is_success() {
            return Err(SyncError::Upload(format!(
                "server returned {}",
                response.status().as_u16()
            )));
        }

        let body: UploadResponse = response.json()?;
        Ok(body.result)
    }
}

/// Run `uploader` on a detached thread. The outcome is only logged.
pub fn spawn_upload(uploader: Arc<dyn IdentifierUploader>, payload: UploadPayload) {
    let spawned = thread::Builder::new()
        .name("paywall-upload".into())
        .spawn(move || match uploader.upload(&payload) {
            Ok(0) => debug!("identifier upload succeeded"),
            Ok(code) => warn!(code, "identifier upload rejected"),
            Err(e) => warn!(error = %e, "identifier upload failed"),
        });

    if let Err(e) = spawned {
        warn!(error = %e, "could not spawn identifier upload");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{NoopIdentityProvider, StaticIdentityProvider};
    use crossbeam_channel::bounded;

    struct RecordingUploader {
        sent: crossbeam_channel::Sender<UploadPayload>,
    }

    impl IdentifierUploader for RecordingUploader {
        fn upload(&self, payload: &UploadPayload) -> Result<i64> {
            let _ = self.sent.send(payload.clone());
            Err(SyncError::Upload("connection refused".into()))
        }
    }

    #[test]
    fn test_payload_wire_format() {
        let identity = StaticIdentityProvider {
            distinct_id: Some("d".into()),
            appsflyer_id: Some("af".into()),
            advertising_id: None,
            vendor_id: Some("v".into()),
        };
        let payload = UploadPayload::collect("com.demo.app", &identity);
        let json = serde_json::to_value(&payload).unwrap();

        assert_eq!(
            json,
            serde_json::json!({
                "bundleid": "com.demo.app",
                "distinctid": "d",
                "appsflyer_id": "af",
                "idfa": "",
                "idfv": "v",
            })
        );
    }

    #[test]
    fn test_spawn_upload_swallows_errors() {
        let (tx, rx) = bounded(1);
        let uploader = Arc::new(RecordingUploader { sent: tx });
        let payload = UploadPayload::collect("com.demo.app", &NoopIdentityProvider);

        spawn_upload(uploader, payload.clone());

        let sent = rx.recv_timeout(Duration::from_secs(1)).unwrap();
        assert_eq!(sent, payload);
    }

    #[test]
    fn test_from_config_requires_url() {
        let config = SyncConfig::with_plans("w", "y");
        assert!(matches!(
            HttpIdentifierUploader::from_config(&config),
            Err(SyncError::InvalidConfig(_))
        ));
    }
}
