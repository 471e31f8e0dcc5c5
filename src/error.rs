//! Error types for the subscription sync service.

use thiserror::Error;

/// Main error type for sync operations.
///
/// Oracle failures are normally converted into snapshot state at the
/// component boundary; the variants carrying user-facing text display
/// exactly the message that ends up in `Snapshot::last_error_message`.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("{0}")]
    Oracle(String),

    #[error("Product not loaded")]
    ProductNotLoaded(String),

    #[error("No products returned")]
    NoProductsReturned,

    #[error("No active subscription found")]
    NoActiveSubscription,

    #[error("Transaction failed verification")]
    FailedVerification,

    #[error("Upload error: {0}")]
    Upload(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Key-value store is locked by another process")]
    Locked,

    #[error("Service already started")]
    AlreadyStarted,
}

impl From<serde_json::Error> for SyncError {
    fn from(e: serde_json::Error) -> Self {
        SyncError::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(e: reqwest::Error) -> Self {
        SyncError::Upload(e.to_string())
    }
}

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;
