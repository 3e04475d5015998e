//! Domain error taxonomy and its HTTP mapping.

use service_core::error::AppError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WalletError {
    #[error("unauthenticated")]
    Unauthenticated,

    #[error("insufficient capability")]
    ForbiddenCapability,

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("active API key limit reached")]
    QuotaExceeded,

    #[error("API key has not expired yet")]
    NotExpired,

    #[error("invalid duration, expected <integer><H|D|M|Y>")]
    InvalidDuration,

    #[error("insufficient funds")]
    InsufficientFunds,

    #[error("cannot transfer to your own wallet")]
    SelfTransfer,

    #[error("invalid signature")]
    InvalidSignature,

    #[error("paid amount does not match recorded amount")]
    AmountMismatch,

    #[error("payment gateway unavailable: {0}")]
    GatewayUnavailable(String),

    #[error("storage conflict, retry the request")]
    StorageConflict,

    #[error("{0}")]
    Validation(String),

    #[error("storage error: {0}")]
    Storage(anyhow::Error),
}

/// Storage-layer failures, independent of the backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A unique index rejected the write. Carries the offending field.
    #[error("duplicate value for {0}")]
    Duplicate(String),

    /// The atomic unit of work could not commit and was rolled back.
    #[error("write conflict: {0}")]
    Conflict(String),

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

impl From<StoreError> for WalletError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(_) => WalletError::StorageConflict,
            other => WalletError::Storage(anyhow::Error::new(other)),
        }
    }
}

impl From<WalletError> for AppError {
    fn from(err: WalletError) -> Self {
        let message = anyhow::anyhow!(err.to_string());
        match err {
            WalletError::Unauthenticated | WalletError::InvalidSignature => {
                AppError::Unauthorized(message)
            }
            WalletError::ForbiddenCapability => AppError::Forbidden(message),
            WalletError::NotFound(_) => AppError::NotFound(message),
            WalletError::StorageConflict => AppError::Conflict(message),
            WalletError::QuotaExceeded
            | WalletError::NotExpired
            | WalletError::InvalidDuration
            | WalletError::InsufficientFunds
            | WalletError::SelfTransfer
            | WalletError::AmountMismatch
            | WalletError::Validation(_) => AppError::BadRequest(message),
            WalletError::GatewayUnavailable(_) => AppError::ServiceUnavailable,
            WalletError::Storage(err) => AppError::DatabaseError(err),
        }
    }
}
