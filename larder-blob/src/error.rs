use larder_core::LarderError;
use serde_json::json;
use thiserror::Error;

use crate::SlotKind;

/// Result type for asset operations
pub type AssetResult<T> = Result<T, AssetError>;

/// Which physical store an error came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    LocalDisk,
    RemoteImage,
    Registry,
}

impl std::fmt::Display for StoreKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreKind::LocalDisk => f.write_str("local disk"),
            StoreKind::RemoteImage => f.write_str("remote image store"),
            StoreKind::Registry => f.write_str("slot registry"),
        }
    }
}

/// Why an upload was rejected before any side effect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationReason {
    UnsupportedType { mime_type: String, allowed: Vec<String> },
    TooLarge { size_bytes: u64, max_bytes: u64 },
    Empty,
}

impl std::fmt::Display for ValidationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationReason::UnsupportedType { mime_type, allowed } => write!(
                f,
                "file type '{}' is not allowed (expected one of: {})",
                mime_type,
                allowed.join(", ")
            ),
            ValidationReason::TooLarge {
                size_bytes,
                max_bytes,
            } => write!(f, "file is {size_bytes} bytes, the limit is {max_bytes} bytes"),
            ValidationReason::Empty => f.write_str("file is empty"),
        }
    }
}

/// Errors that can occur during asset operations
#[derive(Error, Debug)]
pub enum AssetError {
    #[error("Invalid upload for slot '{slot}': {reason}")]
    Validation {
        slot: SlotKind,
        reason: ValidationReason,
    },

    #[error("Unknown asset slot: {0}")]
    UnknownSlot(String),

    #[error("Invalid file name: {0}")]
    InvalidPath(String),

    #[error("Asset not found: {0}")]
    NotFound(String),

    #[error("{store} failure while {context}: {source}")]
    Storage {
        store: StoreKind,
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Persisted state that cannot be read back. Retrying will not help.
    #[error("{store} holds unreadable data at {context}: {source}")]
    Corrupt {
        store: StoreKind,
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Only ever logged; never returned from a coordinator operation.
    #[error("Cleanup of '{locator}' failed: {source}")]
    Cleanup {
        locator: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl AssetError {
    pub fn validation(slot: SlotKind, reason: ValidationReason) -> Self {
        Self::Validation { slot, reason }
    }

    /// Create a storage error from any error type
    pub fn storage<E>(store: StoreKind, context: impl Into<String>, error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::Storage {
            store,
            context: context.into(),
            source: error.into(),
        }
    }

    pub fn local(context: impl Into<String>, error: std::io::Error) -> Self {
        Self::storage(StoreKind::LocalDisk, context, error)
    }

    pub fn registry<E>(context: impl Into<String>, error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::storage(StoreKind::Registry, context, error)
    }

    pub fn corrupt<E>(store: StoreKind, context: impl Into<String>, error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::Corrupt {
            store,
            context: context.into(),
            source: error.into(),
        }
    }

    pub fn cleanup<E>(locator: impl Into<String>, error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::Cleanup {
            locator: locator.into(),
            source: error.into(),
        }
    }

    /// Whether retrying the same request later can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AssetError::Storage { .. })
    }
}

impl From<AssetError> for LarderError {
    fn from(err: AssetError) -> Self {
        let message = err.to_string();
        match err {
            AssetError::Validation { slot, reason } => {
                let base = match &reason {
                    ValidationReason::UnsupportedType { .. } => {
                        LarderError::unsupported_media_type(message)
                    }
                    ValidationReason::TooLarge { .. } => LarderError::payload_too_large(message),
                    ValidationReason::Empty => LarderError::bad_request(message),
                };
                base.with_errors(json!({ "file": [reason.to_string()] }))
                    .with_data(json!({ "slot": slot.as_str() }))
            }
            AssetError::UnknownSlot(_) | AssetError::InvalidPath(_) => {
                LarderError::bad_request(message)
            }
            AssetError::NotFound(_) => LarderError::not_found(message),
            AssetError::Storage { store, .. } => {
                let base = match store {
                    StoreKind::RemoteImage => LarderError::unavailable(message.clone()),
                    StoreKind::LocalDisk | StoreKind::Registry => {
                        LarderError::general_error(message.clone())
                    }
                };
                base.with_source(anyhow::Error::new(err))
            }
            AssetError::Corrupt { .. } | AssetError::Cleanup { .. } => {
                LarderError::general_error(message.clone()).with_source(anyhow::Error::new(err))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use larder_core::ErrorKind;

    #[test]
    fn validation_maps_to_client_errors() {
        let too_big: LarderError = AssetError::validation(
            SlotKind::Favicon,
            ValidationReason::TooLarge {
                size_bytes: 10,
                max_bytes: 5,
            },
        )
        .into();
        assert_eq!(too_big.kind, ErrorKind::PayloadTooLarge);
        assert_eq!(too_big.data.unwrap()["slot"], "favicon");

        let wrong_type: LarderError = AssetError::validation(
            SlotKind::Cv,
            ValidationReason::UnsupportedType {
                mime_type: "image/png".into(),
                allowed: vec!["application/pdf".into()],
            },
        )
        .into();
        assert_eq!(wrong_type.code(), 415);
    }

    #[test]
    fn storage_maps_to_server_errors() {
        let remote: LarderError = AssetError::storage(
            StoreKind::RemoteImage,
            "uploading profile image",
            std::io::Error::other("timeout"),
        )
        .into();
        assert_eq!(remote.kind, ErrorKind::Unavailable);
        assert!(remote.source.is_some());

        let disk: LarderError =
            AssetError::local("writing logo", std::io::Error::other("disk full")).into();
        assert_eq!(disk.kind, ErrorKind::GeneralError);
    }

    #[test]
    fn only_storage_is_retryable() {
        assert!(AssetError::local("x", std::io::Error::other("y")).is_retryable());
        assert!(!AssetError::UnknownSlot("x".into()).is_retryable());
        assert!(!AssetError::corrupt(StoreKind::Registry, "x", "bad json").is_retryable());
    }
}
