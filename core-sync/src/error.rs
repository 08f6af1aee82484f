use bridge_traits::error::BridgeError;
use core_library::LibraryError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    /// The shop did not deliver the resource
    #[error("Failed to fetch {url}: {reason}")]
    RemoteFetchFailed {
        url: String,
        /// HTTP status, absent for transport failures and timeouts
        status: Option<u16>,
        reason: String,
    },

    /// Seed or reference data is missing; redelivery cannot fix it
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Entity not found: {entity_type} with id {id}")]
    NotFound { entity_type: String, id: String },

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Library error: {0}")]
    Library(LibraryError),

    #[error("Bridge error: {0}")]
    Bridge(#[from] BridgeError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SyncError {
    /// Whether redelivering the message may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::RemoteFetchFailed { .. } | SyncError::Bridge(_) | SyncError::Io(_) => true,
            SyncError::Library(LibraryError::InvalidInput { .. }) => false,
            SyncError::Library(_) => true,
            SyncError::Configuration(_) | SyncError::NotFound { .. } | SyncError::InvalidPayload(_) => {
                false
            }
        }
    }

    pub(crate) fn fetch_failed(
        url: &str,
        status: Option<u16>,
        reason: impl Into<String>,
    ) -> Self {
        SyncError::RemoteFetchFailed {
            url: url.to_string(),
            status,
            reason: reason.into(),
        }
    }
}

impl From<LibraryError> for SyncError {
    fn from(err: LibraryError) -> Self {
        match err {
            LibraryError::Configuration(message) => SyncError::Configuration(message),
            LibraryError::NotFound { entity_type, id } => SyncError::NotFound { entity_type, id },
            other => SyncError::Library(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_classification() {
        assert!(SyncError::fetch_failed("http://shop/x.jpg", Some(503), "status").is_retryable());
        assert!(SyncError::from(LibraryError::Conflict {
            entity_type: "ImageMediaBridge".to_string(),
            id: "42".to_string(),
        })
        .is_retryable());

        assert!(!SyncError::InvalidPayload("missing path".to_string()).is_retryable());
        assert!(!SyncError::from(LibraryError::Configuration("no media type".to_string()))
            .is_retryable());
    }

    #[test]
    fn test_library_configuration_is_lifted() {
        let err = SyncError::from(LibraryError::Configuration("missing".to_string()));
        assert!(matches!(err, SyncError::Configuration(ref m) if m == "missing"));
    }
}
