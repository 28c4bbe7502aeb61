//! Error types for the background.

use crate::collaborators::ApiError;
use extension_config_and_utils::CoreError;
use extension_port::{ErrorKind, ErrorPayload, PortError, WireError};
use gpgauth::{AuthError, CryptoFailure};
use thiserror::Error;

/// Background error type.
#[derive(Error, Debug)]
pub enum BackgroundError {
    /// Messaging failure, including worker lookup misses
    #[error("{0}")]
    Port(#[from] PortError),

    /// Handshake failure
    #[error("{0}")]
    Auth(#[from] AuthError),

    /// REST API failure
    #[error("API error: {0}")]
    Api(#[from] ApiError),

    /// Encryption or decryption failed
    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoFailure),

    /// No active tab to act on
    #[error("Autofill failed. Could not find the active tab.")]
    NoActiveTab,

    /// Session lacks what the operation needs
    #[error("Session error: {0}")]
    Session(String),

    /// Request arguments could not be decoded
    #[error("Invalid parameters: {0}")]
    InvalidParams(String),

    /// Configuration or path error
    #[error("Configuration error: {0}")]
    Core(#[from] CoreError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl BackgroundError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BackgroundError::Port(e) => e.kind(),
            BackgroundError::Auth(e) => e.kind(),
            BackgroundError::Api(_) => ErrorKind::ApiError,
            BackgroundError::Crypto(_) => ErrorKind::CryptoError,
            BackgroundError::NoActiveTab => ErrorKind::WorkerNotFound,
            BackgroundError::InvalidParams(_) => ErrorKind::InvalidParams,
            BackgroundError::Session(_)
            | BackgroundError::Core(_)
            | BackgroundError::Io(_)
            | BackgroundError::Json(_) => ErrorKind::Internal,
        }
    }

    /// Payload for the `ERROR` answer. Inner payloads pass through as-is.
    pub fn to_payload(&self) -> ErrorPayload {
        match self {
            BackgroundError::Port(e) => e.to_payload(),
            BackgroundError::Auth(e) => e.to_payload(),
            BackgroundError::Api(e) => {
                let payload = ErrorPayload::new(ErrorKind::ApiError, e.message.clone());
                match &e.code {
                    Some(code) => payload.with_data(serde_json::json!({ "code": code })),
                    None => payload,
                }
            }
            other => ErrorPayload::new(other.kind(), other.to_string()),
        }
    }
}

impl From<WireError> for BackgroundError {
    fn from(error: WireError) -> Self {
        BackgroundError::InvalidParams(error.to_string())
    }
}

impl From<BackgroundError> for ErrorPayload {
    fn from(error: BackgroundError) -> Self {
        error.to_payload()
    }
}

/// Result type for background operations.
pub type BackgroundResult<T> = Result<T, BackgroundError>;

#[cfg(test)]
mod tests {
    use super::*;
    use extension_port::WorkerRole;

    #[test]
    fn test_worker_not_found_passes_through() {
        let error = BackgroundError::from(PortError::WorkerNotFound {
            role: WorkerRole::WEB_INTEGRATION,
            tab_id: 12,
        });
        let payload = error.to_payload();
        assert_eq!(payload.kind, ErrorKind::WorkerNotFound);
        assert_eq!(payload.data.unwrap()["tab_id"], 12);
    }

    #[test]
    fn test_remote_payload_is_preserved() {
        let inner = ErrorPayload::new(ErrorKind::CryptoError, "wrong key");
        let error = BackgroundError::from(PortError::Remote(inner.clone()));
        assert_eq!(error.to_payload(), inner);
    }

    #[test]
    fn test_no_active_tab_message() {
        let payload = BackgroundError::NoActiveTab.to_payload();
        assert_eq!(payload.kind, ErrorKind::WorkerNotFound);
        assert_eq!(
            payload.message,
            "Autofill failed. Could not find the active tab."
        );
    }

    #[test]
    fn test_api_code_is_kept() {
        let error = BackgroundError::Api(ApiError::new("Not found").with_code("404"));
        let payload = error.to_payload();
        assert_eq!(payload.kind, ErrorKind::ApiError);
        assert_eq!(payload.data.unwrap()["code"], "404");
    }
}
