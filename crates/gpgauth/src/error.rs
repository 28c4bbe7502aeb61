//! Authentication error types.

use extension_port::{ErrorKind, ErrorPayload, PortError};
use thiserror::Error;

/// Code a remote collaborator uses to report an unknown identity.
pub const NO_ACCOUNT_CODE: &str = "no_account";

/// Message fragment older servers use for the same condition.
const NO_ACCOUNT_LEGACY_FRAGMENT: &str = "no user associated";

/// Error reported by the remote authentication endpoint.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct RemoteError {
    /// Structured error code, when the server sends one.
    pub code: Option<String>,
    pub message: String,
}

impl RemoteError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn is_no_account(&self) -> bool {
        reports_no_account(self.code.as_deref(), &self.message)
    }
}

/// Failure inside the crypto collaborator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct CryptoFailure(pub String);

/// Authentication error type.
#[derive(Error, Debug)]
pub enum AuthError {
    /// Server key missing, malformed or different from the pinned one
    #[error("Server key mismatch: {0}")]
    ServerKeyMismatch(String),

    /// The server could not be asked (network failure, bad envelope, 5xx)
    #[error("API error: {0}")]
    Api(String),

    /// The server has no account for this user key
    #[error("No account: {0}")]
    NoAccount(String),

    /// The server could not prove possession of its key
    #[error("Challenge failed: {0}")]
    ChallengeFailed(String),

    /// Encryption or decryption failed
    #[error("Crypto error: {0}")]
    Crypto(String),

    /// Invalid state transition in the login FSM
    #[error("Invalid auth state transition: {0}")]
    InvalidStateTransition(String),

    /// Messaging failure (closed channel, timeout, lookup miss)
    #[error("Transport error: {0}")]
    Transport(#[from] PortError),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AuthError {
    /// Wire category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            AuthError::ServerKeyMismatch(_) => ErrorKind::AuthServerKeyMismatch,
            AuthError::Api(_) => ErrorKind::ApiError,
            AuthError::NoAccount(_) => ErrorKind::AuthNoAccount,
            AuthError::ChallengeFailed(_) => ErrorKind::AuthChallengeFailed,
            AuthError::Crypto(_) => ErrorKind::CryptoError,
            AuthError::InvalidStateTransition(_) => ErrorKind::ProtocolViolation,
            AuthError::Transport(e) => e.kind(),
            AuthError::Json(_) => ErrorKind::Internal,
        }
    }

    /// Human message without the category prefix.
    pub fn message(&self) -> String {
        match self {
            AuthError::ServerKeyMismatch(m)
            | AuthError::Api(m)
            | AuthError::NoAccount(m)
            | AuthError::ChallengeFailed(m)
            | AuthError::Crypto(m)
            | AuthError::InvalidStateTransition(m) => m.clone(),
            AuthError::Transport(PortError::Remote(payload)) => payload.message.clone(),
            other => other.to_string(),
        }
    }

    pub fn to_payload(&self) -> ErrorPayload {
        match self {
            AuthError::Transport(e) => e.to_payload(),
            other => ErrorPayload::new(other.kind(), other.message()),
        }
    }

    pub fn is_no_account(&self) -> bool {
        matches!(self, AuthError::NoAccount(_))
    }

    /// Classify a failure returned by the remote endpoint.
    pub fn from_remote(error: RemoteError) -> Self {
        if error.is_no_account() {
            AuthError::NoAccount(error.message)
        } else {
            AuthError::ChallengeFailed(error.message)
        }
    }

    /// Classify the `ERROR` answer to an `auth.verify` request.
    pub fn from_verify_failure(error: PortError) -> Self {
        let PortError::Remote(payload) = error else {
            return AuthError::Transport(error);
        };

        if reports_no_account(
            (payload.kind == ErrorKind::AuthNoAccount).then_some(NO_ACCOUNT_CODE),
            &payload.message,
        ) {
            return AuthError::NoAccount(payload.message);
        }

        match payload.kind {
            ErrorKind::AuthServerKeyMismatch => AuthError::ServerKeyMismatch(payload.message),
            ErrorKind::CryptoError => AuthError::Crypto(payload.message),
            ErrorKind::ApiError => AuthError::Api(payload.message),
            ErrorKind::AuthChallengeFailed | ErrorKind::Internal => {
                AuthError::ChallengeFailed(payload.message)
            }
            _ => AuthError::Transport(PortError::Remote(payload)),
        }
    }
}

impl From<AuthError> for ErrorPayload {
    fn from(error: AuthError) -> Self {
        error.to_payload()
    }
}

/// Whether a remote failure means "no account for this key".
///
/// Prefers the structured code; falls back to the legacy message text for
/// servers that only send a human message.
pub fn reports_no_account(code: Option<&str>, message: &str) -> bool {
    match code {
        Some(code) if code == NO_ACCOUNT_CODE => true,
        _ => message
            .to_ascii_lowercase()
            .contains(NO_ACCOUNT_LEGACY_FRAGMENT),
    }
}

/// Result type alias using AuthError.
pub type AuthResult<T> = Result<T, AuthError>;
