//! Error payloads carried by `ERROR` terminal messages.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Failure categories understood by every context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The pipe closed before a terminal message arrived.
    TransportClosed,
    /// No terminal message within the configured bound.
    RequestTimeout,
    /// No live worker for `(role, tab_id)`.
    WorkerNotFound,
    /// Malformed, duplicate or unmatched message.
    ProtocolViolation,
    /// Nobody listens for the requested name on the receiving side.
    NoHandler,
    /// Request arguments could not be decoded.
    InvalidParams,
    /// Server key is missing, malformed, or not the pinned one.
    AuthServerKeyMismatch,
    /// The remote has no account for this identity.
    AuthNoAccount,
    /// The server could not prove possession of its private key.
    AuthChallengeFailed,
    /// Decrypt/encrypt failure.
    CryptoError,
    /// REST API failure.
    ApiError,
    /// Anything else, including kinds this build does not know.
    #[serde(other)]
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::TransportClosed => "transport_closed",
            ErrorKind::RequestTimeout => "request_timeout",
            ErrorKind::WorkerNotFound => "worker_not_found",
            ErrorKind::ProtocolViolation => "protocol_violation",
            ErrorKind::NoHandler => "no_handler",
            ErrorKind::InvalidParams => "invalid_params",
            ErrorKind::AuthServerKeyMismatch => "auth_server_key_mismatch",
            ErrorKind::AuthNoAccount => "auth_no_account",
            ErrorKind::AuthChallengeFailed => "auth_challenge_failed",
            ErrorKind::CryptoError => "crypto_error",
            ErrorKind::ApiError => "api_error",
            ErrorKind::Internal => "internal",
        }
    }
}

/// Error information in an `ERROR` terminal message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorPayload {
    /// Error category.
    pub kind: ErrorKind,
    /// Human readable message.
    pub message: String,
    /// Additional error data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ErrorPayload {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Decode whatever a peer put in the error slot.
    ///
    /// Older content scripts send bare strings or `{ "message": .. }`
    /// objects; both are accepted and classified as `Internal`.
    pub fn from_wire_value(value: Option<Value>) -> Self {
        let Some(value) = value else {
            return Self::new(ErrorKind::Internal, "error without payload");
        };

        if let Ok(payload) = serde_json::from_value::<ErrorPayload>(value.clone()) {
            return payload;
        }

        match value {
            Value::String(message) => Self::new(ErrorKind::Internal, message),
            Value::Object(ref map) => {
                let message = map
                    .get("message")
                    .and_then(|m| m.as_str())
                    .unwrap_or("unknown error")
                    .to_string();
                Self::new(ErrorKind::Internal, message).with_data(value)
            }
            other => Self::new(ErrorKind::Internal, other.to_string()),
        }
    }
}

impl std::fmt::Display for ErrorPayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind.as_str(), self.message)
    }
}

/// Failure to read a wire array.
#[derive(Error, Debug)]
pub enum WireError {
    /// Not a non-empty JSON array with a string head.
    #[error("Malformed message: {0}")]
    Malformed(String),

    /// Head is neither a known name nor a request id with a status.
    #[error("Unknown message: {0}")]
    UnknownMessage(String),

    /// Positional argument missing.
    #[error("Missing argument at position {0}")]
    MissingArgument(usize),

    /// Positional argument has the wrong shape.
    #[error("Invalid argument at position {index}: {source}")]
    InvalidArgument {
        index: usize,
        #[source]
        source: serde_json::Error,
    },
}

impl From<WireError> for ErrorPayload {
    fn from(error: WireError) -> Self {
        ErrorPayload::new(ErrorKind::InvalidParams, error.to_string())
    }
}
