//! Port error types.

use crate::{TabId, WorkerRole};
use port_protocol_types::{ErrorKind, ErrorPayload, MessageName, WireError};
use std::time::Duration;
use thiserror::Error;

/// Port error type.
#[derive(Error, Debug)]
pub enum PortError {
    /// Pipe closed before a terminal message arrived
    #[error("Transport closed")]
    TransportClosed,

    /// No terminal message within the timeout policy
    #[error("Request {name} timed out after {after:?}")]
    RequestTimeout { name: MessageName, after: Duration },

    /// Registry lookup miss
    #[error("No {role} worker for tab {tab_id}")]
    WorkerNotFound { role: WorkerRole, tab_id: TabId },

    /// Duplicate, unmatched or misdirected message
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    /// Request arguments could not be decoded
    #[error("Invalid parameters: {0}")]
    InvalidParams(#[from] WireError),

    /// The peer answered with `ERROR`
    #[error("Remote error: {0}")]
    Remote(ErrorPayload),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PortError {
    /// Wire category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            PortError::TransportClosed => ErrorKind::TransportClosed,
            PortError::RequestTimeout { .. } => ErrorKind::RequestTimeout,
            PortError::WorkerNotFound { .. } => ErrorKind::WorkerNotFound,
            PortError::ProtocolViolation(_) => ErrorKind::ProtocolViolation,
            PortError::InvalidParams(_) => ErrorKind::InvalidParams,
            PortError::Remote(payload) => payload.kind,
            PortError::Json(_) | PortError::Io(_) => ErrorKind::Internal,
        }
    }

    /// Payload to put in an `ERROR` terminal message.
    ///
    /// A remote failure is passed through untouched so that orchestrations
    /// report the inner error to their own caller.
    pub fn to_payload(&self) -> ErrorPayload {
        match self {
            PortError::Remote(payload) => payload.clone(),
            PortError::WorkerNotFound { role, tab_id } => {
                ErrorPayload::new(self.kind(), self.to_string()).with_data(serde_json::json!({
                    "role": role.as_str(),
                    "tab_id": tab_id,
                }))
            }
            other => ErrorPayload::new(other.kind(), other.to_string()),
        }
    }
}

impl From<PortError> for ErrorPayload {
    fn from(error: PortError) -> Self {
        error.to_payload()
    }
}

/// Result type alias using PortError.
pub type PortResult<T> = Result<T, PortError>;
