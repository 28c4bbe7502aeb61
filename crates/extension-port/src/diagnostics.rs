//! Protocol diagnostics published by a channel.

use port_protocol_types::{MessageName, RequestId};

/// Something a channel noticed and dropped.
///
/// None of these change the state of a pending request; they are only
/// published so that callers and tests can observe them.
#[derive(Debug, Clone, PartialEq)]
pub enum Diagnostic {
    /// Second terminal message for an already settled id.
    DuplicateTerminal { id: RequestId },
    /// Terminal message for an id this channel never issued.
    UnknownTerminal { id: RequestId },
    /// Terminal message for an id that already timed out or was closed.
    LateTerminal { id: RequestId },
    /// Inbound value that is not a valid message.
    MalformedMessage { reason: String },
    /// Request with no registered handler, answered with `no_handler`.
    UnhandledRequest { name: MessageName, id: RequestId },
    /// Emit on a closed pipe.
    DroppedEmit { message: String },
}
