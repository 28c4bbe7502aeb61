//! Messaging fabric between extension contexts.
//!
//! This crate provides:
//! - Raw pipes (in-memory pairs and NDJSON over byte streams)
//! - `Channel`: named-event bus over a pipe with fire-and-forget `emit`
//! - `Port`: request/response correlation with an optional timeout policy
//! - `WorkerRegistry`: `(role, tab)` lookup of live ports

mod channel;
mod correlator;
mod diagnostics;
mod error;
mod pipe;
mod port;
mod registry;

pub use channel::{Channel, ChannelId, Disposer, HandlerFuture, WeakChannel};
pub use correlator::{Correlator, PendingRequest, SettleResult, Settlement};
pub use diagnostics::Diagnostic;
pub use error::{PortError, PortResult};
pub use pipe::{Pipe, MAX_LINE_BYTES};
pub use port::{Port, RequestPolicy};
pub use port_protocol_types::{
    Envelope, ErrorKind, ErrorPayload, Message, MessageKind, MessageName, Outcome, RequestId,
    Status, WireError,
};
pub use registry::{TabId, WorkerHandle, WorkerRegistry, WorkerRole};
