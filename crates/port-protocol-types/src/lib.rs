//! Wire protocol types shared by every extension context.
//!
//! Messages travel as JSON arrays:
//!
//! - request:  `[name, id, ...args]`
//! - event:    `[name, ...args]`
//! - terminal: `[id, "SUCCESS", ...result]` or `[id, "ERROR", error]`
//!
//! This crate only describes and converts those shapes. Delivery lives in
//! `extension-port`.

mod error;
mod message;
mod name;

pub use error::{ErrorKind, ErrorPayload, WireError};
pub use message::{Envelope, Message, Outcome, RequestId, Status};
pub use name::{MessageKind, MessageName};
