//! Extension background.
//!
//! This crate provides:
//! - Collaborators: REST API client, browser bridge for tabs and crypto,
//!   file keyring
//! - Controllers: secret decryption and filling the active tab
//! - Listeners answering worker requests
//! - `BackgroundHost`: Unix socket accept loop with worker registration

pub mod collaborators;
mod context;
pub mod controllers;
mod error;
mod events;
mod host;

pub use context::{BackgroundContext, UserSession};
pub use error::{BackgroundError, BackgroundResult};
pub use events::listen;
pub use host::BackgroundHost;

#[cfg(test)]
mod tests;
