//! Integration tests for the background.
//!
//! - `harness.rs`     - mock collaborators and in-memory worker connections
//! - `quickaccess.rs` - filling the active tab from a stored secret
//! - `timeout.rs`     - request timeout and late answers across workers
//! - `registry.rs`    - worker registration through `worker.register`
//! - `auth.rs`        - server verification for the login page
//! - `forwarding.rs`  - tags, themes and folders forwarded to the API
//! - `host.rs`        - workers connecting over the Unix socket

mod auth;
