//! GPGAuth-style login handshake.
//!
//! This crate provides:
//! - `AuthMachine`: rust-fsm transition table for one login attempt
//! - `AuthSession`: per-attempt state driven by that machine
//! - `LoginFlow`: login page side, talks to the background over a port
//! - `ServerVerifier`: background side, challenges the server with a token
//!   encrypted for the pinned server key

pub mod auth_fsm;
mod error;
mod key;
mod login;
mod session;
mod verifier;

pub use auth_fsm::{AuthMachine, AuthMachineInput, AuthMachineState, AuthStage};
pub use error::{
    reports_no_account, AuthError, AuthResult, CryptoFailure, RemoteError, NO_ACCOUNT_CODE,
};
pub use key::KeyInfo;
pub use login::{LoginFlow, LoginObserver, LoginProgress, VerifiedLogin};
pub use session::{AuthFailure, AuthSession};
pub use verifier::{
    generate_token, is_valid_token, AuthApi, CryptoProvider, Keyring, ServerVerifier,
    VerifyOutcome,
};
