//! GPGAuth login state machine using rust-fsm.
//!
//! ```text
//! ┌──────────────────┐ ServerKeyAccepted ┌──────────────────┐ ChallengeSent ┌───────────┐
//! │       Init       │ ────────────────► │ ServerKeyChecked │ ────────────► │ TokenSent │
//! └────────┬─────────┘                   └────────┬─────────┘               └─────┬─────┘
//!          │ Fail                                 │ Fail                          │ ProofAccepted
//!          ▼                                      ▼                               ▼
//!     ┌────────┐ ◄──────────────────────────────────────────── Fail ──────  ┌──────────┐
//!     │ Failed │                                                            │ Verified │
//!     └────────┘                                                            └──────────┘
//! ```
//!
//! Verified and Failed accept no input: one attempt per session.

use rust_fsm::*;
use serde::{Deserialize, Serialize};

state_machine! {
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub gpgauth_machine(Init)

    Init => {
        ServerKeyAccepted => ServerKeyChecked,
        Fail => Failed
    },
    ServerKeyChecked => {
        ChallengeSent => TokenSent,
        Fail => Failed
    },
    TokenSent => {
        ProofAccepted => Verified,
        Fail => Failed
    }
}

pub use gpgauth_machine::Input as AuthMachineInput;
pub use gpgauth_machine::State as AuthMachineState;
pub use gpgauth_machine::StateMachine as AuthMachine;

/// Stage of a login attempt, as reported to observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthStage {
    Init,
    ServerKeyChecked,
    TokenSent,
    Verified,
    Failed,
}

impl AuthStage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, AuthStage::Verified | AuthStage::Failed)
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, AuthStage::Verified)
    }
}

impl From<&AuthMachineState> for AuthStage {
    fn from(state: &AuthMachineState) -> Self {
        match state {
            AuthMachineState::Init => AuthStage::Init,
            AuthMachineState::ServerKeyChecked => AuthStage::ServerKeyChecked,
            AuthMachineState::TokenSent => AuthStage::TokenSent,
            AuthMachineState::Verified => AuthStage::Verified,
            AuthMachineState::Failed => AuthStage::Failed,
        }
    }
}
