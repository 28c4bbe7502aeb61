//! Per-attempt login session.

use crate::auth_fsm::{AuthMachine, AuthMachineInput, AuthStage};
use crate::{AuthError, AuthResult, KeyInfo};
use extension_port::ErrorKind;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// Why an attempt ended in `Failed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthFailure {
    pub kind: ErrorKind,
    pub message: String,
}

impl AuthFailure {
    pub fn is_no_account(&self) -> bool {
        self.kind == ErrorKind::AuthNoAccount
    }
}

impl From<&AuthError> for AuthFailure {
    fn from(error: &AuthError) -> Self {
        Self {
            kind: error.kind(),
            message: error.message(),
        }
    }
}

/// State of one login attempt. Never persisted.
pub struct AuthSession {
    machine: AuthMachine,
    started: bool,
    server_key_id: Option<String>,
    client_token: Option<String>,
    server_nonce: Option<String>,
    failure: Option<AuthFailure>,
}

impl Default for AuthSession {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthSession {
    pub fn new() -> Self {
        Self {
            machine: AuthMachine::new(),
            started: false,
            server_key_id: None,
            client_token: None,
            server_nonce: None,
            failure: None,
        }
    }

    pub fn stage(&self) -> AuthStage {
        AuthStage::from(self.machine.state())
    }

    pub fn server_key_id(&self) -> Option<&str> {
        self.server_key_id.as_deref()
    }

    pub fn client_token(&self) -> Option<&str> {
        self.client_token.as_deref()
    }

    pub fn server_nonce(&self) -> Option<&str> {
        self.server_nonce.as_deref()
    }

    pub fn failure(&self) -> Option<&AuthFailure> {
        self.failure.as_ref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.stage().is_authenticated()
    }

    /// Claim the session for an attempt. A session runs at most one.
    pub fn begin(&mut self) -> AuthResult<()> {
        if self.started {
            return Err(AuthError::InvalidStateTransition(format!(
                "login attempt already started (stage {:?})",
                self.stage()
            )));
        }
        self.started = true;
        Ok(())
    }

    pub fn server_key_checked(&mut self, key: &KeyInfo) -> AuthResult<AuthStage> {
        let stage = self.transition(&AuthMachineInput::ServerKeyAccepted)?;
        self.server_key_id = Some(key.key_id.clone());
        Ok(stage)
    }

    pub fn challenge_sent(&mut self) -> AuthResult<AuthStage> {
        self.transition(&AuthMachineInput::ChallengeSent)
    }

    pub fn verified(
        &mut self,
        client_token: Option<String>,
        server_nonce: Option<String>,
    ) -> AuthResult<AuthStage> {
        let stage = self.transition(&AuthMachineInput::ProofAccepted)?;
        self.client_token = client_token;
        self.server_nonce = server_nonce;
        Ok(stage)
    }

    pub fn fail(&mut self, failure: AuthFailure) -> AuthResult<AuthStage> {
        let stage = self.transition(&AuthMachineInput::Fail)?;
        self.failure = Some(failure);
        Ok(stage)
    }

    fn transition(&mut self, input: &AuthMachineInput) -> AuthResult<AuthStage> {
        let old_stage = self.stage();
        self.machine.consume(input).map_err(|_| {
            AuthError::InvalidStateTransition(format!(
                "Cannot apply {:?} in stage {:?}",
                input, old_stage
            ))
        })?;

        let new_stage = self.stage();
        debug!(old_stage = ?old_stage, new_stage = ?new_stage, "Login stage transition");
        Ok(new_stage)
    }
}

impl fmt::Debug for AuthSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Tokens stay out of logs.
        f.debug_struct("AuthSession")
            .field("stage", &self.stage())
            .field("started", &self.started)
            .field("server_key_id", &self.server_key_id)
            .field("failure", &self.failure)
            .finish_non_exhaustive()
    }
}
