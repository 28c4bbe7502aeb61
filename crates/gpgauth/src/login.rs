//! Login page side of the handshake.
//!
//! Drives one `AuthSession` through the background over a port:
//!
//! 1. `keyring.server.get` returns the pinned server key
//! 2. `auth.verify` asks the background to challenge the server
//!
//! Progress goes to an optional observer, together with the
//! `auth.login-*` feedback events the background emits later in the login.

use crate::auth_fsm::AuthStage;
use crate::session::{AuthFailure, AuthSession};
use crate::{AuthError, AuthResult, KeyInfo, VerifyOutcome};
use extension_port::{Disposer, MessageName, Port, PortError};
use serde_json::Value;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// Progress reported to the login UI.
#[derive(Debug, Clone, PartialEq)]
pub enum LoginProgress {
    /// Pinned server key received.
    ServerKeyFetched { key_id: String },
    /// Challenge sent, waiting for the server proof.
    Verifying,
    /// Server proved possession of its key.
    Verified { message: String },
    /// The attempt failed.
    Failed { failure: AuthFailure },
    /// Handshake passed, session being opened.
    Processing { message: String },
    /// Login completed.
    LoginSucceeded,
    /// Login failed, reported by the background.
    LoginFailed { message: String },
}

/// Callback type for login progress notifications.
pub type LoginObserver = Arc<dyn Fn(LoginProgress) + Send + Sync>;

/// Outcome of a successful server verification.
#[derive(Debug, Clone, PartialEq)]
pub struct VerifiedLogin {
    pub server_key: KeyInfo,
    pub message: String,
}

/// One login attempt over a port to the background.
pub struct LoginFlow {
    port: Port,
    session: Mutex<AuthSession>,
    observer: Option<LoginObserver>,
    listeners: Mutex<Vec<Disposer>>,
}

impl LoginFlow {
    pub fn new(port: Port) -> Self {
        Self {
            port,
            session: Mutex::new(AuthSession::new()),
            observer: None,
            listeners: Mutex::new(Vec::new()),
        }
    }

    pub fn with_observer(mut self, observer: LoginObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn stage(&self) -> AuthStage {
        self.session().stage()
    }

    pub fn failure(&self) -> Option<AuthFailure> {
        self.session().failure().cloned()
    }

    /// Relay `auth.login-*` events from the background to the observer.
    pub fn listen(&self) {
        let mut listeners = lock(&self.listeners);
        if !listeners.is_empty() {
            return;
        }

        let observer = self.observer.clone();
        listeners.push(self.port.on(MessageName::AuthLoginProcessing, move |envelope| {
            let message = envelope.opt_arg::<String>(0).ok().flatten().unwrap_or_default();
            relay(&observer, LoginProgress::Processing { message });
            async {}
        }));

        let observer = self.observer.clone();
        listeners.push(self.port.on(MessageName::AuthLoginSuccess, move |_| {
            relay(&observer, LoginProgress::LoginSucceeded);
            async {}
        }));

        let observer = self.observer.clone();
        listeners.push(self.port.on(MessageName::AuthLoginFailed, move |envelope| {
            let message = envelope.opt_arg::<String>(0).ok().flatten().unwrap_or_default();
            relay(&observer, LoginProgress::LoginFailed { message });
            async {}
        }));
    }

    /// Remove the event relays, e.g. when the page navigates away.
    pub fn stop_listening(&self) {
        for disposer in lock(&self.listeners).drain(..) {
            disposer.dispose();
        }
    }

    /// Run the attempt. Fails with `InvalidStateTransition` when called twice.
    pub async fn start(&self) -> AuthResult<VerifiedLogin> {
        self.session().begin()?;

        let server_key = match self.fetch_server_key().await {
            Ok(key) => key,
            Err(e) => return Err(self.fail(e)),
        };
        self.session().server_key_checked(&server_key)?;
        self.notify(LoginProgress::ServerKeyFetched {
            key_id: server_key.display_id(),
        });

        self.session().challenge_sent()?;
        self.notify(LoginProgress::Verifying);

        let result = match self.port.request(MessageName::AuthVerify, vec![]).await {
            Ok(result) => result,
            Err(e) => return Err(self.fail(AuthError::from_verify_failure(e))),
        };

        let outcome = parse_verify_result(&result);
        self.session()
            .verified(outcome.token.clone(), outcome.server_nonce.clone())?;

        info!(key_id = %server_key.key_id, "Server verified, login can proceed");
        self.notify(LoginProgress::Verified {
            message: outcome.message.clone(),
        });

        Ok(VerifiedLogin {
            server_key,
            message: outcome.message,
        })
    }

    async fn fetch_server_key(&self) -> AuthResult<KeyInfo> {
        let result = match self.port.request(MessageName::KeyringServerGet, vec![]).await {
            Ok(result) => result,
            Err(PortError::Remote(payload)) => {
                return Err(AuthError::ServerKeyMismatch(format!(
                    "Could not find server key: {}",
                    payload.message
                )))
            }
            Err(e) => return Err(AuthError::Transport(e)),
        };

        let value = result
            .into_iter()
            .next()
            .ok_or_else(|| AuthError::ServerKeyMismatch("Could not find server key".to_string()))?;
        let key: KeyInfo = serde_json::from_value(value)
            .map_err(|e| AuthError::ServerKeyMismatch(format!("Malformed server key: {e}")))?;
        key.validate().map_err(AuthError::ServerKeyMismatch)?;

        debug!(key_id = %key.key_id, "Fetched server key");
        Ok(key)
    }

    fn fail(&self, error: AuthError) -> AuthError {
        let failure = AuthFailure::from(&error);
        if let Err(e) = self.session().fail(failure.clone()) {
            warn!(error = %e, "Could not record login failure");
        }
        warn!(kind = failure.kind.as_str(), message = %failure.message, "Login failed");
        self.notify(LoginProgress::Failed { failure });
        error
    }

    fn notify(&self, progress: LoginProgress) {
        relay(&self.observer, progress);
    }

    fn session(&self) -> MutexGuard<'_, AuthSession> {
        lock(&self.session)
    }
}

struct VerifyResult {
    message: String,
    token: Option<String>,
    server_nonce: Option<String>,
}

/// `auth.verify` answers with a `VerifyOutcome` object; older backgrounds
/// send only the message string.
fn parse_verify_result(result: &[Value]) -> VerifyResult {
    match result.first() {
        Some(Value::String(message)) => VerifyResult {
            message: message.clone(),
            token: None,
            server_nonce: None,
        },
        Some(value) => match serde_json::from_value::<VerifyOutcome>(value.clone()) {
            Ok(outcome) => VerifyResult {
                message: outcome.message,
                token: Some(outcome.token),
                server_nonce: Some(outcome.server_nonce),
            },
            Err(_) => VerifyResult {
                message: value.to_string(),
                token: None,
                server_nonce: None,
            },
        },
        None => VerifyResult {
            message: String::new(),
            token: None,
            server_nonce: None,
        },
    }
}

fn relay(observer: &Option<LoginObserver>, progress: LoginProgress) {
    if let Some(observer) = observer {
        observer(progress);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
