//! Shared state handed to listeners and controllers.

use crate::collaborators::{ApiClient, ApiOptions, CryptoProvider, Keyring, Tabs};
use crate::{BackgroundError, BackgroundResult};
use extension_port::{RequestPolicy, WorkerRegistry};
use gpgauth::ServerVerifier;
use std::sync::{Arc, RwLock};
use url::Url;

/// The signed-in user, as far as API calls are concerned.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserSession {
    pub domain: Option<Url>,
    pub csrf_token: Option<String>,
}

impl UserSession {
    pub fn new(domain: Url) -> Self {
        Self {
            domain: Some(domain),
            csrf_token: None,
        }
    }

    /// Options for the API client.
    pub fn api_options(&self) -> BackgroundResult<ApiOptions> {
        let base_url = self
            .domain
            .clone()
            .ok_or_else(|| BackgroundError::Session("User domain is not configured".to_string()))?;
        Ok(ApiOptions {
            base_url,
            csrf_token: self.csrf_token.clone(),
        })
    }
}

/// Everything the background listeners need, passed explicitly.
#[derive(Clone)]
pub struct BackgroundContext {
    session: Arc<RwLock<UserSession>>,
    pub registry: WorkerRegistry,
    pub api: Arc<dyn ApiClient>,
    pub crypto: Arc<dyn CryptoProvider>,
    pub tabs: Arc<dyn Tabs>,
    pub keyring: Arc<dyn Keyring>,
    pub verifier: ServerVerifier,
    pub policy: RequestPolicy,
}

impl BackgroundContext {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        session: UserSession,
        registry: WorkerRegistry,
        api: Arc<dyn ApiClient>,
        crypto: Arc<dyn CryptoProvider>,
        tabs: Arc<dyn Tabs>,
        keyring: Arc<dyn Keyring>,
        verifier: ServerVerifier,
        policy: RequestPolicy,
    ) -> Self {
        Self {
            session: Arc::new(RwLock::new(session)),
            registry,
            api,
            crypto,
            tabs,
            keyring,
            verifier,
            policy,
        }
    }

    pub fn session(&self) -> UserSession {
        match self.session.read() {
            Ok(session) => session.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn set_session(&self, session: UserSession) {
        match self.session.write() {
            Ok(mut current) => *current = session,
            Err(poisoned) => *poisoned.into_inner() = session,
        }
    }

    /// API options of the current session.
    pub fn api_options(&self) -> BackgroundResult<ApiOptions> {
        self.session().api_options()
    }
}
