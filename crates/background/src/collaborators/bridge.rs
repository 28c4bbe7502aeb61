//! Tab and crypto collaborators served by the browser worker.
//!
//! The browser context registers itself as `(Browser, BROWSER_TAB_ID)` and
//! answers `tabs.query-active`, `crypto.encrypt` and `crypto.decrypt`.

use super::{Tab, Tabs};
use crate::BackgroundResult;
use async_trait::async_trait;
use extension_port::{MessageName, Port, PortError, PortResult, TabId, WorkerRegistry, WorkerRole};
use gpgauth::{CryptoFailure, CryptoProvider, KeyInfo};
use serde_json::{json, Value};
use tracing::debug;

/// Tab id the browser worker registers under.
pub const BROWSER_TAB_ID: TabId = 0;

/// Forwards collaborator calls to the registered browser worker.
#[derive(Clone)]
pub struct BrowserBridge {
    registry: WorkerRegistry,
}

impl BrowserBridge {
    pub fn new(registry: WorkerRegistry) -> Self {
        Self { registry }
    }

    fn port(&self) -> PortResult<Port> {
        self.registry
            .get(&WorkerRole::BROWSER, BROWSER_TAB_ID)
            .map(|handle| handle.port)
    }

    async fn call(&self, name: MessageName, args: Vec<Value>) -> PortResult<Option<Value>> {
        let port = self.port()?;
        debug!(name = %name, "Forwarding to browser worker");
        let result = port.request(name, args).await?;
        Ok(result.into_iter().next())
    }

    async fn crypto(&self, name: MessageName, text: &str, key: &KeyInfo) -> Result<String, CryptoFailure> {
        let value = self
            .call(name, vec![json!(text), json!(key)])
            .await
            .map_err(crypto_failure)?;
        match value {
            Some(Value::String(text)) => Ok(text),
            _ => Err(CryptoFailure(format!("{name} returned no text"))),
        }
    }
}

fn crypto_failure(error: PortError) -> CryptoFailure {
    match error {
        PortError::Remote(payload) => CryptoFailure(payload.message),
        other => CryptoFailure(other.to_string()),
    }
}

#[async_trait]
impl Tabs for BrowserBridge {
    async fn active_tab(&self) -> BackgroundResult<Option<Tab>> {
        match self.call(MessageName::TabsQueryActive, Vec::new()).await? {
            None | Some(Value::Null) => Ok(None),
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
        }
    }
}

#[async_trait]
impl CryptoProvider for BrowserBridge {
    async fn encrypt(&self, plaintext: &str, recipient: &KeyInfo) -> Result<String, CryptoFailure> {
        self.crypto(MessageName::CryptoEncrypt, plaintext, recipient).await
    }

    async fn decrypt(&self, armored: &str, key: &KeyInfo) -> Result<String, CryptoFailure> {
        self.crypto(MessageName::CryptoDecrypt, armored, key).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BackgroundError;
    use extension_port::{ErrorKind, ErrorPayload, Pipe};

    fn bridge_with_browser() -> (BrowserBridge, Port) {
        let registry = WorkerRegistry::new();
        let (near, far) = Pipe::pair();
        registry.register(
            WorkerRole::BROWSER,
            BROWSER_TAB_ID,
            Port::open(near, "browser"),
        );
        (BrowserBridge::new(registry), Port::open(far, "browser-worker"))
    }

    #[tokio::test]
    async fn test_active_tab_is_queried() {
        let (bridge, browser) = bridge_with_browser();
        browser.handle(MessageName::TabsQueryActive, |_| async {
            Ok(vec![json!({"id": 7, "url": "https://example.com/login"})])
        });

        let tab = bridge.active_tab().await.unwrap().unwrap();
        assert_eq!(tab.id, 7);
        assert_eq!(tab.url, "https://example.com/login");
    }

    #[tokio::test]
    async fn test_no_active_tab() {
        let (bridge, browser) = bridge_with_browser();
        browser.handle(MessageName::TabsQueryActive, |_| async { Ok(vec![Value::Null]) });
        assert!(bridge.active_tab().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_missing_browser_worker() {
        let bridge = BrowserBridge::new(WorkerRegistry::new());
        let error = bridge.active_tab().await.unwrap_err();
        assert!(matches!(
            error,
            BackgroundError::Port(PortError::WorkerNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_decrypt_failure_keeps_message() {
        let (bridge, browser) = bridge_with_browser();
        browser.handle(MessageName::CryptoDecrypt, |_| async {
            Err(ErrorPayload::new(ErrorKind::CryptoError, "bad passphrase"))
        });

        let key = serde_json::from_value::<KeyInfo>(json!({
            "keyId": "5d9b054f",
            "fingerprint": "03F60E958F4CB29723ACDF761353B5B15D9B054F",
            "algorithm": "RSA",
            "created": "2015-08-09T12:48:31Z"
        }))
        .unwrap();
        let error = bridge.decrypt("-----BEGIN PGP MESSAGE-----", &key).await.unwrap_err();
        assert_eq!(error.0, "bad passphrase");
    }
}
