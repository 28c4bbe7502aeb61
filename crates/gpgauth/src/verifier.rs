//! Background side of the handshake.
//!
//! The verifier proves that the server holds the private half of the key
//! pinned in the local keyring: it encrypts a fresh token for that key and
//! expects the server to send the same token back in clear.

use crate::{AuthError, AuthResult, CryptoFailure, KeyInfo, RemoteError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

const TOKEN_TAG: &str = "gpgauthv1.3.0";

/// Remote authentication endpoint.
#[async_trait]
pub trait AuthApi: Send + Sync {
    /// Fingerprint of the key the server currently advertises.
    async fn server_key_fingerprint(&self) -> Result<String, RemoteError>;

    /// Send a token encrypted for the server key; the server answers with
    /// the decrypted token.
    async fn verify(&self, user_fingerprint: &str, encrypted_token: &str)
        -> Result<String, RemoteError>;
}

/// Local key store.
pub trait Keyring: Send + Sync {
    /// Server key pinned at setup.
    fn server_key(&self) -> Option<KeyInfo>;

    /// The user's own key.
    fn user_key(&self) -> Option<KeyInfo>;
}

/// Opaque OpenPGP operations.
#[async_trait]
pub trait CryptoProvider: Send + Sync {
    async fn encrypt(&self, plaintext: &str, recipient: &KeyInfo) -> Result<String, CryptoFailure>;

    async fn decrypt(&self, armored: &str, key: &KeyInfo) -> Result<String, CryptoFailure>;
}

/// Successful server verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyOutcome {
    /// Message shown to the user.
    pub message: String,
    /// Token the client generated.
    pub token: String,
    /// What the server sent back.
    pub server_nonce: String,
}

/// Fresh GPGAuth token: `gpgauthv1.3.0|36|<uuid>|gpgauthv1.3.0`.
pub fn generate_token() -> String {
    let uuid = Uuid::new_v4().to_string();
    format!("{TOKEN_TAG}|{}|{uuid}|{TOKEN_TAG}", uuid.len())
}

/// Check the token layout.
pub fn is_valid_token(token: &str) -> bool {
    let parts: Vec<&str> = token.split('|').collect();
    match parts.as_slice() {
        [head, len, uuid, tail] => {
            *head == TOKEN_TAG
                && *tail == TOKEN_TAG
                && len.parse::<usize>().ok() == Some(uuid.len())
                && Uuid::parse_str(uuid).is_ok()
        }
        _ => false,
    }
}

/// Verifies the server against the pinned key.
#[derive(Clone)]
pub struct ServerVerifier {
    api: Arc<dyn AuthApi>,
    keyring: Arc<dyn Keyring>,
    crypto: Arc<dyn CryptoProvider>,
}

impl ServerVerifier {
    pub fn new(
        api: Arc<dyn AuthApi>,
        keyring: Arc<dyn Keyring>,
        crypto: Arc<dyn CryptoProvider>,
    ) -> Self {
        Self {
            api,
            keyring,
            crypto,
        }
    }

    /// Pinned server key, checked for shape.
    pub fn pinned_server_key(&self) -> AuthResult<KeyInfo> {
        let key = self
            .keyring
            .server_key()
            .ok_or_else(|| AuthError::ServerKeyMismatch("Could not find server key".to_string()))?;
        key.validate().map_err(AuthError::ServerKeyMismatch)?;
        Ok(key)
    }

    /// Compare the key the server advertises with the pinned one.
    pub async fn verify_server_key(&self) -> AuthResult<KeyInfo> {
        let pinned = self.pinned_server_key()?;
        let remote = self
            .api
            .server_key_fingerprint()
            .await
            .map_err(|e| {
                warn!(error = %e, "Could not fetch the server key");
                AuthError::Api(format!("Could not fetch server key: {}", e.message))
            })?;

        if !pinned.matches_fingerprint(&remote) {
            warn!(
                pinned = %pinned.fingerprint,
                remote = %remote,
                "Server key differs from the pinned key"
            );
            return Err(AuthError::ServerKeyMismatch(
                "The server key has changed since setup".to_string(),
            ));
        }

        debug!(key_id = %pinned.key_id, "Server key matches pinned key");
        Ok(pinned)
    }

    /// Full server verification. Never retried.
    pub async fn verify(&self) -> AuthResult<VerifyOutcome> {
        let server_key = self.verify_server_key().await?;
        let user_key = self
            .keyring
            .user_key()
            .ok_or_else(|| AuthError::Crypto("No user key in the keyring".to_string()))?;

        let token = generate_token();
        let encrypted = self
            .crypto
            .encrypt(&token, &server_key)
            .await
            .map_err(|e| AuthError::Crypto(e.to_string()))?;

        let server_nonce = self
            .api
            .verify(&user_key.fingerprint, &encrypted)
            .await
            .map_err(AuthError::from_remote)?;

        if server_nonce != token {
            warn!(key_id = %server_key.key_id, "Server returned a different token");
            return Err(AuthError::ChallengeFailed(
                "The server was unable to prove it can use the advertised OpenPGP key"
                    .to_string(),
            ));
        }

        info!(key_id = %server_key.key_id, "Server identity verified");
        Ok(VerifyOutcome {
            message: "The server key is verified. The server can use it to sign and decrypt content."
                .to_string(),
            token,
            server_nonce,
        })
    }
}

#[cfg(test)]
pub(crate) mod mocks {
    use super::*;
    use crate::key::fixtures::{server_key, user_key};
    use std::sync::Mutex;

    /// Server that decrypts by stripping the `enc:` prefix.
    pub struct MockAuthApi {
        pub advertised: String,
        pub fingerprint_error: Option<RemoteError>,
        pub verify_error: Mutex<Option<RemoteError>>,
        pub tamper: bool,
        pub calls: Mutex<Vec<String>>,
    }

    impl MockAuthApi {
        pub fn honest() -> Self {
            Self {
                advertised: server_key().fingerprint,
                fingerprint_error: None,
                verify_error: Mutex::new(None),
                tamper: false,
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl AuthApi for MockAuthApi {
        async fn server_key_fingerprint(&self) -> Result<String, RemoteError> {
            match &self.fingerprint_error {
                Some(error) => Err(error.clone()),
                None => Ok(self.advertised.clone()),
            }
        }

        async fn verify(
            &self,
            user_fingerprint: &str,
            encrypted_token: &str,
        ) -> Result<String, RemoteError> {
            self.calls.lock().unwrap().push(user_fingerprint.to_string());
            if let Some(error) = self.verify_error.lock().unwrap().clone() {
                return Err(error);
            }
            let token = encrypted_token.trim_start_matches("enc:").to_string();
            Ok(if self.tamper {
                format!("{token}x")
            } else {
                token
            })
        }
    }

    pub struct MockKeyring {
        pub server: Option<KeyInfo>,
        pub user: Option<KeyInfo>,
    }

    impl Default for MockKeyring {
        fn default() -> Self {
            Self {
                server: Some(server_key()),
                user: Some(user_key()),
            }
        }
    }

    impl Keyring for MockKeyring {
        fn server_key(&self) -> Option<KeyInfo> {
            self.server.clone()
        }

        fn user_key(&self) -> Option<KeyInfo> {
            self.user.clone()
        }
    }

    pub struct PrefixCrypto;

    #[async_trait]
    impl CryptoProvider for PrefixCrypto {
        async fn encrypt(&self, plaintext: &str, _recipient: &KeyInfo) -> Result<String, CryptoFailure> {
            Ok(format!("enc:{plaintext}"))
        }

        async fn decrypt(&self, armored: &str, _key: &KeyInfo) -> Result<String, CryptoFailure> {
            armored
                .strip_prefix("enc:")
                .map(str::to_string)
                .ok_or_else(|| CryptoFailure("not encrypted".to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mocks::*;
    use super::*;
    use crate::key::fixtures::user_key;
    use extension_port::ErrorKind;

    fn verifier(api: MockAuthApi, keyring: MockKeyring) -> ServerVerifier {
        ServerVerifier::new(Arc::new(api), Arc::new(keyring), Arc::new(PrefixCrypto))
    }

    #[test]
    fn test_token_format() {
        let token = generate_token();
        assert!(token.starts_with("gpgauthv1.3.0|36|"));
        assert!(token.ends_with("|gpgauthv1.3.0"));
        assert!(is_valid_token(&token));
        assert!(!is_valid_token("gpgauthv1.3.0|12|abc|gpgauthv1.3.0"));
        assert_ne!(generate_token(), token);
    }

    #[tokio::test]
    async fn test_honest_server_is_verified() {
        let outcome = verifier(MockAuthApi::honest(), MockKeyring::default())
            .verify()
            .await
            .unwrap();
        assert_eq!(outcome.token, outcome.server_nonce);
        assert!(is_valid_token(&outcome.token));
    }

    #[tokio::test]
    async fn test_user_fingerprint_is_sent() {
        let api = Arc::new(MockAuthApi::honest());
        let verifier = ServerVerifier::new(
            api.clone(),
            Arc::new(MockKeyring::default()),
            Arc::new(PrefixCrypto),
        );
        verifier.verify().await.unwrap();
        assert_eq!(*api.calls.lock().unwrap(), vec![user_key().fingerprint]);
    }

    #[tokio::test]
    async fn test_wrong_proof_is_challenge_failure() {
        let mut api = MockAuthApi::honest();
        api.tamper = true;
        let error = verifier(api, MockKeyring::default()).verify().await.unwrap_err();
        assert_eq!(error.kind(), ErrorKind::AuthChallengeFailed);
    }

    #[tokio::test]
    async fn test_changed_server_key_is_mismatch() {
        let mut api = MockAuthApi::honest();
        api.advertised = user_key().fingerprint;
        let error = verifier(api, MockKeyring::default()).verify().await.unwrap_err();
        assert_eq!(error.kind(), ErrorKind::AuthServerKeyMismatch);
    }

    #[tokio::test]
    async fn test_unreachable_server_is_not_mismatch() {
        let mut api = MockAuthApi::honest();
        api.fingerprint_error = Some(RemoteError::new("Request failed: connection refused"));
        let api = Arc::new(api);
        let verifier = ServerVerifier::new(
            api.clone(),
            Arc::new(MockKeyring::default()),
            Arc::new(PrefixCrypto),
        );

        let error = verifier.verify().await.unwrap_err();

        assert_eq!(error.kind(), ErrorKind::ApiError);
        assert!(error.message().contains("connection refused"));
        assert!(api.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_pinned_key_is_mismatch() {
        let keyring = MockKeyring {
            server: None,
            ..MockKeyring::default()
        };
        let error = verifier(MockAuthApi::honest(), keyring)
            .verify_server_key()
            .await
            .unwrap_err();
        assert_eq!(error.kind(), ErrorKind::AuthServerKeyMismatch);
    }

    #[tokio::test]
    async fn test_unknown_user_is_no_account() {
        let api = MockAuthApi::honest();
        *api.verify_error.lock().unwrap() =
            Some(RemoteError::new("There is no user associated with this key."));
        let error = verifier(api, MockKeyring::default()).verify().await.unwrap_err();
        assert!(error.is_no_account());
    }

    #[tokio::test]
    async fn test_structured_no_account_code() {
        let api = MockAuthApi::honest();
        *api.verify_error.lock().unwrap() =
            Some(RemoteError::new("User not found").with_code("no_account"));
        let error = verifier(api, MockKeyring::default()).verify().await.unwrap_err();
        assert_eq!(error.kind(), ErrorKind::AuthNoAccount);
    }
}
