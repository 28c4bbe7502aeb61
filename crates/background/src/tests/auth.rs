//! Server verification requested by the login page.

use super::harness::*;
use extension_port::{ErrorKind, PortError, WorkerRole};
use gpgauth::{AuthStage, LoginFlow, LoginProgress, RemoteError, VerifyOutcome};
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn observed_flow(port: extension_port::Port) -> (LoginFlow, Arc<Mutex<Vec<LoginProgress>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let s = seen.clone();
    let flow = LoginFlow::new(port)
        .with_observer(Arc::new(move |p: LoginProgress| s.lock().unwrap().push(p)));
    flow.listen();
    (flow, seen)
}

#[tokio::test]
async fn test_login_against_honest_server() {
    let h = TestHarness::new();
    let login = h.register(WorkerRole::LOGIN, TAB_ID).await;
    let (flow, seen) = observed_flow(login);

    let verified = flow.start().await.unwrap();

    assert_eq!(verified.server_key, server_key());
    assert_eq!(flow.stage(), AuthStage::Verified);
    let seen = seen.clone();
    assert!(
        eventually(Duration::from_secs(1), || seen
            .lock()
            .unwrap()
            .contains(&LoginProgress::LoginSucceeded))
        .await
    );
}

#[tokio::test]
async fn test_feedback_follows_verification() {
    let h = TestHarness::new();
    let login = h.register(WorkerRole::LOGIN, TAB_ID).await;
    let (flow, seen) = observed_flow(login);

    flow.start().await.unwrap();

    let events = seen.clone();
    assert!(
        eventually(Duration::from_secs(1), || events
            .lock()
            .unwrap()
            .contains(&LoginProgress::LoginSucceeded))
        .await
    );
    let seen = seen.lock().unwrap();
    let verified = seen
        .iter()
        .position(|p| matches!(p, LoginProgress::Verifying))
        .unwrap();
    let processing = seen
        .iter()
        .position(|p| matches!(p, LoginProgress::Processing { .. }))
        .unwrap();
    let succeeded = seen
        .iter()
        .position(|p| *p == LoginProgress::LoginSucceeded)
        .unwrap();
    assert!(verified < processing && processing < succeeded);
}

#[tokio::test]
async fn test_failed_verification_sends_only_login_failed() {
    let auth_api = MockAuthApi::default();
    *auth_api.verify_error.lock().unwrap() = Some(RemoteError::new("Decryption failed"));
    let h = TestHarness::with_auth_api(auth_api);
    let login = h.register(WorkerRole::LOGIN, TAB_ID).await;
    let (flow, seen) = observed_flow(login);

    flow.start().await.unwrap_err();

    let events = seen.clone();
    assert!(
        eventually(Duration::from_secs(1), || events
            .lock()
            .unwrap()
            .iter()
            .any(|p| matches!(p, LoginProgress::LoginFailed { .. })))
        .await
    );
    let seen = seen.lock().unwrap();
    assert!(!seen
        .iter()
        .any(|p| matches!(p, LoginProgress::Processing { .. } | LoginProgress::LoginSucceeded)));
}

#[tokio::test]
async fn test_unknown_user_fails_with_no_account() {
    let auth_api = MockAuthApi::default();
    *auth_api.verify_error.lock().unwrap() =
        Some(RemoteError::new("There is no user associated with this key."));
    let h = TestHarness::with_auth_api(auth_api);
    let login = h.register(WorkerRole::LOGIN, TAB_ID).await;
    let (flow, _) = observed_flow(login);

    let error = flow.start().await.unwrap_err();

    assert_eq!(error.kind(), ErrorKind::AuthNoAccount);
    assert_eq!(flow.stage(), AuthStage::Failed);
    assert!(flow.failure().unwrap().is_no_account());
}

#[tokio::test]
async fn test_changed_server_key_is_mismatch() {
    let auth_api = MockAuthApi {
        fingerprint: user_key().fingerprint,
        ..MockAuthApi::default()
    };
    let h = TestHarness::with_auth_api(auth_api);
    let login = h.register(WorkerRole::LOGIN, TAB_ID).await;
    let (flow, _) = observed_flow(login);

    let error = flow.start().await.unwrap_err();

    assert_eq!(error.kind(), ErrorKind::AuthServerKeyMismatch);
    assert_eq!(flow.stage(), AuthStage::Failed);
}

#[tokio::test]
async fn test_unreachable_server_is_not_reported_as_mismatch() {
    let auth_api = MockAuthApi {
        fingerprint_error: Some(RemoteError::new("Request failed: 502 Bad Gateway")),
        ..MockAuthApi::default()
    };
    let h = TestHarness::with_auth_api(auth_api);
    let login = h.register(WorkerRole::LOGIN, TAB_ID).await;
    let (flow, _) = observed_flow(login);

    let error = flow.start().await.unwrap_err();

    assert_eq!(error.kind(), ErrorKind::ApiError);
    assert_eq!(flow.stage(), AuthStage::Failed);
    assert_eq!(flow.failure().unwrap().kind, ErrorKind::ApiError);
}

#[tokio::test]
async fn test_verify_answers_with_outcome_and_feedback() {
    let h = TestHarness::new();
    let login = h.register(WorkerRole::LOGIN, TAB_ID).await;

    let result = login
        .request(extension_port::MessageName::AuthVerify, vec![])
        .await
        .unwrap();

    let outcome: VerifyOutcome = serde_json::from_value(result[0].clone()).unwrap();
    assert_eq!(outcome.token, outcome.server_nonce);
}

#[tokio::test]
async fn test_server_key_get_returns_pinned_key() {
    let h = TestHarness::new();
    let login = h.connect("login");

    let result = login
        .request(extension_port::MessageName::KeyringServerGet, vec![])
        .await
        .unwrap();

    assert_eq!(result[0]["fingerprint"], server_key().fingerprint);
}

#[tokio::test]
async fn test_challenge_failure_is_not_no_account() {
    let auth_api = MockAuthApi::default();
    *auth_api.verify_error.lock().unwrap() = Some(RemoteError::new("Decryption failed"));
    let h = TestHarness::with_auth_api(auth_api);
    let login = h.connect("login");

    let result = login
        .request(extension_port::MessageName::AuthVerify, vec![])
        .await;

    let payload = match result {
        Err(PortError::Remote(payload)) => payload,
        other => panic!("expected an ERROR answer, got {other:?}"),
    };
    assert_eq!(payload.kind, ErrorKind::AuthChallengeFailed);
}
