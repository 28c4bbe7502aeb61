//! OpenPGP key metadata.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Read-only description of a key held by the keyring.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyInfo {
    pub key_id: String,
    pub fingerprint: String,
    pub algorithm: String,
    pub created: DateTime<Utc>,
    #[serde(default)]
    pub expires: Option<DateTime<Utc>>,
    #[serde(default)]
    pub user_ids: Vec<String>,
}

impl KeyInfo {
    /// Check the fields a handshake relies on.
    pub fn validate(&self) -> Result<(), String> {
        if self.key_id.trim().is_empty() {
            return Err("key id is empty".to_string());
        }
        let fingerprint = normalize_fingerprint(&self.fingerprint);
        if fingerprint.len() != 40 || !fingerprint.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(format!("invalid fingerprint {}", self.fingerprint));
        }
        Ok(())
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires.is_some_and(|expires| expires <= now)
    }

    /// Same key, ignoring case and spacing.
    pub fn same_fingerprint(&self, other: &KeyInfo) -> bool {
        self.matches_fingerprint(&other.fingerprint)
    }

    pub fn matches_fingerprint(&self, fingerprint: &str) -> bool {
        normalize_fingerprint(&self.fingerprint) == normalize_fingerprint(fingerprint)
    }

    /// Key id as shown to users.
    pub fn display_id(&self) -> String {
        self.key_id.to_uppercase()
    }
}

fn normalize_fingerprint(fingerprint: &str) -> String {
    fingerprint
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_uppercase()
}
