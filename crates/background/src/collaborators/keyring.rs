//! Keyring backed by a JSON file.

use crate::BackgroundResult;
use gpgauth::{KeyInfo, Keyring};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
struct KeyringFile {
    #[serde(default)]
    server: Option<KeyInfo>,
    #[serde(default)]
    user: Option<KeyInfo>,
}

/// Keys pinned at setup, loaded once at startup.
#[derive(Debug, Clone, Default)]
pub struct FileKeyring {
    keys: KeyringFile,
}

impl FileKeyring {
    /// Load the keyring. A missing file is an empty keyring.
    pub fn load(path: &Path) -> BackgroundResult<Self> {
        if !path.exists() {
            info!(path = %path.display(), "No keyring file, starting with an empty keyring");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let keys: KeyringFile = serde_json::from_str(&content)?;
        debug!(
            path = %path.display(),
            server = keys.server.is_some(),
            user = keys.user.is_some(),
            "Keyring loaded"
        );
        Ok(Self { keys })
    }

    pub fn new(server: Option<KeyInfo>, user: Option<KeyInfo>) -> Self {
        Self {
            keys: KeyringFile { server, user },
        }
    }

    pub fn save(&self, path: &Path) -> BackgroundResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(&self.keys)?)?;
        Ok(())
    }
}

impl Keyring for FileKeyring {
    fn server_key(&self) -> Option<KeyInfo> {
        self.keys.server.clone()
    }

    fn user_key(&self) -> Option<KeyInfo> {
        self.keys.user.clone()
    }
}
