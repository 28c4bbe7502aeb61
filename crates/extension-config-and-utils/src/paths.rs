//! File system paths for the background.

use crate::{CoreError, CoreResult};
use std::path::PathBuf;

/// Directory name under the home directory.
const BASE_DIR_NAME: &str = ".vault-extension";

/// Manages file system paths for the background.
#[derive(Debug, Clone)]
pub struct Paths {
    /// Base directory for runtime files (~/.vault-extension)
    base_dir: PathBuf,
}

impl Paths {
    /// Uses `~/.vault-extension`.
    pub fn new() -> CoreResult<Self> {
        let home = dirs::home_dir()
            .ok_or_else(|| CoreError::Path("Could not determine home directory".to_string()))?;

        Ok(Self {
            base_dir: home.join(BASE_DIR_NAME),
        })
    }

    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    pub fn base_dir(&self) -> &PathBuf {
        &self.base_dir
    }

    /// ~/.vault-extension/config.json
    pub fn config_file(&self) -> PathBuf {
        self.base_dir.join("config.json")
    }

    /// Socket content scripts connect to.
    pub fn socket_file(&self) -> PathBuf {
        self.base_dir.join("background.sock")
    }

    /// Pinned server key and user key metadata.
    pub fn keyring_file(&self) -> PathBuf {
        self.base_dir.join("keyring.json")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.base_dir.join("logs")
    }

    /// JSONL log stream.
    pub fn log_file(&self) -> PathBuf {
        self.logs_dir().join("background.jsonl")
    }

    pub fn ensure_dirs(&self) -> CoreResult<()> {
        std::fs::create_dir_all(&self.base_dir)?;
        std::fs::create_dir_all(self.logs_dir())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_paths_with_base_dir() {
        let base = PathBuf::from("/tmp/test-vault-extension");
        let paths = Paths::with_base_dir(base.clone());

        assert_eq!(paths.base_dir(), &base);
        assert_eq!(paths.config_file(), base.join("config.json"));
        assert_eq!(paths.socket_file(), base.join("background.sock"));
        assert_eq!(paths.keyring_file(), base.join("keyring.json"));
        assert_eq!(paths.log_file(), base.join("logs/background.jsonl"));
    }

    #[test]
    fn test_paths_default() {
        let paths = Paths::new().unwrap();
        let home = dirs::home_dir().unwrap();
        assert_eq!(paths.base_dir(), &home.join(".vault-extension"));
    }

    #[test]
    fn test_ensure_dirs_is_idempotent() {
        let dir = tempdir().unwrap();
        let paths = Paths::with_base_dir(dir.path().join("vault"));
        assert!(!paths.logs_dir().exists());

        paths.ensure_dirs().unwrap();
        paths.ensure_dirs().unwrap();

        assert!(paths.base_dir().is_dir());
        assert!(paths.logs_dir().is_dir());
    }
}
