//! Configuration management for the background.

use crate::{CoreError, CoreResult, Paths};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use url::Url;

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Default API base URL.
pub const DEFAULT_API_URL: &str = "http://127.0.0.1:8080";

/// Default request timeout; 0 disables it.
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;

const ENV_LOG_LEVEL: &str = "VAULT_EXT_LOG_LEVEL";
const ENV_API_URL: &str = "VAULT_EXT_API_URL";
const ENV_REQUEST_TIMEOUT_MS: &str = "VAULT_EXT_REQUEST_TIMEOUT_MS";

/// Background configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Base URL of the password manager API.
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Timeout for requests between contexts, in milliseconds.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

fn default_request_timeout_ms() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_MS
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            api_url: default_api_url(),
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
        }
    }
}

impl Config {
    /// Defaults, then environment overrides.
    pub fn new() -> Self {
        let mut config = Self::default();
        config.load_from_env();
        config
    }

    /// Load configuration from the config file, falling back to defaults,
    /// then apply environment overrides.
    pub fn load(paths: &Paths) -> CoreResult<Self> {
        let config_path = paths.config_file();

        let mut config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            Self::default()
        };

        config.load_from_env();
        Ok(config)
    }

    pub fn load_from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    pub fn save(&self, paths: &Paths) -> CoreResult<()> {
        paths.ensure_dirs()?;
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(paths.config_file(), content)?;
        Ok(())
    }

    fn load_from_env(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    /// Apply overrides from a variable lookup. Unparseable timeouts are
    /// ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(log_level) = lookup(ENV_LOG_LEVEL) {
            self.log_level = log_level;
        }
        if let Some(api_url) = lookup(ENV_API_URL) {
            self.api_url = api_url;
        }
        if let Some(timeout) = lookup(ENV_REQUEST_TIMEOUT_MS).and_then(|t| t.trim().parse().ok()) {
            self.request_timeout_ms = timeout;
        }
    }

    /// API base URL, parsed.
    pub fn api_url(&self) -> CoreResult<Url> {
        let url = Url::parse(&self.api_url)?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(CoreError::UnsupportedApiScheme(other.to_string())),
        }
    }

    /// `None` when requests should wait indefinitely.
    pub fn request_timeout(&self) -> Option<Duration> {
        (self.request_timeout_ms > 0).then(|| Duration::from_millis(self.request_timeout_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.log_level, DEFAULT_LOG_LEVEL);
        assert_eq!(config.api_url, DEFAULT_API_URL);
        assert_eq!(
            config.request_timeout(),
            Some(Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS))
        );
    }

    #[test]
    fn test_config_load_from_file_with_partial_fields() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.json");
        std::fs::write(&config_path, r#"{ "log_level": "debug" }"#).unwrap();

        let config = Config::load_from_file(&config_path).unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.api_url, DEFAULT_API_URL);
    }

    #[test]
    fn test_config_save_and_load_roundtrip() {
        let dir = tempdir().unwrap();
        let paths = Paths::with_base_dir(dir.path().to_path_buf());

        let config = Config {
            log_level: "trace".to_string(),
            api_url: "https://vault.example.com".to_string(),
            request_timeout_ms: 0,
        };
        config.save(&paths).unwrap();

        let loaded = Config::load_from_file(&paths.config_file()).unwrap();
        assert_eq!(loaded, config);
        assert_eq!(loaded.request_timeout(), None);
    }

    #[test]
    fn test_config_load_nonexistent_uses_defaults() {
        let dir = tempdir().unwrap();
        let paths = Paths::with_base_dir(dir.path().join("missing"));
        let config = Config::load(&paths).unwrap();
        assert!(!config.api_url.is_empty());
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("VAULT_EXT_LOG_LEVEL", "warn"),
            ("VAULT_EXT_API_URL", "https://vault.example.com"),
            ("VAULT_EXT_REQUEST_TIMEOUT_MS", "250"),
        ]);

        let mut config = Config::default();
        config.apply_overrides(|name| env.get(name).map(|v| v.to_string()));

        assert_eq!(config.log_level, "warn");
        assert_eq!(config.api_url, "https://vault.example.com");
        assert_eq!(config.request_timeout(), Some(Duration::from_millis(250)));
    }

    #[test]
    fn test_bad_timeout_override_is_ignored() {
        let mut config = Config::default();
        config.apply_overrides(|name| {
            (name == "VAULT_EXT_REQUEST_TIMEOUT_MS").then(|| "soon".to_string())
        });
        assert_eq!(config.request_timeout_ms, DEFAULT_REQUEST_TIMEOUT_MS);
    }

    #[test]
    fn test_api_url_validation() {
        let mut config = Config::default();
        assert_eq!(config.api_url().unwrap().scheme(), "http");

        config.api_url = "not a valid url".to_string();
        assert!(config.api_url().is_err());

        config.api_url = "ftp://vault.example.com".to_string();
        assert!(matches!(
            config.api_url(),
            Err(CoreError::UnsupportedApiScheme(scheme)) if scheme == "ftp"
        ));
    }
}
