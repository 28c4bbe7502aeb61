//! Errors raised while reading settings and preparing the background's files.

use thiserror::Error;

/// Setup failure. Everything here happens before the socket is bound.
#[derive(Error, Debug)]
pub enum CoreError {
    /// `api_url` parses but is not http or https
    #[error("API URL must be http or https, got {0}")]
    UnsupportedApiScheme(String),

    #[error("Invalid API URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// A global tracing subscriber was already installed
    #[error("Logging already initialized: {0}")]
    LoggingInitialized(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Config or keyring file is not valid JSON
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// No home directory to put the base dir under
    #[error("Path error: {0}")]
    Path(String),
}

pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scheme_error_names_the_scheme() {
        let error = CoreError::UnsupportedApiScheme("ftp".to_string());
        assert_eq!(error.to_string(), "API URL must be http or https, got ftp");
    }
}
