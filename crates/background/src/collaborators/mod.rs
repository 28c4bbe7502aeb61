//! Boundaries to the outside world.
//!
//! - `ApiClient`: REST API of the password manager
//! - `Tabs`: browser tab queries
//! - `CryptoProvider`, `Keyring`, `AuthApi`: from `gpgauth`
//!
//! Production implementations live in the submodules; tests use mocks.

mod bridge;
mod http;
mod keyring;

pub use bridge::{BrowserBridge, BROWSER_TAB_ID};
pub use gpgauth::{AuthApi, CryptoProvider, Keyring};
pub use http::HttpApiClient;
pub use keyring::FileKeyring;

use crate::BackgroundResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use url::Url;

/// API entity collections the background talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiResource {
    Resources,
    Secrets,
    Tags,
    Themes,
    Folders,
}

impl ApiResource {
    /// Path segment under the API base URL.
    pub fn path(&self) -> &'static str {
        match self {
            ApiResource::Resources => "resources",
            ApiResource::Secrets => "secrets",
            ApiResource::Tags => "tags",
            ApiResource::Themes => "account/settings/themes",
            ApiResource::Folders => "folders",
        }
    }
}

/// Connection options derived from the user session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiOptions {
    pub base_url: Url,
    /// CSRF token of the authenticated session, if any.
    pub csrf_token: Option<String>,
}

/// Query string pairs.
pub type ApiQuery = Vec<(String, String)>;

/// Successful API answer.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub body: Value,
}

/// API failure as reported by the server or the HTTP layer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct ApiError {
    pub message: String,
    /// Server error code, when there is one.
    pub code: Option<String>,
}

impl ApiError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }
}

/// REST client, one method per CRUD verb.
#[async_trait]
pub trait ApiClient: Send + Sync {
    async fn find_all(
        &self,
        options: &ApiOptions,
        resource: ApiResource,
        query: &ApiQuery,
    ) -> Result<ApiResponse, ApiError>;

    async fn get(
        &self,
        options: &ApiOptions,
        resource: ApiResource,
        id: &str,
        query: &ApiQuery,
    ) -> Result<ApiResponse, ApiError>;

    async fn create(
        &self,
        options: &ApiOptions,
        resource: ApiResource,
        body: Value,
    ) -> Result<ApiResponse, ApiError>;

    async fn update(
        &self,
        options: &ApiOptions,
        resource: ApiResource,
        id: &str,
        body: Value,
    ) -> Result<ApiResponse, ApiError>;

    async fn delete(
        &self,
        options: &ApiOptions,
        resource: ApiResource,
        id: &str,
    ) -> Result<ApiResponse, ApiError>;
}

/// A browser tab.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tab {
    pub id: i64,
    pub url: String,
}

/// Browser tab queries.
#[async_trait]
pub trait Tabs: Send + Sync {
    /// Active tab of the current window.
    async fn active_tab(&self) -> BackgroundResult<Option<Tab>>;
}
