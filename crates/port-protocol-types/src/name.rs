//! Message-name catalogue.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Whether a message name carries a request id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// `[name, id, ...args]`, answered by exactly one terminal message.
    Request,
    /// `[name, ...args]`, never answered.
    Event,
}

/// Every message name exchanged between extension contexts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageName {
    // Worker lifecycle
    #[serde(rename = "worker.register")]
    WorkerRegister,
    #[serde(rename = "worker.use-resource-on-current-tab")]
    UseResourceOnCurrentTab,

    // Keyring
    #[serde(rename = "keyring.server.get")]
    KeyringServerGet,

    // Authentication
    #[serde(rename = "auth.verify-server-key")]
    AuthVerifyServerKey,
    #[serde(rename = "auth.verify")]
    AuthVerify,
    #[serde(rename = "auth.login-processing")]
    AuthLoginProcessing,
    #[serde(rename = "auth.login-success")]
    AuthLoginSuccess,
    #[serde(rename = "auth.login-failed")]
    AuthLoginFailed,

    // Secrets and forms
    #[serde(rename = "secret.decrypt")]
    SecretDecrypt,
    #[serde(rename = "form.fill")]
    FormFill,

    // Browser bridge
    #[serde(rename = "tabs.query-active")]
    TabsQueryActive,
    #[serde(rename = "crypto.encrypt")]
    CryptoEncrypt,
    #[serde(rename = "crypto.decrypt")]
    CryptoDecrypt,

    // Tags
    #[serde(rename = "tags.find-all")]
    TagsFindAll,
    #[serde(rename = "tags.update-resource-tags")]
    TagsUpdateResourceTags,
    #[serde(rename = "tags.update")]
    TagsUpdate,
    #[serde(rename = "tags.delete")]
    TagsDelete,

    // Themes
    #[serde(rename = "themes.find-all")]
    ThemesFindAll,

    // Folders
    #[serde(rename = "folders.find-all")]
    FoldersFindAll,
    #[serde(rename = "folders.get")]
    FoldersGet,
    #[serde(rename = "folders.create")]
    FoldersCreate,
    #[serde(rename = "folders.update")]
    FoldersUpdate,
    #[serde(rename = "folders.delete")]
    FoldersDelete,
}

impl MessageName {
    /// Dotted wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageName::WorkerRegister => "worker.register",
            MessageName::UseResourceOnCurrentTab => "worker.use-resource-on-current-tab",
            MessageName::KeyringServerGet => "keyring.server.get",
            MessageName::AuthVerifyServerKey => "auth.verify-server-key",
            MessageName::AuthVerify => "auth.verify",
            MessageName::AuthLoginProcessing => "auth.login-processing",
            MessageName::AuthLoginSuccess => "auth.login-success",
            MessageName::AuthLoginFailed => "auth.login-failed",
            MessageName::SecretDecrypt => "secret.decrypt",
            MessageName::FormFill => "form.fill",
            MessageName::TabsQueryActive => "tabs.query-active",
            MessageName::CryptoEncrypt => "crypto.encrypt",
            MessageName::CryptoDecrypt => "crypto.decrypt",
            MessageName::TagsFindAll => "tags.find-all",
            MessageName::TagsUpdateResourceTags => "tags.update-resource-tags",
            MessageName::TagsUpdate => "tags.update",
            MessageName::TagsDelete => "tags.delete",
            MessageName::ThemesFindAll => "themes.find-all",
            MessageName::FoldersFindAll => "folders.find-all",
            MessageName::FoldersGet => "folders.get",
            MessageName::FoldersCreate => "folders.create",
            MessageName::FoldersUpdate => "folders.update",
            MessageName::FoldersDelete => "folders.delete",
        }
    }

    /// Auth feedback is pushed to the login page; everything else is RPC.
    pub fn kind(&self) -> MessageKind {
        match self {
            MessageName::AuthLoginProcessing
            | MessageName::AuthLoginSuccess
            | MessageName::AuthLoginFailed => MessageKind::Event,
            _ => MessageKind::Request,
        }
    }
}

impl fmt::Display for MessageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageName {
    type Err = serde_json::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_value(serde_json::Value::String(s.to_string()))
    }
}
