//! Fetch a resource with its secret and decrypt it with the user key.

use crate::collaborators::{ApiQuery, ApiResource};
use crate::{BackgroundContext, BackgroundError, BackgroundResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

/// Password entry as returned by the API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub uri: Option<String>,
    #[serde(default, skip_serializing)]
    secrets: Vec<Secret>,
    #[serde(default, skip_serializing)]
    secret: Option<Secret>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
struct Secret {
    data: String,
}

impl Resource {
    /// Armored secret of the current user.
    fn armored_secret(&self) -> Option<&str> {
        self.secret
            .as_ref()
            .or_else(|| self.secrets.first())
            .map(|secret| secret.data.as_str())
    }
}

/// Decrypted secret content.
#[derive(Debug, Clone, PartialEq)]
pub enum Plaintext {
    /// Legacy secrets: the password itself.
    Text(String),
    /// JSON object with a `password` field and other details.
    Structured(Value),
}

impl Plaintext {
    pub fn parse(decrypted: String) -> Self {
        match serde_json::from_str::<Value>(&decrypted) {
            Ok(value @ Value::Object(_)) => Plaintext::Structured(value),
            _ => Plaintext::Text(decrypted),
        }
    }

    /// Password to fill; empty when a structured secret has none.
    pub fn password(&self) -> &str {
        match self {
            Plaintext::Text(password) => password,
            Plaintext::Structured(value) => value
                .get("password")
                .and_then(Value::as_str)
                .unwrap_or_default(),
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            Plaintext::Text(text) => Value::String(text.clone()),
            Plaintext::Structured(value) => value.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DecryptedSecret {
    pub resource: Resource,
    pub plaintext: Plaintext,
}

impl DecryptedSecret {
    pub fn username(&self) -> &str {
        self.resource.username.as_deref().unwrap_or_default()
    }

    pub fn password(&self) -> &str {
        self.plaintext.password()
    }
}

pub struct SecretDecryptController<'a> {
    ctx: &'a BackgroundContext,
}

impl<'a> SecretDecryptController<'a> {
    pub fn new(ctx: &'a BackgroundContext) -> Self {
        Self { ctx }
    }

    pub async fn main(&self, resource_id: &str) -> BackgroundResult<DecryptedSecret> {
        let options = self.ctx.api_options()?;
        let query: ApiQuery = vec![("contain[secret]".to_string(), "1".to_string())];
        let response = self
            .ctx
            .api
            .get(&options, ApiResource::Resources, resource_id, &query)
            .await?;
        let resource: Resource = serde_json::from_value(response.body)?;

        let armored = resource.armored_secret().ok_or_else(|| {
            BackgroundError::Api(crate::collaborators::ApiError::new(format!(
                "Resource {resource_id} has no secret"
            )))
        })?;
        let user_key = self
            .ctx
            .keyring
            .user_key()
            .ok_or_else(|| BackgroundError::Session("No user key in the keyring".to_string()))?;

        debug!(resource_id, key_id = %user_key.key_id, "Decrypting secret");
        let decrypted = self.ctx.crypto.decrypt(armored, &user_key).await?;
        info!(resource_id, "Secret decrypted");

        Ok(DecryptedSecret {
            plaintext: Plaintext::parse(decrypted),
            resource,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_bare_string_is_the_password() {
        let plaintext = Plaintext::parse("myp@ss".to_string());
        assert_eq!(plaintext, Plaintext::Text("myp@ss".to_string()));
        assert_eq!(plaintext.password(), "myp@ss");
    }

    #[test]
    fn test_structured_secret() {
        let plaintext = Plaintext::parse(r#"{"password":"s3cret","description":"x"}"#.to_string());
        assert_eq!(plaintext.password(), "s3cret");
        assert_eq!(plaintext.to_value()["description"], "x");

        let without = Plaintext::parse(r#"{"description":"x"}"#.to_string());
        assert_eq!(without.password(), "");
    }

    #[test]
    fn test_json_scalar_stays_text() {
        assert_eq!(Plaintext::parse("1234".to_string()).password(), "1234");
    }

    #[test]
    fn test_resource_secret_shapes() {
        let listed: Resource = serde_json::from_value(json!({
            "id": "r1",
            "name": "bank",
            "secrets": [{"data": "armored"}]
        }))
        .unwrap();
        assert_eq!(listed.armored_secret(), Some("armored"));
        assert_eq!(listed.username, None);

        let single: Resource = serde_json::from_value(json!({
            "id": "r2",
            "username": "ada",
            "secret": {"data": "armored-2"}
        }))
        .unwrap();
        assert_eq!(single.armored_secret(), Some("armored-2"));
    }
}
