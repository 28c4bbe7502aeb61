//! REST API client for the password manager server.

use super::{ApiClient, ApiError, ApiOptions, ApiQuery, ApiResource, ApiResponse};
use async_trait::async_trait;
use gpgauth::{AuthApi, RemoteError};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

const API_VERSION: (&str, &str) = ("api-version", "v2");
const CSRF_HEADER: &str = "X-CSRF-Token";
const VERIFY_RESPONSE_HEADER: &str = "X-GPGAuth-Verify-Response";

/// `{ header: { status, message, code }, body }` envelope of every answer.
#[derive(Debug, Deserialize)]
struct Envelope {
    header: EnvelopeHeader,
    #[serde(default)]
    body: Value,
}

#[derive(Debug, Deserialize)]
struct EnvelopeHeader {
    #[serde(default)]
    status: String,
    #[serde(default)]
    message: String,
    #[serde(default)]
    code: Option<Value>,
}

impl EnvelopeHeader {
    fn error(&self) -> ApiError {
        let error = ApiError::new(self.message.clone());
        match &self.code {
            Some(Value::String(code)) => error.with_code(code.clone()),
            Some(Value::Number(code)) => error.with_code(code.to_string()),
            _ => error,
        }
    }
}

/// HTTP implementation of `ApiClient` and `AuthApi`.
#[derive(Clone)]
pub struct HttpApiClient {
    http_client: reqwest::Client,
    base_url: Url,
}

impl HttpApiClient {
    /// `base_url` is used for the login handshake; entity calls take the
    /// base URL from the `ApiOptions` they are given.
    pub fn new(base_url: Url) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            base_url,
        }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn collection_url(base: &Url, resource: ApiResource) -> String {
        format!(
            "{}/{}.json",
            base.as_str().trim_end_matches('/'),
            resource.path()
        )
    }

    fn entity_url(base: &Url, resource: ApiResource, id: &str) -> String {
        format!(
            "{}/{}/{}.json",
            base.as_str().trim_end_matches('/'),
            resource.path(),
            id
        )
    }

    fn with_csrf(
        request: reqwest::RequestBuilder,
        options: &ApiOptions,
    ) -> reqwest::RequestBuilder {
        match &options.csrf_token {
            Some(token) => request.header(CSRF_HEADER, token),
            None => request,
        }
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<ApiResponse, ApiError> {
        let response = request
            .query(&[API_VERSION])
            .send()
            .await
            .map_err(|e| ApiError::new(format!("Request failed: {e}")))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ApiError::new(format!("Failed to read response: {e}")))?;

        let envelope: Envelope = match serde_json::from_str(&text) {
            Ok(envelope) => envelope,
            Err(_) if !status.is_success() => {
                warn!(status = %status, "API returned a non-JSON error");
                return Err(ApiError::new(format!("Server responded with {status}"))
                    .with_code(status.as_u16().to_string()));
            }
            Err(e) => return Err(ApiError::new(format!("Invalid API response: {e}"))),
        };

        if !status.is_success() || envelope.header.status == "error" {
            let error = envelope.header.error();
            warn!(status = %status, message = %error.message, "API request failed");
            return Err(error);
        }

        Ok(ApiResponse {
            body: envelope.body,
        })
    }
}

#[async_trait]
impl ApiClient for HttpApiClient {
    async fn find_all(
        &self,
        options: &ApiOptions,
        resource: ApiResource,
        query: &ApiQuery,
    ) -> Result<ApiResponse, ApiError> {
        let url = Self::collection_url(&options.base_url, resource);
        debug!(url = %url, "API find all");
        self.send(self.http_client.get(&url).query(query)).await
    }

    async fn get(
        &self,
        options: &ApiOptions,
        resource: ApiResource,
        id: &str,
        query: &ApiQuery,
    ) -> Result<ApiResponse, ApiError> {
        let url = Self::entity_url(&options.base_url, resource, id);
        debug!(url = %url, "API get");
        self.send(self.http_client.get(&url).query(query)).await
    }

    async fn create(
        &self,
        options: &ApiOptions,
        resource: ApiResource,
        body: Value,
    ) -> Result<ApiResponse, ApiError> {
        let url = Self::collection_url(&options.base_url, resource);
        debug!(url = %url, "API create");
        let request = Self::with_csrf(self.http_client.post(&url).json(&body), options);
        self.send(request).await
    }

    async fn update(
        &self,
        options: &ApiOptions,
        resource: ApiResource,
        id: &str,
        body: Value,
    ) -> Result<ApiResponse, ApiError> {
        let url = Self::entity_url(&options.base_url, resource, id);
        debug!(url = %url, "API update");
        let request = Self::with_csrf(self.http_client.put(&url).json(&body), options);
        self.send(request).await
    }

    async fn delete(
        &self,
        options: &ApiOptions,
        resource: ApiResource,
        id: &str,
    ) -> Result<ApiResponse, ApiError> {
        let url = Self::entity_url(&options.base_url, resource, id);
        debug!(url = %url, "API delete");
        let request = Self::with_csrf(self.http_client.delete(&url), options);
        self.send(request).await
    }
}

#[async_trait]
impl AuthApi for HttpApiClient {
    async fn server_key_fingerprint(&self) -> Result<String, RemoteError> {
        let url = format!("{}/auth/verify.json", self.base_url.as_str().trim_end_matches('/'));
        let response = self
            .send(self.http_client.get(&url))
            .await
            .map_err(api_to_remote)?;

        response
            .body
            .get("fingerprint")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| RemoteError::new("Server key fingerprint missing from response"))
    }

    async fn verify(
        &self,
        user_fingerprint: &str,
        encrypted_token: &str,
    ) -> Result<String, RemoteError> {
        let url = format!("{}/auth/verify.json", self.base_url.as_str().trim_end_matches('/'));
        let form = [
            ("data[gpg_auth][keyid]", user_fingerprint),
            ("data[gpg_auth][server_verify_token]", encrypted_token),
        ];

        let response = self
            .http_client
            .post(&url)
            .query(&[API_VERSION])
            .form(&form)
            .send()
            .await
            .map_err(|e| RemoteError::new(format!("Request failed: {e}")))?;

        if let Some(proof) = response
            .headers()
            .get(VERIFY_RESPONSE_HEADER)
            .and_then(|value| value.to_str().ok())
        {
            return Ok(proof.to_string());
        }

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        let error = serde_json::from_str::<Envelope>(&text)
            .map(|envelope| envelope.header.error())
            .unwrap_or_else(|_| ApiError::new(format!("Server responded with {status}")));
        Err(api_to_remote(error))
    }
}

fn api_to_remote(error: ApiError) -> RemoteError {
    let remote = RemoteError::new(error.message);
    match error.code {
        Some(code) => remote.with_code(code),
        None => remote,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://vault.example.com/").unwrap()
    }

    #[test]
    fn test_urls() {
        assert_eq!(
            HttpApiClient::collection_url(&base(), ApiResource::Folders),
            "https://vault.example.com/folders.json"
        );
        assert_eq!(
            HttpApiClient::entity_url(&base(), ApiResource::Tags, "abc"),
            "https://vault.example.com/tags/abc.json"
        );
        assert_eq!(
            HttpApiClient::collection_url(&base(), ApiResource::Themes),
            "https://vault.example.com/account/settings/themes.json"
        );
    }

    #[test]
    fn test_envelope_error_code() {
        let envelope: Envelope = serde_json::from_str(
            r#"{"header":{"status":"error","message":"There is no user associated with this key.","code":404},"body":null}"#,
        )
        .unwrap();
        let error = envelope.header.error();
        assert_eq!(error.code.as_deref(), Some("404"));
        assert!(api_to_remote(error).is_no_account());
    }

    #[test]
    fn test_envelope_without_body() {
        let envelope: Envelope =
            serde_json::from_str(r#"{"header":{"status":"success","message":"OK"}}"#).unwrap();
        assert!(envelope.body.is_null());
    }
}
