use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use crate::{ApiError, ApiResult, FileDescriptor, RemoteFile, SecurityToken};

/// Narrow control-plane surface the engine consumes.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// Issues object-storage credentials for a project. Called once per
    /// engine instance.
    async fn generate_security_token(&self, project: &str) -> ApiResult<SecurityToken>;

    /// Fetches server-side metadata for a file resource.
    ///
    /// Returns `Ok(None)` when the file does not exist, the normal
    /// outcome for a fresh upload.
    async fn get_file(&self, resource_name: &str) -> ApiResult<Option<RemoteFile>>;

    /// Requests pre-signed PUT URLs for a batch of files, keyed by
    /// resource name.
    async fn generate_file_upload_urls(
        &self,
        parent: &str,
        files: &[FileDescriptor],
    ) -> ApiResult<HashMap<String, String>>;
}

/// JSON-over-HTTP [`ControlPlane`] implementation.
pub struct HttpControlPlane {
    base_url: Url,
    client: reqwest::Client,
    auth_token: Option<String>,
}

impl HttpControlPlane {
    pub fn new(base_url: &str, auth_token: Option<String>) -> ApiResult<Self> {
        let base_url =
            Url::parse(base_url).map_err(|e| ApiError::InvalidEndpoint(e.to_string()))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            base_url,
            client,
            auth_token,
        })
    }

    fn endpoint(&self, path: &str) -> ApiResult<Url> {
        self.base_url
            .join(path)
            .map_err(|e| ApiError::InvalidEndpoint(e.to_string()))
    }

    async fn post_json<Req, Resp>(&self, path: &str, body: &Req) -> ApiResult<Resp>
    where
        Req: serde::Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let url = self.endpoint(path)?;
        debug!(%url, "control plane request");
        let mut req = self.client.post(url).json(body);
        if let Some(token) = &self.auth_token {
            req = req.bearer_auth(token);
        }
        let resp = req.send().await?.error_for_status()?;
        Ok(resp.json().await?)
    }
}

#[derive(serde::Serialize)]
struct GenerateSecurityTokenRequest<'a> {
    project: &'a str,
}

#[derive(serde::Serialize)]
struct GetFileRequest<'a> {
    name: &'a str,
}

#[derive(serde::Serialize)]
struct GenerateUploadUrlsRequest<'a> {
    parent: &'a str,
    files: &'a [FileDescriptor],
}

#[derive(Deserialize)]
struct GenerateUploadUrlsResponse {
    #[serde(alias = "preSignedUrls", default)]
    pre_signed_urls: HashMap<String, String>,
}

#[async_trait]
impl ControlPlane for HttpControlPlane {
    async fn generate_security_token(&self, project: &str) -> ApiResult<SecurityToken> {
        self.post_json(
            "v1/securityTokens:generate",
            &GenerateSecurityTokenRequest { project },
        )
        .await
    }

    async fn get_file(&self, resource_name: &str) -> ApiResult<Option<RemoteFile>> {
        let url = self.endpoint("v1/files:get")?;
        let mut req = self
            .client
            .post(url)
            .json(&GetFileRequest {
                name: resource_name,
            });
        if let Some(token) = &self.auth_token {
            req = req.bearer_auth(token);
        }
        let resp = req.send().await?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let resp = resp.error_for_status()?;
        Ok(Some(resp.json().await?))
    }

    async fn generate_file_upload_urls(
        &self,
        parent: &str,
        files: &[FileDescriptor],
    ) -> ApiResult<HashMap<String, String>> {
        let resp: GenerateUploadUrlsResponse = self
            .post_json(
                "v1/files:generateUploadUrls",
                &GenerateUploadUrlsRequest { parent, files },
            )
            .await?;
        Ok(resp.pre_signed_urls)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_joins_base_url() {
        let plane = HttpControlPlane::new("https://api.example.com/", None).unwrap();
        let url = plane.endpoint("v1/files:get").unwrap();
        assert_eq!(url.as_str(), "https://api.example.com/v1/files:get");
    }

    #[test]
    fn rejects_invalid_base_url() {
        assert!(HttpControlPlane::new("not a url", None).is_err());
    }

    #[test]
    fn upload_urls_response_accepts_both_casings() {
        let camel: GenerateUploadUrlsResponse =
            serde_json::from_str(r#"{"preSignedUrls":{"a":"u"}}"#).unwrap();
        assert_eq!(camel.pre_signed_urls.get("a").unwrap(), "u");
        let snake: GenerateUploadUrlsResponse =
            serde_json::from_str(r#"{"pre_signed_urls":{"a":"u"}}"#).unwrap();
        assert_eq!(snake.pre_signed_urls.get("a").unwrap(), "u");
    }
}
