//! Google Cloud credentials
//!
//! Two kinds of token flow through the service:
//! - OAuth2 access tokens for calling Google APIs (Storage, Datastore,
//!   BigQuery, Cloud Tasks), discovered by `gcp_auth`
//! - OIDC identity tokens attached to queued tasks so the load endpoint can
//!   authenticate the caller, minted by the metadata server
//!
//! Both are traits so emulators and tests can hand in a fixed token.

use async_trait::async_trait;
use gcp_auth::TokenProvider;
use reqwest::Client;
use std::sync::Arc;
use tracing::debug;

use crate::types::{AppError, AppResult};

pub const CLOUD_PLATFORM_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";

const METADATA_ENDPOINT: &str = "http://metadata.google.internal";

#[async_trait]
pub trait AccessTokenSource: Send + Sync {
    async fn access_token(&self) -> AppResult<String>;
}

#[async_trait]
pub trait IdTokenSource: Send + Sync {
    /// Mints a short-lived identity token for `audience`.
    async fn id_token(&self, audience: &str) -> AppResult<String>;
}

/// Access tokens from Application Default Credentials.
pub struct GcpTokenSource {
    provider: Arc<dyn TokenProvider>,
}

impl GcpTokenSource {
    pub async fn new() -> AppResult<Self> {
        let provider = gcp_auth::provider()
            .await
            .map_err(|e| AppError::Auth(format!("Failed to initialize GCP auth: {e}")))?;
        Ok(Self { provider })
    }
}

#[async_trait]
impl AccessTokenSource for GcpTokenSource {
    async fn access_token(&self) -> AppResult<String> {
        let token = self
            .provider
            .token(&[CLOUD_PLATFORM_SCOPE])
            .await
            .map_err(|e| AppError::Auth(format!("Failed to get GCP access token: {e}")))?;
        Ok(token.as_str().to_string())
    }
}

/// A fixed token, used against emulators and in tests.
#[derive(Debug, Clone)]
pub struct StaticToken(pub String);

#[async_trait]
impl AccessTokenSource for StaticToken {
    async fn access_token(&self) -> AppResult<String> {
        Ok(self.0.clone())
    }
}

#[async_trait]
impl IdTokenSource for StaticToken {
    async fn id_token(&self, _audience: &str) -> AppResult<String> {
        Ok(self.0.clone())
    }
}

/// Identity tokens from the compute metadata server of the running service account.
pub struct MetadataIdTokenSource {
    client: Client,
    endpoint: String,
}

impl MetadataIdTokenSource {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            endpoint: METADATA_ENDPOINT.to_string(),
        }
    }

    pub fn with_endpoint(client: Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl IdTokenSource for MetadataIdTokenSource {
    async fn id_token(&self, audience: &str) -> AppResult<String> {
        debug!(audience, "Minting identity token");

        let url = format!(
            "{}/computeMetadata/v1/instance/service-accounts/default/identity",
            self.endpoint
        );
        let response = self
            .client
            .get(&url)
            .header("Metadata-Flavor", "Google")
            .query(&[("audience", audience)])
            .send()
            .await
            .map_err(|e| AppError::Auth(format!("Metadata server unreachable: {e}")))?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(AppError::Auth(format!(
                "Identity token request failed: {} - {}",
                status, body
            )));
        }

        Ok(body.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_metadata_id_token() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock(
                "GET",
                "/computeMetadata/v1/instance/service-accounts/default/identity",
            )
            .match_header("Metadata-Flavor", "Google")
            .match_query(mockito::Matcher::UrlEncoded(
                "audience".into(),
                "https://loader.example.com".into(),
            ))
            .with_status(200)
            .with_body("eyJ.token.sig\n")
            .create_async()
            .await;

        let source = MetadataIdTokenSource::with_endpoint(Client::new(), server.url());
        let token = source.id_token("https://loader.example.com").await.unwrap();

        assert_eq!(token, "eyJ.token.sig");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_metadata_id_token_failure() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock(
                "GET",
                "/computeMetadata/v1/instance/service-accounts/default/identity",
            )
            .match_query(mockito::Matcher::Any)
            .with_status(404)
            .create_async()
            .await;

        let source = MetadataIdTokenSource::with_endpoint(Client::new(), server.url());
        let err = source.id_token("aud").await.unwrap_err();
        assert!(matches!(err, AppError::Auth(_)));
    }
}
