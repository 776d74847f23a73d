// Cloud Storage JSON API client

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;

use super::{ObjectMeta, ObjectStore};
use crate::auth::AccessTokenSource;
use crate::types::{AppError, AppResult};

pub const GCS_ENDPOINT: &str = "https://storage.googleapis.com";

pub struct GcsClient {
    client: Client,
    tokens: Arc<dyn AccessTokenSource>,
    endpoint: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListObjectsResponse {
    #[serde(default)]
    items: Vec<GcsObject>,
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
struct GcsObject {
    name: String,
    updated: DateTime<Utc>,
}

impl GcsClient {
    pub fn new(client: Client, tokens: Arc<dyn AccessTokenSource>) -> Self {
        Self::with_endpoint(client, tokens, GCS_ENDPOINT)
    }

    /// Points the client at a different host, e.g. a storage emulator.
    pub fn with_endpoint(
        client: Client,
        tokens: Arc<dyn AccessTokenSource>,
        endpoint: impl Into<String>,
    ) -> Self {
        Self {
            client,
            tokens,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
        }
    }

    fn bucket_url(&self, bucket: &str) -> AppResult<Url> {
        let mut url = Url::parse(&self.endpoint)
            .map_err(|e| AppError::Storage(format!("Invalid storage endpoint: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| AppError::Storage("Storage endpoint cannot be a base".to_string()))?
            .pop_if_empty()
            .extend(["storage", "v1", "b", bucket, "o"]);
        Ok(url)
    }

    fn object_url(&self, bucket: &str, name: &str) -> AppResult<Url> {
        let mut url = self.bucket_url(bucket)?;
        // push() percent-encodes the '/' separators inside the object name
        url.path_segments_mut()
            .map_err(|_| AppError::Storage("Storage endpoint cannot be a base".to_string()))?
            .push(name);
        Ok(url)
    }
}

#[async_trait]
impl ObjectStore for GcsClient {
    async fn list(&self, bucket: &str, prefix: &str) -> AppResult<Vec<ObjectMeta>> {
        let url = self.bucket_url(bucket)?;
        let token = self.tokens.access_token().await?;
        let mut objects = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self
                .client
                .get(url.clone())
                .bearer_auth(&token)
                .query(&[
                    ("prefix", prefix),
                    ("fields", "items(name,updated),nextPageToken"),
                ]);
            if let Some(page) = &page_token {
                request = request.query(&[("pageToken", page.as_str())]);
            }

            let response = request.send().await?;
            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(AppError::Storage(format!(
                    "Listing gs://{}/{} failed: {} - {}",
                    bucket, prefix, status, body
                )));
            }

            let page: ListObjectsResponse = response.json().await?;
            objects.extend(page.items.into_iter().map(|o| ObjectMeta {
                bucket: bucket.to_string(),
                name: o.name,
                updated: o.updated,
            }));

            match page.next_page_token {
                Some(next) if !next.is_empty() => page_token = Some(next),
                _ => break,
            }
        }

        debug!(bucket, prefix, count = objects.len(), "Listed objects");
        Ok(objects)
    }

    async fn get(&self, bucket: &str, name: &str) -> AppResult<Option<Bytes>> {
        let url = self.object_url(bucket, name)?;
        let token = self.tokens.access_token().await?;

        let response = self
            .client
            .get(url)
            .bearer_auth(&token)
            .query(&[("alt", "media")])
            .send()
            .await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => Ok(Some(response.bytes().await?)),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(AppError::Storage(format!(
                    "Downloading gs://{}/{} failed: {} - {}",
                    bucket, name, status, body
                )))
            }
        }
    }
}
