//! Cloud Datastore watermark store
//!
//! Each job is one entity of kind `data-pipelines` (configurable) named after
//! the job. Property names match the records written by earlier deployments
//! of the loader, so existing state carries over:
//!
//! | field               | property              |
//! |---------------------|-----------------------|
//! | `last_attempted_at` | `last_attempted_grab` |
//! | `last_watermark`    | `last_modified_time`  |
//!
//! Writes are non-transactional upserts of the full entity. The entity is
//! looked up first and every property, known or not, is written back.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::debug;

use super::{JobState, StateField, WatermarkStore};
use crate::auth::AccessTokenSource;
use crate::types::{AppError, AppResult};

pub const DATASTORE_ENDPOINT: &str = "https://datastore.googleapis.com";
pub const DEFAULT_KIND: &str = "data-pipelines";

const LAST_ATTEMPTED_PROPERTY: &str = "last_attempted_grab";
const LAST_WATERMARK_PROPERTY: &str = "last_modified_time";

pub struct DatastoreWatermarkStore {
    client: Client,
    tokens: Arc<dyn AccessTokenSource>,
    endpoint: String,
    project_id: String,
    kind: String,
}

#[derive(Deserialize)]
struct LookupResponse {
    #[serde(default)]
    found: Vec<EntityResult>,
}

#[derive(Deserialize)]
struct EntityResult {
    entity: Entity,
}

#[derive(Deserialize)]
struct Entity {
    #[serde(default)]
    properties: Map<String, Value>,
}

fn property_name(field: StateField) -> &'static str {
    match field {
        StateField::LastAttemptedAt => LAST_ATTEMPTED_PROPERTY,
        StateField::LastWatermark => LAST_WATERMARK_PROPERTY,
    }
}

fn timestamp_value(value: DateTime<Utc>) -> Value {
    json!({ "timestampValue": value.to_rfc3339_opts(SecondsFormat::Micros, true) })
}

fn read_timestamp(properties: &Map<String, Value>, name: &str) -> Option<DateTime<Utc>> {
    properties
        .get(name)
        .and_then(|v| v.get("timestampValue"))
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

fn state_from_properties(properties: &Map<String, Value>) -> JobState {
    JobState {
        last_attempted_at: read_timestamp(properties, LAST_ATTEMPTED_PROPERTY),
        last_watermark: read_timestamp(properties, LAST_WATERMARK_PROPERTY),
    }
}

impl DatastoreWatermarkStore {
    pub fn new(
        client: Client,
        tokens: Arc<dyn AccessTokenSource>,
        project_id: impl Into<String>,
    ) -> Self {
        Self {
            client,
            tokens,
            endpoint: DATASTORE_ENDPOINT.to_string(),
            project_id: project_id.into(),
            kind: DEFAULT_KIND.to_string(),
        }
    }

    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = kind.into();
        self
    }

    /// Points the store at a different host, e.g. the Datastore emulator.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into().trim_end_matches('/').to_string();
        self
    }

    fn key(&self, job_name: &str) -> Value {
        json!({
            "partitionId": { "projectId": self.project_id },
            "path": [{ "kind": self.kind, "name": job_name }]
        })
    }

    async fn call(&self, method: &str, body: &Value) -> AppResult<reqwest::Response> {
        let token = self.tokens.access_token().await?;
        let url = format!("{}/v1/projects/{}:{}", self.endpoint, self.project_id, method);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&token)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(AppError::Store(format!(
            "Datastore {} failed: {} - {}",
            method, status, body
        )))
    }

    /// All stored properties of the job's entity, `None` if it does not exist.
    async fn lookup(&self, job_name: &str) -> AppResult<Option<Map<String, Value>>> {
        let response = self
            .call("lookup", &json!({ "keys": [self.key(job_name)] }))
            .await?;
        let lookup: LookupResponse = response.json().await?;

        Ok(lookup
            .found
            .into_iter()
            .next()
            .map(|result| result.entity.properties))
    }
}

#[async_trait]
impl WatermarkStore for DatastoreWatermarkStore {
    async fn get(&self, job_name: &str) -> AppResult<Option<JobState>> {
        Ok(self
            .lookup(job_name)
            .await?
            .map(|properties| state_from_properties(&properties)))
    }

    async fn set_field(
        &self,
        job_name: &str,
        field: StateField,
        value: DateTime<Utc>,
    ) -> AppResult<()> {
        let mut properties = self.lookup(job_name).await?.unwrap_or_default();
        properties.insert(property_name(field).to_string(), timestamp_value(value));

        debug!(job_name, %field, %value, kind = %self.kind, "Upserting Datastore entity");

        let body = json!({
            "mode": "NON_TRANSACTIONAL",
            "mutations": [{
                "upsert": {
                    "key": self.key(job_name),
                    "properties": properties
                }
            }]
        });
        self.call("commit", &body).await?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "datastore"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::StaticToken;
    use chrono::TimeZone;
    use mockito::Matcher;

    fn store_for(server: &mockito::ServerGuard) -> DatastoreWatermarkStore {
        DatastoreWatermarkStore::new(
            Client::new(),
            Arc::new(StaticToken("test-token".to_string())),
            "my-project",
        )
        .with_endpoint(server.url())
    }

    #[test]
    fn test_state_from_properties() {
        let properties = json!({
            "last_attempted_grab": { "timestampValue": "2024-03-01T10:05:00.123456Z" },
            "last_modified_time": { "timestampValue": "2024-03-01T10:00:00Z" },
            "owner": { "stringValue": "data-eng" }
        });

        let state = state_from_properties(properties.as_object().unwrap());
        assert_eq!(
            state.last_watermark,
            Some(Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap())
        );
        assert!(state.last_attempted_at.is_some());
    }

    #[test]
    fn test_missing_or_null_properties() {
        let properties = json!({ "last_modified_time": { "nullValue": null } });
        let state = state_from_properties(properties.as_object().unwrap());
        assert_eq!(state, JobState::default());
    }

    #[tokio::test]
    async fn test_get_absent_entity() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/projects/my-project:lookup")
            .match_body(Matcher::Regex(
                r#""kind":"data-pipelines","name":"orders""#.to_string(),
            ))
            .with_status(200)
            .with_body(r#"{"missing":[{"entity":{}}]}"#)
            .create_async()
            .await;

        let state = store_for(&server).get("orders").await.unwrap();
        assert!(state.is_none());
    }

    #[tokio::test]
    async fn test_set_field_preserves_unknown_properties() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/projects/my-project:lookup")
            .with_status(200)
            .with_body(
                r#"{"found":[{"entity":{"properties":{
                    "owner":{"stringValue":"data-eng"},
                    "last_modified_time":{"timestampValue":"2024-03-01T09:00:00Z"}
                }}}]}"#,
            )
            .create_async()
            .await;
        let commit = server
            .mock("POST", "/v1/projects/my-project:commit")
            .match_body(Matcher::AllOf(vec![
                Matcher::Regex(r#""mode":"NON_TRANSACTIONAL""#.to_string()),
                Matcher::Regex(r#""owner":\{"stringValue":"data-eng"\}"#.to_string()),
                Matcher::Regex(
                    r#""last_attempted_grab":\{"timestampValue":"2024-03-01T10:00:00.000000Z"\}"#
                        .to_string(),
                ),
                Matcher::Regex(
                    r#""last_modified_time":\{"timestampValue":"2024-03-01T09:00:00Z"\}"#
                        .to_string(),
                ),
            ]))
            .with_status(200)
            .with_body(r#"{"mutationResults":[{}]}"#)
            .create_async()
            .await;

        let now = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap();
        store_for(&server)
            .set_field("orders", StateField::LastAttemptedAt, now)
            .await
            .unwrap();

        commit.assert_async().await;
    }

    #[tokio::test]
    async fn test_commit_failure_is_store_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/projects/my-project:lookup")
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;
        server
            .mock("POST", "/v1/projects/my-project:commit")
            .with_status(500)
            .with_body("backend error")
            .create_async()
            .await;

        let err = store_for(&server)
            .set_field("orders", StateField::LastWatermark, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Store(_)));
    }
}
