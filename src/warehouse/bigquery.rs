//! BigQuery load jobs over the REST API
//!
//! A load is a `jobs.insert` followed by `jobs.get` polling until the job
//! reports `DONE`. There is no client-side deadline on the wait; the caller's
//! infrastructure timeout bounds it.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::{LoadJobConfig, LoadOutcome, LoadSource, WarehouseLoader};
use crate::auth::AccessTokenSource;
use crate::types::{AppError, AppResult};

pub const BIGQUERY_ENDPOINT: &str = "https://bigquery.googleapis.com";
pub const DEFAULT_LOCATION: &str = "US";

pub struct BigQueryLoader {
    client: Client,
    tokens: Arc<dyn AccessTokenSource>,
    endpoint: String,
    project_id: String,
    location: String,
    poll_interval: Duration,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobResource {
    job_reference: JobReference,
    status: Option<JobStatus>,
    statistics: Option<JobStatistics>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobReference {
    job_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobStatus {
    state: String,
    error_result: Option<ErrorProto>,
}

#[derive(Debug, Deserialize)]
struct ErrorProto {
    reason: Option<String>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct JobStatistics {
    load: Option<LoadStatistics>,
}

// int64 values arrive as JSON strings
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoadStatistics {
    output_rows: Option<String>,
    input_files: Option<String>,
}

impl JobResource {
    fn is_done(&self) -> bool {
        self.status.as_ref().is_some_and(|s| s.state == "DONE")
    }

    fn into_outcome(self) -> AppResult<LoadOutcome> {
        if let Some(error) = self.status.and_then(|s| s.error_result) {
            return Err(AppError::Warehouse(format!(
                "load job {} failed: {} ({})",
                self.job_reference.job_id,
                error.message.unwrap_or_default(),
                error.reason.unwrap_or_default()
            )));
        }

        let load = self.statistics.and_then(|s| s.load);
        let parse = |v: Option<String>| v.and_then(|s| s.parse::<u64>().ok());
        let (output_rows, input_files) = match load {
            Some(load) => (parse(load.output_rows), parse(load.input_files)),
            None => (None, None),
        };

        Ok(LoadOutcome {
            job_id: self.job_reference.job_id,
            output_rows,
            input_files,
        })
    }
}

/// `skip_leading_rows` → `skipLeadingRows`; camelCase keys pass through.
pub fn to_lower_camel(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    let mut upper_next = false;
    for c in key.chars() {
        if c == '_' {
            upper_next = !out.is_empty();
        } else if upper_next {
            out.extend(c.to_uppercase());
            upper_next = false;
        } else {
            out.push(c);
        }
    }
    out
}

impl BigQueryLoader {
    pub fn new(
        client: Client,
        tokens: Arc<dyn AccessTokenSource>,
        project_id: impl Into<String>,
    ) -> Self {
        Self {
            client,
            tokens,
            endpoint: BIGQUERY_ENDPOINT.to_string(),
            project_id: project_id.into(),
            location: DEFAULT_LOCATION.to_string(),
            poll_interval: Duration::from_secs(2),
        }
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into().trim_end_matches('/').to_string();
        self
    }

    /// Request body for `jobs.insert`.
    pub fn job_body(&self, source: &LoadSource, config: &LoadJobConfig) -> Value {
        let destination = &config.destination;
        let mut load = Map::new();
        load.insert("sourceUris".into(), json!(source.uris()));
        load.insert(
            "destinationTable".into(),
            json!({
                "projectId": destination.project_id.as_deref().unwrap_or(&self.project_id),
                "datasetId": destination.dataset_id,
                "tableId": destination.table_id,
            }),
        );
        load.insert("sourceFormat".into(), json!(config.file_format.source_format()));

        if let Some(schema) = &config.schema {
            load.insert("schema".into(), json!({ "fields": schema }));
        }
        if let Some(create) = config.create_disposition {
            load.insert("createDisposition".into(), json!(create));
        }
        if let Some(write) = config.write_disposition {
            load.insert("writeDisposition".into(), json!(write));
        }
        if let Some(hive) = &config.hive_partitioning {
            load.insert("hivePartitioningOptions".into(), json!(hive));
        }

        for (key, value) in &config.extra_options {
            let key = to_lower_camel(key);
            if load.contains_key(&key) {
                warn!(option = %key, "Ignoring extra option that overrides a job setting");
                continue;
            }
            load.insert(key, value.clone());
        }

        json!({
            "jobReference": { "projectId": self.project_id, "location": self.location },
            "configuration": { "load": load }
        })
    }

    fn jobs_url(&self) -> String {
        format!("{}/bigquery/v2/projects/{}/jobs", self.endpoint, self.project_id)
    }

    async fn read_job(response: reqwest::Response, action: &str) -> AppResult<JobResource> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Warehouse(format!(
                "{} failed: {} - {}",
                action, status, body
            )));
        }
        Ok(response.json().await?)
    }

    async fn insert(&self, body: &Value) -> AppResult<JobResource> {
        let token = self.tokens.access_token().await?;
        let response = self
            .client
            .post(self.jobs_url())
            .bearer_auth(&token)
            .json(body)
            .send()
            .await?;
        Self::read_job(response, "jobs.insert").await
    }

    async fn poll(&self, job_id: &str) -> AppResult<JobResource> {
        let token = self.tokens.access_token().await?;
        let response = self
            .client
            .get(format!("{}/{}", self.jobs_url(), job_id))
            .bearer_auth(&token)
            .query(&[("location", self.location.as_str())])
            .send()
            .await?;
        Self::read_job(response, "jobs.get").await
    }
}

#[async_trait]
impl WarehouseLoader for BigQueryLoader {
    async fn load(&self, source: &LoadSource, config: &LoadJobConfig) -> AppResult<LoadOutcome> {
        let body = self.job_body(source, config);
        let mut job = self.insert(&body).await?;
        let job_id = job.job_reference.job_id.clone();
        debug!(job_id = %job_id, destination = %config.destination, "Load job submitted");

        while !job.is_done() {
            tokio::time::sleep(self.poll_interval).await;
            job = self.poll(&job_id).await?;
        }

        job.into_outcome()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::StaticToken;
    use crate::jobs::{CreateDisposition, FileFormat, HivePartitioning, WriteDisposition};
    use mockito::Matcher;

    fn loader() -> BigQueryLoader {
        BigQueryLoader::new(
            Client::new(),
            Arc::new(StaticToken("test-token".to_string())),
            "loader-project",
        )
    }

    fn config() -> LoadJobConfig {
        let mut extra_options = Map::new();
        extra_options.insert("skip_leading_rows".into(), json!(1));
        extra_options.insert("sourceFormat".into(), json!("AVRO"));

        LoadJobConfig {
            destination: "raw.orders".parse().unwrap(),
            file_format: FileFormat::Csv,
            schema: None,
            create_disposition: Some(CreateDisposition::CreateIfNeeded),
            write_disposition: Some(WriteDisposition::WriteAppend),
            hive_partitioning: Some(HivePartitioning {
                mode: Some("AUTO".into()),
                source_uri_prefix: Some("gs://landing/orders/".into()),
                require_partition_filter: None,
            }),
            extra_options,
        }
    }

    #[test]
    fn test_to_lower_camel() {
        assert_eq!(to_lower_camel("skip_leading_rows"), "skipLeadingRows");
        assert_eq!(to_lower_camel("ignoreUnknownValues"), "ignoreUnknownValues");
        assert_eq!(to_lower_camel("autodetect"), "autodetect");
        assert_eq!(to_lower_camel("_private"), "private");
    }

    #[test]
    fn test_job_body() {
        let body = loader().job_body(
            &LoadSource::Wildcard("gs://landing/orders/*".into()),
            &config(),
        );
        let load = &body["configuration"]["load"];

        assert_eq!(body["jobReference"]["location"], "US");
        assert_eq!(load["sourceUris"], json!(["gs://landing/orders/*"]));
        assert_eq!(load["destinationTable"]["projectId"], "loader-project");
        assert_eq!(load["destinationTable"]["tableId"], "orders");
        assert_eq!(load["createDisposition"], "CREATE_IF_NEEDED");
        assert_eq!(load["writeDisposition"], "WRITE_APPEND");
        assert_eq!(load["hivePartitioningOptions"]["sourceUriPrefix"], "gs://landing/orders/");
        assert_eq!(load["skipLeadingRows"], 1);
        // extra options never override the resolved job settings
        assert_eq!(load["sourceFormat"], "CSV");
        assert!(load.get("schema").is_none());
    }

    #[tokio::test]
    async fn test_load_done_on_insert() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/bigquery/v2/projects/loader-project/jobs")
            .match_header("authorization", "Bearer test-token")
            .with_status(200)
            .with_body(
                r#"{"jobReference":{"projectId":"loader-project","jobId":"job_1"},
                    "status":{"state":"DONE"},
                    "statistics":{"load":{"outputRows":"42","inputFiles":"2"}}}"#,
            )
            .create_async()
            .await;

        let outcome = loader()
            .with_endpoint(server.url())
            .load(&LoadSource::Uris(vec!["gs://a/b.csv".into()]), &config())
            .await
            .unwrap();

        assert_eq!(outcome.job_id, "job_1");
        assert_eq!(outcome.output_rows, Some(42));
        assert_eq!(outcome.input_files, Some(2));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_load_polls_until_failed() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/bigquery/v2/projects/loader-project/jobs")
            .with_status(200)
            .with_body(r#"{"jobReference":{"jobId":"job_2"},"status":{"state":"RUNNING"}}"#)
            .create_async()
            .await;
        let poll = server
            .mock("GET", "/bigquery/v2/projects/loader-project/jobs/job_2")
            .match_query(Matcher::UrlEncoded("location".into(), "US".into()))
            .with_status(200)
            .with_body(
                r#"{"jobReference":{"jobId":"job_2"},
                    "status":{"state":"DONE","errorResult":{"reason":"invalid","message":"bad row"}}}"#,
            )
            .create_async()
            .await;

        let err = loader()
            .with_endpoint(server.url())
            .with_poll_interval(Duration::from_millis(1))
            .load(&LoadSource::Uris(vec!["gs://a/b.csv".into()]), &config())
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Warehouse(ref msg) if msg.contains("bad row")));
        poll.assert_async().await;
    }
}
