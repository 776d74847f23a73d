// Cloud Tasks queue over the REST API

use async_trait::async_trait;
use base64::Engine;
use chrono::SecondsFormat;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use super::{QueuedTask, TaskQueue};
use crate::auth::AccessTokenSource;
use crate::types::{AppError, AppResult};

pub const CLOUD_TASKS_ENDPOINT: &str = "https://cloudtasks.googleapis.com";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloudTasksConfig {
    pub project_id: String,
    pub location: String,
    pub queue_name: String,
}

impl CloudTasksConfig {
    pub fn new(
        project_id: impl Into<String>,
        location: impl Into<String>,
        queue_name: impl Into<String>,
    ) -> Self {
        Self {
            project_id: project_id.into(),
            location: location.into(),
            queue_name: queue_name.into(),
        }
    }

    pub fn queue_path(&self) -> String {
        format!(
            "projects/{}/locations/{}/queues/{}",
            self.project_id, self.location, self.queue_name
        )
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateTaskRequest {
    task: CloudTask,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CloudTask {
    http_request: HttpRequest,
    schedule_time: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HttpRequest {
    url: String,
    http_method: &'static str,
    headers: HashMap<String, String>,
    /// Base64 encoded.
    body: String,
}

#[derive(Debug, Deserialize)]
struct CloudTasksErrorResponse {
    error: CloudTasksError,
}

#[derive(Debug, Deserialize)]
struct CloudTasksError {
    message: String,
    status: String,
}

#[derive(Debug, Deserialize)]
struct CreatedTask {
    name: String,
}

pub struct CloudTasksQueue {
    client: Client,
    tokens: Arc<dyn AccessTokenSource>,
    endpoint: String,
    config: CloudTasksConfig,
}

impl CloudTasksQueue {
    pub fn new(client: Client, tokens: Arc<dyn AccessTokenSource>, config: CloudTasksConfig) -> Self {
        Self {
            client,
            tokens,
            endpoint: CLOUD_TASKS_ENDPOINT.to_string(),
            config,
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into().trim_end_matches('/').to_string();
        self
    }

    fn request_for(task: &QueuedTask) -> CreateTaskRequest {
        let mut headers = HashMap::new();
        headers.insert("Content-Type".to_string(), "application/json".to_string());
        headers.insert(
            "Authorization".to_string(),
            format!("Bearer {}", task.auth_token),
        );

        CreateTaskRequest {
            task: CloudTask {
                http_request: HttpRequest {
                    url: task.target_url.clone(),
                    http_method: "POST",
                    headers,
                    body: base64::engine::general_purpose::STANDARD.encode(&task.body),
                },
                schedule_time: task
                    .scheduled_at
                    .to_rfc3339_opts(SecondsFormat::Nanos, true),
            },
        }
    }
}

#[async_trait]
impl TaskQueue for CloudTasksQueue {
    async fn enqueue(&self, task: &QueuedTask) -> AppResult<String> {
        let token = self.tokens.access_token().await?;
        let url = format!("{}/v2/{}/tasks", self.endpoint, self.config.queue_path());

        let response = self
            .client
            .post(&url)
            .bearer_auth(&token)
            .json(&Self::request_for(task))
            .send()
            .await
            .map_err(|e| AppError::Dispatch(format!("Cloud Tasks request failed: {e}")))?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            let detail = match serde_json::from_str::<CloudTasksErrorResponse>(&body) {
                Ok(parsed) => format!("{} ({})", parsed.error.message, parsed.error.status),
                Err(_) => format!("{} - {}", status, body),
            };
            return Err(AppError::Dispatch(format!("Cloud Tasks API error: {}", detail)));
        }

        let created: CreatedTask = serde_json::from_str(&body)?;
        debug!(task_name = %created.name, job_name = %task.job_name, "Task created");
        Ok(created.name)
    }

    fn queue_name(&self) -> String {
        self.config.queue_path()
    }
}
