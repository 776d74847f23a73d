//! Dispatcher
//!
//! Fans a fixed list of job names out to a task queue, one HTTP task per job,
//! each aimed at the load endpoint with `{"job_name": ...}` as its body. The
//! per-job enqueues run concurrently and one failing never stops the others.

pub mod cloud_tasks;
pub mod memory;

pub use cloud_tasks::*;
pub use memory::*;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info};

use crate::auth::IdTokenSource;
use crate::types::{AppError, AppResult};

pub const ALL_QUEUED_MESSAGE: &str = "All object pulls queued";

/// What the load endpoint should do, and when.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchRequest {
    pub job_name: String,
    pub scheduled_at: DateTime<Utc>,
}

/// A fully built HTTP task, ready for a queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedTask {
    pub job_name: String,
    pub target_url: String,
    pub auth_token: String,
    pub scheduled_at: DateTime<Utc>,
    pub body: Vec<u8>,
}

impl QueuedTask {
    pub fn new(
        request: &DispatchRequest,
        target_url: impl Into<String>,
        auth_token: impl Into<String>,
    ) -> AppResult<Self> {
        Ok(Self {
            job_name: request.job_name.clone(),
            target_url: target_url.into(),
            auth_token: auth_token.into(),
            scheduled_at: request.scheduled_at,
            body: serde_json::to_vec(&json!({ "job_name": request.job_name }))?,
        })
    }
}

#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Enqueues a task and returns the name the queue assigned it.
    async fn enqueue(&self, task: &QueuedTask) -> AppResult<String>;

    fn queue_name(&self) -> String;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DispatchStatus {
    Queued { task_name: String },
    QueueFailed { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobDispatch {
    pub job_name: String,
    #[serde(flatten)]
    pub status: DispatchStatus,
}

impl JobDispatch {
    pub fn is_queued(&self) -> bool {
        matches!(self.status, DispatchStatus::Queued { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
    pub message: String,
    pub jobs: Vec<JobDispatch>,
}

impl DispatchReport {
    pub fn queued(&self) -> usize {
        self.jobs.iter().filter(|j| j.is_queued()).count()
    }

    pub fn failed(&self) -> usize {
        self.jobs.len() - self.queued()
    }
}

pub struct Dispatcher {
    job_names: Vec<String>,
    target_url: String,
    queue: Arc<dyn TaskQueue>,
    id_tokens: Arc<dyn IdTokenSource>,
}

impl Dispatcher {
    pub fn new(
        job_names: Vec<String>,
        target_url: impl Into<String>,
        queue: Arc<dyn TaskQueue>,
        id_tokens: Arc<dyn IdTokenSource>,
    ) -> Self {
        Self {
            job_names,
            target_url: target_url.into(),
            queue,
            id_tokens,
        }
    }

    pub fn job_names(&self) -> &[String] {
        &self.job_names
    }

    pub async fn dispatch_all(&self) -> DispatchReport {
        self.dispatch_at(Utc::now()).await
    }

    /// Enqueues one task per configured job, all scheduled at `now`, and
    /// returns once every enqueue has finished.
    pub async fn dispatch_at(&self, now: DateTime<Utc>) -> DispatchReport {
        let jobs = join_all(
            self.job_names
                .iter()
                .map(|job_name| self.dispatch_one(job_name, now)),
        )
        .await;

        let report = DispatchReport {
            message: ALL_QUEUED_MESSAGE.to_string(),
            jobs,
        };
        info!(
            queue = %self.queue.queue_name(),
            queued = report.queued(),
            failed = report.failed(),
            "{}",
            ALL_QUEUED_MESSAGE
        );
        report
    }

    async fn dispatch_one(&self, job_name: &str, now: DateTime<Utc>) -> JobDispatch {
        let status = match self.enqueue(job_name, now).await {
            Ok(task_name) => {
                info!(%job_name, "Successfully created task. Task name: {}", task_name);
                DispatchStatus::Queued { task_name }
            }
            Err(e) => {
                error!(%job_name, "Error adding task to queue. Error: {}", e);
                DispatchStatus::QueueFailed {
                    error: e.to_string(),
                }
            }
        };

        JobDispatch {
            job_name: job_name.to_string(),
            status,
        }
    }

    async fn enqueue(&self, job_name: &str, now: DateTime<Utc>) -> AppResult<String> {
        if job_name.trim().is_empty() {
            return Err(AppError::Dispatch("job name is empty".to_string()));
        }

        let token = self.id_tokens.id_token(&self.target_url).await?;
        let request = DispatchRequest {
            job_name: job_name.to_string(),
            scheduled_at: now,
        };
        let task = QueuedTask::new(&request, &self.target_url, token)?;
        self.queue.enqueue(&task).await
    }
}
