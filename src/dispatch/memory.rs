// In-memory task queue for tests and local runs

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;

use super::{QueuedTask, TaskQueue};
use crate::types::{AppError, AppResult};

#[derive(Clone, Default)]
pub struct InMemoryTaskQueue {
    tasks: Arc<Mutex<Vec<QueuedTask>>>,
    failing_jobs: Arc<HashSet<String>>,
}

impl InMemoryTaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// A queue that rejects tasks for the given job names.
    pub fn failing_for<I, S>(job_names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tasks: Arc::default(),
            failing_jobs: Arc::new(job_names.into_iter().map(Into::into).collect()),
        }
    }

    pub async fn tasks(&self) -> Vec<QueuedTask> {
        self.tasks.lock().await.clone()
    }
}

#[async_trait]
impl TaskQueue for InMemoryTaskQueue {
    async fn enqueue(&self, task: &QueuedTask) -> AppResult<String> {
        if self.failing_jobs.contains(&task.job_name) {
            return Err(AppError::Dispatch(format!(
                "queue rejected task for {}",
                task.job_name
            )));
        }

        let mut tasks = self.tasks.lock().await;
        tasks.push(task.clone());
        Ok(format!("memory/tasks/{}", tasks.len()))
    }

    fn queue_name(&self) -> String {
        "memory".to_string()
    }
}
