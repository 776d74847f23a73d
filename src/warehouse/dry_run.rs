// Dry-run loader: records load requests instead of running them

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

use super::{LoadJobConfig, LoadOutcome, LoadSource, WarehouseLoader};
use crate::types::{AppError, AppResult};

#[derive(Clone, Default)]
pub struct DryRunLoader {
    calls: Arc<Mutex<Vec<(LoadSource, LoadJobConfig)>>>,
    failure: Option<String>,
}

impl DryRunLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// A loader whose every load fails with `message`.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            calls: Arc::default(),
            failure: Some(message.into()),
        }
    }

    pub async fn calls(&self) -> Vec<(LoadSource, LoadJobConfig)> {
        self.calls.lock().await.clone()
    }
}

#[async_trait]
impl WarehouseLoader for DryRunLoader {
    async fn load(&self, source: &LoadSource, config: &LoadJobConfig) -> AppResult<LoadOutcome> {
        let mut calls = self.calls.lock().await;
        calls.push((source.clone(), config.clone()));
        let sequence = calls.len();
        drop(calls);

        info!(
            destination = %config.destination,
            uris = source.uris().len(),
            "Dry run: skipping load job"
        );

        match &self.failure {
            Some(message) => Err(AppError::Warehouse(message.clone())),
            None => Ok(LoadOutcome {
                job_id: format!("dry-run-{}", sequence),
                output_rows: None,
                input_files: match source {
                    LoadSource::Wildcard(_) => None,
                    LoadSource::Uris(uris) => Some(uris.len() as u64),
                },
            }),
        }
    }
}
