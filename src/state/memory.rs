// In-memory watermark store for tests and local runs

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;

use super::{JobState, StateField, WatermarkStore};
use crate::types::AppResult;

#[derive(Clone, Default)]
pub struct InMemoryWatermarkStore {
    inner: Arc<RwLock<HashMap<String, JobState>>>,
    reads: Arc<AtomicUsize>,
    writes: Arc<AtomicUsize>,
}

impl InMemoryWatermarkStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a record directly, bypassing the counters.
    pub async fn insert(&self, job_name: &str, state: JobState) {
        let mut guard = self.inner.write().await;
        guard.insert(job_name.to_string(), state);
    }

    pub async fn snapshot(&self, job_name: &str) -> Option<JobState> {
        let guard = self.inner.read().await;
        guard.get(job_name).cloned()
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WatermarkStore for InMemoryWatermarkStore {
    async fn get(&self, job_name: &str) -> AppResult<Option<JobState>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let guard = self.inner.read().await;
        Ok(guard.get(job_name).cloned())
    }

    async fn set_field(
        &self,
        job_name: &str,
        field: StateField,
        value: DateTime<Utc>,
    ) -> AppResult<()> {
        // Separate read and write, same round trip shape as the remote stores
        let mut state = self.get(job_name).await?.unwrap_or_default();
        state.set(field, value);

        self.writes.fetch_add(1, Ordering::SeqCst);
        let mut guard = self.inner.write().await;
        guard.insert(job_name.to_string(), state);
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
