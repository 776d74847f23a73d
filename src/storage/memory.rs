// In-memory object store for tests and local runs

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;

use super::{ObjectMeta, ObjectStore};
use crate::types::AppResult;

#[derive(Debug, Clone)]
struct StoredObject {
    data: Bytes,
    updated: DateTime<Utc>,
}

#[derive(Clone, Default)]
pub struct MemoryObjectStore {
    objects: Arc<RwLock<BTreeMap<(String, String), StoredObject>>>,
    list_calls: Arc<AtomicUsize>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn put(
        &self,
        bucket: &str,
        name: &str,
        data: impl Into<Bytes>,
        updated: DateTime<Utc>,
    ) {
        let mut guard = self.objects.write().await;
        guard.insert(
            (bucket.to_string(), name.to_string()),
            StoredObject {
                data: data.into(),
                updated,
            },
        );
    }

    /// Number of `list` calls served so far.
    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn list(&self, bucket: &str, prefix: &str) -> AppResult<Vec<ObjectMeta>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let guard = self.objects.read().await;
        Ok(guard
            .iter()
            .filter(|((b, name), _)| b == bucket && name.starts_with(prefix))
            .map(|((b, name), object)| ObjectMeta {
                bucket: b.clone(),
                name: name.clone(),
                updated: object.updated,
            })
            .collect())
    }

    async fn get(&self, bucket: &str, name: &str) -> AppResult<Option<Bytes>> {
        let guard = self.objects.read().await;
        Ok(guard
            .get(&(bucket.to_string(), name.to_string()))
            .map(|o| o.data.clone()))
    }
}
