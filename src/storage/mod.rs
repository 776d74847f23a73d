// Object storage layer (Cloud Storage)

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};

use crate::types::AppResult;

pub mod gcs_client;
pub mod memory;

pub use gcs_client::*;
pub use memory::*;

/// Listing entry for one stored object.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectMeta {
    pub bucket: String,
    pub name: String,
    pub updated: DateTime<Utc>,
}

impl ObjectMeta {
    pub fn uri(&self) -> String {
        format!("gs://{}/{}", self.bucket, self.name)
    }
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Lists every object under `prefix`, in no particular order.
    async fn list(&self, bucket: &str, prefix: &str) -> AppResult<Vec<ObjectMeta>>;

    /// Downloads an object; `None` when it does not exist.
    async fn get(&self, bucket: &str, name: &str) -> AppResult<Option<Bytes>>;
}
