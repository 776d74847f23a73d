//! Job configuration sources
//!
//! The document is a JSON object keyed by job name. It is re-read on every
//! run, so edits to the document take effect on the next invocation without
//! a redeploy.

use async_trait::async_trait;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error};

use super::{JobSpec, TableFieldSchema};
use crate::storage::ObjectStore;
use crate::types::{AppError, AppResult};

#[async_trait]
pub trait JobConfigSource: Send + Sync {
    /// Resolves and validates the [`JobSpec`] for one job.
    async fn resolve(&self, job_name: &str) -> AppResult<JobSpec>;

    /// Loads the table schema referenced by a job spec.
    async fn schema(&self, schema_ref: &str) -> AppResult<Vec<TableFieldSchema>>;
}

/// Picks one job out of a raw configuration document.
pub fn spec_from_document(document: &[u8], job_name: &str) -> AppResult<JobSpec> {
    let parsed: Value = serde_json::from_slice(document).map_err(|e| {
        error!("Could not parse the job configuration document: {}", e);
        AppError::ResourceUnavailable(format!("config document is corrupt: {e}"))
    })?;

    let Value::Object(mut jobs) = parsed else {
        return Err(AppError::ResourceUnavailable(
            "config document is not a JSON object".to_string(),
        ));
    };

    let entry = jobs
        .remove(job_name)
        .filter(|v| !v.is_null())
        .ok_or_else(|| AppError::JobNotFound(job_name.to_string()))?;

    JobSpec::from_value(job_name, entry)
}

/// Parses a schema document: a field array, or an object with a `fields` array.
pub fn schema_from_document(document: &[u8], schema_ref: &str) -> AppResult<Vec<TableFieldSchema>> {
    #[derive(serde::Deserialize)]
    #[serde(untagged)]
    enum SchemaDocument {
        Fields(Vec<TableFieldSchema>),
        Wrapped { fields: Vec<TableFieldSchema> },
    }

    match serde_json::from_slice::<SchemaDocument>(document) {
        Ok(SchemaDocument::Fields(fields)) | Ok(SchemaDocument::Wrapped { fields }) => Ok(fields),
        Err(e) => {
            error!("Could not transform schema {} into a table schema", schema_ref);
            Err(AppError::ResourceUnavailable(format!(
                "schema {schema_ref} is not a valid table schema: {e}"
            )))
        }
    }
}

/// Reads the document and schemas from a bucket.
pub struct BucketJobConfigSource {
    store: Arc<dyn ObjectStore>,
    bucket: String,
    config_object: String,
    schema_prefix: String,
}

impl BucketJobConfigSource {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        bucket: impl Into<String>,
        config_object: impl Into<String>,
        schema_prefix: impl Into<String>,
    ) -> Self {
        Self {
            store,
            bucket: bucket.into(),
            config_object: config_object.into(),
            schema_prefix: schema_prefix.into(),
        }
    }

    async fn fetch(&self, name: &str, what: &str) -> AppResult<bytes::Bytes> {
        let data = self.store.get(&self.bucket, name).await.map_err(|e| {
            error!("{} exists but cannot be downloaded: {}", what, e);
            AppError::ResourceUnavailable(format!("{what} could not be downloaded: {e}"))
        })?;

        data.ok_or_else(|| {
            AppError::ResourceUnavailable(format!(
                "{} gs://{}/{} does not exist.",
                what, self.bucket, name
            ))
        })
    }
}

#[async_trait]
impl JobConfigSource for BucketJobConfigSource {
    async fn resolve(&self, job_name: &str) -> AppResult<JobSpec> {
        debug!("Grabbing config file for {}", job_name);
        let document = self.fetch(&self.config_object, "Config file").await?;
        spec_from_document(&document, job_name)
    }

    async fn schema(&self, schema_ref: &str) -> AppResult<Vec<TableFieldSchema>> {
        let name = format!("{}{}", self.schema_prefix, schema_ref);
        let document = self.fetch(&name, "Schema file").await?;
        schema_from_document(&document, schema_ref)
    }
}

/// Reads the document and schemas from the local filesystem.
pub struct FileJobConfigSource {
    config_path: PathBuf,
    schema_dir: PathBuf,
}

impl FileJobConfigSource {
    pub fn new(config_path: impl Into<PathBuf>, schema_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
            schema_dir: schema_dir.into(),
        }
    }

    async fn read(path: &PathBuf) -> AppResult<Vec<u8>> {
        tokio::fs::read(path).await.map_err(|e| {
            AppError::ResourceUnavailable(format!("{} could not be read: {e}", path.display()))
        })
    }
}

#[async_trait]
impl JobConfigSource for FileJobConfigSource {
    async fn resolve(&self, job_name: &str) -> AppResult<JobSpec> {
        let document = Self::read(&self.config_path).await?;
        spec_from_document(&document, job_name)
    }

    async fn schema(&self, schema_ref: &str) -> AppResult<Vec<TableFieldSchema>> {
        let document = Self::read(&self.schema_dir.join(schema_ref)).await?;
        schema_from_document(&document, schema_ref)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryObjectStore;
    use chrono::Utc;
    use serde_json::json;
    use tempfile::TempDir;

    fn document() -> Vec<u8> {
        serde_json::to_vec(&json!({
            "orders": {
                "blob_prefix": "orders/",
                "source_bucket": "landing",
                "schema_ref": "orders.json",
                "destination_table": "raw.orders",
                "file_format": "json"
            },
            "broken": {
                "blob_prefix": "broken/",
                "source_bucket": "landing",
                "destination_table": "raw.broken",
                "file_format": "json",
                "create_mode": "CREATE_SOMETIMES"
            }
        }))
        .unwrap()
    }

    #[test]
    fn test_spec_from_document() {
        let spec = spec_from_document(&document(), "orders").unwrap();
        assert_eq!(spec.job_name, "orders");
        assert_eq!(spec.blob_prefix, "orders/");

        let err = spec_from_document(&document(), "returns").unwrap_err();
        assert!(matches!(err, AppError::JobNotFound(ref name) if name == "returns"));

        let err = spec_from_document(&document(), "broken").unwrap_err();
        assert!(matches!(err, AppError::InvalidDisposition { .. }));

        let err = spec_from_document(b"not json", "orders").unwrap_err();
        assert!(matches!(err, AppError::ResourceUnavailable(_)));
    }

    #[test]
    fn test_schema_document_shapes() {
        let bare = br#"[{"name":"id","type":"STRING","mode":"REQUIRED"}]"#;
        let wrapped = br#"{"fields":[{"name":"id","type":"STRING"},
            {"name":"lines","type":"RECORD","mode":"REPEATED",
             "fields":[{"name":"sku","type":"STRING"}]}]}"#;

        let fields = schema_from_document(bare, "bare.json").unwrap();
        assert_eq!(fields[0].mode.as_deref(), Some("REQUIRED"));

        let fields = schema_from_document(wrapped, "wrapped.json").unwrap();
        assert_eq!(fields.len(), 2);
        assert_eq!(fields[1].fields[0].name, "sku");

        assert!(schema_from_document(b"{\"nope\":1}", "bad.json").is_err());
    }

    #[tokio::test]
    async fn test_bucket_source() {
        let store = MemoryObjectStore::new();
        store
            .put("config-bucket", "config/config.json", document(), Utc::now())
            .await;
        store
            .put(
                "config-bucket",
                "bq-schemas/orders.json",
                r#"[{"name":"id","type":"STRING"}]"#,
                Utc::now(),
            )
            .await;

        let source = BucketJobConfigSource::new(
            Arc::new(store),
            "config-bucket",
            "config/config.json",
            "bq-schemas/",
        );

        let spec = source.resolve("orders").await.unwrap();
        let schema = source.schema(spec.schema_ref.as_deref().unwrap()).await.unwrap();
        assert_eq!(schema[0].name, "id");

        let err = source.schema("missing.json").await.unwrap_err();
        assert!(matches!(err, AppError::ResourceUnavailable(_)));
    }

    #[tokio::test]
    async fn test_bucket_source_missing_document() {
        let source = BucketJobConfigSource::new(
            Arc::new(MemoryObjectStore::new()),
            "config-bucket",
            "config/config.json",
            "bq-schemas/",
        );

        let err = source.resolve("orders").await.unwrap_err();
        assert!(matches!(err, AppError::ResourceUnavailable(_)));
    }

    #[tokio::test]
    async fn test_file_source() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.json");
        std::fs::write(&config_path, document()).unwrap();
        std::fs::write(
            temp_dir.path().join("orders.json"),
            r#"[{"name":"id","type":"STRING"}]"#,
        )
        .unwrap();

        let source = FileJobConfigSource::new(&config_path, temp_dir.path());
        let spec = source.resolve("orders").await.unwrap();
        assert_eq!(spec.destination_table.to_string(), "raw.orders");
        assert_eq!(source.schema("orders.json").await.unwrap().len(), 1);
    }
}
