//! Job Configuration
//!
//! A job names a source prefix in a bucket and the BigQuery table it loads
//! into. Specs are resolved per run from a JSON document keyed by job name
//! (see [`source`]) and validated up front: an unknown create/write
//! disposition, file format or malformed table id is a configuration error,
//! raised before any watermark state is touched.

pub mod source;

pub use source::*;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

use crate::types::{AppError, AppResult};

/// Source file encoding understood by the warehouse loader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Json,
    Csv,
}

impl FileFormat {
    /// Value of `sourceFormat` in a BigQuery load configuration.
    pub fn source_format(&self) -> &'static str {
        match self {
            FileFormat::Json => "NEWLINE_DELIMITED_JSON",
            FileFormat::Csv => "CSV",
        }
    }
}

impl FromStr for FileFormat {
    type Err = AppError;

    fn from_str(s: &str) -> AppResult<Self> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(FileFormat::Json),
            "csv" => Ok(FileFormat::Csv),
            other => Err(AppError::Configuration(format!(
                "'{}' is not a valid file_format, expected json or csv",
                other
            ))),
        }
    }
}

impl fmt::Display for FileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileFormat::Json => write!(f, "json"),
            FileFormat::Csv => write!(f, "csv"),
        }
    }
}

/// What the load job does when the destination table is missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CreateDisposition {
    #[serde(rename = "CREATE_IF_NEEDED")]
    CreateIfNeeded,
    #[serde(rename = "CREATE_NEVER")]
    CreateNever,
}

impl CreateDisposition {
    pub const ALL: [CreateDisposition; 2] =
        [CreateDisposition::CreateIfNeeded, CreateDisposition::CreateNever];

    pub fn as_str(&self) -> &'static str {
        match self {
            CreateDisposition::CreateIfNeeded => "CREATE_IF_NEEDED",
            CreateDisposition::CreateNever => "CREATE_NEVER",
        }
    }
}

impl FromStr for CreateDisposition {
    type Err = AppError;

    fn from_str(s: &str) -> AppResult<Self> {
        Self::ALL
            .into_iter()
            .find(|d| d.as_str() == s)
            .ok_or_else(|| AppError::InvalidDisposition {
                kind: "CreateDisposition",
                value: s.to_string(),
            })
    }
}

/// What the load job does with rows already in the destination table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WriteDisposition {
    #[serde(rename = "WRITE_APPEND")]
    WriteAppend,
    #[serde(rename = "WRITE_TRUNCATE")]
    WriteTruncate,
    #[serde(rename = "WRITE_EMPTY")]
    WriteEmpty,
}

impl WriteDisposition {
    pub const ALL: [WriteDisposition; 3] = [
        WriteDisposition::WriteAppend,
        WriteDisposition::WriteTruncate,
        WriteDisposition::WriteEmpty,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            WriteDisposition::WriteAppend => "WRITE_APPEND",
            WriteDisposition::WriteTruncate => "WRITE_TRUNCATE",
            WriteDisposition::WriteEmpty => "WRITE_EMPTY",
        }
    }
}

impl FromStr for WriteDisposition {
    type Err = AppError;

    fn from_str(s: &str) -> AppResult<Self> {
        Self::ALL
            .into_iter()
            .find(|d| d.as_str() == s)
            .ok_or_else(|| AppError::InvalidDisposition {
                kind: "WriteDisposition",
                value: s.to_string(),
            })
    }
}

/// Hive partitioning options, forwarded to the load job as-is.
///
/// Accepts both the API's camelCase keys and snake_case keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HivePartitioning {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(default, alias = "source_uri_prefix", skip_serializing_if = "Option::is_none")]
    pub source_uri_prefix: Option<String>,
    #[serde(default, alias = "require_partition_filter", skip_serializing_if = "Option::is_none")]
    pub require_partition_filter: Option<bool>,
}

/// One column of a BigQuery table schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableFieldSchema {
    pub name: String,
    #[serde(rename = "type", alias = "field_type")]
    pub field_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<TableFieldSchema>,
}

/// Fully or partially qualified BigQuery table id.
///
/// `project.dataset.table` or `dataset.table`; the project falls back to the
/// loader's own project when omitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
    pub project_id: Option<String>,
    pub dataset_id: String,
    pub table_id: String,
}

impl FromStr for TableRef {
    type Err = AppError;

    fn from_str(s: &str) -> AppResult<Self> {
        let parts: Vec<&str> = s.split('.').collect();
        if parts.iter().any(|p| p.trim().is_empty()) {
            return Err(AppError::Configuration(format!(
                "'{}' is not a valid destination table",
                s
            )));
        }

        match parts.as_slice() {
            [dataset, table] => Ok(TableRef {
                project_id: None,
                dataset_id: dataset.to_string(),
                table_id: table.to_string(),
            }),
            [project, dataset, table] => Ok(TableRef {
                project_id: Some(project.to_string()),
                dataset_id: dataset.to_string(),
                table_id: table.to_string(),
            }),
            _ => Err(AppError::Configuration(format!(
                "'{}' is not a valid destination table, expected [project.]dataset.table",
                s
            ))),
        }
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.project_id {
            Some(project) => write!(f, "{}.{}.{}", project, self.dataset_id, self.table_id),
            None => write!(f, "{}.{}", self.dataset_id, self.table_id),
        }
    }
}

/// Resolved, validated configuration for one job.
#[derive(Debug, Clone, PartialEq)]
pub struct JobSpec {
    pub job_name: String,
    pub blob_prefix: String,
    pub source_bucket: String,
    pub schema_ref: Option<String>,
    pub destination_table: TableRef,
    pub file_format: FileFormat,
    pub partitioning: Option<HivePartitioning>,
    pub create_mode: Option<CreateDisposition>,
    pub write_mode: Option<WriteDisposition>,
    pub extra_options: Map<String, Value>,
}

// Document shape; enum-like fields stay strings until validated.
#[derive(Debug, Deserialize)]
struct RawJobSpec {
    blob_prefix: String,
    #[serde(alias = "storage_bucket")]
    source_bucket: String,
    #[serde(default, alias = "schema_file_location")]
    schema_ref: Option<String>,
    #[serde(alias = "destination_table_id")]
    destination_table: String,
    #[serde(alias = "file_type")]
    file_format: String,
    #[serde(default, alias = "hive_partitioning")]
    partitioning: Option<HivePartitioning>,
    #[serde(default, alias = "create_behavior")]
    create_mode: Option<String>,
    #[serde(default, alias = "write_behavior")]
    write_mode: Option<String>,
    #[serde(default, alias = "extra_kwargs")]
    extra_options: Option<Map<String, Value>>,
}

impl JobSpec {
    /// Validates one entry of the job configuration document.
    pub fn from_value(job_name: &str, value: Value) -> AppResult<Self> {
        let raw: RawJobSpec = serde_json::from_value(value).map_err(|e| {
            AppError::Configuration(format!("job '{}' is malformed: {}", job_name, e))
        })?;

        let create_mode = raw
            .create_mode
            .as_deref()
            .map(CreateDisposition::from_str)
            .transpose()?;
        let write_mode = raw
            .write_mode
            .as_deref()
            .map(WriteDisposition::from_str)
            .transpose()?;

        Ok(JobSpec {
            job_name: job_name.to_string(),
            blob_prefix: raw.blob_prefix,
            source_bucket: raw.source_bucket,
            schema_ref: raw.schema_ref.filter(|s| !s.trim().is_empty()),
            destination_table: raw.destination_table.parse()?,
            file_format: raw.file_format.parse()?,
            partitioning: raw.partitioning,
            create_mode,
            write_mode,
            extra_options: raw.extra_options.unwrap_or_default(),
        })
    }

    /// Wildcard URI covering every object under the job's prefix.
    pub fn wildcard_uri(&self) -> String {
        format!("gs://{}/{}*", self.source_bucket, self.blob_prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn orders_entry() -> Value {
        json!({
            "blob_prefix": "shopify/orders/",
            "storage_bucket": "raw-landing",
            "schema_file_location": "orders.json",
            "destination_table_id": "analytics.raw.orders",
            "file_type": "json",
            "create_behavior": "CREATE_IF_NEEDED",
            "write_behavior": "WRITE_APPEND",
            "extra_kwargs": { "ignore_unknown_values": true }
        })
    }

    #[test]
    fn test_parses_legacy_keys() {
        let spec = JobSpec::from_value("orders", orders_entry()).unwrap();

        assert_eq!(spec.source_bucket, "raw-landing");
        assert_eq!(spec.schema_ref.as_deref(), Some("orders.json"));
        assert_eq!(spec.destination_table.to_string(), "analytics.raw.orders");
        assert_eq!(spec.file_format, FileFormat::Json);
        assert_eq!(spec.create_mode, Some(CreateDisposition::CreateIfNeeded));
        assert_eq!(spec.write_mode, Some(WriteDisposition::WriteAppend));
        assert_eq!(spec.extra_options.get("ignore_unknown_values"), Some(&json!(true)));
        assert_eq!(spec.wildcard_uri(), "gs://raw-landing/shopify/orders/*");
    }

    #[test]
    fn test_parses_current_keys() {
        let spec = JobSpec::from_value(
            "events",
            json!({
                "blob_prefix": "events/",
                "source_bucket": "landing",
                "destination_table": "raw.events",
                "file_format": "CSV",
                "partitioning": { "mode": "AUTO", "source_uri_prefix": "gs://landing/events/" }
            }),
        )
        .unwrap();

        assert_eq!(spec.file_format, FileFormat::Csv);
        assert_eq!(spec.schema_ref, None);
        assert_eq!(spec.destination_table.project_id, None);
        assert_eq!(
            spec.partitioning.unwrap().source_uri_prefix.as_deref(),
            Some("gs://landing/events/")
        );
        assert!(spec.extra_options.is_empty());
    }

    #[test]
    fn test_rejects_unknown_write_disposition() {
        let mut entry = orders_entry();
        entry["write_behavior"] = json!("WRITE_SOMETIMES");

        let err = JobSpec::from_value("orders", entry).unwrap_err();
        assert!(matches!(
            err,
            AppError::InvalidDisposition { kind: "WriteDisposition", .. }
        ));
        assert!(err.to_string().contains("WRITE_SOMETIMES"));
    }

    #[test]
    fn test_rejects_lowercase_create_disposition() {
        let mut entry = orders_entry();
        entry["create_behavior"] = json!("create_never");

        let err = JobSpec::from_value("orders", entry).unwrap_err();
        assert!(matches!(
            err,
            AppError::InvalidDisposition { kind: "CreateDisposition", .. }
        ));
    }

    #[test]
    fn test_rejects_unknown_file_format() {
        let mut entry = orders_entry();
        entry["file_type"] = json!("parquet");

        let err = JobSpec::from_value("orders", entry).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_empty_schema_ref_is_none() {
        let mut entry = orders_entry();
        entry["schema_file_location"] = json!("");

        let spec = JobSpec::from_value("orders", entry).unwrap();
        assert_eq!(spec.schema_ref, None);
    }

    #[test]
    fn test_table_ref_shapes() {
        assert!("dataset.table".parse::<TableRef>().is_ok());
        assert!("p.d.t".parse::<TableRef>().is_ok());
        assert!("table".parse::<TableRef>().is_err());
        assert!("a..b".parse::<TableRef>().is_err());
        assert!("a.b.c.d".parse::<TableRef>().is_err());
    }
}
