// Warehouse load layer (BigQuery)

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::jobs::{
    CreateDisposition, FileFormat, HivePartitioning, JobSpec, TableFieldSchema, TableRef,
    WriteDisposition,
};
use crate::types::AppResult;

pub mod bigquery;
pub mod dry_run;

pub use bigquery::*;
pub use dry_run::*;

/// Files handed to a load job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadSource {
    /// A single wildcard URI; the warehouse expands it.
    Wildcard(String),
    /// Explicit object URIs, in no meaningful order.
    Uris(Vec<String>),
}

impl LoadSource {
    pub fn uris(&self) -> Vec<String> {
        match self {
            LoadSource::Wildcard(pattern) => vec![pattern.clone()],
            LoadSource::Uris(uris) => uris.clone(),
        }
    }

    pub fn is_wildcard(&self) -> bool {
        matches!(self, LoadSource::Wildcard(_))
    }
}

/// Everything the warehouse needs besides the source files.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadJobConfig {
    pub destination: TableRef,
    pub file_format: FileFormat,
    pub schema: Option<Vec<TableFieldSchema>>,
    pub create_disposition: Option<CreateDisposition>,
    pub write_disposition: Option<WriteDisposition>,
    pub hive_partitioning: Option<HivePartitioning>,
    pub extra_options: Map<String, Value>,
}

impl LoadJobConfig {
    pub fn from_spec(spec: &JobSpec, schema: Option<Vec<TableFieldSchema>>) -> Self {
        Self {
            destination: spec.destination_table.clone(),
            file_format: spec.file_format,
            schema,
            create_disposition: spec.create_mode,
            write_disposition: spec.write_mode,
            hive_partitioning: spec.partitioning.clone(),
            extra_options: spec.extra_options.clone(),
        }
    }
}

/// Terminal result of a successful load job.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadOutcome {
    pub job_id: String,
    pub output_rows: Option<u64>,
    pub input_files: Option<u64>,
}

#[async_trait]
pub trait WarehouseLoader: Send + Sync {
    /// Runs a load job and waits for it to reach a terminal state.
    ///
    /// Returns an error if the job cannot be submitted or finishes with an error.
    async fn load(&self, source: &LoadSource, config: &LoadJobConfig) -> AppResult<LoadOutcome>;
}
