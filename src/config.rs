use anyhow::{bail, Context, Result};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

pub const DEFAULT_FUNCTION_REGION: &str = "us-central1";

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub gcp: GcpConfig,
    pub storage: StorageConfig,
    pub state: StateConfig,
    pub warehouse: WarehouseConfig,
    pub dispatcher: DispatcherConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
}

#[derive(Debug, Clone)]
pub struct GcpConfig {
    pub project_id: String,
    /// Fixed bearer token used instead of Application Default Credentials.
    pub access_token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub global_bucket: String,
    pub config_object: String,
    pub schema_prefix: String,
    pub endpoint: Option<String>,
    /// Local job config document; when set, schemas are read from `schema_dir`.
    pub job_config_file: Option<PathBuf>,
    pub schema_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateBackend {
    Datastore,
    Postgres,
    Memory,
}

impl FromStr for StateBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "datastore" => Ok(StateBackend::Datastore),
            "postgres" | "postgresql" => Ok(StateBackend::Postgres),
            "memory" => Ok(StateBackend::Memory),
            other => bail!("unknown WATERMARK_STORE '{}'", other),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Clone)]
pub struct StateConfig {
    pub backend: StateBackend,
    pub datastore_kind: String,
    pub datastore_endpoint: Option<String>,
    /// Present only for the Postgres backend.
    pub database: Option<DatabaseConfig>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarehouseBackend {
    BigQuery,
    DryRun,
}

impl FromStr for WarehouseBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bigquery" => Ok(WarehouseBackend::BigQuery),
            "dry-run" | "dry_run" | "dryrun" => Ok(WarehouseBackend::DryRun),
            other => bail!("unknown WAREHOUSE_BACKEND '{}'", other),
        }
    }
}

#[derive(Debug, Clone)]
pub struct WarehouseConfig {
    pub backend: WarehouseBackend,
    pub location: String,
    pub poll_interval_ms: u64,
    pub endpoint: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub job_names: Vec<String>,
    pub queue_location: String,
    pub queue_name: String,
    pub target_url: String,
    pub endpoint: Option<String>,
    /// Fixed identity token for queued tasks, instead of the metadata server.
    pub id_token: Option<String>,
    pub metadata_endpoint: Option<String>,
}

/// Splits a comma separated list of job names, dropping blanks.
pub fn parse_job_names(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());
        let opt = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let project_id = var("PROJECT_ID", "");

        let backend: StateBackend = var("WATERMARK_STORE", "datastore").parse()?;
        let database = match backend {
            StateBackend::Postgres => Some(DatabaseConfig {
                url: opt("DATABASE_URL")
                    .context("DATABASE_URL must be set when WATERMARK_STORE=postgres")?,
                max_connections: var("DB_MAX_CONNECTIONS", "5")
                    .parse()
                    .context("DB_MAX_CONNECTIONS")?,
                min_connections: var("DB_MIN_CONNECTIONS", "1")
                    .parse()
                    .context("DB_MIN_CONNECTIONS")?,
            }),
            _ => None,
        };

        let target_url = opt("LOAD_FUNCTION_URL").unwrap_or_else(|| {
            format!(
                "https://{}-{}.cloudfunctions.net/bq-load-file",
                var("FUNCTION_REGION", DEFAULT_FUNCTION_REGION),
                project_id
            )
        });

        Ok(Self {
            server: ServerConfig {
                port: var("PORT", "3000").parse().context("PORT")?,
                host: var("HOST", "0.0.0.0"),
            },
            gcp: GcpConfig {
                project_id: project_id.clone(),
                access_token: opt("GCP_ACCESS_TOKEN"),
            },
            storage: StorageConfig {
                global_bucket: var("GLOBAL_STORAGE_BUCKET", ""),
                config_object: var("CONFIG_OBJECT", "config/config.json"),
                schema_prefix: var("SCHEMA_PREFIX", "bq-schemas/"),
                endpoint: opt("STORAGE_ENDPOINT"),
                job_config_file: opt("JOB_CONFIG_FILE").map(PathBuf::from),
                schema_dir: opt("SCHEMA_DIR").map(PathBuf::from),
            },
            state: StateConfig {
                backend,
                datastore_kind: var("DATASTORE_KIND", "data-pipelines"),
                datastore_endpoint: opt("DATASTORE_ENDPOINT"),
                database,
            },
            warehouse: WarehouseConfig {
                backend: var("WAREHOUSE_BACKEND", "bigquery").parse()?,
                location: var("BQ_LOCATION", "US"),
                poll_interval_ms: var("BQ_POLL_INTERVAL_MS", "2000")
                    .parse()
                    .context("BQ_POLL_INTERVAL_MS")?,
                endpoint: opt("BIGQUERY_ENDPOINT"),
            },
            dispatcher: DispatcherConfig {
                job_names: parse_job_names(&var("CONFIG_JOB_NAMES", "")),
                queue_location: var("QUEUE_LOCATION", DEFAULT_FUNCTION_REGION),
                queue_name: var("QUEUE_NAME", ""),
                target_url,
                endpoint: opt("CLOUD_TASKS_ENDPOINT"),
                id_token: opt("ID_TOKEN"),
                metadata_endpoint: opt("METADATA_ENDPOINT"),
            },
        })
    }
}
