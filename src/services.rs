//! Wiring from [`Config`] to the concrete backends behind [`AppState`].

use anyhow::{bail, Result};
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::auth::{AccessTokenSource, GcpTokenSource, IdTokenSource, MetadataIdTokenSource, StaticToken};
use crate::config::{Config, StateBackend, WarehouseBackend};
use crate::db;
use crate::dispatch::{CloudTasksConfig, CloudTasksQueue, Dispatcher, TaskQueue};
use crate::jobs::source::{BucketJobConfigSource, FileJobConfigSource, JobConfigSource};
use crate::models::AppState;
use crate::orchestrator::LoadOrchestrator;
use crate::state::{DatastoreWatermarkStore, InMemoryWatermarkStore, PostgresWatermarkStore, WatermarkStore};
use crate::storage::{GcsClient, ObjectStore};
use crate::warehouse::{BigQueryLoader, DryRunLoader, WarehouseLoader};

async fn access_tokens(config: &Config) -> Result<Arc<dyn AccessTokenSource>> {
    Ok(match &config.gcp.access_token {
        Some(token) => Arc::new(StaticToken(token.clone())),
        None => Arc::new(GcpTokenSource::new().await?),
    })
}

fn object_store(config: &Config, client: &Client, tokens: &Arc<dyn AccessTokenSource>) -> Arc<dyn ObjectStore> {
    match &config.storage.endpoint {
        Some(endpoint) => Arc::new(GcsClient::with_endpoint(client.clone(), tokens.clone(), endpoint)),
        None => Arc::new(GcsClient::new(client.clone(), tokens.clone())),
    }
}

fn job_configs(config: &Config, objects: Arc<dyn ObjectStore>) -> Result<Arc<dyn JobConfigSource>> {
    let storage = &config.storage;
    if let Some(path) = &storage.job_config_file {
        let schema_dir = match (&storage.schema_dir, path.parent()) {
            (Some(dir), _) => dir.clone(),
            (None, Some(parent)) => parent.to_path_buf(),
            (None, None) => ".".into(),
        };
        info!("Reading job config from {}", path.display());
        return Ok(Arc::new(FileJobConfigSource::new(path, schema_dir)));
    }

    if storage.global_bucket.is_empty() {
        bail!("GLOBAL_STORAGE_BUCKET or JOB_CONFIG_FILE must be set");
    }
    Ok(Arc::new(BucketJobConfigSource::new(
        objects,
        &storage.global_bucket,
        &storage.config_object,
        &storage.schema_prefix,
    )))
}

async fn watermark_store(
    config: &Config,
    client: &Client,
    tokens: &Arc<dyn AccessTokenSource>,
) -> Result<(Arc<dyn WatermarkStore>, Option<sqlx::PgPool>)> {
    let state = &config.state;
    match state.backend {
        StateBackend::Datastore => {
            if config.gcp.project_id.is_empty() {
                bail!("PROJECT_ID must be set for the datastore watermark store");
            }
            let mut store = DatastoreWatermarkStore::new(client.clone(), tokens.clone(), &config.gcp.project_id)
                .with_kind(&state.datastore_kind);
            if let Some(endpoint) = &state.datastore_endpoint {
                store = store.with_endpoint(endpoint);
            }
            Ok((Arc::new(store), None))
        }
        StateBackend::Postgres => {
            let Some(database) = &state.database else {
                bail!("DATABASE_URL must be set when WATERMARK_STORE=postgres");
            };
            let pool = db::create_pool(database).await?;
            info!("Running database migrations...");
            db::run_migrations(&pool).await?;
            info!("Database migrations completed");
            Ok((Arc::new(PostgresWatermarkStore::new(pool.clone())), Some(pool)))
        }
        StateBackend::Memory => Ok((Arc::new(InMemoryWatermarkStore::new()), None)),
    }
}

fn warehouse_loader(
    config: &Config,
    client: &Client,
    tokens: &Arc<dyn AccessTokenSource>,
) -> Result<Arc<dyn WarehouseLoader>> {
    let warehouse = &config.warehouse;
    match warehouse.backend {
        WarehouseBackend::BigQuery => {
            if config.gcp.project_id.is_empty() {
                bail!("PROJECT_ID must be set for BigQuery loads");
            }
            let mut loader = BigQueryLoader::new(client.clone(), tokens.clone(), &config.gcp.project_id)
                .with_location(&warehouse.location)
                .with_poll_interval(Duration::from_millis(warehouse.poll_interval_ms));
            if let Some(endpoint) = &warehouse.endpoint {
                loader = loader.with_endpoint(endpoint);
            }
            Ok(Arc::new(loader))
        }
        WarehouseBackend::DryRun => Ok(Arc::new(DryRunLoader::new())),
    }
}

fn dispatcher(config: &Config, client: &Client, tokens: &Arc<dyn AccessTokenSource>) -> Dispatcher {
    let settings = &config.dispatcher;
    let mut queue = CloudTasksQueue::new(
        client.clone(),
        tokens.clone(),
        CloudTasksConfig::new(
            &config.gcp.project_id,
            &settings.queue_location,
            &settings.queue_name,
        ),
    );
    if let Some(endpoint) = &settings.endpoint {
        queue = queue.with_endpoint(endpoint);
    }
    let queue: Arc<dyn TaskQueue> = Arc::new(queue);

    let id_tokens: Arc<dyn IdTokenSource> = match (&settings.id_token, &settings.metadata_endpoint) {
        (Some(token), _) => Arc::new(StaticToken(token.clone())),
        (None, Some(endpoint)) => Arc::new(MetadataIdTokenSource::with_endpoint(client.clone(), endpoint)),
        (None, None) => Arc::new(MetadataIdTokenSource::new(client.clone())),
    };

    Dispatcher::new(settings.job_names.clone(), &settings.target_url, queue, id_tokens)
}

impl AppState {
    /// Builds the shared state, connecting to every configured backend.
    pub async fn build(config: Config) -> Result<Self> {
        let client = Client::new();
        let tokens = access_tokens(&config).await?;

        let objects = object_store(&config, &client, &tokens);
        let configs = job_configs(&config, objects.clone())?;
        let (store, pool) = watermark_store(&config, &client, &tokens).await?;
        let loader = warehouse_loader(&config, &client, &tokens)?;

        info!(
            state = store.backend_name(),
            warehouse = ?config.warehouse.backend,
            jobs = config.dispatcher.job_names.len(),
            "Backends ready"
        );

        let orchestrator = LoadOrchestrator::new(configs, store, objects, loader);
        let dispatcher = dispatcher(&config, &client, &tokens);

        Ok(Self {
            config,
            orchestrator: Arc::new(orchestrator),
            dispatcher: Arc::new(dispatcher),
            pool,
        })
    }
}
