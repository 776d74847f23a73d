//! Load Orchestrator
//!
//! One run takes a job name through: resolve the job config (and schema),
//! read its watermark state, apply the debounce guard, stamp the attempt,
//! select files, hand them to the warehouse and, on success, advance the
//! watermark to the run's start time.
//!
//! Every timestamp a run writes is the same `now` captured when it started,
//! so files landing while a long load is in flight are picked up next time.

pub mod debounce;
pub mod selection;

pub use debounce::*;
pub use selection::*;

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::jobs::source::JobConfigSource;
use crate::models::LoadRequest;
use crate::state::{StateField, WatermarkStore};
use crate::storage::ObjectStore;
use crate::types::{AppError, AppResult};
use crate::warehouse::{LoadJobConfig, WarehouseLoader};

/// How a run that got past request validation ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RunOutcome {
    Loaded {
        job_name: String,
        mode: LoadMode,
        job_id: String,
        file_count: Option<usize>,
        output_rows: Option<u64>,
    },
    NoNewFiles {
        job_name: String,
    },
    Debounced {
        job_name: String,
        last_attempted_at: DateTime<Utc>,
    },
    LoadFailed {
        job_name: String,
        mode: LoadMode,
        error: String,
    },
}

impl RunOutcome {
    /// Plain-text response body, if the outcome has one.
    pub fn message(&self) -> Option<String> {
        match self {
            RunOutcome::Loaded { job_name, .. } => Some(format!("Success for {}", job_name)),
            RunOutcome::NoNewFiles { job_name } => {
                Some(format!("There are no new blobs to load for {}", job_name))
            }
            RunOutcome::Debounced { .. } | RunOutcome::LoadFailed { .. } => None,
        }
    }

    pub fn job_name(&self) -> &str {
        match self {
            RunOutcome::Loaded { job_name, .. }
            | RunOutcome::NoNewFiles { job_name }
            | RunOutcome::Debounced { job_name, .. }
            | RunOutcome::LoadFailed { job_name, .. } => job_name,
        }
    }
}

pub struct LoadOrchestrator {
    configs: Arc<dyn JobConfigSource>,
    state: Arc<dyn WatermarkStore>,
    objects: Arc<dyn ObjectStore>,
    loader: Arc<dyn WarehouseLoader>,
}

impl LoadOrchestrator {
    pub fn new(
        configs: Arc<dyn JobConfigSource>,
        state: Arc<dyn WatermarkStore>,
        objects: Arc<dyn ObjectStore>,
        loader: Arc<dyn WarehouseLoader>,
    ) -> Self {
        Self {
            configs,
            state,
            objects,
            loader,
        }
    }

    pub fn state_backend(&self) -> &'static str {
        self.state.backend_name()
    }

    pub async fn run(&self, request: &LoadRequest) -> AppResult<RunOutcome> {
        self.run_at(request, Utc::now()).await
    }

    /// Runs one load with `now` as the run start time.
    ///
    /// Errors are reserved for the request itself and for collaborators that
    /// fail before the load is attempted. A load job that fails is reported
    /// as [`RunOutcome::LoadFailed`] with the attempt stamp kept and the
    /// watermark unchanged.
    #[instrument(
        name = "load_run",
        skip_all,
        fields(run_id = %Uuid::new_v4(), job_name = ?request.job_name)
    )]
    pub async fn run_at(&self, request: &LoadRequest, now: DateTime<Utc>) -> AppResult<RunOutcome> {
        // Blank names are rejected; anything else is looked up verbatim.
        let job_name = match request.job_name.as_deref() {
            Some(name) if !name.trim().is_empty() => name,
            _ => {
                error!("Job name was not included in request json.");
                return Err(AppError::MissingJobName);
            }
        };

        let spec = self.configs.resolve(job_name).await?;
        let schema = match &spec.schema_ref {
            Some(schema_ref) => Some(self.configs.schema(schema_ref).await?),
            None => None,
        };

        let current = self.state.get(job_name).await?;
        let decision = decide(current.as_ref(), request.backfill, now);
        let since = match decision {
            Decision::TooSoon { last_attempted_at } => {
                warn!(
                    %last_attempted_at,
                    "Last attempted grab was within the last {} minutes, skipping",
                    DEBOUNCE_WINDOW_MINUTES
                );
                return Ok(RunOutcome::Debounced {
                    job_name: job_name.to_string(),
                    last_attempted_at,
                });
            }
            Decision::Backfill => None,
            Decision::Incremental { since } => Some(since),
        };

        self.state
            .set_field(job_name, StateField::LastAttemptedAt, now)
            .await?;

        let selection = select(self.objects.as_ref(), &spec, since).await?;
        let mode = selection.mode();
        let file_count = selection.file_count();
        info!(%mode, files = ?file_count, "Starting load");

        let source = match selection.into_source() {
            Some(source) => source,
            None => {
                warn!("There are no new blobs to load for {}", job_name);
                return Ok(RunOutcome::NoNewFiles {
                    job_name: job_name.to_string(),
                });
            }
        };

        let load_config = LoadJobConfig::from_spec(&spec, schema);
        let outcome = match self.loader.load(&source, &load_config).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(%mode, "Failed to run load job: {}", e);
                return Ok(RunOutcome::LoadFailed {
                    job_name: job_name.to_string(),
                    mode,
                    error: e.to_string(),
                });
            }
        };

        match mode {
            LoadMode::Backfill => {
                debug!(job_id = %outcome.job_id, "Backfill was initiated, no results being returned");
            }
            LoadMode::Incremental => match outcome.output_rows {
                Some(rows) => info!(
                    job_id = %outcome.job_id,
                    "Loaded {} rows from {} files",
                    rows,
                    outcome.input_files.unwrap_or(file_count.unwrap_or(0) as u64)
                ),
                None => warn!(job_id = %outcome.job_id, "Could not output load job results"),
            },
        }

        // Never move the watermark backwards, even if clocks disagree.
        let watermark = current
            .and_then(|s| s.last_watermark)
            .map_or(now, |previous| previous.max(now));
        self.state
            .set_field(job_name, StateField::LastWatermark, watermark)
            .await?;

        Ok(RunOutcome::Loaded {
            job_name: job_name.to_string(),
            mode,
            job_id: outcome.job_id,
            file_count,
            output_rows: outcome.output_rows,
        })
    }
}
