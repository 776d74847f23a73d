use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::PgPool;
use std::sync::Arc;

use crate::config::Config;
use crate::dispatch::Dispatcher;
use crate::orchestrator::LoadOrchestrator;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub orchestrator: Arc<LoadOrchestrator>,
    pub dispatcher: Arc<Dispatcher>,
    /// Set when watermarks live in Postgres.
    pub pool: Option<PgPool>,
}

// API Request/Response types

/// Body of a load invocation. Unknown fields are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadRequest {
    #[serde(default)]
    pub job_name: Option<String>,
    #[serde(default)]
    pub backfill: Option<bool>,
}

impl LoadRequest {
    /// Lenient parse: a body that is empty, not JSON, or not an object reads
    /// as a request with no fields, and a field of the wrong type reads as
    /// absent. Only a JSON `true` requests a backfill.
    pub fn from_body(body: &[u8]) -> Self {
        let value: Value = serde_json::from_slice(body).unwrap_or(Value::Null);
        Self {
            job_name: value
                .get("job_name")
                .and_then(Value::as_str)
                .map(str::to_string),
            backfill: value.get("backfill").and_then(Value::as_bool),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
    pub state_backend: String,
    pub database: Option<String>,
    pub configured_jobs: usize,
}
