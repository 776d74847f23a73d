//! Watermark State
//!
//! One [`JobState`] record per job name. The orchestrator reads it to decide
//! whether and how to run, then updates one field at a time through
//! [`WatermarkStore::set_field`].
//!
//! Updates are read-modify-write without compare-and-swap: two writers racing
//! on the same job name resolve as last-writer-wins.

pub mod datastore;
pub mod memory;
pub mod postgres;

pub use datastore::*;
pub use memory::*;
pub use postgres::*;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::AppResult;

/// Persisted per-job progress.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobState {
    /// Start of the most recent accepted run, whatever its outcome.
    pub last_attempted_at: Option<DateTime<Utc>>,
    /// Files modified after this instant have not been loaded yet.
    pub last_watermark: Option<DateTime<Utc>>,
}

impl JobState {
    pub fn get(&self, field: StateField) -> Option<DateTime<Utc>> {
        match field {
            StateField::LastAttemptedAt => self.last_attempted_at,
            StateField::LastWatermark => self.last_watermark,
        }
    }

    pub fn set(&mut self, field: StateField, value: DateTime<Utc>) {
        match field {
            StateField::LastAttemptedAt => self.last_attempted_at = Some(value),
            StateField::LastWatermark => self.last_watermark = Some(value),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateField {
    LastAttemptedAt,
    LastWatermark,
}

impl fmt::Display for StateField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateField::LastAttemptedAt => write!(f, "last_attempted_at"),
            StateField::LastWatermark => write!(f, "last_watermark"),
        }
    }
}

#[async_trait]
pub trait WatermarkStore: Send + Sync {
    /// Current state for a job; `None` if the job has never run.
    async fn get(&self, job_name: &str) -> AppResult<Option<JobState>>;

    /// Sets one field, creating the record if needed and leaving every other
    /// field of the stored record untouched.
    async fn set_field(
        &self,
        job_name: &str,
        field: StateField,
        value: DateTime<Utc>,
    ) -> AppResult<()>;

    /// Short backend name for logs and health checks.
    fn backend_name(&self) -> &'static str;
}
