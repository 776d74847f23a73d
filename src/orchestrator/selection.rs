// File selection for a run

use chrono::{DateTime, Utc};
use tracing::debug;

use super::debounce::LoadMode;
use crate::jobs::JobSpec;
use crate::storage::{ObjectMeta, ObjectStore};
use crate::types::AppResult;
use crate::warehouse::LoadSource;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    Backfill { pattern: String },
    Incremental { files: Vec<String> },
}

impl Selection {
    pub fn mode(&self) -> LoadMode {
        match self {
            Selection::Backfill { .. } => LoadMode::Backfill,
            Selection::Incremental { .. } => LoadMode::Incremental,
        }
    }

    /// Number of explicitly selected files; `None` for a wildcard.
    pub fn file_count(&self) -> Option<usize> {
        match self {
            Selection::Backfill { .. } => None,
            Selection::Incremental { files } => Some(files.len()),
        }
    }

    /// What to hand the loader, or `None` when there is nothing to load.
    pub fn into_source(self) -> Option<LoadSource> {
        match self {
            Selection::Backfill { pattern } => Some(LoadSource::Wildcard(pattern)),
            Selection::Incremental { files } if files.is_empty() => None,
            Selection::Incremental { files } => Some(LoadSource::Uris(files)),
        }
    }
}

/// URIs of the objects modified after `watermark`.
///
/// Compared at whole-second granularity: an object updated within the same
/// second as the watermark counts as already loaded.
pub fn modified_after(objects: Vec<ObjectMeta>, watermark: DateTime<Utc>) -> Vec<String> {
    let cutoff = watermark.timestamp();
    objects
        .into_iter()
        .filter(|o| o.updated.timestamp() > cutoff)
        .map(|o| o.uri())
        .collect()
}

/// Selects the files for an accepted run: everything under the prefix when
/// `since` is `None`, otherwise what changed after it. Backfills never list
/// the bucket.
pub async fn select(
    objects: &dyn ObjectStore,
    spec: &JobSpec,
    since: Option<DateTime<Utc>>,
) -> AppResult<Selection> {
    match since {
        None => Ok(Selection::Backfill {
            pattern: spec.wildcard_uri(),
        }),
        Some(since) => {
            let listed = objects.list(&spec.source_bucket, &spec.blob_prefix).await?;
            let files = modified_after(listed, since);
            debug!("Grabbed {} files", files.len());
            Ok(Selection::Incremental { files })
        }
    }
}
