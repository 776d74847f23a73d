//! Debounce guard and load-mode decision
//!
//! The guard is time based: a job whose last accepted attempt started less
//! than [`DEBOUNCE_WINDOW_MINUTES`] ago is not run again. Nothing locks the
//! record between this check and the attempt stamp that follows it, so two
//! invocations landing in the same instant can both pass.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::fmt;

use crate::state::JobState;

pub const DEBOUNCE_WINDOW_MINUTES: i64 = 5;

pub fn debounce_window() -> Duration {
    Duration::minutes(DEBOUNCE_WINDOW_MINUTES)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadMode {
    /// Reload everything under the prefix through one wildcard URI.
    Backfill,
    /// Load only objects modified after the watermark.
    Incremental,
}

impl fmt::Display for LoadMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadMode::Backfill => write!(f, "backfill"),
            LoadMode::Incremental => write!(f, "incremental"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// The previous attempt is inside the debounce window; do nothing.
    TooSoon { last_attempted_at: DateTime<Utc> },
    Backfill,
    Incremental { since: DateTime<Utc> },
}

impl Decision {
    pub fn mode(&self) -> Option<LoadMode> {
        match self {
            Decision::TooSoon { .. } => None,
            Decision::Backfill => Some(LoadMode::Backfill),
            Decision::Incremental { .. } => Some(LoadMode::Incremental),
        }
    }
}

/// Decides whether a run invoked at `now` may proceed, and in which mode.
///
/// Without both a watermark and an attempt stamp there is no trustworthy
/// incremental boundary, so the run is a backfill whatever was requested.
pub fn decide(state: Option<&JobState>, backfill_requested: Option<bool>, now: DateTime<Utc>) -> Decision {
    let (watermark, last_attempted_at) = match state {
        Some(JobState {
            last_watermark: Some(watermark),
            last_attempted_at: Some(attempted),
        }) => (*watermark, *attempted),
        _ => return Decision::Backfill,
    };

    if last_attempted_at > now - debounce_window() {
        return Decision::TooSoon { last_attempted_at };
    }

    if backfill_requested == Some(true) {
        Decision::Backfill
    } else {
        Decision::Incremental { since: watermark }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn state(watermark: Option<DateTime<Utc>>, attempted: Option<DateTime<Utc>>) -> JobState {
        JobState {
            last_watermark: watermark,
            last_attempted_at: attempted,
        }
    }

    #[test]
    fn test_rejects_inside_window() {
        let now = t0();
        for minutes_ago in [0, 1, 2, 4] {
            let attempted = now - Duration::minutes(minutes_ago);
            let s = state(Some(attempted), Some(attempted));
            for flag in [None, Some(true), Some(false)] {
                assert_eq!(
                    decide(Some(&s), flag, now),
                    Decision::TooSoon { last_attempted_at: attempted }
                );
            }
        }

        let attempted = now - Duration::minutes(5) + Duration::seconds(1);
        let s = state(Some(attempted), Some(attempted));
        assert!(matches!(decide(Some(&s), None, now), Decision::TooSoon { .. }));
    }

    #[test]
    fn test_window_boundary_is_accepted() {
        let now = t0();
        let attempted = now - Duration::minutes(5);
        let s = state(Some(attempted), Some(attempted));
        assert_eq!(
            decide(Some(&s), None, now),
            Decision::Incremental { since: attempted }
        );
    }

    #[test]
    fn test_missing_fields_force_backfill() {
        let now = t0();
        let recent = now - Duration::minutes(1);
        let cases = [
            None,
            Some(state(None, None)),
            Some(state(Some(recent), None)),
            Some(state(None, Some(recent))),
        ];

        for s in cases.iter() {
            for flag in [None, Some(true), Some(false)] {
                assert_eq!(decide(s.as_ref(), flag, now), Decision::Backfill);
            }
        }
    }

    #[test]
    fn test_flag_selects_mode_outside_window() {
        let now = t0();
        let watermark = now - Duration::hours(1);
        let s = state(Some(watermark), Some(watermark));

        assert_eq!(decide(Some(&s), Some(true), now), Decision::Backfill);
        assert_eq!(
            decide(Some(&s), Some(false), now),
            Decision::Incremental { since: watermark }
        );
        assert_eq!(
            decide(Some(&s), None, now).mode(),
            Some(LoadMode::Incremental)
        );
    }
}
