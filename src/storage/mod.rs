//! Storage layer for splitlab
//!
//! The engine talks to persistence only through [`ExperimentStore`]. SQLite
//! backs the binary; the in-memory store backs tests and benches.

pub mod memory;
pub mod migrations;
pub mod sqlite;

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

use crate::core::model::{
    Assignment, Event, Experiment, ExperimentStatus, ExperimentWithVariants, NewExperiment,
};
use crate::error::Result;

pub use memory::{ErrorInjection, MemoryStore, Race, StoreErrorKind};
pub use sqlite::Database;

/// Narrowing applied when reading an experiment's events. Both time bounds
/// are inclusive.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventFilter {
    pub event_type: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

impl EventFilter {
    /// Whether an event passes every populated criterion.
    #[must_use]
    pub fn matches(&self, event: &Event) -> bool {
        if let Some(event_type) = &self.event_type {
            if &event.event_type != event_type {
                return false;
            }
        }
        if let Some(start) = self.start_time {
            if event.timestamp < start {
                return false;
            }
        }
        if let Some(end) = self.end_time {
            if event.timestamp > end {
                return false;
            }
        }
        true
    }
}

/// Persistence operations the assignment and analytics engine relies on.
///
/// `create_assignment` must be insert-if-absent: a second insert for the same
/// (experiment, user) pair fails with [`crate::error::LabError::Conflict`].
pub trait ExperimentStore: Send + Sync {
    fn get_assignment(&self, experiment_id: &str, user_id: &str) -> Result<Option<Assignment>>;

    fn get_assignments_for_experiment(&self, experiment_id: &str) -> Result<Vec<Assignment>>;

    fn create_assignment(
        &self,
        experiment_id: &str,
        user_id: &str,
        variant_id: &str,
    ) -> Result<Assignment>;

    fn get_experiment_with_variants(
        &self,
        experiment_id: &str,
    ) -> Result<Option<ExperimentWithVariants>>;

    fn get_events_for_experiment(
        &self,
        experiment_id: &str,
        filter: &EventFilter,
    ) -> Result<Vec<Event>>;

    /// Persist a validated experiment and its variants, assigning ids.
    fn create_experiment(&self, experiment: &NewExperiment) -> Result<ExperimentWithVariants>;

    /// Experiments newest first.
    fn list_experiments(&self, limit: usize, offset: usize) -> Result<Vec<Experiment>>;

    fn update_experiment_status(
        &self,
        experiment_id: &str,
        status: ExperimentStatus,
    ) -> Result<Experiment>;

    fn insert_event(&self, event: &Event) -> Result<()>;
}

/// Current time at the precision stores persist.
#[must_use]
pub fn now_micros() -> DateTime<Utc> {
    to_micros(Utc::now())
}

/// Truncate to the microsecond precision of [`format_timestamp`].
#[must_use]
pub fn to_micros(value: DateTime<Utc>) -> DateTime<Utc> {
    value.trunc_subsecs(6)
}

/// Canonical timestamp text used by stores; fixed-width so it sorts
/// lexically in time order.
#[must_use]
pub fn format_timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::fixtures::{event, ts};

    #[test]
    fn empty_filter_matches_everything() {
        assert!(EventFilter::default().matches(&event("u1", "click", ts(5))));
    }

    #[test]
    fn time_bounds_are_inclusive() {
        let filter = EventFilter {
            event_type: None,
            start_time: Some(ts(10)),
            end_time: Some(ts(20)),
        };
        assert!(filter.matches(&event("u1", "click", ts(10))));
        assert!(filter.matches(&event("u1", "click", ts(20))));
        assert!(!filter.matches(&event("u1", "click", ts(9))));
        assert!(!filter.matches(&event("u1", "click", ts(21))));
    }

    #[test]
    fn event_type_must_match_exactly() {
        let filter = EventFilter {
            event_type: Some("purchase".into()),
            ..EventFilter::default()
        };
        assert!(filter.matches(&event("u1", "purchase", ts(0))));
        assert!(!filter.matches(&event("u1", "Purchase", ts(0))));
    }

    #[test]
    fn formatted_timestamps_sort_chronologically() {
        let earlier = format_timestamp(ts(1));
        let later = format_timestamp(ts(10));
        assert!(earlier < later);
        assert!(earlier.ends_with('Z'));
    }
}
