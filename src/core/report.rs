//! Experiment report: experiment metadata plus per-variant aggregates.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::core::aggregation::{VariantStats, ratio};
use crate::core::model::{Event, ExperimentStatus, ExperimentWithVariants};

/// Optional narrowing of the event stream a report is computed over.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportFilters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub experiment_id: String,
    pub name: String,
    pub description: Option<String>,
    pub status: ExperimentStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub primary_metric_name: String,
    pub days_running: i64,
    pub total_users: u64,
    pub global_conversion_rate: f64,
    pub count_variants: usize,
    pub count_events: usize,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub daily_event_volume: BTreeMap<NaiveDate, u64>,
    /// Keyed by ISO week, e.g. `2026-W01`.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub weekly_event_volume: BTreeMap<String, u64>,
    pub filters: ReportFilters,
    pub variants: BTreeMap<String, VariantStats>,
}

impl Report {
    #[must_use]
    pub fn variant(&self, name: &str) -> Option<&VariantStats> {
        self.variants.get(name)
    }
}

/// Whole days the experiment has run as of `now`.
///
/// An experiment whose end time has passed is measured start-to-end.
#[must_use]
pub fn days_running(
    start: DateTime<Utc>,
    end: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> i64 {
    let until = match end {
        Some(end) if now > end => end,
        _ => now,
    };
    (until - start).num_days().max(0)
}

/// Attributed events per UTC calendar day.
pub fn daily_volume<'e, I>(events: I) -> BTreeMap<NaiveDate, u64>
where
    I: IntoIterator<Item = &'e Event>,
{
    let mut volume = BTreeMap::new();
    for event in events {
        *volume.entry(event.timestamp.date_naive()).or_insert(0) += 1;
    }
    volume
}

/// Attributed events per ISO 8601 week (`YYYY-Www`, ISO week-year).
pub fn weekly_volume<'e, I>(events: I) -> BTreeMap<String, u64>
where
    I: IntoIterator<Item = &'e Event>,
{
    let mut volume = BTreeMap::new();
    for event in events {
        let week = event.timestamp.iso_week();
        let key = format!("{}-W{:02}", week.year(), week.week());
        *volume.entry(key).or_insert(0) += 1;
    }
    volume
}

/// Inputs to [`compose`] that do not live on the experiment itself.
#[derive(Debug)]
pub struct ComposeInput<'a> {
    pub stats: BTreeMap<String, VariantStats>,
    pub attributed_events: &'a [&'a Event],
    pub filters: ReportFilters,
    pub include_daily_volume: bool,
    pub include_weekly_volume: bool,
    pub now: DateTime<Utc>,
}

/// Combine experiment metadata with per-variant aggregates.
#[must_use]
pub fn compose(experiment: &ExperimentWithVariants, input: ComposeInput<'_>) -> Report {
    let meta = &experiment.experiment;
    let total_users: u64 = input.stats.values().map(|s| s.total_assigned_users).sum();
    let converting: BTreeSet<&str> = input
        .stats
        .values()
        .flat_map(|s| s.converting_users.iter().map(String::as_str))
        .collect();
    let daily_event_volume = if input.include_daily_volume {
        daily_volume(input.attributed_events.iter().copied())
    } else {
        BTreeMap::new()
    };
    let weekly_event_volume = if input.include_weekly_volume {
        weekly_volume(input.attributed_events.iter().copied())
    } else {
        BTreeMap::new()
    };

    Report {
        experiment_id: meta.id.clone(),
        name: meta.name.clone(),
        description: meta.description.clone(),
        status: meta.status,
        start_time: meta.start_time,
        end_time: meta.end_time,
        primary_metric_name: meta.primary_metric_name.clone(),
        days_running: days_running(meta.start_time, meta.end_time, input.now),
        total_users,
        global_conversion_rate: ratio(converting.len() as u64, total_users),
        count_variants: experiment.variants.len(),
        count_events: input.attributed_events.len(),
        daily_event_volume,
        weekly_event_volume,
        filters: input.filters,
        variants: input.stats,
    }
}
