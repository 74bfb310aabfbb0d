//! Service facade over the engine: what the request layer calls.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use rand::Rng;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::Config;
use crate::core::aggregation::{RevenueRule, aggregate};
use crate::core::attribution::{assignment_times, filter_attributed};
use crate::core::model::{
    Assignment, Event, Experiment, ExperimentStatus, ExperimentWithVariants, NewEvent,
    NewExperiment, NewVariant,
};
use crate::core::report::{ComposeInput, Report, ReportFilters, compose};
use crate::core::resolver::{AssignmentResolver, ResolverOptions};
use crate::error::{LabError, Result};
use crate::storage::{EventFilter, ExperimentStore, now_micros, to_micros};

/// Allowed distance of a variant weight sum from 100.
pub const ALLOCATION_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceOptions {
    pub resolver: ResolverOptions,
    pub revenue: RevenueRule,
    pub include_daily_volume: bool,
    pub include_weekly_volume: bool,
}

impl Default for ServiceOptions {
    fn default() -> Self {
        Self {
            resolver: ResolverOptions::default(),
            revenue: RevenueRule::default(),
            include_daily_volume: true,
            include_weekly_volume: true,
        }
    }
}

impl From<&Config> for ServiceOptions {
    fn from(config: &Config) -> Self {
        Self {
            resolver: ResolverOptions {
                require_running: config.assignment.require_running,
            },
            revenue: RevenueRule {
                event_type: config.metrics.revenue_event_type.clone(),
                property: config.metrics.revenue_property.clone(),
                metric: config.metrics.revenue_metric.clone(),
            },
            include_daily_volume: config.report.include_daily_volume,
            include_weekly_volume: config.report.include_weekly_volume,
        }
    }
}

#[derive(Debug)]
pub struct ExperimentService<S: ExperimentStore> {
    store: S,
    options: ServiceOptions,
}

impl<S: ExperimentStore> ExperimentService<S> {
    pub fn new(store: S) -> Self {
        Self::with_options(store, ServiceOptions::default())
    }

    pub const fn with_options(store: S, options: ServiceOptions) -> Self {
        Self { store, options }
    }

    pub const fn store(&self) -> &S {
        &self.store
    }

    pub const fn options(&self) -> &ServiceOptions {
        &self.options
    }

    /// Resolve with the thread-local generator.
    pub fn resolve_assignment(&self, experiment_id: &str, user_id: &str) -> Result<Assignment> {
        self.resolve_assignment_with(experiment_id, user_id, &mut rand::rng())
    }

    pub fn resolve_assignment_with<R: Rng + ?Sized>(
        &self,
        experiment_id: &str,
        user_id: &str,
        rng: &mut R,
    ) -> Result<Assignment> {
        require_non_empty("experiment id", experiment_id)?;
        require_non_empty("user id", user_id)?;
        AssignmentResolver::new(&self.store)
            .with_options(self.options.resolver)
            .resolve(experiment_id, user_id, rng)
    }

    pub fn compute_report(&self, experiment_id: &str, filters: &ReportFilters) -> Result<Report> {
        self.compute_report_at(experiment_id, filters, Utc::now())
    }

    /// Build the report as of `now`. Events before the experiment start are
    /// never counted, whatever the filter asks for.
    pub fn compute_report_at(
        &self,
        experiment_id: &str,
        filters: &ReportFilters,
        now: DateTime<Utc>,
    ) -> Result<Report> {
        let experiment = self.get_experiment(experiment_id)?;
        let assignments = self.store.get_assignments_for_experiment(experiment_id)?;

        let experiment_start = experiment.experiment.start_time;
        let window = EventFilter {
            event_type: filters.event_type.clone(),
            start_time: Some(
                filters
                    .start_time
                    .map_or(experiment_start, |start| start.max(experiment_start)),
            ),
            end_time: filters.end_time,
        };
        let events = self.store.get_events_for_experiment(experiment_id, &window)?;

        let assigned_at = assignment_times(&assignments);
        let attributed = filter_attributed(&events, &assigned_at);
        debug!(
            experiment_id,
            assignments = assignments.len(),
            events = events.len(),
            attributed = attributed.len(),
            "aggregating report"
        );

        let stats = aggregate(
            &experiment.variants,
            &assignments,
            attributed.iter().copied(),
            &experiment.experiment.primary_metric_name,
            &self.options.revenue,
        );
        let report = compose(
            &experiment,
            ComposeInput {
                stats,
                attributed_events: &attributed,
                filters: filters.clone(),
                include_daily_volume: self.options.include_daily_volume,
                include_weekly_volume: self.options.include_weekly_volume,
                now,
            },
        );
        info!(
            experiment_id,
            total_users = report.total_users,
            count_events = report.count_events,
            "report computed"
        );
        Ok(report)
    }

    /// Validate and persist a new experiment.
    pub fn create_experiment(&self, new: NewExperiment) -> Result<ExperimentWithVariants> {
        validate_new_experiment(&new)?;
        let created = self.store.create_experiment(&new)?;
        info!(
            experiment_id = %created.experiment.id,
            name = %created.experiment.name,
            variants = created.variants.len(),
            "experiment created"
        );
        Ok(created)
    }

    /// Append an event. A named experiment must exist.
    pub fn record_event(&self, new: NewEvent) -> Result<Event> {
        require_non_empty("user id", &new.user_id)?;
        require_non_empty("event type", &new.event_type)?;
        if let Some(experiment_id) = new.experiment_id.as_deref() {
            if self.store.get_experiment_with_variants(experiment_id)?.is_none() {
                return Err(LabError::NotFound(format!(
                    "experiment not found: {experiment_id}"
                )));
            }
        }

        let event = Event {
            id: Uuid::new_v4().to_string(),
            user_id: new.user_id,
            event_type: new.event_type,
            timestamp: new.timestamp.map_or_else(now_micros, to_micros),
            experiment_id: new.experiment_id,
            properties: new.properties,
        };
        self.store.insert_event(&event)?;
        debug!(event_id = %event.id, event_type = %event.event_type, "event recorded");
        Ok(event)
    }

    pub fn get_experiment(&self, experiment_id: &str) -> Result<ExperimentWithVariants> {
        self.store
            .get_experiment_with_variants(experiment_id)?
            .ok_or_else(|| LabError::NotFound(format!("experiment not found: {experiment_id}")))
    }

    pub fn list_experiments(&self, limit: usize, offset: usize) -> Result<Vec<Experiment>> {
        self.store.list_experiments(limit, offset)
    }

    pub fn set_status(&self, experiment_id: &str, status: ExperimentStatus) -> Result<Experiment> {
        let updated = self.store.update_experiment_status(experiment_id, status)?;
        info!(experiment_id, %status, "experiment status updated");
        Ok(updated)
    }
}

fn require_non_empty(what: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(LabError::ValidationFailed(format!("{what} must not be empty")));
    }
    Ok(())
}

/// Creation-time checks on the variant set: at least one variant, unique
/// non-empty names, each weight in [0, 100], weights summing to 100.
pub fn validate_allocation(variants: &[NewVariant]) -> Result<()> {
    if variants.is_empty() {
        return Err(LabError::ValidationFailed(
            "experiment needs at least one variant".to_string(),
        ));
    }

    let mut seen = HashSet::with_capacity(variants.len());
    for variant in variants {
        require_non_empty("variant name", &variant.name)?;
        if !seen.insert(variant.name.as_str()) {
            return Err(LabError::ValidationFailed(format!(
                "duplicate variant name: {}",
                variant.name
            )));
        }
        let weight = variant.traffic_allocation_percent;
        if !weight.is_finite() || !(0.0..=100.0).contains(&weight) {
            return Err(LabError::ValidationFailed(format!(
                "variant {} weight {weight} outside [0, 100]",
                variant.name
            )));
        }
    }

    let total: f64 = variants.iter().map(|v| v.traffic_allocation_percent).sum();
    if (total - 100.0).abs() > ALLOCATION_TOLERANCE {
        return Err(LabError::ValidationFailed(format!(
            "traffic allocation must total 100, got {total}"
        )));
    }
    Ok(())
}

pub fn validate_new_experiment(new: &NewExperiment) -> Result<()> {
    require_non_empty("experiment name", &new.name)?;
    require_non_empty("primary metric name", &new.primary_metric_name)?;
    if let (Some(start), Some(end)) = (new.start_time, new.end_time) {
        if end <= start {
            return Err(LabError::ValidationFailed(
                "end time must be after start time".to_string(),
            ));
        }
    }
    if !(new.target_duration_days.is_finite() && new.target_duration_days > 0.0) {
        return Err(LabError::ValidationFailed(
            "target duration must be a positive number of days".to_string(),
        ));
    }
    if !(new.target_confidence > 0.0 && new.target_confidence < 1.0) {
        return Err(LabError::ValidationFailed(
            "target confidence must lie strictly between 0 and 1".to_string(),
        ));
    }
    validate_allocation(&new.variants)
}
