//! In-memory [`ExperimentStore`] for tests and benches.
//!
//! Besides plain storage it supports error injection per operation and
//! scripted assignment races, so resolver paths that a real database only
//! hits under contention can be exercised deterministically.
//!
//! ```rust,ignore
//! use splitlab::storage::{ErrorInjection, MemoryStore, StoreErrorKind};
//!
//! let store = MemoryStore::new();
//! store.seed_experiment(experiment);
//! store.inject_error(ErrorInjection::Operation(
//!     "create_assignment".into(),
//!     StoreErrorKind::Unavailable,
//! ));
//! ```

use std::collections::{BTreeMap, HashMap};

use parking_lot::Mutex;

use crate::core::model::{
    Assignment, Event, Experiment, ExperimentStatus, ExperimentWithVariants, NewExperiment,
    Variant,
};
use crate::error::{LabError, Result};
use crate::storage::{EventFilter, ExperimentStore, now_micros, to_micros};

/// Kind of error to inject.
#[derive(Debug, Clone)]
pub enum StoreErrorKind {
    /// Backing store unreachable.
    Unavailable,
    NotFound,
    Custom(String),
}

impl StoreErrorKind {
    fn to_error(&self, context: &str) -> LabError {
        match self {
            Self::Unavailable => LabError::StorageUnavailable(format!("mock error: {context}")),
            Self::NotFound => LabError::NotFound(format!("mock error: {context}")),
            Self::Custom(msg) => LabError::StorageUnavailable(format!("{msg}: {context}")),
        }
    }
}

/// Error injection configuration.
#[derive(Debug, Clone)]
pub enum ErrorInjection {
    /// Fail every operation.
    All(StoreErrorKind),
    /// Fail one named operation, e.g. `"create_assignment"`.
    Operation(String, StoreErrorKind),
    /// Fail any operation touching this experiment id.
    Experiment(String, StoreErrorKind),
}

/// Scripted outcome for the next `create_assignment` on one pair.
#[derive(Debug, Clone)]
pub enum Race {
    /// Another writer commits this variant first; the caller gets `Conflict`.
    Competitor(String),
    /// `Conflict` is reported but nothing was written.
    Phantom,
}

#[derive(Debug, Default)]
struct State {
    experiments: BTreeMap<String, ExperimentWithVariants>,
    assignments: HashMap<(String, String), Assignment>,
    events: Vec<Event>,
    next_id: u64,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    error_on: Mutex<Option<ErrorInjection>>,
    races: Mutex<HashMap<(String, String), Race>>,
    calls: Mutex<HashMap<&'static str, usize>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inject_error(&self, injection: ErrorInjection) {
        *self.error_on.lock() = Some(injection);
    }

    pub fn clear_error(&self) {
        *self.error_on.lock() = None;
    }

    pub fn inject_race(&self, experiment_id: &str, user_id: &str, race: Race) {
        self.races
            .lock()
            .insert((experiment_id.to_string(), user_id.to_string()), race);
    }

    /// Number of times an operation was invoked, failed calls included.
    #[must_use]
    pub fn calls(&self, op: &str) -> usize {
        self.calls.lock().get(op).copied().unwrap_or(0)
    }

    /// Insert an experiment as-is, bypassing creation validation.
    pub fn seed_experiment(&self, experiment: ExperimentWithVariants) {
        self.state
            .lock()
            .experiments
            .insert(experiment.experiment.id.clone(), experiment);
    }

    /// Insert an assignment with a caller-chosen timestamp.
    pub fn seed_assignment(&self, assignment: Assignment) {
        let key = (assignment.experiment_id.clone(), assignment.user_id.clone());
        self.state.lock().assignments.insert(key, assignment);
    }

    pub fn seed_event(&self, event: Event) {
        self.state.lock().events.push(event);
    }

    /// Change a variant's weight after the fact. Returns false when no such
    /// variant exists.
    pub fn set_variant_weight(&self, experiment_id: &str, variant_name: &str, weight: f64) -> bool {
        let mut state = self.state.lock();
        state
            .experiments
            .get_mut(experiment_id)
            .and_then(|exp| exp.variants.iter_mut().find(|v| v.name == variant_name))
            .map(|variant| variant.traffic_allocation_percent = weight)
            .is_some()
    }

    #[must_use]
    pub fn assignment_count(&self) -> usize {
        self.state.lock().assignments.len()
    }

    fn check_error(&self, op: &'static str, experiment_id: Option<&str>) -> Result<()> {
        *self.calls.lock().entry(op).or_insert(0) += 1;

        let error_on = self.error_on.lock();
        if let Some(injection) = error_on.as_ref() {
            match injection {
                ErrorInjection::All(kind) => return Err(kind.to_error(op)),
                ErrorInjection::Operation(target_op, kind) if target_op == op => {
                    return Err(kind.to_error(op));
                }
                ErrorInjection::Experiment(target_id, kind)
                    if Some(target_id.as_str()) == experiment_id =>
                {
                    return Err(kind.to_error(&format!("{op}: {target_id}")));
                }
                _ => {}
            }
        }
        Ok(())
    }
}

fn generate_id(state: &mut State, prefix: &str) -> String {
    state.next_id += 1;
    format!("{prefix}-{}", state.next_id)
}

impl ExperimentStore for MemoryStore {
    fn get_assignment(&self, experiment_id: &str, user_id: &str) -> Result<Option<Assignment>> {
        self.check_error("get_assignment", Some(experiment_id))?;
        let key = (experiment_id.to_string(), user_id.to_string());
        Ok(self.state.lock().assignments.get(&key).cloned())
    }

    fn get_assignments_for_experiment(&self, experiment_id: &str) -> Result<Vec<Assignment>> {
        self.check_error("get_assignments_for_experiment", Some(experiment_id))?;
        let state = self.state.lock();
        let mut assignments: Vec<Assignment> = state
            .assignments
            .values()
            .filter(|a| a.experiment_id == experiment_id)
            .cloned()
            .collect();
        assignments.sort_by(|a, b| {
            a.assigned_at
                .cmp(&b.assigned_at)
                .then_with(|| a.user_id.cmp(&b.user_id))
        });
        Ok(assignments)
    }

    fn create_assignment(
        &self,
        experiment_id: &str,
        user_id: &str,
        variant_id: &str,
    ) -> Result<Assignment> {
        self.check_error("create_assignment", Some(experiment_id))?;
        let key = (experiment_id.to_string(), user_id.to_string());
        let conflict = || {
            LabError::Conflict(format!(
                "user {user_id} is already assigned in experiment {experiment_id}"
            ))
        };

        let mut state = self.state.lock();
        match self.races.lock().remove(&key) {
            Some(Race::Competitor(winner)) => {
                state.assignments.entry(key).or_insert_with(|| Assignment {
                    experiment_id: experiment_id.to_string(),
                    user_id: user_id.to_string(),
                    variant_id: winner,
                    assigned_at: now_micros(),
                });
                return Err(conflict());
            }
            Some(Race::Phantom) => return Err(conflict()),
            None => {}
        }

        if state.assignments.contains_key(&key) {
            return Err(conflict());
        }
        let assignment = Assignment {
            experiment_id: experiment_id.to_string(),
            user_id: user_id.to_string(),
            variant_id: variant_id.to_string(),
            assigned_at: now_micros(),
        };
        state.assignments.insert(key, assignment.clone());
        Ok(assignment)
    }

    fn get_experiment_with_variants(
        &self,
        experiment_id: &str,
    ) -> Result<Option<ExperimentWithVariants>> {
        self.check_error("get_experiment_with_variants", Some(experiment_id))?;
        Ok(self.state.lock().experiments.get(experiment_id).cloned())
    }

    fn get_events_for_experiment(
        &self,
        experiment_id: &str,
        filter: &EventFilter,
    ) -> Result<Vec<Event>> {
        self.check_error("get_events_for_experiment", Some(experiment_id))?;
        let state = self.state.lock();
        let mut events: Vec<Event> = state
            .events
            .iter()
            .filter(|e| e.experiment_id.as_deref() == Some(experiment_id) && filter.matches(e))
            .cloned()
            .collect();
        events.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));
        Ok(events)
    }

    fn create_experiment(&self, new: &NewExperiment) -> Result<ExperimentWithVariants> {
        self.check_error("create_experiment", None)?;
        let mut state = self.state.lock();
        if state
            .experiments
            .values()
            .any(|e| e.experiment.name == new.name)
        {
            return Err(LabError::Conflict(format!(
                "experiment name already exists: {}",
                new.name
            )));
        }

        let now = now_micros();
        let id = generate_id(&mut state, "exp");
        let mut variants: Vec<Variant> = Vec::with_capacity(new.variants.len());
        for v in &new.variants {
            if variants.iter().any(|existing| existing.name == v.name) {
                return Err(LabError::Conflict(format!(
                    "duplicate variant name: {}",
                    v.name
                )));
            }
            variants.push(Variant {
                id: format!("{id}-{}", v.name),
                experiment_id: id.clone(),
                name: v.name.clone(),
                traffic_allocation_percent: v.traffic_allocation_percent,
                is_control: v.is_control,
                configuration: v.configuration.clone(),
            });
        }
        variants.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));

        let created = ExperimentWithVariants {
            experiment: Experiment {
                id: id.clone(),
                name: new.name.clone(),
                description: new.description.clone(),
                status: new.status,
                start_time: new.start_time.map_or(now, to_micros),
                end_time: new.end_time.map(to_micros),
                primary_metric_name: new.primary_metric_name.clone(),
                target_duration_days: new.target_duration_days,
                target_confidence: new.target_confidence,
                updated_at: now,
            },
            variants,
        };
        state.experiments.insert(id, created.clone());
        Ok(created)
    }

    fn list_experiments(&self, limit: usize, offset: usize) -> Result<Vec<Experiment>> {
        self.check_error("list_experiments", None)?;
        let state = self.state.lock();
        let mut experiments: Vec<Experiment> = state
            .experiments
            .values()
            .map(|e| e.experiment.clone())
            .collect();
        experiments.sort_by(|a, b| {
            b.start_time
                .cmp(&a.start_time)
                .then_with(|| a.name.cmp(&b.name))
        });
        Ok(experiments.into_iter().skip(offset).take(limit).collect())
    }

    fn update_experiment_status(
        &self,
        experiment_id: &str,
        status: ExperimentStatus,
    ) -> Result<Experiment> {
        self.check_error("update_experiment_status", Some(experiment_id))?;
        let mut state = self.state.lock();
        let entry = state
            .experiments
            .get_mut(experiment_id)
            .ok_or_else(|| LabError::NotFound(format!("experiment not found: {experiment_id}")))?;
        entry.experiment.status = status;
        entry.experiment.updated_at = now_micros();
        Ok(entry.experiment.clone())
    }

    fn insert_event(&self, event: &Event) -> Result<()> {
        self.check_error("insert_event", event.experiment_id.as_deref())?;
        self.state.lock().events.push(event.clone());
        Ok(())
    }
}
