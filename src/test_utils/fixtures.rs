//! Builders for experiments, assignments and events used across tests.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use rand::RngCore;
use tempfile::TempDir;

use crate::core::model::{
    Assignment, Event, Experiment, ExperimentStatus, ExperimentWithVariants, NewVariant,
    Properties, PropertyValue, Variant,
};
use crate::storage::Database;

/// 2026-01-01T00:00:00Z, the zero point of [`ts`].
pub const BASE_EPOCH: i64 = 1_767_225_600;

/// Fixed instant `secs` seconds after [`BASE_EPOCH`].
pub fn ts(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(BASE_EPOCH + secs, 0).expect("timestamp in range")
}

/// Random source that returns the same bits forever.
///
/// `low()` makes every uniform float draw 0.0; `high()` makes it land just
/// below the upper bound.
#[derive(Debug, Clone, Copy)]
pub struct FixedRng(pub u64);

impl FixedRng {
    pub const fn low() -> Self {
        Self(0)
    }

    pub const fn high() -> Self {
        Self(u64::MAX)
    }
}

impl RngCore for FixedRng {
    #[allow(clippy::cast_possible_truncation)]
    fn next_u32(&mut self) -> u32 {
        self.0 as u32
    }

    fn next_u64(&mut self) -> u64 {
        self.0
    }

    fn fill_bytes(&mut self, dst: &mut [u8]) {
        let bytes = self.0.to_le_bytes();
        for (i, byte) in dst.iter_mut().enumerate() {
            *byte = bytes[i % bytes.len()];
        }
    }
}

/// Variant whose id is `"{experiment_id}-{name}"`.
pub fn variant(experiment_id: &str, name: &str, weight: f64, is_control: bool) -> Variant {
    Variant {
        id: format!("{experiment_id}-{name}"),
        experiment_id: experiment_id.to_string(),
        name: name.to_string(),
        traffic_allocation_percent: weight,
        is_control,
        configuration: None,
    }
}

pub fn new_variant(name: &str, weight: f64, is_control: bool) -> NewVariant {
    NewVariant {
        name: name.to_string(),
        traffic_allocation_percent: weight,
        is_control,
        configuration: None,
    }
}

/// Running experiment named after its id, started at `ts(0)`, converting on
/// `purchase`.
pub fn experiment_with(experiment_id: &str, variants: Vec<Variant>) -> ExperimentWithVariants {
    ExperimentWithVariants {
        experiment: Experiment {
            id: experiment_id.to_string(),
            name: experiment_id.to_string(),
            description: None,
            status: ExperimentStatus::Running,
            start_time: ts(0),
            end_time: None,
            primary_metric_name: "purchase".to_string(),
            target_duration_days: 7.0,
            target_confidence: 0.95,
            updated_at: ts(0),
        },
        variants,
    }
}

pub fn assignment(
    experiment_id: &str,
    user_id: &str,
    variant_id: &str,
    assigned_at: DateTime<Utc>,
) -> Assignment {
    Assignment {
        experiment_id: experiment_id.to_string(),
        user_id: user_id.to_string(),
        variant_id: variant_id.to_string(),
        assigned_at,
    }
}

/// Event with no experiment id and no properties.
pub fn event(user_id: &str, event_type: &str, timestamp: DateTime<Utc>) -> Event {
    event_with(user_id, event_type, timestamp, &[])
}

pub fn event_with(
    user_id: &str,
    event_type: &str,
    timestamp: DateTime<Utc>,
    properties: &[(&str, PropertyValue)],
) -> Event {
    let properties: Properties = properties
        .iter()
        .map(|(key, value)| ((*key).to_string(), value.clone()))
        .collect();
    Event {
        id: uuid::Uuid::new_v4().to_string(),
        user_id: user_id.to_string(),
        event_type: event_type.to_string(),
        timestamp,
        experiment_id: None,
        properties,
    }
}

/// Isolated on-disk database under a temporary directory.
pub struct TempDatabase {
    pub temp_dir: TempDir,
    pub db_path: PathBuf,
    pub db: Database,
}

impl TempDatabase {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("splitlab.db");
        let db = Database::open(&db_path).expect("Failed to open database");
        Self {
            temp_dir,
            db_path,
            db,
        }
    }
}

impl Default for TempDatabase {
    fn default() -> Self {
        Self::new()
    }
}
