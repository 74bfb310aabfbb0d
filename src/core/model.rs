//! Experiment, variant, assignment and event records.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{LabError, Result};

/// Lifecycle status of an experiment.
///
/// Transitions are not constrained; the status is metadata for the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExperimentStatus {
    #[default]
    Draft,
    Running,
    Paused,
    Completed,
    Archived,
}

impl ExperimentStatus {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "DRAFT",
            Self::Running => "RUNNING",
            Self::Paused => "PAUSED",
            Self::Completed => "COMPLETED",
            Self::Archived => "ARCHIVED",
        }
    }
}

impl fmt::Display for ExperimentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExperimentStatus {
    type Err = LabError;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "DRAFT" => Ok(Self::Draft),
            "RUNNING" => Ok(Self::Running),
            "PAUSED" => Ok(Self::Paused),
            "COMPLETED" => Ok(Self::Completed),
            "ARCHIVED" => Ok(Self::Archived),
            other => Err(LabError::ValidationFailed(format!(
                "unknown experiment status: {other} (expected draft|running|paused|completed|archived)"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Experiment {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub status: ExperimentStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    /// Event type that counts as a conversion.
    pub primary_metric_name: String,
    pub target_duration_days: f64,
    pub target_confidence: f64,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variant {
    pub id: String,
    pub experiment_id: String,
    pub name: String,
    /// Relative traffic share, expressed as a percentage.
    pub traffic_allocation_percent: f64,
    pub is_control: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub configuration: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentWithVariants {
    #[serde(flatten)]
    pub experiment: Experiment,
    pub variants: Vec<Variant>,
}

/// Durable (experiment, user) -> variant binding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    pub experiment_id: String,
    pub user_id: String,
    pub variant_id: String,
    pub assigned_at: DateTime<Utc>,
}

/// One value of an event's free-form property payload.
///
/// Untagged so payloads read naturally as JSON: `{"price": 19.99, "sku": "a1"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Bool(bool),
    Number(f64),
    Text(String),
    /// Nulls, arrays and objects are kept verbatim but never read as metrics.
    Other(serde_json::Value),
}

impl PropertyValue {
    /// Numeric reading of this value. Text that parses as a float counts;
    /// everything else is absent.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(value) if value.is_finite() => Some(*value),
            Self::Text(raw) => raw.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
            _ => None,
        }
    }
}

impl From<f64> for PropertyValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

pub type Properties = BTreeMap<String, PropertyValue>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub user_id: String,
    pub event_type: String,
    pub timestamp: DateTime<Utc>,
    pub experiment_id: Option<String>,
    #[serde(default)]
    pub properties: Properties,
}

impl Event {
    /// Numeric property lookup with an "absent" fallback.
    #[must_use]
    pub fn numeric_property(&self, key: &str) -> Option<f64> {
        self.properties.get(key).and_then(PropertyValue::as_f64)
    }
}

/// Input for a new variant, before ids are assigned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewVariant {
    pub name: String,
    pub traffic_allocation_percent: f64,
    #[serde(default)]
    pub is_control: bool,
    #[serde(default)]
    pub configuration: Option<serde_json::Value>,
}

/// Input for a new experiment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewExperiment {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: ExperimentStatus,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    pub primary_metric_name: String,
    #[serde(default = "default_target_duration_days")]
    pub target_duration_days: f64,
    #[serde(default = "default_target_confidence")]
    pub target_confidence: f64,
    pub variants: Vec<NewVariant>,
}

const fn default_target_duration_days() -> f64 {
    7.0
}

const fn default_target_confidence() -> f64 {
    0.95
}

impl NewExperiment {
    /// Minimal experiment input with the stored defaults applied.
    pub fn new(
        name: impl Into<String>,
        primary_metric_name: impl Into<String>,
        variants: Vec<NewVariant>,
    ) -> Self {
        Self {
            name: name.into(),
            description: None,
            status: ExperimentStatus::Draft,
            start_time: None,
            end_time: None,
            primary_metric_name: primary_metric_name.into(),
            target_duration_days: default_target_duration_days(),
            target_confidence: default_target_confidence(),
            variants,
        }
    }
}

/// Input for recording an event. A missing timestamp means "now".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewEvent {
    pub user_id: String,
    pub event_type: String,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub experiment_id: Option<String>,
    #[serde(default)]
    pub properties: Properties,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_parses_case_insensitively() {
        assert_eq!("running".parse::<ExperimentStatus>().unwrap(), ExperimentStatus::Running);
        assert_eq!("ARCHIVED".parse::<ExperimentStatus>().unwrap(), ExperimentStatus::Archived);
        assert!("live".parse::<ExperimentStatus>().is_err());
    }

    #[test]
    fn status_serializes_like_stored_value() {
        let json = serde_json::to_string(&ExperimentStatus::Completed).unwrap();
        assert_eq!(json, "\"COMPLETED\"");
        assert_eq!(ExperimentStatus::Completed.to_string(), "COMPLETED");
    }

    #[test]
    fn properties_deserialize_into_typed_values() {
        let props: Properties = serde_json::from_str(
            r#"{"price": 19.99, "sku": "a1", "gift": true, "tags": ["x"], "qty": "3"}"#,
        )
        .unwrap();
        assert_eq!(props["price"], PropertyValue::Number(19.99));
        assert_eq!(props["sku"], PropertyValue::Text("a1".into()));
        assert_eq!(props["gift"], PropertyValue::Bool(true));
        assert!(matches!(props["tags"], PropertyValue::Other(_)));
        assert_eq!(props["qty"].as_f64(), Some(3.0));
        assert_eq!(props["sku"].as_f64(), None);
        assert_eq!(props["gift"].as_f64(), None);
    }

    #[test]
    fn numeric_property_missing_key_is_absent() {
        let event = Event {
            id: "ev".into(),
            user_id: "u1".into(),
            event_type: "purchase".into(),
            timestamp: Utc::now(),
            experiment_id: None,
            properties: Properties::new(),
        };
        assert_eq!(event.numeric_property("price"), None);
    }
}
