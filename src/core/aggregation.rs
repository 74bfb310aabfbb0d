//! Per-variant aggregation of assignments and attributed events.
//!
//! Conversion counts distinct users; revenue is a plain sum. Every configured
//! variant gets a bucket, including variants nobody was assigned to.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::core::model::{Assignment, Event, Variant};

/// Default event type whose numeric payload is summed as revenue.
pub const DEFAULT_REVENUE_EVENT_TYPE: &str = "purchase";
/// Default property carrying the purchase amount.
pub const DEFAULT_REVENUE_PROPERTY: &str = "price";
/// Default metric key the sum is reported under.
pub const DEFAULT_REVENUE_METRIC: &str = "total_revenue";

/// The one numeric extraction rule applied during aggregation.
///
/// Only a single (event type, property) pair is summed. Arbitrary numeric
/// metrics are not derived from payloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevenueRule {
    pub event_type: String,
    pub property: String,
    pub metric: String,
}

impl Default for RevenueRule {
    fn default() -> Self {
        Self {
            event_type: DEFAULT_REVENUE_EVENT_TYPE.to_string(),
            property: DEFAULT_REVENUE_PROPERTY.to_string(),
            metric: DEFAULT_REVENUE_METRIC.to_string(),
        }
    }
}

impl RevenueRule {
    fn amount(&self, event: &Event) -> Option<f64> {
        if event.event_type != self.event_type {
            return None;
        }
        event.numeric_property(&self.property)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VariantStats {
    pub variant_id: String,
    pub is_control: bool,
    pub traffic_allocation_percent: f64,
    #[serde(skip)]
    pub assigned_users: BTreeSet<String>,
    #[serde(skip)]
    pub converting_users: BTreeSet<String>,
    pub total_assigned_users: u64,
    pub conversion_count: u64,
    pub conversion_rate: f64,
    pub event_counts: BTreeMap<String, u64>,
    pub metrics: BTreeMap<String, f64>,
}

impl VariantStats {
    fn empty(variant: &Variant, rule: &RevenueRule) -> Self {
        let mut metrics = BTreeMap::new();
        metrics.insert(rule.metric.clone(), 0.0);
        Self {
            variant_id: variant.id.clone(),
            is_control: variant.is_control,
            traffic_allocation_percent: variant.traffic_allocation_percent,
            assigned_users: BTreeSet::new(),
            converting_users: BTreeSet::new(),
            total_assigned_users: 0,
            conversion_count: 0,
            conversion_rate: 0.0,
            event_counts: BTreeMap::new(),
            metrics,
        }
    }

    fn finalize(&mut self) {
        self.total_assigned_users = self.assigned_users.len() as u64;
        self.conversion_count = self.converting_users.len() as u64;
        self.conversion_rate = ratio(self.conversion_count, self.total_assigned_users);
    }

    /// Total occurrences of one event type for this variant.
    #[must_use]
    pub fn event_count(&self, event_type: &str) -> u64 {
        self.event_counts.get(event_type).copied().unwrap_or(0)
    }

    #[must_use]
    pub fn metric(&self, name: &str) -> f64 {
        self.metrics.get(name).copied().unwrap_or(0.0)
    }
}

/// `numerator / denominator`, defined as 0.0 for an empty denominator.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn ratio(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

/// Aggregate attributed events per variant, keyed by variant name.
pub fn aggregate<'e, I>(
    variants: &[Variant],
    assignments: &[Assignment],
    events: I,
    primary_metric: &str,
    rule: &RevenueRule,
) -> BTreeMap<String, VariantStats>
where
    I: IntoIterator<Item = &'e Event>,
{
    let mut buckets: BTreeMap<String, VariantStats> = variants
        .iter()
        .map(|variant| (variant.name.clone(), VariantStats::empty(variant, rule)))
        .collect();
    let name_by_id: HashMap<&str, &str> = variants
        .iter()
        .map(|variant| (variant.id.as_str(), variant.name.as_str()))
        .collect();

    let mut variant_of_user: HashMap<&str, &str> = HashMap::with_capacity(assignments.len());
    for assignment in assignments {
        let Some(&name) = name_by_id.get(assignment.variant_id.as_str()) else {
            warn!(
                experiment_id = %assignment.experiment_id,
                variant_id = %assignment.variant_id,
                "assignment references unknown variant; skipping"
            );
            continue;
        };
        variant_of_user.insert(assignment.user_id.as_str(), name);
        if let Some(bucket) = buckets.get_mut(name) {
            bucket.assigned_users.insert(assignment.user_id.clone());
        }
    }

    for event in events {
        let Some(&name) = variant_of_user.get(event.user_id.as_str()) else {
            continue;
        };
        let Some(bucket) = buckets.get_mut(name) else {
            continue;
        };

        *bucket.event_counts.entry(event.event_type.clone()).or_insert(0) += 1;
        if event.event_type == primary_metric {
            bucket.converting_users.insert(event.user_id.clone());
        }
        if let Some(amount) = rule.amount(event) {
            *bucket.metrics.entry(rule.metric.clone()).or_insert(0.0) += amount;
        }
    }

    for bucket in buckets.values_mut() {
        bucket.finalize();
    }
    buckets
}
