//! Weighted variant allocation.
//!
//! Variants are ordered by (name, id) before the cumulative table is built, so
//! the boundaries do not depend on the order storage returned them in. The
//! random source is always passed in by the caller.

use rand::Rng;

use crate::core::model::Variant;
use crate::error::{LabError, Result};

/// Cumulative-weight table over one experiment's variants.
#[derive(Debug, Clone)]
pub struct AllocationTable<'a> {
    entries: Vec<(f64, &'a Variant)>,
    total: f64,
}

impl<'a> AllocationTable<'a> {
    /// Build the table, rejecting variant sets nothing can be drawn from.
    pub fn build(variants: &'a [Variant]) -> Result<Self> {
        if variants.is_empty() {
            return Err(LabError::InvalidConfiguration(
                "experiment has no variants".to_string(),
            ));
        }

        let mut ordered: Vec<&Variant> = variants.iter().collect();
        ordered.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));

        let mut entries = Vec::with_capacity(ordered.len());
        let mut total = 0.0f64;
        for variant in ordered {
            let weight = variant.traffic_allocation_percent;
            if !weight.is_finite() || weight < 0.0 {
                return Err(LabError::InvalidConfiguration(format!(
                    "variant {} has invalid weight {weight}",
                    variant.name
                )));
            }
            total += weight;
            entries.push((total, variant));
        }

        if total <= 0.0 {
            return Err(LabError::InvalidConfiguration(
                "experiment has no allocated traffic".to_string(),
            ));
        }

        Ok(Self { entries, total })
    }

    /// Sum of all variant weights.
    #[must_use]
    pub const fn total_weight(&self) -> f64 {
        self.total
    }

    /// Draw one variant in proportion to its weight.
    pub fn draw<R: Rng + ?Sized>(&self, rng: &mut R) -> &'a Variant {
        let target = rng.random_range(0.0..self.total);
        let mut previous = 0.0f64;
        let mut last_positive = None;
        for &(cumulative, variant) in &self.entries {
            let positive = cumulative > previous;
            previous = cumulative;
            if !positive {
                continue;
            }
            last_positive = Some(variant);
            if cumulative >= target {
                return variant;
            }
        }

        // Float drift past the final boundary closes onto the last live variant.
        match last_positive {
            Some(variant) => variant,
            None => self.entries[self.entries.len() - 1].1,
        }
    }
}

/// Build a table and draw once.
pub fn allocate<'a, R: Rng + ?Sized>(variants: &'a [Variant], rng: &mut R) -> Result<&'a Variant> {
    Ok(AllocationTable::build(variants)?.draw(rng))
}
