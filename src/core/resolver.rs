//! Assignment resolution: at most one variant per (experiment, user), ever.
//!
//! No in-process lock is held. Two callers racing on a fresh pair both
//! allocate; the store's insert-if-absent picks the winner and the loser
//! adopts the winner's record.

use rand::Rng;
use tracing::{debug, info, warn};

use crate::core::allocator::allocate;
use crate::core::model::{Assignment, ExperimentStatus};
use crate::error::{LabError, Result};
use crate::storage::ExperimentStore;

/// Policy knobs for [`AssignmentResolver`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolverOptions {
    /// Refuse new assignments unless the experiment is `RUNNING`. Existing
    /// assignments are still returned.
    pub require_running: bool,
}

#[derive(Debug)]
pub struct AssignmentResolver<'s, S: ExperimentStore + ?Sized> {
    store: &'s S,
    options: ResolverOptions,
}

impl<'s, S: ExperimentStore + ?Sized> AssignmentResolver<'s, S> {
    pub const fn new(store: &'s S) -> Self {
        Self {
            store,
            options: ResolverOptions {
                require_running: false,
            },
        }
    }

    #[must_use]
    pub const fn with_options(mut self, options: ResolverOptions) -> Self {
        self.options = options;
        self
    }

    /// Return the user's variant, allocating and persisting one on first
    /// sight.
    pub fn resolve<R: Rng + ?Sized>(
        &self,
        experiment_id: &str,
        user_id: &str,
        rng: &mut R,
    ) -> Result<Assignment> {
        if let Some(existing) = self.store.get_assignment(experiment_id, user_id)? {
            debug!(experiment_id, user_id, variant_id = %existing.variant_id, "assignment hit");
            return Ok(existing);
        }

        let experiment = self
            .store
            .get_experiment_with_variants(experiment_id)?
            .ok_or_else(|| LabError::NotFound(format!("experiment not found: {experiment_id}")))?;

        let status = experiment.experiment.status;
        if self.options.require_running && status != ExperimentStatus::Running {
            return Err(LabError::ExperimentInactive {
                experiment_id: experiment_id.to_string(),
                status: status.to_string(),
            });
        }

        let variant = allocate(&experiment.variants, rng)?;

        match self
            .store
            .create_assignment(experiment_id, user_id, &variant.id)
        {
            Ok(created) => {
                info!(experiment_id, user_id, variant = %variant.name, "user assigned");
                Ok(created)
            }
            Err(LabError::Conflict(reason)) => {
                debug!(experiment_id, user_id, %reason, "lost assignment race; adopting winner");
                self.store
                    .get_assignment(experiment_id, user_id)?
                    .ok_or_else(|| {
                        warn!(experiment_id, user_id, "conflict reported but no assignment stored");
                        LabError::StorageUnavailable(format!(
                            "assignment for user {user_id} in experiment {experiment_id} \
                             conflicted but could not be read back"
                        ))
                    })
            }
            Err(err) => Err(err),
        }
    }
}
