use chrono::{DateTime, Utc};

use splitlab::core::model::{ExperimentStatus, ExperimentWithVariants, NewExperiment};
use splitlab::service::ExperimentService;
use splitlab::storage::Database;
use splitlab::test_utils::fixtures::{TempDatabase, new_variant};
use tempfile::TempDir;

/// Service over a fresh on-disk database. The temp dir lives as long as the
/// fixture.
pub struct LabFixture {
    pub _temp_dir: TempDir,
    pub service: ExperimentService<Database>,
}

impl LabFixture {
    pub fn new() -> Self {
        splitlab::test_utils::logging::init();
        let TempDatabase { temp_dir, db, .. } = TempDatabase::new();
        Self {
            _temp_dir: temp_dir,
            service: ExperimentService::new(db),
        }
    }

    /// Running 50/50 control/treatment experiment converting on `purchase`.
    pub fn fifty_fifty(&self, name: &str, start: DateTime<Utc>) -> ExperimentWithVariants {
        let mut new = NewExperiment::new(
            name,
            "purchase",
            vec![
                new_variant("control", 50.0, true),
                new_variant("treatment", 50.0, false),
            ],
        );
        new.status = ExperimentStatus::Running;
        new.start_time = Some(start);
        self.service
            .create_experiment(new)
            .expect("create experiment")
    }
}

pub fn variant_id(experiment: &ExperimentWithVariants, name: &str) -> String {
    experiment
        .variants
        .iter()
        .find(|v| v.name == name)
        .map(|v| v.id.clone())
        .expect("variant exists")
}
