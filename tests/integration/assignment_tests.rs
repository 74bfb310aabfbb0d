use chrono::{Duration, Utc};
use rand::SeedableRng;
use rand::rngs::StdRng;

use splitlab::LabError;
use splitlab::core::model::{ExperimentStatus, NewExperiment};
use splitlab::service::{ExperimentService, ServiceOptions};
use splitlab::storage::{Database, ExperimentStore};
use splitlab::test_utils::fixtures::{FixedRng, TempDatabase, new_variant};

use super::fixture::{LabFixture, variant_id};

#[test]
fn repeated_resolution_is_idempotent() {
    let fx = LabFixture::new();
    let exp = fx.fifty_fifty("idempotent", Utc::now() - Duration::days(1));
    let id = &exp.experiment.id;

    let first = fx.service.resolve_assignment(id, "u1").unwrap();
    for _ in 0..20 {
        let again = fx.service.resolve_assignment(id, "u1").unwrap();
        assert_eq!(again, first);
    }
    assert_eq!(
        fx.service
            .store()
            .get_assignments_for_experiment(id)
            .unwrap()
            .len(),
        1
    );
}

#[test]
fn fixed_generator_selects_expected_variant() {
    let fx = LabFixture::new();
    let exp = fx.fifty_fifty("fixed", Utc::now());
    let id = &exp.experiment.id;

    let high = fx
        .service
        .resolve_assignment_with(id, "u1", &mut FixedRng::high())
        .unwrap();
    assert_eq!(high.variant_id, variant_id(&exp, "treatment"));

    let low = fx
        .service
        .resolve_assignment_with(id, "u2", &mut FixedRng::low())
        .unwrap();
    assert_eq!(low.variant_id, variant_id(&exp, "control"));
}

#[test]
fn unknown_experiment_is_not_found() {
    let fx = LabFixture::new();
    let err = fx
        .service
        .resolve_assignment("no-such-id", "u1")
        .unwrap_err();
    assert!(matches!(err, LabError::NotFound(_)));
}

#[test]
fn split_converges_to_configured_weights() {
    let fx = LabFixture::new();
    let new = NewExperiment::new(
        "seventy-thirty",
        "purchase",
        vec![
            new_variant("control", 70.0, true),
            new_variant("treatment", 30.0, false),
        ],
    );
    let exp = fx.service.create_experiment(new).unwrap();
    let control_id = variant_id(&exp, "control");

    let mut rng = StdRng::seed_from_u64(2026);
    let users = 5_000u32;
    let mut control = 0u32;
    for n in 0..users {
        let assignment = fx
            .service
            .resolve_assignment_with(&exp.experiment.id, &format!("user-{n}"), &mut rng)
            .unwrap();
        if assignment.variant_id == control_id {
            control += 1;
        }
    }
    let share = f64::from(control) / f64::from(users);
    assert!((share - 0.70).abs() < 0.03, "control share {share}");
}

#[test]
fn require_running_policy_is_enforced() {
    let TempDatabase {
        temp_dir: _temp_dir,
        db,
        ..
    } = TempDatabase::new();
    let mut options = ServiceOptions::default();
    options.resolver.require_running = true;
    let service = ExperimentService::with_options(db, options);

    let exp = service
        .create_experiment(NewExperiment::new(
            "draft-only",
            "signup",
            vec![new_variant("only", 100.0, true)],
        ))
        .unwrap();
    let err = service
        .resolve_assignment(&exp.experiment.id, "u1")
        .unwrap_err();
    assert!(matches!(err, LabError::ExperimentInactive { .. }));

    service
        .set_status(&exp.experiment.id, ExperimentStatus::Running)
        .unwrap();
    service.resolve_assignment(&exp.experiment.id, "u1").unwrap();
}

#[test]
fn assignments_survive_reopening_the_database() {
    let TempDatabase {
        temp_dir: _temp_dir,
        db_path,
        db,
    } = TempDatabase::new();
    let service = ExperimentService::new(db);
    let exp = service
        .create_experiment(NewExperiment::new(
            "durable",
            "purchase",
            vec![new_variant("a", 50.0, true), new_variant("b", 50.0, false)],
        ))
        .unwrap();
    let first = service
        .resolve_assignment_with(&exp.experiment.id, "u1", &mut FixedRng::low())
        .unwrap();
    drop(service);

    let reopened = ExperimentService::new(Database::open(&db_path).unwrap());
    let again = reopened
        .resolve_assignment_with(&exp.experiment.id, "u1", &mut FixedRng::high())
        .unwrap();
    assert_eq!(again, first);
}
