use std::sync::Arc;
use std::thread;

use chrono::Utc;

use splitlab::storage::ExperimentStore;

use super::fixture::LabFixture;

#[test]
fn concurrent_first_resolution_yields_one_record() {
    let fx = LabFixture::new();
    let exp = fx.fifty_fifty("racy", Utc::now());
    let id = exp.experiment.id.clone();
    let service = Arc::new(fx.service);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let service = Arc::clone(&service);
            let id = id.clone();
            thread::spawn(move || service.resolve_assignment(&id, "shared-user").unwrap())
        })
        .collect();
    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    let first = &results[0];
    assert!(results.iter().all(|r| r == first));
    let stored = service.store().get_assignments_for_experiment(&id).unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(&stored[0], first);
}

#[test]
fn concurrent_distinct_users_are_all_recorded() {
    let fx = LabFixture::new();
    let exp = fx.fifty_fifty("fan-out", Utc::now());
    let id = exp.experiment.id.clone();
    let service = Arc::new(fx.service);

    let handles: Vec<_> = (0..4)
        .map(|worker| {
            let service = Arc::clone(&service);
            let id = id.clone();
            thread::spawn(move || {
                for n in 0..25 {
                    service
                        .resolve_assignment(&id, &format!("w{worker}-u{n}"))
                        .unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let stored = service.store().get_assignments_for_experiment(&id).unwrap();
    assert_eq!(stored.len(), 100);
}
