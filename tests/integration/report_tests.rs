use chrono::{Duration, Utc};

use splitlab::core::model::{NewEvent, PropertyValue};
use splitlab::core::report::ReportFilters;
use splitlab::test_utils::fixtures::FixedRng;

use super::fixture::LabFixture;

fn purchase(user: &str, experiment_id: &str, at: chrono::DateTime<Utc>, price: f64) -> NewEvent {
    NewEvent {
        user_id: user.to_string(),
        event_type: "purchase".to_string(),
        timestamp: Some(at),
        experiment_id: Some(experiment_id.to_string()),
        properties: [("price".to_string(), PropertyValue::Number(price))]
            .into_iter()
            .collect(),
    }
}

#[test]
fn purchase_after_assignment_is_credited_to_treatment() {
    let fx = LabFixture::new();
    let start = Utc::now() - Duration::days(3);
    let exp = fx.fifty_fifty("checkout-flow", start);
    let id = exp.experiment.id.clone();

    let assignment = fx
        .service
        .resolve_assignment_with(&id, "u1", &mut FixedRng::high())
        .unwrap();
    let bought_at = assignment.assigned_at + Duration::seconds(1);
    fx.service
        .record_event(purchase("u1", &id, bought_at, 19.99))
        .unwrap();

    let report = fx
        .service
        .compute_report_at(&id, &ReportFilters::default(), bought_at + Duration::hours(1))
        .unwrap();

    assert_eq!(report.total_users, 1);
    assert_eq!(report.count_variants, 2);
    assert_eq!(report.count_events, 1);
    assert!((report.global_conversion_rate - 1.0).abs() < 1e-9);
    assert_eq!(report.days_running, 3);
    assert_eq!(report.daily_event_volume.values().sum::<u64>(), 1);
    assert_eq!(report.weekly_event_volume.values().sum::<u64>(), 1);

    let treatment = report.variant("treatment").unwrap();
    assert_eq!(treatment.total_assigned_users, 1);
    assert_eq!(treatment.conversion_count, 1);
    assert!((treatment.conversion_rate - 1.0).abs() < 1e-9);
    assert!((treatment.metric("total_revenue") - 19.99).abs() < 1e-9);

    let control = report.variant("control").unwrap();
    assert_eq!(control.total_assigned_users, 0);
    assert_eq!(control.conversion_count, 0);
    assert!(control.conversion_rate.abs() < f64::EPSILON);
    assert!(control.metric("total_revenue").abs() < f64::EPSILON);
}

#[test]
fn events_before_assignment_are_not_attributed() {
    let fx = LabFixture::new();
    let start = Utc::now() - Duration::days(1);
    let exp = fx.fifty_fifty("pre-exposure", start);
    let id = exp.experiment.id.clone();

    let assignment = fx
        .service
        .resolve_assignment_with(&id, "u1", &mut FixedRng::low())
        .unwrap();
    fx.service
        .record_event(purchase(
            "u1",
            &id,
            assignment.assigned_at - Duration::minutes(5),
            10.0,
        ))
        .unwrap();
    fx.service
        .record_event(purchase("ghost", &id, assignment.assigned_at, 5.0))
        .unwrap();

    let report = fx
        .service
        .compute_report_at(
            &id,
            &ReportFilters::default(),
            assignment.assigned_at + Duration::hours(1),
        )
        .unwrap();
    assert_eq!(report.count_events, 0);
    let control = report.variant("control").unwrap();
    assert_eq!(control.total_assigned_users, 1);
    assert_eq!(control.conversion_count, 0);
    assert!(control.metric("total_revenue").abs() < f64::EPSILON);
}

#[test]
fn event_type_filter_narrows_the_stream() {
    let fx = LabFixture::new();
    let exp = fx.fifty_fifty("filtered", Utc::now() - Duration::days(1));
    let id = exp.experiment.id.clone();

    let assignment = fx
        .service
        .resolve_assignment_with(&id, "u1", &mut FixedRng::high())
        .unwrap();
    let later = assignment.assigned_at + Duration::seconds(10);
    fx.service
        .record_event(purchase("u1", &id, later, 42.0))
        .unwrap();
    fx.service
        .record_event(NewEvent {
            user_id: "u1".to_string(),
            event_type: "page_view".to_string(),
            timestamp: Some(later),
            experiment_id: Some(id.clone()),
            properties: Default::default(),
        })
        .unwrap();

    let filters = ReportFilters {
        event_type: Some("page_view".to_string()),
        ..ReportFilters::default()
    };
    let report = fx
        .service
        .compute_report_at(&id, &filters, later + Duration::hours(1))
        .unwrap();

    assert_eq!(report.count_events, 1);
    let treatment = report.variant("treatment").unwrap();
    assert_eq!(treatment.event_count("page_view"), 1);
    assert_eq!(treatment.event_count("purchase"), 0);
    assert_eq!(treatment.conversion_count, 0);
    assert_eq!(report.filters, filters);
}
