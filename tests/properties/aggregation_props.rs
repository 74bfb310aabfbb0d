use chrono::Duration;
use proptest::prelude::*;

use splitlab::core::aggregation::{RevenueRule, aggregate};
use splitlab::core::attribution::{assignment_times, filter_attributed};
use splitlab::core::model::{Assignment, Event, PropertyValue, Variant};
use splitlab::test_utils::fixtures::{assignment, event_with, ts, variant};

#[derive(Debug, Clone)]
struct Scenario {
    variants: Vec<Variant>,
    assignments: Vec<Assignment>,
    events: Vec<Event>,
}

fn scenario_strategy() -> impl Strategy<Value = Scenario> {
    let users = prop::collection::vec((0usize..3, 0i64..1_000), 0..20);
    let events = prop::collection::vec((0usize..25, 0i64..2_000, any::<bool>(), 0u32..500), 0..60);
    (users, events).prop_map(|(users, raw_events)| {
        let variants = vec![
            variant("exp", "a", 34.0, true),
            variant("exp", "b", 33.0, false),
            variant("exp", "c", 33.0, false),
        ];
        let assignments = users
            .iter()
            .enumerate()
            .map(|(n, (slot, at))| {
                assignment("exp", &format!("u{n}"), &variants[*slot].id, ts(*at))
            })
            .collect();
        let events = raw_events
            .into_iter()
            .map(|(user, at, is_purchase, cents)| {
                let kind = if is_purchase { "purchase" } else { "page_view" };
                event_with(
                    &format!("u{user}"),
                    kind,
                    ts(at),
                    &[("price", PropertyValue::Number(f64::from(cents) / 100.0))],
                )
            })
            .collect();
        Scenario {
            variants,
            assignments,
            events,
        }
    })
}

proptest! {
    #[test]
    fn attribution_never_keeps_pre_assignment_or_unassigned_events(s in scenario_strategy()) {
        let times = assignment_times(&s.assignments);
        for event in filter_attributed(&s.events, &times) {
            let at = times.get(event.user_id.as_str()).copied();
            prop_assert!(at.is_some());
            prop_assert!(event.timestamp >= at.unwrap());
        }
    }

    #[test]
    fn attribution_includes_the_assignment_instant(offset in 0i64..1_000) {
        let assignments = vec![assignment("exp", "u1", "exp-a", ts(offset))];
        let events = vec![
            event_with("u1", "purchase", ts(offset), &[]),
            event_with("u1", "purchase", ts(offset) - Duration::microseconds(1), &[]),
        ];
        let times = assignment_times(&assignments);
        let kept = filter_attributed(&events, &times);
        prop_assert_eq!(kept.len(), 1);
        prop_assert_eq!(kept[0].timestamp, ts(offset));
    }

    #[test]
    fn every_variant_has_a_bucket_and_users_add_up(s in scenario_strategy()) {
        let times = assignment_times(&s.assignments);
        let attributed = filter_attributed(&s.events, &times);
        let stats = aggregate(
            &s.variants,
            &s.assignments,
            attributed.iter().copied(),
            "purchase",
            &RevenueRule::default(),
        );

        prop_assert_eq!(stats.len(), s.variants.len());
        let total: u64 = stats.values().map(|v| v.total_assigned_users).sum();
        prop_assert_eq!(total, s.assignments.len() as u64);
        for bucket in stats.values() {
            prop_assert!(bucket.conversion_count <= bucket.total_assigned_users);
            prop_assert!((0.0..=1.0).contains(&bucket.conversion_rate));
            prop_assert!(bucket.metric("total_revenue") >= 0.0);
        }
    }

    #[test]
    fn aggregation_is_order_independent(s in scenario_strategy()) {
        let times = assignment_times(&s.assignments);
        let attributed = filter_attributed(&s.events, &times);
        let rule = RevenueRule::default();
        let forward = aggregate(
            &s.variants,
            &s.assignments,
            attributed.iter().copied(),
            "purchase",
            &rule,
        );
        let backward = aggregate(
            &s.variants,
            &s.assignments,
            attributed.iter().rev().copied(),
            "purchase",
            &rule,
        );

        prop_assert_eq!(forward.keys().collect::<Vec<_>>(), backward.keys().collect::<Vec<_>>());
        for (name, a) in &forward {
            let b = &backward[name];
            prop_assert_eq!(&a.converting_users, &b.converting_users);
            prop_assert_eq!(&a.event_counts, &b.event_counts);
            prop_assert!((a.metric("total_revenue") - b.metric("total_revenue")).abs() < 1e-6);
        }
    }
}
