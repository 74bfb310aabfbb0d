//! Event attribution: only behaviour at or after assignment counts.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::core::model::{Assignment, Event};

/// Map each assigned user to the moment they entered the experiment.
#[must_use]
pub fn assignment_times(assignments: &[Assignment]) -> HashMap<&str, DateTime<Utc>> {
    assignments
        .iter()
        .map(|a| (a.user_id.as_str(), a.assigned_at))
        .collect()
}

/// Keep events whose user is assigned and whose timestamp is not before the
/// assignment. Users without an assignment are never attributed.
#[must_use]
pub fn filter_attributed<'e>(
    events: &'e [Event],
    assigned_at: &HashMap<&str, DateTime<Utc>>,
) -> Vec<&'e Event> {
    events
        .iter()
        .filter(|event| {
            assigned_at
                .get(event.user_id.as_str())
                .is_some_and(|at| event.timestamp >= *at)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::fixtures::{assignment, event, ts};

    #[test]
    fn pre_assignment_events_are_dropped() {
        let assignments = vec![assignment("exp", "u1", "v1", ts(100))];
        let events = vec![
            event("u1", "click", ts(99)),
            event("u1", "click", ts(101)),
        ];
        let times = assignment_times(&assignments);
        let kept = filter_attributed(&events, &times);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].timestamp, ts(101));
    }

    #[test]
    fn event_at_assignment_instant_is_included() {
        let assignments = vec![assignment("exp", "u1", "v1", ts(100))];
        let events = vec![event("u1", "purchase", ts(100))];
        let times = assignment_times(&assignments);
        assert_eq!(filter_attributed(&events, &times).len(), 1);
    }

    #[test]
    fn unassigned_users_are_excluded() {
        let assignments = vec![assignment("exp", "u1", "v1", ts(0))];
        let events = vec![event("u2", "purchase", ts(50)), event("u1", "purchase", ts(50))];
        let times = assignment_times(&assignments);
        let kept = filter_attributed(&events, &times);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].user_id, "u1");
    }

    #[test]
    fn empty_inputs_yield_nothing() {
        let times = assignment_times(&[]);
        assert!(filter_attributed(&[], &times).is_empty());
        let events = vec![event("u1", "click", ts(1))];
        assert!(filter_attributed(&events, &times).is_empty());
    }
}
