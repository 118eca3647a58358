//! Deterministic aggregation of per-tag statuses into one view (spec §4.3).

use serde_json::Value;

use crate::status::{offline_sentinel, Status};

/// `key(s) = 2 * priority + (1 if status == "online" else 0)`.
fn aggregation_key(status: &Status) -> i64 {
    2 * i64::from(status.priority) + i64::from(status.status_str() == "online")
}

/// Picks the winning status among a resource's live reports, or `None` if
/// there are none.
///
/// Higher priority dominates; at equal priority, an online report beats an
/// offline one (spec §4.3's "seen online" bias). Ties are broken by keeping
/// the *first* occurrence in `statuses` -- callers must pass statuses in tag
/// registration order for this to mean "earliest insertion wins" (spec §9).
#[must_use]
pub fn aggregate_winner<'a, I>(statuses: I) -> Option<&'a Status>
where
    I: IntoIterator<Item = &'a Status>,
{
    let mut best: Option<(&Status, i64)> = None;
    for status in statuses {
        let key = aggregation_key(status);
        match best {
            Some((_, best_key)) if key <= best_key => {}
            _ => best = Some((status, key)),
        }
    }
    best.map(|(status, _)| status)
}

/// The aggregated view of a resource: the winner's `presence_doc`, or
/// [`offline_sentinel`] if `statuses` is empty.
#[must_use]
pub fn aggregate_status<'a, I>(statuses: I) -> Value
where
    I: IntoIterator<Item = &'a Status>,
{
    aggregate_winner(statuses).map_or_else(offline_sentinel, |status| status.presence_doc.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn status(online: bool, priority: i32) -> Status {
        let s = if online { "online" } else { "offline" };
        Status::new(json!({"status": s}), 1000.0, priority).unwrap()
    }

    #[test]
    fn empty_input_returns_offline_sentinel() {
        let statuses: Vec<Status> = Vec::new();
        assert_eq!(aggregate_status(&statuses), offline_sentinel());
    }

    #[test]
    fn higher_priority_wins_regardless_of_online_state() {
        let low_online = status(true, 1);
        let high_offline = status(false, 5);
        let statuses = [low_online, high_offline];
        assert_eq!(aggregate_status(&statuses), json!({"status": "offline"}));
    }

    #[test]
    fn equal_priority_online_beats_offline() {
        let offline = status(false, 2);
        let online = status(true, 2);
        let statuses = [offline, online];
        assert_eq!(aggregate_status(&statuses), json!({"status": "online"}));
    }

    #[test]
    fn equal_priority_both_offline_keeps_first() {
        let mut first = status(false, 0);
        first.presence_doc = json!({"status": "offline", "marker": "first"});
        let mut second = status(false, 0);
        second.presence_doc = json!({"status": "offline", "marker": "second"});
        let statuses = [first, second];
        let result = aggregate_status(&statuses);
        assert_eq!(result["marker"], "first");
    }

    #[test]
    fn equal_priority_both_online_keeps_first() {
        let mut first = status(true, 3);
        first.presence_doc = json!({"status": "online", "marker": "first"});
        let mut second = status(true, 3);
        second.presence_doc = json!({"status": "online", "marker": "second"});
        let statuses = [first, second];
        let result = aggregate_status(&statuses);
        assert_eq!(result["marker"], "first");
    }

    #[test]
    fn deterministic_for_same_multiset() {
        let statuses = [status(true, 1), status(false, 5), status(true, 5)];
        let first_run = aggregate_status(&statuses);
        let second_run = aggregate_status(&statuses);
        assert_eq!(first_run, second_run);
    }

    proptest::proptest! {
        #[test]
        fn aggregation_is_deterministic_for_any_multiset(
            flags in proptest::collection::vec((proptest::bool::ANY, -10i32..10i32), 0..12)
        ) {
            let statuses: Vec<Status> = flags
                .into_iter()
                .map(|(online, priority)| status(online, priority))
                .collect();
            let first_run = aggregate_status(&statuses);
            let second_run = aggregate_status(&statuses);
            proptest::prop_assert_eq!(first_run, second_run);
        }

        #[test]
        fn winner_always_has_the_max_key(
            flags in proptest::collection::vec((proptest::bool::ANY, -10i32..10i32), 1..12)
        ) {
            let statuses: Vec<Status> = flags
                .into_iter()
                .map(|(online, priority)| status(online, priority))
                .collect();
            let max_key = statuses.iter().map(aggregation_key).max().unwrap();
            let winner = aggregate_status(&statuses);
            let winner_key = statuses
                .iter()
                .find(|s| s.presence_doc == winner)
                .map(aggregation_key)
                .unwrap();
            proptest::prop_assert_eq!(winner_key, max_key);
        }
    }
}
