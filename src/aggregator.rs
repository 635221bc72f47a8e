//! # Session Aggregation Module
//!
//! Folds the actions of a session into a single summary
//!
//! ## Key Components
//! - [`SessionFold`] - Order-independent running fold over one session's actions
//! - [`aggregate_sessions`] - Group a shard of actions by session and fold each group

use chrono::NaiveDateTime;
use log::debug;
use rayon::prelude::*;
use std::collections::{BTreeSet, HashMap};

use crate::models::{ActionRecord, SessionSummary};

/// Running state of a session fold. Min, max and count are associative and
/// commutative, so partial folds built on different workers can be merged.
#[derive(Debug, Clone, Default)]
pub struct SessionFold {
    session_id: Option<String>,
    user_id: Option<i64>,
    search_keywords: BTreeSet<String>,
    click_category_ids: BTreeSet<i64>,
    start_time: Option<NaiveDateTime>,
    end_time: Option<NaiveDateTime>,
    step_count: u64,
}

impl SessionFold {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, action: &ActionRecord) {
        if self.session_id.is_none() {
            self.session_id = Some(action.session_id.clone());
        }
        self.merge_user(Some(action.user_id));

        if let Some(keyword) = &action.search_keyword {
            self.search_keywords.insert(keyword.clone());
        }
        if let Some(category_id) = action.click_category_id {
            self.click_category_ids.insert(category_id);
        }

        self.start_time = Some(match self.start_time {
            Some(start) => start.min(action.action_time),
            None => action.action_time,
        });
        self.end_time = Some(match self.end_time {
            Some(end) => end.max(action.action_time),
            None => action.action_time,
        });

        self.step_count += 1;
    }

    pub fn merge(mut self, other: SessionFold) -> SessionFold {
        if self.session_id.is_none() {
            self.session_id = other.session_id;
        }
        self.merge_user(other.user_id);
        self.search_keywords.extend(other.search_keywords);
        self.click_category_ids.extend(other.click_category_ids);
        self.start_time = min_option(self.start_time, other.start_time);
        self.end_time = max_option(self.end_time, other.end_time);
        self.step_count += other.step_count;
        self
    }

    /// Yields `None` only for a fold that never saw an action
    pub fn finish(self) -> Option<SessionSummary> {
        Some(SessionSummary {
            session_id: self.session_id?,
            user_id: self.user_id?,
            search_keywords: self.search_keywords,
            click_category_ids: self.click_category_ids,
            start_time: self.start_time?,
            end_time: self.end_time?,
            step_count: self.step_count,
        })
    }

    // Conflicting user ids resolve to the smallest
    fn merge_user(&mut self, user_id: Option<i64>) {
        match (self.user_id, user_id) {
            (None, incoming) => self.user_id = incoming,
            (Some(current), Some(incoming)) if incoming != current => {
                debug!(
                    "Session {:?} spans users {} and {}",
                    self.session_id, current, incoming
                );
                self.user_id = Some(current.min(incoming));
            }
            _ => {}
        }
    }
}

fn min_option(a: Option<NaiveDateTime>, b: Option<NaiveDateTime>) -> Option<NaiveDateTime> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

fn max_option(a: Option<NaiveDateTime>, b: Option<NaiveDateTime>) -> Option<NaiveDateTime> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, b) => a.or(b),
    }
}

/// Aggregate one shard. All actions of a session must live in the same shard.
/// Within the shard, actions are folded in parallel chunks whose partial folds
/// are merged per session.
pub fn aggregate_sessions(actions: &[ActionRecord]) -> Vec<SessionSummary> {
    let folds: HashMap<&str, SessionFold> = actions
        .par_iter()
        .fold(HashMap::<&str, SessionFold>::new, |mut folds, action| {
            folds
                .entry(action.session_id.as_str())
                .or_insert_with(SessionFold::new)
                .add(action);
            folds
        })
        .reduce(HashMap::new, merge_fold_maps);

    let mut summaries: Vec<SessionSummary> = folds
        .into_values()
        .filter_map(SessionFold::finish)
        .collect();
    summaries.sort_by(|a, b| a.session_id.cmp(&b.session_id));
    summaries
}

fn merge_fold_maps<'a>(
    mut into: HashMap<&'a str, SessionFold>,
    from: HashMap<&'a str, SessionFold>,
) -> HashMap<&'a str, SessionFold> {
    for (session_id, fold) in from {
        let merged = match into.remove(session_id) {
            Some(existing) => existing.merge(fold),
            None => fold,
        };
        into.insert(session_id, merged);
    }
    into
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::parse_action_time;
    use chrono::Duration;

    fn action(
        session: &str,
        secs: i64,
        keyword: Option<&str>,
        category: Option<i64>,
    ) -> ActionRecord {
        let base = parse_action_time("2024-03-01 10:00:00").unwrap();
        ActionRecord::new(
            session,
            7,
            base + Duration::seconds(secs),
            keyword.map(str::to_string),
            category,
        )
        .unwrap()
    }

    #[test]
    fn test_visit_length_and_steps() {
        let actions = vec![
            action("s1", 12, None, None),
            action("s1", 0, Some("shoes"), None),
            action("s1", 12, None, Some(42)),
            action("s1", 5, None, None),
        ];

        let summaries = aggregate_sessions(&actions);
        assert_eq!(summaries.len(), 1);

        let summary = &summaries[0];
        assert_eq!(summary.visit_length_secs(), 12);
        assert_eq!(summary.step_count, 4);
        assert!(summary.search_keywords.contains("shoes"));
        assert!(summary.click_category_ids.contains(&42));
    }

    #[test]
    fn test_fold_is_order_independent() {
        let actions = vec![
            action("s1", 30, Some("a"), None),
            action("s1", 3, None, Some(10)),
            action("s1", 90, Some("b"), None),
            action("s1", 45, None, Some(110)),
        ];

        let mut forward = SessionFold::new();
        actions.iter().for_each(|a| forward.add(a));

        let mut backward = SessionFold::new();
        actions.iter().rev().for_each(|a| backward.add(a));

        let mut left = SessionFold::new();
        let mut right = SessionFold::new();
        actions[..1].iter().for_each(|a| left.add(a));
        actions[1..].iter().for_each(|a| right.add(a));
        let merged = right.merge(left);

        let forward = forward.finish().unwrap();
        assert_eq!(forward, backward.finish().unwrap());
        assert_eq!(forward, merged.finish().unwrap());
        assert_eq!(forward.visit_length_secs(), 87);
    }

    #[test]
    fn test_category_dedup_is_exact() {
        let actions = vec![
            action("s1", 0, None, Some(110)),
            action("s1", 1, None, Some(10)),
            action("s1", 2, None, Some(10)),
            action("s1", 3, Some("shoe"), None),
            action("s1", 4, Some("shoes"), None),
        ];

        let summary = aggregate_sessions(&actions).remove(0);
        assert_eq!(summary.click_category_ids.len(), 2);
        assert_eq!(summary.search_keywords.len(), 2);
    }

    #[test]
    fn test_groups_by_session() {
        let actions = vec![
            action("s2", 0, None, None),
            action("s1", 0, None, None),
            action("s2", 60, None, None),
        ];

        let summaries = aggregate_sessions(&actions);
        let ids: Vec<_> = summaries.iter().map(|s| s.session_id.as_str()).collect();
        assert_eq!(ids, vec!["s1", "s2"]);
        assert_eq!(summaries[1].step_count, 2);
    }

    #[test]
    fn test_empty_fold_has_no_summary() {
        assert!(SessionFold::new().finish().is_none());
    }

    #[test]
    fn test_large_session_merges_partial_folds() {
        let actions: Vec<ActionRecord> = (0..5000)
            .map(|i| {
                let session = if i % 2 == 0 { "even" } else { "odd" };
                action(session, i, None, Some(i % 7))
            })
            .collect();

        let summaries = aggregate_sessions(&actions);
        assert_eq!(summaries.len(), 2);

        let even = &summaries[0];
        assert_eq!(even.session_id, "even");
        assert_eq!(even.step_count, 2500);
        assert_eq!(even.visit_length_secs(), 4998);
        assert_eq!(even.click_category_ids.len(), 7);

        let odd = &summaries[1];
        assert_eq!(odd.step_count, 2500);
        assert_eq!(odd.visit_length_secs(), 4998);
    }
}
