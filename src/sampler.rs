//! # Stratified Sampler Module
//!
//! Samples filtered sessions in proportion to how they spread over the hours
//! of each day
//!
//! ## Key Components
//! - [`DateHourCounts`] - Count phase: sessions per date and hour
//! - [`SamplingPlan`] - Plan phase: random ordinals chosen per hour
//! - [`select_sessions`] - Select phase: emit the sessions at the planned ordinals

use chrono::NaiveDate;
use rand::Rng;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use crate::models::DateHour;
use crate::record::FullSessionRecord;

pub const DEFAULT_TOTAL_QUOTA: u64 = 100;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DateHourCounts {
    by_date: BTreeMap<NaiveDate, BTreeMap<u32, u64>>,
}

impl DateHourCounts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: &[FullSessionRecord]) -> Self {
        let mut counts = Self::new();
        for record in records {
            counts.add(record.date_hour(), 1);
        }
        counts
    }

    pub fn add(&mut self, key: DateHour, n: u64) {
        *self
            .by_date
            .entry(key.date)
            .or_default()
            .entry(key.hour)
            .or_insert(0) += n;
    }

    pub fn merge(mut self, other: DateHourCounts) -> DateHourCounts {
        for (date, hours) in other.by_date {
            for (hour, n) in hours {
                self.add(DateHour { date, hour }, n);
            }
        }
        self
    }

    /// Sessions per date, in date order
    pub fn date_totals(&self) -> impl Iterator<Item = (NaiveDate, u64)> + '_ {
        self.by_date
            .iter()
            .map(|(date, hours)| (*date, hours.values().sum()))
    }

    pub fn date_count(&self) -> usize {
        self.by_date.len()
    }

    pub fn total(&self) -> u64 {
        self.by_date.values().flat_map(|hours| hours.values()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_date.is_empty()
    }
}

/// Ordinals to keep for each date and hour. Built once, then only read.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SamplingPlan {
    day_quota: u64,
    selections: BTreeMap<NaiveDate, BTreeMap<u32, BTreeSet<usize>>>,
}

impl SamplingPlan {
    pub fn build<R: Rng>(counts: &DateHourCounts, total_quota: u64, rng: &mut R) -> Self {
        // No filtered sessions means no dates and nothing to divide by
        if counts.is_empty() {
            return Self::default();
        }

        let day_quota = total_quota / counts.date_count() as u64;
        let mut selections = BTreeMap::new();

        for (date, hours) in &counts.by_date {
            let day_total: u64 = hours.values().sum();
            let mut hour_selections = BTreeMap::new();

            for (hour, count) in hours {
                let quota = hour_quota(*count, day_total, day_quota);
                hour_selections.insert(*hour, draw_distinct(rng, quota, *count));
            }

            selections.insert(*date, hour_selections);
        }

        Self {
            day_quota,
            selections,
        }
    }

    pub fn day_quota(&self) -> u64 {
        self.day_quota
    }

    pub fn indices(&self, key: DateHour) -> Option<&BTreeSet<usize>> {
        self.selections
            .get(&key.date)
            .and_then(|hours| hours.get(&key.hour))
    }

    pub fn planned_total(&self) -> usize {
        self.selections
            .values()
            .flat_map(|hours| hours.values())
            .map(BTreeSet::len)
            .sum()
    }

    pub fn planned_for_date(&self, date: NaiveDate) -> usize {
        self.selections
            .get(&date)
            .map(|hours| hours.values().map(BTreeSet::len).sum())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.planned_total() == 0
    }
}

/// floor(count / day_total * day_quota), never more than the hour holds
pub fn hour_quota(count: u64, day_total: u64, day_quota: u64) -> u64 {
    if day_total == 0 {
        return 0;
    }
    let proportional = (count as u128 * day_quota as u128 / day_total as u128) as u64;
    proportional.min(count)
}

/// `quota` distinct ordinals in `0..count`, redrawing on collision
fn draw_distinct<R: Rng>(rng: &mut R, quota: u64, count: u64) -> BTreeSet<usize> {
    let mut chosen = BTreeSet::new();
    let quota = quota.min(count) as usize;

    while chosen.len() < quota {
        let index = rng.random_range(0..count) as usize;
        chosen.insert(index);
    }

    chosen
}

/// Canonical ordinal order inside one date-hour bucket
pub fn order_bucket(records: &mut [FullSessionRecord]) {
    records.sort_by(|a, b| {
        a.start_time
            .cmp(&b.start_time)
            .then_with(|| a.session_id.cmp(&b.session_id))
    });
}

/// Select from a shard that holds every record of the date-hour buckets it owns
pub fn select_sessions(
    records: Vec<FullSessionRecord>,
    plan: &SamplingPlan,
) -> Vec<FullSessionRecord> {
    let mut buckets: BTreeMap<DateHour, Vec<FullSessionRecord>> = BTreeMap::new();
    for record in records {
        buckets.entry(record.date_hour()).or_default().push(record);
    }

    let mut selected = Vec::new();
    for (key, mut bucket) in buckets {
        let Some(indices) = plan.indices(key) else {
            continue;
        };

        order_bucket(&mut bucket);
        selected.extend(
            bucket
                .into_iter()
                .enumerate()
                .filter(|(ordinal, _)| indices.contains(ordinal))
                .map(|(_, record)| record),
        );
    }

    selected
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::parse_action_time;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn key(date: &str, hour: u32) -> DateHour {
        DateHour {
            date: NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
            hour,
        }
    }

    fn count_of(counts: &DateHourCounts, key: DateHour) -> u64 {
        counts
            .by_date
            .get(&key.date)
            .and_then(|hours| hours.get(&key.hour))
            .copied()
            .unwrap_or(0)
    }

    fn two_date_counts() -> DateHourCounts {
        let mut counts = DateHourCounts::new();
        counts.add(key("2024-03-01", 10), 10);
        counts.add(key("2024-03-01", 11), 40);
        counts.add(key("2024-03-01", 12), 50);
        counts.add(key("2024-03-02", 9), 5);
        counts
    }

    fn record(session_id: &str, start: &str) -> FullSessionRecord {
        FullSessionRecord {
            session_id: session_id.to_string(),
            user_id: 1,
            search_keywords: BTreeSet::new(),
            click_category_ids: BTreeSet::new(),
            visit_length: 0,
            step_length: 1,
            start_time: parse_action_time(start).unwrap(),
            age: 30,
            professional: "IT".to_string(),
            city: "Beijing".to_string(),
            sex: "F".to_string(),
        }
    }

    #[test]
    fn test_proportional_hour_quotas() {
        let mut rng = StdRng::seed_from_u64(7);
        let plan = SamplingPlan::build(&two_date_counts(), DEFAULT_TOTAL_QUOTA, &mut rng);

        assert_eq!(plan.day_quota(), 50);
        assert_eq!(plan.indices(key("2024-03-01", 10)).map(BTreeSet::len), Some(5));
        assert_eq!(plan.indices(key("2024-03-01", 11)).map(BTreeSet::len), Some(20));
        assert_eq!(plan.indices(key("2024-03-01", 12)).map(BTreeSet::len), Some(25));
        // Capped at the five sessions the hour holds
        assert_eq!(plan.indices(key("2024-03-02", 9)).map(BTreeSet::len), Some(5));
    }

    #[test]
    fn test_indices_stay_within_hour_counts() {
        let counts = two_date_counts();

        for seed in 0..20 {
            let mut rng = StdRng::seed_from_u64(seed);
            let plan = SamplingPlan::build(&counts, DEFAULT_TOTAL_QUOTA, &mut rng);

            for (date, hours) in &counts.by_date {
                assert!(plan.planned_for_date(*date) as u64 <= plan.day_quota());
                for hour in hours.keys() {
                    let key = DateHour { date: *date, hour: *hour };
                    let indices = plan.indices(key).unwrap();
                    assert!(indices.len() as u64 <= count_of(&counts, key));
                    assert!(indices.iter().all(|i| (*i as u64) < count_of(&counts, key)));
                }
            }
        }
    }

    #[test]
    fn test_empty_counts_give_empty_plan() {
        let mut rng = StdRng::seed_from_u64(1);
        let plan = SamplingPlan::build(&DateHourCounts::new(), DEFAULT_TOTAL_QUOTA, &mut rng);

        assert!(plan.is_empty());
        assert_eq!(plan.day_quota(), 0);
    }

    #[test]
    fn test_hour_quota_edge_cases() {
        assert_eq!(hour_quota(0, 0, 50), 0);
        assert_eq!(hour_quota(0, 100, 50), 0);
        assert_eq!(hour_quota(3, 3, 50), 3);
        assert_eq!(hour_quota(1, 3, 50), 1);
    }

    #[test]
    fn test_same_seed_same_plan() {
        let counts = two_date_counts();
        let a = SamplingPlan::build(&counts, 100, &mut StdRng::seed_from_u64(42));
        let b = SamplingPlan::build(&counts, 100, &mut StdRng::seed_from_u64(42));
        assert_eq!(a, b);
    }

    #[test]
    fn test_counts_merge() {
        let records = vec![
            record("a", "2024-03-01 10:05:00"),
            record("b", "2024-03-01 10:45:00"),
            record("c", "2024-03-01 11:00:00"),
        ];
        let merged = DateHourCounts::from_records(&records[..1])
            .merge(DateHourCounts::from_records(&records[1..]));

        assert_eq!(merged, DateHourCounts::from_records(&records));
        assert_eq!(count_of(&merged, key("2024-03-01", 10)), 2);
        assert_eq!(merged.total(), 3);
        let totals: Vec<_> = merged.date_totals().collect();
        assert_eq!(totals, vec![(key("2024-03-01", 0).date, 3)]);
    }

    #[test]
    fn test_selection_ignores_arrival_order() {
        let records = vec![
            record("c", "2024-03-01 10:30:00"),
            record("a", "2024-03-01 10:05:00"),
            record("b", "2024-03-01 10:05:00"),
            record("d", "2024-03-01 11:00:00"),
        ];
        let mut counts = DateHourCounts::new();
        counts.add(key("2024-03-01", 10), 3);
        counts.add(key("2024-03-01", 11), 1);

        // Quota of four over a single date keeps every session, so ordinal 1 in hour 10 is "b"
        let plan = SamplingPlan::build(&counts, 4, &mut StdRng::seed_from_u64(3));
        let mut reversed = records.clone();
        reversed.reverse();

        let ids = |selected: Vec<FullSessionRecord>| -> Vec<String> {
            selected.into_iter().map(|r| r.session_id).collect()
        };
        assert_eq!(ids(select_sessions(records, &plan)), vec!["a", "b", "c", "d"]);
        assert_eq!(ids(select_sessions(reversed, &plan)), vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_selection_matches_planned_ordinals() {
        let records: Vec<_> = (0..10)
            .map(|i| record(&format!("s{}", i), &format!("2024-03-01 10:{:02}:00", i)))
            .collect();
        let counts = DateHourCounts::from_records(&records);
        let plan = SamplingPlan::build(&counts, 4, &mut StdRng::seed_from_u64(11));

        let selected = select_sessions(records, &plan);
        let expected: Vec<String> = plan
            .indices(key("2024-03-01", 10))
            .unwrap()
            .iter()
            .map(|i| format!("s{}", i))
            .collect();
        let actual: Vec<String> = selected.into_iter().map(|r| r.session_id).collect();

        assert_eq!(actual, expected);
    }
}
