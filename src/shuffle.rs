//! # Shuffle Module
//!
//! Hash partitioning of owned rows into shards and key-based regrouping
//! between stages
//!
//! ## Key Components
//! - [`shard_of`] - Stable shard assignment for a key
//! - [`partition_by_key`] - Split rows into shards so equal keys share a shard
//! - [`exchange_records`] - Regroup joined records through their wire form

use rayon::prelude::*;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use crate::error::{AnalysisError, Result};
use crate::models::{DateHour, parse_action_time};
use crate::record::{FIELD_START_TIME, FullSessionRecord, field_from_wire};

/// `DefaultHasher::new()` uses fixed keys, so a key maps to the same shard on every run
pub fn shard_of<K: Hash + ?Sized>(key: &K, shards: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    (hasher.finish() % shards.max(1) as u64) as usize
}

pub fn partition_by_key<T, K, F>(rows: Vec<T>, shards: usize, key: F) -> Vec<Vec<T>>
where
    K: Hash + ?Sized,
    F: Fn(&T) -> &K,
{
    let shards = shards.max(1);
    let mut partitions: Vec<Vec<T>> = (0..shards).map(|_| Vec::new()).collect();
    for row in rows {
        let shard = shard_of(key(&row), shards);
        partitions[shard].push(row);
    }
    partitions
}

/// Move joined records into the shards owning their start date-hour. Records
/// cross the boundary encoded, and the destination key is read straight from
/// the wire form, so a record that fails to encode cleanly aborts the exchange.
pub fn exchange_records(
    shards: Vec<Vec<FullSessionRecord>>,
    target_shards: usize,
) -> Result<Vec<Vec<FullSessionRecord>>> {
    let target_shards = target_shards.max(1);

    let routed = shards
        .into_par_iter()
        .map(|shard| {
            shard
                .iter()
                .map(|record| {
                    let line = record.encode();
                    let key = wire_date_hour(&line)?;
                    Ok((shard_of(&key, target_shards), line))
                })
                .collect::<Result<Vec<_>>>()
        })
        .collect::<Result<Vec<_>>>()?;

    let mut inboxes: Vec<Vec<String>> = (0..target_shards).map(|_| Vec::new()).collect();
    for (target, line) in routed.into_iter().flatten() {
        inboxes[target].push(line);
    }

    inboxes
        .into_par_iter()
        .map(|lines| {
            lines
                .iter()
                .map(|line| FullSessionRecord::decode(line))
                .collect::<Result<Vec<_>>>()
        })
        .collect()
}

fn wire_date_hour(line: &str) -> Result<DateHour> {
    let start_time = field_from_wire(line, FIELD_START_TIME)
        .ok_or_else(|| AnalysisError::malformed(FIELD_START_TIME, line))?;
    let start_time = parse_action_time(start_time)
        .map_err(|_| AnalysisError::malformed(FIELD_START_TIME, start_time))?;
    Ok(DateHour::of(&start_time))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn record(session_id: &str, start: &str) -> FullSessionRecord {
        FullSessionRecord {
            session_id: session_id.to_string(),
            user_id: 1,
            search_keywords: ["a,b".to_string()].into_iter().collect(),
            click_category_ids: BTreeSet::new(),
            visit_length: 5,
            step_length: 2,
            start_time: parse_action_time(start).unwrap(),
            age: 30,
            professional: "IT".to_string(),
            city: "Beijing".to_string(),
            sex: "F".to_string(),
        }
    }

    #[test]
    fn test_partition_keeps_keys_together() {
        let rows: Vec<(String, u32)> = (0..50).map(|i| (format!("s{}", i % 7), i)).collect();
        let shards = partition_by_key(rows, 4, |row: &(String, u32)| row.0.as_str());

        assert_eq!(shards.len(), 4);
        assert_eq!(shards.iter().map(Vec::len).sum::<usize>(), 50);
        for (index, shard) in shards.iter().enumerate() {
            assert!(shard.iter().all(|(key, _)| shard_of(key.as_str(), 4) == index));
        }
    }

    #[test]
    fn test_zero_shards_means_one() {
        let shards = partition_by_key(vec![1u32, 2, 3], 0, |v: &u32| v);
        assert_eq!(shards.len(), 1);
        assert_eq!(shards[0].len(), 3);
    }

    #[test]
    fn test_exchange_groups_by_date_hour() {
        let input = vec![
            vec![record("a", "2024-03-01 10:05:00"), record("b", "2024-03-01 11:00:00")],
            vec![record("c", "2024-03-01 10:59:59"), record("d", "2024-03-02 10:00:00")],
        ];

        let output = exchange_records(input, 3).unwrap();
        assert_eq!(output.len(), 3);
        assert_eq!(output.iter().map(Vec::len).sum::<usize>(), 4);

        for (index, shard) in output.iter().enumerate() {
            assert!(shard.iter().all(|r| shard_of(&r.date_hour(), 3) == index));
        }

        let a_shard = output.iter().find(|s| s.iter().any(|r| r.session_id == "a")).unwrap();
        assert!(a_shard.iter().any(|r| r.session_id == "c"));
        let restored = a_shard.iter().find(|r| r.session_id == "a").unwrap();
        assert_eq!(restored, &record("a", "2024-03-01 10:05:00"));
    }
}
