//! # Session Statistics Module
//!
//! Visit-length and step-length histograms accumulated while filtering
//!
//! ## Key Components
//! - [`VisitBucket`] - Exclusive visit duration ranges
//! - [`StepBucket`] - Exclusive step count ranges
//! - [`Histogram`] - Mergeable bucket counters

use serde::{Serialize, Serializer};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum VisitBucket {
    Secs1To3,
    Secs4To6,
    Secs7To9,
    Secs10To30,
    Secs30To60,
    Mins1To3,
    Mins3To10,
    Mins10To30,
    Over30Mins,
}

impl VisitBucket {
    pub const ALL: [VisitBucket; 9] = [
        VisitBucket::Secs1To3,
        VisitBucket::Secs4To6,
        VisitBucket::Secs7To9,
        VisitBucket::Secs10To30,
        VisitBucket::Secs30To60,
        VisitBucket::Mins1To3,
        VisitBucket::Mins3To10,
        VisitBucket::Mins10To30,
        VisitBucket::Over30Mins,
    ];

    /// Zero-length visits (single-action sessions) land in the first bucket
    pub fn classify(visit_length_secs: i64) -> Self {
        match visit_length_secs {
            i64::MIN..=3 => VisitBucket::Secs1To3,
            4..=6 => VisitBucket::Secs4To6,
            7..=9 => VisitBucket::Secs7To9,
            10..=30 => VisitBucket::Secs10To30,
            31..=60 => VisitBucket::Secs30To60,
            61..=180 => VisitBucket::Mins1To3,
            181..=600 => VisitBucket::Mins3To10,
            601..=1800 => VisitBucket::Mins10To30,
            _ => VisitBucket::Over30Mins,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            VisitBucket::Secs1To3 => "1s_3s",
            VisitBucket::Secs4To6 => "4s_6s",
            VisitBucket::Secs7To9 => "7s_9s",
            VisitBucket::Secs10To30 => "10s_30s",
            VisitBucket::Secs30To60 => "30s_60s",
            VisitBucket::Mins1To3 => "1m_3m",
            VisitBucket::Mins3To10 => "3m_10m",
            VisitBucket::Mins10To30 => "10m_30m",
            VisitBucket::Over30Mins => "30m",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StepBucket {
    Steps1To3,
    Steps4To6,
    Steps7To9,
    Steps10To30,
    Steps30To60,
    Over60Steps,
}

impl StepBucket {
    pub const ALL: [StepBucket; 6] = [
        StepBucket::Steps1To3,
        StepBucket::Steps4To6,
        StepBucket::Steps7To9,
        StepBucket::Steps10To30,
        StepBucket::Steps30To60,
        StepBucket::Over60Steps,
    ];

    pub fn classify(step_count: u64) -> Self {
        match step_count {
            0..=3 => StepBucket::Steps1To3,
            4..=6 => StepBucket::Steps4To6,
            7..=9 => StepBucket::Steps7To9,
            10..=30 => StepBucket::Steps10To30,
            31..=60 => StepBucket::Steps30To60,
            _ => StepBucket::Over60Steps,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            StepBucket::Steps1To3 => "1_3",
            StepBucket::Steps4To6 => "4_6",
            StepBucket::Steps7To9 => "7_9",
            StepBucket::Steps10To30 => "10_30",
            StepBucket::Steps30To60 => "30_60",
            StepBucket::Over60Steps => "60",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Bucket {
    SessionCount,
    Visit(VisitBucket),
    Step(StepBucket),
}

impl Bucket {
    pub fn name(&self) -> &'static str {
        match self {
            Bucket::SessionCount => "session_count",
            Bucket::Visit(bucket) => bucket.name(),
            Bucket::Step(bucket) => bucket.name(),
        }
    }
}

/// Bucket counters with key-wise additive merge. The empty histogram is the
/// merge identity, so partials from any number of workers combine in any order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Histogram {
    counts: BTreeMap<Bucket, u64>,
}

impl Histogram {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, bucket: Bucket) {
        self.add_n(bucket, 1);
    }

    fn add_n(&mut self, bucket: Bucket, n: u64) {
        if n > 0 {
            *self.counts.entry(bucket).or_insert(0) += n;
        }
    }

    /// One passing session: the session counter plus one bucket per dimension
    pub fn record_session(&mut self, visit_length_secs: i64, step_count: u64) {
        self.add(Bucket::SessionCount);
        self.add(Bucket::Visit(VisitBucket::classify(visit_length_secs)));
        self.add(Bucket::Step(StepBucket::classify(step_count)));
    }

    pub fn get(&self, bucket: Bucket) -> u64 {
        self.counts.get(&bucket).copied().unwrap_or(0)
    }

    pub fn session_count(&self) -> u64 {
        self.get(Bucket::SessionCount)
    }

    pub fn merge(mut self, other: Histogram) -> Histogram {
        self.merge_from(&other);
        self
    }

    pub fn merge_from(&mut self, other: &Histogram) {
        for (bucket, count) in &other.counts {
            self.add_n(*bucket, *count);
        }
    }

    /// Share of passing sessions in `bucket`, rounded to two decimals
    pub fn ratio(&self, bucket: Bucket) -> f64 {
        let sessions = self.session_count();
        if sessions == 0 {
            return 0.0;
        }
        let ratio = self.get(bucket) as f64 / sessions as f64;
        (ratio * 100.0).round() / 100.0
    }

    pub fn visit_counts(&self) -> impl Iterator<Item = (VisitBucket, u64)> + '_ {
        VisitBucket::ALL
            .into_iter()
            .map(|bucket| (bucket, self.get(Bucket::Visit(bucket))))
    }

    pub fn step_counts(&self) -> impl Iterator<Item = (StepBucket, u64)> + '_ {
        StepBucket::ALL
            .into_iter()
            .map(|bucket| (bucket, self.get(Bucket::Step(bucket))))
    }
}

impl Serialize for Histogram {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let named: BTreeMap<&str, u64> = self
            .counts
            .iter()
            .map(|(bucket, count)| (bucket.name(), *count))
            .collect();
        named.serialize(serializer)
    }
}
