//! # Pipeline Module
//!
//! Runs aggregation, join, filtering and sampling over sharded input on a
//! dedicated worker pool
//!
//! ## Key Components
//! - [`AnalysisJob`] - Job entry point holding configuration and criteria
//! - [`FilteredSessions`] - Filter stage result, available only once every shard finished
//! - [`JobOutput`] - Histogram, sampling plan and sampled sessions with their actions

use log::{debug, info, warn};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rayon::prelude::*;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::aggregator::aggregate_sessions;
use crate::config::JobConfig;
use crate::data_processing::DateRange;
use crate::error::{AnalysisError, Result};
use crate::filter::filter_sessions;
use crate::joiner::{DimensionIndex, JoinOutcome, join_sessions};
use crate::models::{ActionRecord, FilterCriteria, UserDimension};
use crate::record::FullSessionRecord;
use crate::sampler::{DateHourCounts, SamplingPlan, select_sessions};
use crate::shuffle::{exchange_records, partition_by_key};
use crate::source::{ActionSource, DimensionSource};
use crate::stats::Histogram;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StageCounts {
    pub actions: usize,
    pub sessions: usize,
    pub missing_dimension: usize,
    pub joined: usize,
    pub passed: usize,
}

/// Output of the filter stage. Constructed only after the parallel filter has
/// been collected across all shards, so `stats` is always the final total.
#[derive(Debug)]
pub struct FilteredSessions {
    shards: Vec<Vec<FullSessionRecord>>,
    stats: Histogram,
    counts: StageCounts,
}

impl FilteredSessions {
    pub fn stats(&self) -> &Histogram {
        &self.stats
    }

    pub fn counts(&self) -> &StageCounts {
        &self.counts
    }

    pub fn into_records(self) -> Vec<FullSessionRecord> {
        self.shards.into_iter().flatten().collect()
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SampledSession {
    pub record: FullSessionRecord,
    pub actions: Vec<ActionRecord>,
}

#[derive(Debug)]
pub struct JobOutput {
    pub stats: Histogram,
    pub plan: Arc<SamplingPlan>,
    pub sampled: Vec<SampledSession>,
    pub counts: StageCounts,
}

pub struct AnalysisJob {
    config: JobConfig,
    criteria: FilterCriteria,
    pool: rayon::ThreadPool,
}

impl AnalysisJob {
    pub fn new(config: JobConfig, criteria: FilterCriteria) -> Result<Self> {
        config.validate()?;
        if criteria.is_wildcard() {
            debug!("No filter criteria set; every joined session passes");
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.workers.unwrap_or(0))
            .thread_name(|i| format!("session-worker-{}", i))
            .build()
            .map_err(|e| AnalysisError::Config(format!("failed to start worker pool: {}", e)))?;

        Ok(Self {
            config,
            criteria,
            pool,
        })
    }

    pub fn config(&self) -> &JobConfig {
        &self.config
    }

    pub fn criteria(&self) -> &FilterCriteria {
        &self.criteria
    }

    /// Aggregate, join and filter without sampling
    pub fn filter(
        &self,
        actions: Vec<ActionRecord>,
        users: Vec<UserDimension>,
    ) -> FilteredSessions {
        let action_shards = self.shard_actions(actions);
        self.pool.install(|| self.filter_shards(&action_shards, users))
    }

    /// Full run: filter, then sample and attach each sampled session's actions
    pub fn run(&self, actions: Vec<ActionRecord>, users: Vec<UserDimension>) -> Result<JobOutput> {
        let action_shards = self.shard_actions(actions);

        self.pool.install(|| {
            let filtered = self.filter_shards(&action_shards, users);
            let FilteredSessions {
                shards,
                stats,
                counts,
            } = filtered;

            let plan = Arc::new(self.plan(&shards));
            let selected = self.select(shards, &plan)?;
            let sampled = attach_actions(selected, &action_shards);

            info!(
                "Sampled {} of {} filtered sessions across {} planned ordinals",
                sampled.len(),
                counts.passed,
                plan.planned_total()
            );

            Ok(JobOutput {
                stats,
                plan,
                sampled,
                counts,
            })
        })
    }

    pub fn run_from_sources(
        &self,
        actions: &dyn ActionSource,
        users: &dyn DimensionSource,
        range: &DateRange,
    ) -> Result<JobOutput> {
        let actions = actions.actions(range)?;
        let users = users.users()?;
        self.run(actions, users)
    }

    pub fn filter_from_sources(
        &self,
        actions: &dyn ActionSource,
        users: &dyn DimensionSource,
        range: &DateRange,
    ) -> Result<FilteredSessions> {
        let actions = actions.actions(range)?;
        let users = users.users()?;
        Ok(self.filter(actions, users))
    }

    fn shard_actions(&self, actions: Vec<ActionRecord>) -> Vec<Vec<ActionRecord>> {
        if actions.is_empty() {
            info!("No actions in the analysis window");
        }
        partition_by_key(actions, self.config.partitions, |action: &ActionRecord| {
            action.session_id.as_str()
        })
    }

    fn filter_shards(
        &self,
        action_shards: &[Vec<ActionRecord>],
        users: Vec<UserDimension>,
    ) -> FilteredSessions {
        let mut counts = StageCounts {
            actions: action_shards.iter().map(Vec::len).sum(),
            ..Default::default()
        };

        let index = DimensionIndex::build(users);
        if index.is_empty() {
            warn!("User dimension table is empty; every session will be dropped");
        }
        debug!("Indexed {} users", index.len());
        let joined: Vec<JoinOutcome> = action_shards
            .par_iter()
            .map(|shard| join_sessions(aggregate_sessions(shard), &index))
            .collect();

        counts.missing_dimension = joined.iter().map(|o| o.missing.len()).sum();
        counts.joined = joined.iter().map(|o| o.records.len()).sum();
        counts.sessions = counts.joined + counts.missing_dimension;
        debug!(
            "Aggregated {} sessions from {} actions; {} dropped without a user row",
            counts.sessions, counts.actions, counts.missing_dimension
        );

        // Collecting every shard is the barrier: the partials are only merged
        // once no filter task is still running.
        let (shards, partials): (Vec<Vec<FullSessionRecord>>, Vec<Histogram>) = joined
            .into_par_iter()
            .map(|outcome| filter_sessions(outcome.records, &self.criteria))
            .unzip();

        let stats = partials.into_iter().fold(Histogram::new(), Histogram::merge);
        counts.passed = stats.session_count() as usize;
        debug!("{} sessions passed the filter", counts.passed);

        FilteredSessions {
            shards,
            stats,
            counts,
        }
    }

    fn plan(&self, shards: &[Vec<FullSessionRecord>]) -> SamplingPlan {
        let counts = shards
            .par_iter()
            .map(|shard| DateHourCounts::from_records(shard))
            .reduce(DateHourCounts::new, DateHourCounts::merge);

        let mut rng = match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let plan = SamplingPlan::build(&counts, self.config.total_quota, &mut rng);

        debug!(
            "Planned {} samples from {} sessions over {} dates (day quota {})",
            plan.planned_total(),
            counts.total(),
            counts.date_count(),
            plan.day_quota()
        );
        for (date, sessions) in counts.date_totals() {
            debug!(
                "{}: {} sessions, {} planned",
                date,
                sessions,
                plan.planned_for_date(date)
            );
        }
        plan
    }

    fn select(
        &self,
        shards: Vec<Vec<FullSessionRecord>>,
        plan: &Arc<SamplingPlan>,
    ) -> Result<Vec<FullSessionRecord>> {
        if plan.is_empty() {
            return Ok(Vec::new());
        }

        let buckets = exchange_records(shards, self.config.partitions)?;
        let mut selected: Vec<FullSessionRecord> = buckets
            .into_par_iter()
            .map(|bucket| select_sessions(bucket, plan))
            .flatten()
            .collect();

        selected.sort_by(|a, b| {
            a.start_time
                .cmp(&b.start_time)
                .then_with(|| a.session_id.cmp(&b.session_id))
        });
        Ok(selected)
    }
}

/// Join sampled sessions back to their actions, ordered by action time
fn attach_actions(
    selected: Vec<FullSessionRecord>,
    action_shards: &[Vec<ActionRecord>],
) -> Vec<SampledSession> {
    let wanted: HashSet<&str> = selected.iter().map(|r| r.session_id.as_str()).collect();

    let mut details: HashMap<String, Vec<ActionRecord>> = HashMap::new();
    let matched: Vec<ActionRecord> = action_shards
        .par_iter()
        .flat_map_iter(|shard| {
            shard
                .iter()
                .filter(|action| wanted.contains(action.session_id.as_str()))
                .cloned()
        })
        .collect();
    for action in matched {
        details.entry(action.session_id.clone()).or_default().push(action);
    }

    selected
        .into_iter()
        .map(|record| {
            let mut actions = details.remove(&record.session_id).unwrap_or_default();
            actions.sort_by_key(|action| action.action_time);
            SampledSession { record, actions }
        })
        .collect()
}
