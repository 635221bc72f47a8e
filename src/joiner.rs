//! # Dimension Join Module
//!
//! Inner join of session summaries against the user dimension table
//!
//! ## Key Components
//! - [`DimensionIndex`] - Immutable user lookup shared by every join worker
//! - [`join_sessions`] - Join one shard of summaries
//! - [`JoinOutcome`] - Joined records plus the sessions that had no user row

use log::{debug, warn};
use std::collections::HashMap;

use crate::error::AnalysisError;
use crate::models::{SessionSummary, UserDimension};
use crate::record::FullSessionRecord;

#[derive(Debug, Default)]
pub struct DimensionIndex {
    users: HashMap<i64, UserDimension>,
}

impl DimensionIndex {
    /// Duplicate user ids keep the first row
    pub fn build(rows: Vec<UserDimension>) -> Self {
        let mut users = HashMap::with_capacity(rows.len());
        for row in rows {
            if users.contains_key(&row.user_id) {
                warn!("Duplicate dimension row for user {}, keeping the first", row.user_id);
                continue;
            }
            users.insert(row.user_id, row);
        }
        Self { users }
    }

    pub fn get(&self, user_id: i64) -> Option<&UserDimension> {
        self.users.get(&user_id)
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct JoinOutcome {
    pub records: Vec<FullSessionRecord>,
    pub missing: Vec<AnalysisError>,
}

/// Sessions whose user is absent from the index are dropped and reported in
/// [`JoinOutcome::missing`]; they never fail the join.
pub fn join_sessions(summaries: Vec<SessionSummary>, index: &DimensionIndex) -> JoinOutcome {
    let mut outcome = JoinOutcome::default();

    for summary in summaries {
        match index.get(summary.user_id) {
            Some(user) => outcome.records.push(FullSessionRecord::from_parts(summary, user)),
            None => {
                debug!(
                    "Dropping session {}: no dimension row for user {}",
                    summary.session_id, summary.user_id
                );
                outcome.missing.push(AnalysisError::MissingDimensionRecord {
                    session_id: summary.session_id,
                    user_id: summary.user_id,
                });
            }
        }
    }

    outcome
}
