//! # Row Source Module
//!
//! Reads action and user dimension rows from JSONL files or memory
//!
//! ## Key Components
//! - [`ActionSource`] - Yields action records inside a date range
//! - [`DimensionSource`] - Yields the user dimension table
//! - [`JsonlActionSource`] / [`JsonlDimensionSource`] - Positional JSONL readers
//! - `MemorySource` - In-memory rows for tests

use log::debug;
use serde::de::DeserializeOwned;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use crate::data_processing::DateRange;
use crate::error::{AnalysisError, Result};
use crate::models::{ActionRecord, ActionRow, UserDimension, UserRow};

pub trait ActionSource {
    fn actions(&self, range: &DateRange) -> Result<Vec<ActionRecord>>;
}

pub trait DimensionSource {
    fn users(&self) -> Result<Vec<UserDimension>>;
}

#[derive(Debug, Clone)]
pub struct JsonlActionSource {
    path: PathBuf,
}

impl JsonlActionSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ActionSource for JsonlActionSource {
    fn actions(&self, range: &DateRange) -> Result<Vec<ActionRecord>> {
        let mut actions = Vec::new();
        let mut outside_range = 0usize;

        for row in read_rows::<ActionRow>(&self.path)? {
            let action = ActionRecord::try_from(row)?;
            if range.contains(action.action_time.date()) {
                actions.push(action);
            } else {
                outside_range += 1;
            }
        }

        debug!(
            "Read {} actions from {} ({} outside the date range)",
            actions.len(),
            self.path.display(),
            outside_range
        );
        Ok(actions)
    }
}

#[derive(Debug, Clone)]
pub struct JsonlDimensionSource {
    path: PathBuf,
}

impl JsonlDimensionSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl DimensionSource for JsonlDimensionSource {
    fn users(&self) -> Result<Vec<UserDimension>> {
        let users: Vec<UserDimension> = read_rows::<UserRow>(&self.path)?
            .into_iter()
            .map(UserDimension::from)
            .collect();
        debug!("Read {} user rows from {}", users.len(), self.path.display());
        Ok(users)
    }
}

#[cfg(test)]
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    pub actions: Vec<ActionRecord>,
    pub users: Vec<UserDimension>,
}

#[cfg(test)]
impl ActionSource for MemorySource {
    fn actions(&self, range: &DateRange) -> Result<Vec<ActionRecord>> {
        Ok(self
            .actions
            .iter()
            .filter(|action| range.contains(action.action_time.date()))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
impl DimensionSource for MemorySource {
    fn users(&self) -> Result<Vec<UserDimension>> {
        Ok(self.users.clone())
    }
}

/// Every non-blank line must parse; a bad row fails the whole read
fn read_rows<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let mut rows = Vec::new();

    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let row = serde_json::from_str::<T>(&line).map_err(|e| {
            AnalysisError::InvalidRecord(format!(
                "{}:{}: {}",
                path.display(),
                line_no + 1,
                e
            ))
        })?;
        rows.push(row);
    }

    Ok(rows)
}
