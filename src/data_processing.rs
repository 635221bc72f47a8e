//! # Data Processing Module
//!
//! Date filters, task parameters and session list ordering
//!
//! ## Key Components
//! - [`parse_date_filter`] - Parse YYYYMMDD or YYYY-MM-DD date strings
//! - [`DateRange`] - Inclusive analysis window
//! - [`TaskParams`] - Task parameter document and its filter criteria
//! - [`sort_records`] - Sort session records by start time
//! - [`apply_recent_filter_records`] - Keep the N most recent sessions

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::Deserialize;

use crate::cli::SortOrder;
use crate::error::AnalysisError;
use crate::models::{AgeRange, FilterCriteria, value_set};
use crate::record::FullSessionRecord;

/// Parse date in YYYYMMDD (or YYYY-MM-DD) format
pub fn parse_date_filter(date_str: &str) -> Result<NaiveDate> {
    let format = match date_str.len() {
        8 => "%Y%m%d",
        10 => "%Y-%m-%d",
        _ => anyhow::bail!("Date must be in YYYYMMDD format, got: {}", date_str),
    };

    NaiveDate::parse_from_str(date_str, format)
        .with_context(|| format!("Invalid date: {}", date_str))
}

/// Inclusive on both ends; an open end accepts everything on that side
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateRange {
    pub since: Option<NaiveDate>,
    pub until: Option<NaiveDate>,
}

impl DateRange {
    pub fn parse(since: Option<&str>, until: Option<&str>) -> Result<Self> {
        let since = since.map(parse_date_filter).transpose()?;
        let until = until.map(parse_date_filter).transpose()?;

        if let (Some(since), Some(until)) = (since, until) {
            if since > until {
                anyhow::bail!("--since {} is after --until {}", since, until);
            }
        }

        Ok(Self { since, until })
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        let after_since = self.since.is_none_or(|since| date >= since);
        let before_until = self.until.is_none_or(|until| date <= until);
        after_since && before_until
    }
}

/// Task parameter document. Multi-value fields are comma separated.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskParams {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub start_age: Option<String>,
    pub end_age: Option<String>,
    pub professionals: Option<String>,
    pub cities: Option<String>,
    pub sex: Option<String>,
    pub keywords: Option<String>,
    pub category_ids: Option<String>,
}

impl TaskParams {
    pub fn load(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read task parameters {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Invalid task parameters in {}", path.display()))
    }

    pub fn date_range(&self) -> Result<DateRange> {
        DateRange::parse(self.start_date.as_deref(), self.end_date.as_deref())
    }

    /// A single age bound leaves the other side open
    pub fn criteria(&self) -> std::result::Result<FilterCriteria, AnalysisError> {
        let start_age = parse_optional_number("startAge", self.start_age.as_deref())?;
        let end_age = parse_optional_number("endAge", self.end_age.as_deref())?;
        let age_range = match (start_age, end_age) {
            (None, None) => None,
            (start, end) => Some(AgeRange {
                start: start.unwrap_or(0),
                end: end.unwrap_or(u32::MAX),
            }),
        };

        let category_ids = split_list(self.category_ids.as_deref())
            .map(|id| {
                id.parse::<i64>()
                    .map_err(|_| AnalysisError::malformed("categoryIds", id))
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(FilterCriteria {
            age_range,
            professionals: value_set(split_list(self.professionals.as_deref()).map(String::from)),
            cities: value_set(split_list(self.cities.as_deref()).map(String::from)),
            sex: self
                .sex
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from),
            keywords: value_set(split_list(self.keywords.as_deref()).map(String::from)),
            category_ids: value_set(category_ids),
        })
    }
}

fn split_list(value: Option<&str>) -> impl Iterator<Item = &str> {
    value
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

fn parse_optional_number(
    field: &'static str,
    value: Option<&str>,
) -> std::result::Result<Option<u32>, AnalysisError> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        Some(v) => v
            .parse::<u32>()
            .map(Some)
            .map_err(|_| AnalysisError::malformed(field, v)),
        None => Ok(None),
    }
}

/// Sort session records by start time, session id breaking ties
pub fn sort_records(
    mut records: Vec<FullSessionRecord>,
    order: SortOrder,
) -> Vec<FullSessionRecord> {
    records.sort_by(|a, b| {
        let ordering = a
            .start_time
            .cmp(&b.start_time)
            .then_with(|| a.session_id.cmp(&b.session_id));
        match order {
            SortOrder::Asc => ordering,
            SortOrder::Desc => ordering.reverse(),
        }
    });
    records
}

/// Apply recent filtering to session records (keep last N sessions)
pub fn apply_recent_filter_records(
    mut records: Vec<FullSessionRecord>,
    recent_count: Option<usize>,
) -> Vec<FullSessionRecord> {
    if let Some(count) = recent_count {
        // Sort by start time descending to get most recent
        records.sort_by(|a, b| b.start_time.cmp(&a.start_time));
        records.truncate(count);
    }
    records
}
