//! # Data Model Module
//!
//! Row and summary types shared by every pipeline stage
//!
//! ## Key Components
//! - [`ActionRecord`] - A single browsing action
//! - [`UserDimension`] - A row of the user dimension table
//! - [`SessionSummary`] - Folded view of one session
//! - [`FilterCriteria`] - Per-run session filter
//! - [`DateHour`] - Time-of-day bucket key derived from a start time

use chrono::{NaiveDate, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::error::{AnalysisError, Result};

/// Text form of every action and start time
pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn parse_action_time(value: &str) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value.trim(), TIME_FORMAT)
        .map_err(|_| AnalysisError::malformed("actionTime", value))
}

pub fn format_time(time: &NaiveDateTime) -> String {
    time.format(TIME_FORMAT).to_string()
}

/// Positional action row: `[sessionId, userId, actionTime, searchKeyword, clickedCategoryId]`
#[derive(Debug, Clone, Deserialize)]
pub struct ActionRow(
    pub String,
    pub i64,
    pub String,
    pub Option<String>,
    pub Option<i64>,
);

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionRecord {
    pub session_id: String,
    pub user_id: i64,
    pub action_time: NaiveDateTime,
    pub search_keyword: Option<String>,
    pub click_category_id: Option<i64>,
}

impl ActionRecord {
    pub fn new(
        session_id: impl Into<String>,
        user_id: i64,
        action_time: NaiveDateTime,
        search_keyword: Option<String>,
        click_category_id: Option<i64>,
    ) -> Result<Self> {
        let session_id = session_id.into();
        // Empty keywords carry no search
        let search_keyword = search_keyword.filter(|k| !k.is_empty());

        if search_keyword.is_some() && click_category_id.is_some() {
            return Err(AnalysisError::InvalidRecord(format!(
                "action in session '{}' carries both a search keyword and a clicked category",
                session_id
            )));
        }

        Ok(Self {
            session_id,
            user_id,
            action_time,
            search_keyword,
            click_category_id,
        })
    }
}

impl TryFrom<ActionRow> for ActionRecord {
    type Error = AnalysisError;

    fn try_from(row: ActionRow) -> Result<Self> {
        let ActionRow(session_id, user_id, action_time, keyword, category_id) = row;
        let action_time = parse_action_time(&action_time)?;
        ActionRecord::new(session_id, user_id, action_time, keyword, category_id)
    }
}

/// Positional user row: `[userId, age, professional, city, sex]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserDimension {
    pub user_id: i64,
    pub age: u32,
    pub professional: String,
    pub city: String,
    pub sex: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserRow(pub i64, pub u32, pub String, pub String, pub String);

impl From<UserRow> for UserDimension {
    fn from(row: UserRow) -> Self {
        let UserRow(user_id, age, professional, city, sex) = row;
        Self {
            user_id,
            age,
            professional,
            city,
            sex,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    pub session_id: String,
    pub user_id: i64,
    pub search_keywords: BTreeSet<String>,
    pub click_category_ids: BTreeSet<i64>,
    pub start_time: NaiveDateTime,
    pub end_time: NaiveDateTime,
    pub step_count: u64,
}

impl SessionSummary {
    pub fn visit_length_secs(&self) -> i64 {
        (self.end_time - self.start_time).num_seconds()
    }
}

/// Inclusive age bounds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AgeRange {
    pub start: u32,
    pub end: u32,
}

impl AgeRange {
    pub fn contains(&self, age: u32) -> bool {
        age >= self.start && age <= self.end
    }
}

/// Unset fields are wildcards. Set-valued fields match when any member matches.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterCriteria {
    pub age_range: Option<AgeRange>,
    pub professionals: Option<BTreeSet<String>>,
    pub cities: Option<BTreeSet<String>>,
    pub sex: Option<String>,
    pub keywords: Option<BTreeSet<String>>,
    pub category_ids: Option<BTreeSet<i64>>,
}

impl FilterCriteria {
    pub fn is_wildcard(&self) -> bool {
        self.age_range.is_none()
            && self.professionals.is_none()
            && self.cities.is_none()
            && self.sex.is_none()
            && self.keywords.is_none()
            && self.category_ids.is_none()
    }
}

/// Collect a multi-value criterion, treating an empty list as unset
pub fn value_set<T: Ord>(values: impl IntoIterator<Item = T>) -> Option<BTreeSet<T>> {
    let set: BTreeSet<T> = values.into_iter().collect();
    if set.is_empty() { None } else { Some(set) }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct DateHour {
    pub date: NaiveDate,
    pub hour: u32,
}

impl DateHour {
    pub fn of(time: &NaiveDateTime) -> Self {
        Self {
            date: time.date(),
            hour: time.hour(),
        }
    }
}

impl fmt::Display for DateHour {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{:02}", self.date.format("%Y-%m-%d"), self.hour)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_row_conversion() {
        let row: ActionRow =
            serde_json::from_str(r#"["s1", 7, "2024-03-01 10:15:00", "shoes", null]"#).unwrap();
        let action = ActionRecord::try_from(row).unwrap();

        assert_eq!(action.session_id, "s1");
        assert_eq!(action.search_keyword.as_deref(), Some("shoes"));
        assert_eq!(format_time(&action.action_time), "2024-03-01 10:15:00");
    }

    #[test]
    fn test_bad_action_time_is_malformed() {
        let row = ActionRow("s1".into(), 7, "yesterday".into(), None, None);
        match ActionRecord::try_from(row) {
            Err(AnalysisError::MalformedField { field, value }) => {
                assert_eq!(field, "actionTime");
                assert_eq!(value, "yesterday");
            }
            other => panic!("expected malformed field, got {:?}", other),
        }
    }

    #[test]
    fn test_keyword_and_category_are_exclusive() {
        let time = parse_action_time("2024-03-01 10:15:00").unwrap();
        let result = ActionRecord::new("s1", 7, time, Some("shoes".into()), Some(42));
        assert!(matches!(result, Err(AnalysisError::InvalidRecord(_))));

        let empty_keyword =
            ActionRecord::new("s1", 7, time, Some(String::new()), Some(42)).unwrap();
        assert_eq!(empty_keyword.search_keyword, None);
    }

    #[test]
    fn test_date_hour_key() {
        let time = parse_action_time("2024-03-01 09:59:59").unwrap();
        assert_eq!(DateHour::of(&time).to_string(), "2024-03-01_09");
    }

    #[test]
    fn test_empty_value_set_is_unset() {
        assert_eq!(value_set(Vec::<String>::new()), None);
        assert!(FilterCriteria::default().is_wildcard());
    }
}
