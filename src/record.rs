//! # Full Session Record Module
//!
//! Joined session + user record and its in-process wire encoding
//!
//! ## Key Components
//! - [`FullSessionRecord`] - Session summary joined with user dimension fields
//! - [`FullSessionRecord::encode`] - `field=value|field=value` wire form
//! - [`FullSessionRecord::decode`] - Parse the wire form back

use chrono::NaiveDateTime;
use serde::Serialize;
use std::collections::BTreeSet;

use crate::error::{AnalysisError, Result};
use crate::models::{DateHour, SessionSummary, UserDimension, format_time, parse_action_time};

pub const FIELD_DELIMITER: char = '|';
pub const VALUE_DELIMITER: char = ',';

pub const FIELD_SESSION_ID: &str = "sessionid";
pub const FIELD_USER_ID: &str = "userid";
pub const FIELD_SEARCH_KEYWORDS: &str = "searchKeywords";
pub const FIELD_CLICK_CATEGORY_IDS: &str = "clickCategoryIds";
pub const FIELD_VISIT_LENGTH: &str = "visitLength";
pub const FIELD_STEP_LENGTH: &str = "stepLength";
pub const FIELD_START_TIME: &str = "startTime";
pub const FIELD_AGE: &str = "age";
pub const FIELD_PROFESSIONAL: &str = "professional";
pub const FIELD_CITY: &str = "city";
pub const FIELD_SEX: &str = "sex";

const FIELD_ORDER: [&str; 11] = [
    FIELD_SESSION_ID,
    FIELD_USER_ID,
    FIELD_SEARCH_KEYWORDS,
    FIELD_CLICK_CATEGORY_IDS,
    FIELD_VISIT_LENGTH,
    FIELD_STEP_LENGTH,
    FIELD_START_TIME,
    FIELD_AGE,
    FIELD_PROFESSIONAL,
    FIELD_CITY,
    FIELD_SEX,
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FullSessionRecord {
    pub session_id: String,
    pub user_id: i64,
    pub search_keywords: BTreeSet<String>,
    pub click_category_ids: BTreeSet<i64>,
    pub visit_length: i64,
    pub step_length: u64,
    #[serde(serialize_with = "serialize_time")]
    pub start_time: NaiveDateTime,
    pub age: u32,
    pub professional: String,
    pub city: String,
    pub sex: String,
}

fn serialize_time<S: serde::Serializer>(
    time: &NaiveDateTime,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(&format_time(time))
}

impl FullSessionRecord {
    pub fn from_parts(summary: SessionSummary, user: &UserDimension) -> Self {
        let visit_length = summary.visit_length_secs();
        Self {
            session_id: summary.session_id,
            user_id: summary.user_id,
            search_keywords: summary.search_keywords,
            click_category_ids: summary.click_category_ids,
            visit_length,
            step_length: summary.step_count,
            start_time: summary.start_time,
            age: user.age,
            professional: user.professional.clone(),
            city: user.city.clone(),
            sex: user.sex.clone(),
        }
    }

    pub fn date_hour(&self) -> DateHour {
        DateHour::of(&self.start_time)
    }

    pub fn encode(&self) -> String {
        let keywords = join_values(self.search_keywords.iter().map(|k| escape(k)));
        let category_ids = join_values(self.click_category_ids.iter().map(|id| id.to_string()));

        let values = [
            escape(&self.session_id),
            self.user_id.to_string(),
            keywords,
            category_ids,
            self.visit_length.to_string(),
            self.step_length.to_string(),
            format_time(&self.start_time),
            self.age.to_string(),
            escape(&self.professional),
            escape(&self.city),
            escape(&self.sex),
        ];

        FIELD_ORDER
            .iter()
            .zip(values)
            .map(|(field, value)| format!("{}={}", field, value))
            .collect::<Vec<_>>()
            .join(&FIELD_DELIMITER.to_string())
    }

    pub fn decode(line: &str) -> Result<Self> {
        let mut values: Vec<&str> = Vec::with_capacity(FIELD_ORDER.len());

        for (pair, expected) in line.split(FIELD_DELIMITER).zip(FIELD_ORDER) {
            let (field, value) = pair
                .split_once('=')
                .ok_or_else(|| AnalysisError::malformed(expected, pair))?;
            if field != expected {
                return Err(AnalysisError::InvalidRecord(format!(
                    "expected field '{}' but found '{}'",
                    expected, field
                )));
            }
            values.push(value);
        }

        if values.len() != FIELD_ORDER.len()
            || line.split(FIELD_DELIMITER).count() != FIELD_ORDER.len()
        {
            return Err(AnalysisError::InvalidRecord(format!(
                "expected {} fields in '{}'",
                FIELD_ORDER.len(),
                line
            )));
        }

        let search_keywords = split_values(values[2]).map(unescape).collect();
        let click_category_ids = split_values(values[3])
            .map(|id| parse_number(FIELD_CLICK_CATEGORY_IDS, id))
            .collect::<Result<BTreeSet<i64>>>()?;
        let start_time = parse_action_time(values[6])
            .map_err(|_| AnalysisError::malformed(FIELD_START_TIME, values[6]))?;

        Ok(Self {
            session_id: unescape(values[0]),
            user_id: parse_number(FIELD_USER_ID, values[1])?,
            search_keywords,
            click_category_ids,
            visit_length: parse_number(FIELD_VISIT_LENGTH, values[4])?,
            step_length: parse_number(FIELD_STEP_LENGTH, values[5])?,
            start_time,
            age: parse_number(FIELD_AGE, values[7])?,
            professional: unescape(values[8]),
            city: unescape(values[9]),
            sex: unescape(values[10]),
        })
    }
}

/// Look up a single field in an encoded record without decoding the rest
pub fn field_from_wire<'a>(line: &'a str, field: &str) -> Option<&'a str> {
    line.split(FIELD_DELIMITER)
        .filter_map(|pair| pair.split_once('='))
        .find(|(name, _)| *name == field)
        .map(|(_, value)| value)
}

fn parse_number<T: std::str::FromStr>(field: &'static str, value: &str) -> Result<T> {
    value
        .parse::<T>()
        .map_err(|_| AnalysisError::malformed(field, value))
}

fn join_values(values: impl Iterator<Item = String>) -> String {
    values.collect::<Vec<_>>().join(&VALUE_DELIMITER.to_string())
}

fn split_values(value: &str) -> impl Iterator<Item = &str> {
    value.split(VALUE_DELIMITER).filter(|v| !v.is_empty())
}

fn escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '%' => escaped.push_str("%25"),
            '|' => escaped.push_str("%7C"),
            ',' => escaped.push_str("%2C"),
            '=' => escaped.push_str("%3D"),
            _ => escaped.push(c),
        }
    }
    escaped
}

fn unescape(value: &str) -> String {
    let mut unescaped = String::with_capacity(value.len());
    let mut rest = value;

    while let Some(pos) = rest.find('%') {
        unescaped.push_str(&rest[..pos]);
        let code = rest.get(pos + 1..pos + 3);
        let decoded = match code {
            Some("25") => Some('%'),
            Some("7C") => Some('|'),
            Some("2C") => Some(','),
            Some("3D") => Some('='),
            _ => None,
        };
        match decoded {
            Some(c) => {
                unescaped.push(c);
                rest = &rest[pos + 3..];
            }
            None => {
                unescaped.push('%');
                rest = &rest[pos + 1..];
            }
        }
    }

    unescaped.push_str(rest);
    unescaped
}
