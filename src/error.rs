//! # Error Module
//!
//! Error taxonomy for the analysis pipeline
//!
//! ## Key Components
//! - [`AnalysisError`] - Fatal and reportable pipeline failures
//! - [`Result`] - Pipeline result alias

use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AnalysisError {
    /// Reported through the join outcome; the session is dropped, the job continues.
    #[error("no dimension row for user {user_id} (session '{session_id}')")]
    MissingDimensionRecord { session_id: String, user_id: i64 },
    #[error("malformed field '{field}': {value:?}")]
    MalformedField { field: &'static str, value: String },
    #[error("invalid record: {0}")]
    InvalidRecord(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl AnalysisError {
    pub fn malformed(field: &'static str, value: impl Into<String>) -> Self {
        Self::MalformedField {
            field,
            value: value.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, AnalysisError>;
