//! # Predicate Filter Module
//!
//! Evaluates filter criteria against joined session records and tallies the
//! visit statistics of every session that passes
//!
//! ## Key Components
//! - [`matches`] - Pure pass/fail evaluation
//! - [`filter_sessions`] - Filter a shard and build its partial histogram

use crate::models::FilterCriteria;
use crate::record::FullSessionRecord;
use crate::stats::Histogram;

/// Checks age, professional, city, sex, keywords and category ids in that order
pub fn matches(record: &FullSessionRecord, criteria: &FilterCriteria) -> bool {
    if let Some(range) = &criteria.age_range
        && !range.contains(record.age)
    {
        return false;
    }

    if let Some(professionals) = &criteria.professionals
        && !professionals.contains(&record.professional)
    {
        return false;
    }

    if let Some(cities) = &criteria.cities
        && !cities.contains(&record.city)
    {
        return false;
    }

    if let Some(sex) = &criteria.sex
        && *sex != record.sex
    {
        return false;
    }

    if let Some(keywords) = &criteria.keywords
        && record.search_keywords.is_disjoint(keywords)
    {
        return false;
    }

    if let Some(category_ids) = &criteria.category_ids
        && record.click_category_ids.is_disjoint(category_ids)
    {
        return false;
    }

    true
}

/// Keep the passing records of one shard. The returned histogram is a
/// partial: it only becomes the job total once every shard's partial is merged.
pub fn filter_sessions(
    records: Vec<FullSessionRecord>,
    criteria: &FilterCriteria,
) -> (Vec<FullSessionRecord>, Histogram) {
    let mut stats = Histogram::new();

    let passed = records
        .into_iter()
        .filter(|record| {
            let keep = matches(record, criteria);
            if keep {
                stats.record_session(record.visit_length, record.step_length);
            }
            keep
        })
        .collect();

    (passed, stats)
}
