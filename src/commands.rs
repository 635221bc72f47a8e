//! # Commands Module
//!
//! Command handlers for analyze, stats and sessions operations
//!
//! ## Key Components
//! - [`handle_analyze_command`] - Full run: distribution plus stratified sample
//! - [`handle_stats_command`] - Session length distribution only
//! - [`handle_sessions_command`] - List sessions passing the filter
//! - [`merge_task_params`] - Overlay CLI flags onto a task parameter file

use anyhow::{Context, Result};
use log::debug;
use std::path::{Path, PathBuf};

use crate::cli::{CriteriaArgs, InputArgs, SortOrder};
use crate::config::{JobConfig, resolve_config_path};
use crate::data_processing::{DateRange, TaskParams, apply_recent_filter_records, sort_records};
use crate::models::FilterCriteria;
use crate::pipeline::AnalysisJob;
use crate::report::{
    format_sample_table, format_sessions_table, format_stats_table, generate_analysis_json,
    generate_stats_json,
};
use crate::source::{JsonlActionSource, JsonlDimensionSource};

/// Everything a handler needs to start the pipeline
struct JobSetup {
    job: AnalysisJob,
    range: DateRange,
    actions: JsonlActionSource,
    users: JsonlDimensionSource,
}

/// CLI flags override the task parameter file field by field
pub fn merge_task_params(input: &InputArgs, criteria: &CriteriaArgs) -> Result<TaskParams> {
    let mut params = match &input.params {
        Some(path) => TaskParams::load(path)?,
        None => TaskParams::default(),
    };

    let overlay = |field: &mut Option<String>, value: Option<String>| {
        if value.is_some() {
            *field = value;
        }
    };
    overlay(&mut params.start_date, input.since.clone());
    overlay(&mut params.end_date, input.until.clone());
    overlay(&mut params.start_age, criteria.start_age.map(|age| age.to_string()));
    overlay(&mut params.end_age, criteria.end_age.map(|age| age.to_string()));
    overlay(&mut params.professionals, criteria.professionals.clone());
    overlay(&mut params.cities, criteria.cities.clone());
    overlay(&mut params.sex, criteria.sex.clone());
    overlay(&mut params.keywords, criteria.keywords.clone());
    overlay(&mut params.category_ids, criteria.category_ids.clone());

    Ok(params)
}

fn required_path(
    flag: Option<&PathBuf>,
    configured: Option<&PathBuf>,
    what: &str,
) -> Result<PathBuf> {
    flag.or(configured).cloned().with_context(|| {
        format!(
            "No {} file given. Pass --{} or set [input] {} in the config file.",
            what, what, what
        )
    })
}

fn setup_job(
    config_path: Option<&Path>,
    input: &InputArgs,
    criteria: &CriteriaArgs,
    quota: Option<u64>,
    seed: Option<u64>,
) -> Result<JobSetup> {
    let mut config =
        JobConfig::load(config_path).with_context(|| match resolve_config_path(config_path) {
            Some(path) => format!("Failed to load config {}", path.display()),
            None => "Failed to load config".to_string(),
        })?;
    if let Some(quota) = quota {
        config.total_quota = quota;
    }
    if seed.is_some() {
        config.seed = seed;
    }

    let actions = required_path(input.actions.as_ref(), config.input.actions.as_ref(), "actions")?;
    let users = required_path(input.users.as_ref(), config.input.users.as_ref(), "users")?;

    let params = merge_task_params(input, criteria)?;
    let range = params.date_range().context("Invalid analysis date range")?;
    let criteria: FilterCriteria = params.criteria().context("Invalid filter criteria")?;

    let job = AnalysisJob::new(config, criteria).context("Failed to set up the analysis job")?;
    debug!(
        "Resolved config {:?}, range {:?}, criteria {:?}",
        job.config(),
        range,
        job.criteria()
    );

    Ok(JobSetup {
        job,
        range,
        actions: JsonlActionSource::new(actions),
        users: JsonlDimensionSource::new(users),
    })
}

/// Handle the full analysis command
pub fn handle_analyze_command(
    config_path: Option<&Path>,
    input: &InputArgs,
    criteria: &CriteriaArgs,
    quota: Option<u64>,
    seed: Option<u64>,
    json: bool,
) -> Result<()> {
    let setup = setup_job(config_path, input, criteria, quota, seed)?;
    let output = setup
        .job
        .run_from_sources(&setup.actions, &setup.users, &setup.range)
        .context("Session analysis failed")?;

    if json {
        let json_output = generate_analysis_json(&output);
        println!("{}", serde_json::to_string_pretty(&json_output)?);
    } else {
        println!("{}", format_stats_table(&output.stats, &output.counts));
        if output.sampled.is_empty() {
            println!("No sessions were sampled.");
        } else {
            println!("{}", format_sample_table(&output.sampled, output.plan.day_quota()));
        }
    }

    Ok(())
}

/// Handle the distribution-only command
pub fn handle_stats_command(
    config_path: Option<&Path>,
    input: &InputArgs,
    criteria: &CriteriaArgs,
    json: bool,
) -> Result<()> {
    let setup = setup_job(config_path, input, criteria, None, None)?;
    let filtered = setup
        .job
        .filter_from_sources(&setup.actions, &setup.users, &setup.range)
        .context("Session filtering failed")?;

    if json {
        let json_output = generate_stats_json(filtered.stats());
        println!("{}", serde_json::to_string_pretty(&json_output)?);
    } else {
        println!("{}", format_stats_table(filtered.stats(), filtered.counts()));
    }

    Ok(())
}

/// Handle the filtered session listing command
pub fn handle_sessions_command(
    config_path: Option<&Path>,
    input: &InputArgs,
    criteria: &CriteriaArgs,
    order: SortOrder,
    recent: Option<usize>,
    json: bool,
) -> Result<()> {
    let setup = setup_job(config_path, input, criteria, None, None)?;
    let filtered = setup
        .job
        .filter_from_sources(&setup.actions, &setup.users, &setup.range)
        .context("Session filtering failed")?;

    let records = filtered.into_records();
    if records.is_empty() {
        println!("No sessions matched the filter.");
        return Ok(());
    }

    let records = sort_records(apply_recent_filter_records(records, recent), order);

    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
    } else {
        println!("{}", format_sessions_table(&records));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_flags_override_params_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("task.json");
        fs::write(
            &path,
            r#"{"startAge": "20", "endAge": "30", "cities": "Beijing", "sex": "F"}"#,
        )
        .unwrap();

        let input = InputArgs {
            params: Some(path),
            since: Some("20240301".to_string()),
            ..Default::default()
        };
        let criteria = CriteriaArgs {
            end_age: Some(45),
            cities: Some("Shanghai,Shenzhen".to_string()),
            ..Default::default()
        };

        let params = merge_task_params(&input, &criteria).unwrap();
        assert_eq!(params.start_age.as_deref(), Some("20"));
        assert_eq!(params.end_age.as_deref(), Some("45"));
        assert_eq!(params.cities.as_deref(), Some("Shanghai,Shenzhen"));
        assert_eq!(params.sex.as_deref(), Some("F"));
        assert_eq!(params.start_date.as_deref(), Some("20240301"));

        let criteria = params.criteria().unwrap();
        assert!(criteria.cities.unwrap().contains("Shenzhen"));
    }

    #[test]
    fn test_no_params_file_uses_flags_only() {
        let params = merge_task_params(&InputArgs::default(), &CriteriaArgs::default()).unwrap();
        assert!(params.criteria().unwrap().is_wildcard());
        assert_eq!(params.date_range().unwrap(), DateRange::default());
    }

    #[test]
    fn test_missing_params_file_fails() {
        let input = InputArgs {
            params: Some(PathBuf::from("/nonexistent/task.json")),
            ..Default::default()
        };
        assert!(merge_task_params(&input, &CriteriaArgs::default()).is_err());
    }

    #[test]
    fn test_input_path_resolution() {
        let flag = PathBuf::from("flag.jsonl");
        let configured = PathBuf::from("config.jsonl");

        assert_eq!(required_path(Some(&flag), Some(&configured), "users").unwrap(), flag);
        assert_eq!(required_path(None, Some(&configured), "users").unwrap(), configured);

        let err = required_path(None, None, "actions").unwrap_err();
        assert!(err.to_string().contains("--actions"));
    }

    #[test]
    fn test_setup_reads_config_inputs() {
        let dir = tempdir().unwrap();
        let config = dir.path().join("config.toml");
        fs::write(
            &config,
            "total_quota = 10\n\n[input]\nactions = \"a.jsonl\"\nusers = \"u.jsonl\"\n",
        )
        .unwrap();

        let setup = setup_job(
            Some(&config),
            &InputArgs::default(),
            &CriteriaArgs::default(),
            Some(20),
            Some(3),
        )
        .unwrap();

        assert_eq!(setup.job.config().total_quota, 20);
        assert_eq!(setup.job.config().seed, Some(3));
        assert!(setup.job.criteria().is_wildcard());
    }
}
