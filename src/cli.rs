//! # CLI Module
//!
//! Command-line interface definitions and argument parsing for session-analyzer
//!
//! ## Key Components
//! - [`Args`] - Main CLI arguments structure
//! - [`Commands`] - Subcommand definitions
//! - [`InputArgs`] / [`CriteriaArgs`] - Flags shared by every subcommand
//! - [`SortOrder`] - Result sorting options

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum SortOrder {
    Asc,
    Desc,
}

/// Where rows come from and which days to read
#[derive(Debug, Clone, Default, clap::Args)]
pub struct InputArgs {
    /// Action log JSONL file (overrides [input] actions in the config)
    #[arg(long)]
    pub actions: Option<PathBuf>,

    /// User dimension JSONL file (overrides [input] users in the config)
    #[arg(long)]
    pub users: Option<PathBuf>,

    /// Read actions from date (YYYYMMDD format)
    #[arg(long)]
    pub since: Option<String>,

    /// Read actions until date (YYYYMMDD format)
    #[arg(long)]
    pub until: Option<String>,

    /// Task parameter JSON file; flags below override its fields
    #[arg(long)]
    pub params: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, clap::Args)]
pub struct CriteriaArgs {
    /// Minimum user age (inclusive)
    #[arg(long)]
    pub start_age: Option<u32>,

    /// Maximum user age (inclusive)
    #[arg(long)]
    pub end_age: Option<u32>,

    /// Comma separated professions
    #[arg(long)]
    pub professionals: Option<String>,

    /// Comma separated cities
    #[arg(long)]
    pub cities: Option<String>,

    #[arg(long)]
    pub sex: Option<String>,

    /// Comma separated search keywords; any match passes
    #[arg(long)]
    pub keywords: Option<String>,

    /// Comma separated clicked category ids; any match passes
    #[arg(long)]
    pub category_ids: Option<String>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Filter sessions, report the length distribution and draw a stratified sample
    Analyze {
        #[command(flatten)]
        input: InputArgs,

        #[command(flatten)]
        criteria: CriteriaArgs,

        /// Sessions to sample across all dates
        #[arg(long)]
        quota: Option<u64>,

        /// Sampling seed for reproducible runs
        #[arg(long)]
        seed: Option<u64>,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },
    /// Report the session length distribution only
    Stats {
        #[command(flatten)]
        input: InputArgs,

        #[command(flatten)]
        criteria: CriteriaArgs,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },
    /// List the sessions that pass the filter
    Sessions {
        #[command(flatten)]
        input: InputArgs,

        #[command(flatten)]
        criteria: CriteriaArgs,

        /// Sort order by session start time
        #[arg(long, default_value = "desc", value_enum)]
        order: SortOrder,

        /// Show only recent sessions (last N)
        #[arg(long)]
        recent: Option<usize>,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },
}

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Session Analyzer - User session aggregation, filtering and stratified sampling"
)]
pub struct Args {
    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Job configuration file (can also use SESSION_ANALYZER_CONFIG env var)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}
