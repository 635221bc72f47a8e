//! # Session Analyzer
//!
//! User session aggregation, filtering and stratified sampling over action logs
//!
//! ## Key Components
//! - [`pipeline::AnalysisJob`] - Sharded aggregate, join, filter and sample run
//! - [`commands`] - Subcommand handlers
//! - [`report`] - Terminal tables and JSON output

mod aggregator;
mod cli;
mod commands;
mod config;
mod data_processing;
mod error;
mod filter;
mod joiner;
mod models;
mod pipeline;
mod record;
mod report;
mod sampler;
mod shuffle;
mod source;
mod stats;

use anyhow::Result;
use clap::Parser;

use crate::cli::{Args, Commands};
use crate::commands::{handle_analyze_command, handle_sessions_command, handle_stats_command};

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logger based on debug flag
    if args.debug {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug")).init();
    }

    let config_path = args.config.as_deref();

    match &args.command {
        Commands::Analyze {
            input,
            criteria,
            quota,
            seed,
            json,
        } => handle_analyze_command(config_path, input, criteria, *quota, *seed, *json),
        Commands::Stats {
            input,
            criteria,
            json,
        } => handle_stats_command(config_path, input, criteria, *json),
        Commands::Sessions {
            input,
            criteria,
            order,
            recent,
            json,
        } => handle_sessions_command(config_path, input, criteria, *order, *recent, *json),
    }
}
