//! # Report Module
//!
//! Terminal tables and JSON documents for histograms and sampled sessions
//!
//! ## Key Components
//! - [`format_stats_table`] - Bucket counts and ratios
//! - [`format_sessions_table`] - One row per full session record
//! - [`generate_analysis_json`] - JSON document for a full analysis run

use serde::Serialize;

use crate::models::format_time;
use crate::pipeline::{JobOutput, SampledSession, StageCounts};
use crate::record::FullSessionRecord;
use crate::stats::{Bucket, Histogram};

const GRAY: &str = "\x1b[90m";
const RESET: &str = "\x1b[39m";
const CYAN: &str = "\x1b[36m";
const GREEN: &str = "\x1b[32m";

#[derive(Debug, Serialize)]
pub struct JsonBucket {
    pub name: &'static str,
    pub count: u64,
    pub ratio: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JsonStats {
    pub session_count: u64,
    pub visit_length: Vec<JsonBucket>,
    pub step_length: Vec<JsonBucket>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JsonAnalysis<'a> {
    pub counts: &'a StageCounts,
    pub stats: JsonStats,
    pub day_quota: u64,
    pub sampled: &'a [SampledSession],
}

pub fn generate_stats_json(stats: &Histogram) -> JsonStats {
    let bucket = |bucket: Bucket| JsonBucket {
        name: bucket.name(),
        count: stats.get(bucket),
        ratio: stats.ratio(bucket),
    };

    JsonStats {
        session_count: stats.session_count(),
        visit_length: stats
            .visit_counts()
            .map(|(b, _)| bucket(Bucket::Visit(b)))
            .collect(),
        step_length: stats
            .step_counts()
            .map(|(b, _)| bucket(Bucket::Step(b)))
            .collect(),
    }
}

pub fn generate_analysis_json(output: &JobOutput) -> JsonAnalysis<'_> {
    JsonAnalysis {
        counts: &output.counts,
        stats: generate_stats_json(&output.stats),
        day_quota: output.plan.day_quota(),
        sampled: &output.sampled,
    }
}

/// Format numbers with thousands separators
pub fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + s.len() / 3);
    for (i, c) in s.chars().enumerate() {
        if i > 0 && (s.len() - i) % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result
}

/// Cut to `width` characters, marking the cut with `…`
fn fit(value: &str, width: usize) -> String {
    if value.chars().count() <= width {
        return value.to_string();
    }
    let mut cut: String = value.chars().take(width.saturating_sub(1)).collect();
    cut.push('…');
    cut
}

fn banner(title: &str) -> String {
    let inner = title.chars().count() + 4;
    let line = "─".repeat(inner);
    let blank = " ".repeat(inner);
    format!("\n ╭{line}╮\n │{blank}│\n │  {title}  │\n │{blank}│\n ╰{line}╯\n\n")
}

fn rule(left: char, mid: char, right: char, widths: &[usize]) -> String {
    let cells: Vec<String> = widths.iter().map(|w| "─".repeat(w + 2)).collect();
    format!("{GRAY}{left}{}{right}{RESET}\n", cells.join(&mid.to_string()))
}

pub fn format_stats_table(stats: &Histogram, counts: &StageCounts) -> String {
    const WIDTHS: [usize; 3] = [12, 10, 6];
    let mut output = banner("Session Length Distribution");

    let sections = [
        (
            "Visit",
            stats
                .visit_counts()
                .map(|(b, count)| (Bucket::Visit(b), count))
                .collect::<Vec<_>>(),
        ),
        (
            "Steps",
            stats
                .step_counts()
                .map(|(b, count)| (Bucket::Step(b), count))
                .collect::<Vec<_>>(),
        ),
    ];

    for (title, rows) in sections {
        output.push_str(&format!("{GREEN}{title}{RESET}\n"));
        output.push_str(&rule('┌', '┬', '┐', &WIDTHS));
        output.push_str(&format!(
            "{GRAY}│{RESET}{CYAN} {:<12} {RESET}{GRAY}│{RESET}{CYAN} {:>10} {RESET}{GRAY}│{RESET}{CYAN} {:>6} {RESET}{GRAY}│{RESET}\n",
            "Bucket", "Sessions", "Ratio"
        ));
        output.push_str(&rule('├', '┼', '┤', &WIDTHS));

        for (bucket, count) in rows {
            output.push_str(&format!(
                "{GRAY}│{RESET} {:<12} {GRAY}│{RESET} {:>10} {GRAY}│{RESET} {:>6.2} {GRAY}│{RESET}\n",
                bucket.name(),
                format_number(count),
                stats.ratio(bucket)
            ));
        }
        output.push_str(&rule('└', '┴', '┘', &WIDTHS));
        output.push('\n');
    }

    output.push_str(&format!(
        "{GREEN}Sessions: {} passed of {} joined ({} without user row, {} actions){RESET}\n",
        format_number(stats.session_count()),
        format_number(counts.joined as u64),
        format_number(counts.missing_dimension as u64),
        format_number(counts.actions as u64)
    ));

    output
}

const SESSION_WIDTHS: [usize; 7] = [20, 8, 19, 7, 5, 12, 7];

fn session_header(title: &str, last: &str) -> String {
    let mut output = banner(title);
    output.push_str(&rule('┌', '┬', '┐', &SESSION_WIDTHS));
    output.push_str(&format!(
        "{GRAY}│{RESET}{CYAN} {:<20} {RESET}{GRAY}│{RESET}{CYAN} {:>8} {RESET}{GRAY}│{RESET}{CYAN} {:<19} {RESET}{GRAY}│{RESET}{CYAN} {:>7} {RESET}{GRAY}│{RESET}{CYAN} {:>5} {RESET}{GRAY}│{RESET}{CYAN} {:<12} {RESET}{GRAY}│{RESET}{CYAN} {:>7} {RESET}{GRAY}│{RESET}\n",
        "Session", "User", "Start", "Visit", "Steps", "City", last
    ));
    output.push_str(&rule('├', '┼', '┤', &SESSION_WIDTHS));
    output
}

fn session_row(record: &FullSessionRecord, last: &str) -> String {
    format!(
        "{GRAY}│{RESET} {:<20} {GRAY}│{RESET} {:>8} {GRAY}│{RESET} {:<19} {GRAY}│{RESET} {:>7} {GRAY}│{RESET} {:>5} {GRAY}│{RESET} {:<12} {GRAY}│{RESET} {:>7} {GRAY}│{RESET}\n",
        fit(&record.session_id, 20),
        record.user_id,
        format_time(&record.start_time),
        format!("{}s", record.visit_length),
        record.step_length,
        fit(&record.city, 12),
        fit(last, 7)
    )
}

pub fn format_sessions_table(records: &[FullSessionRecord]) -> String {
    let mut output = session_header("Filtered Sessions", "Age");
    for record in records {
        output.push_str(&session_row(record, &record.age.to_string()));
    }
    output.push_str(&rule('└', '┴', '┘', &SESSION_WIDTHS));
    output.push_str(&format!(
        "{GREEN}{} sessions{RESET}\n",
        format_number(records.len() as u64)
    ));
    output
}

pub fn format_sample_table(sampled: &[SampledSession], day_quota: u64) -> String {
    let mut output = session_header("Sampled Sessions", "Actions");
    for session in sampled {
        output.push_str(&session_row(&session.record, &session.actions.len().to_string()));
    }
    output.push_str(&rule('└', '┴', '┘', &SESSION_WIDTHS));
    output.push_str(&format!(
        "{GREEN}{} sampled (day quota {}){RESET}\n",
        format_number(sampled.len() as u64),
        day_quota
    ));
    output
}
