use std::fmt::Write;

use chrono::{DateTime, FixedOffset, Utc};

use crate::models::StudentRecord;
use crate::stats::{self, Stats};
use crate::view::FilterSortConfig;

fn scope_label(config: &FilterSortConfig) -> String {
    let mut parts = Vec::new();
    if !config.search_term().is_empty() {
        parts.push(format!("name contains \"{}\"", config.search_term()));
    }
    if !config.section_filter().is_empty() {
        parts.push(format!("section {}", config.section_filter()));
    }
    if !config.study_type_filter().is_empty() {
        parts.push(format!("study type {}", config.study_type_filter()));
    }

    if parts.is_empty() {
        "all submissions".to_string()
    } else {
        parts.join(", ")
    }
}

pub fn build_report(
    config: &FilterSortConfig,
    stats: &Stats,
    view: &[&StudentRecord],
    generated_at: DateTime<Utc>,
    zone: &FixedOffset,
) -> String {
    let sections = stats::summarize_by_section(view.iter().copied());

    let mut output = String::new();

    let _ = writeln!(output, "# Student ID Submissions Report");
    let _ = writeln!(
        output,
        "Generated for {} at {}",
        scope_label(config),
        generated_at.with_timezone(zone).format("%Y-%m-%d %H:%M %:z")
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Totals");
    let _ = writeln!(output, "- Submitted students: {}", stats.total);
    let _ = writeln!(output, "- Sections represented: {}", stats.distinct_sections);
    let _ = writeln!(output, "- Submitted today: {}", stats.submitted_today);
    let _ = writeln!(output, "- Matching current filters: {}", view.len());

    let _ = writeln!(output);
    let _ = writeln!(output, "## Section Mix");

    if sections.is_empty() {
        let _ = writeln!(output, "No submissions match these filters.");
    } else {
        for summary in sections.iter() {
            let _ = writeln!(output, "- {}: {} students", summary.section, summary.count);
        }
    }

    let mut recent: Vec<(&StudentRecord, DateTime<Utc>)> = view
        .iter()
        .filter_map(|r| r.submitted_instant().map(|at| (*r, at)))
        .collect();
    recent.sort_by(|a, b| b.1.cmp(&a.1));

    let _ = writeln!(output);
    let _ = writeln!(output, "## Recent Submissions");

    if recent.is_empty() {
        let _ = writeln!(output, "No submissions match these filters.");
    } else {
        for (record, at) in recent.iter().take(5) {
            let _ = writeln!(
                output,
                "- {} ({}, {}) on {}",
                record.name,
                record.section,
                record.study_type,
                at.with_timezone(zone).format("%Y-%m-%d %H:%M")
            );
        }
    }

    output
}
