use std::collections::{HashMap, HashSet};

use chrono::{DateTime, FixedOffset, Utc};

use crate::models::StudentRecord;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stats {
    pub total: usize,
    pub distinct_sections: usize,
    pub submitted_today: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionSummary {
    pub section: String,
    pub count: usize,
}

/// Dashboard counters over submitted records only.
///
/// `now` is captured once by the caller; "today" is the calendar date of `now`
/// in `zone`, and each submission is truncated the same way.
pub fn compute_statistics(records: &[StudentRecord], now: DateTime<Utc>, zone: &FixedOffset) -> Stats {
    let today = now.with_timezone(zone).date_naive();
    let mut sections = HashSet::new();
    let mut stats = Stats::default();

    for record in records.iter().filter(|r| r.has_submitted()) {
        stats.total += 1;
        sections.insert(record.section.as_str());

        let submitted_on = record
            .submitted_instant()
            .map(|instant| instant.with_timezone(zone).date_naive());
        if submitted_on == Some(today) {
            stats.submitted_today += 1;
        }
    }

    stats.distinct_sections = sections.len();
    stats
}

/// Submitted records per section, largest first, ties by section name.
pub fn summarize_by_section<'a>(
    records: impl IntoIterator<Item = &'a StudentRecord>,
) -> Vec<SectionSummary> {
    let mut map: HashMap<&str, usize> = HashMap::new();

    for record in records.into_iter().filter(|r| r.has_submitted()) {
        *map.entry(record.section.as_str()).or_insert(0) += 1;
    }

    let mut summaries: Vec<SectionSummary> = map
        .into_iter()
        .map(|(section, count)| SectionSummary {
            section: section.to_string(),
            count,
        })
        .collect();

    summaries.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.section.cmp(&b.section)));
    summaries
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn submitted(id: &str, section: &str, at: Option<&str>) -> StudentRecord {
        let mut record = StudentRecord::new(id, format!("Student {id}"));
        record.section = section.to_string();
        record.submitted_at = at.map(str::to_string);
        record
    }

    #[test]
    fn empty_input_is_all_zero() {
        let now = Utc::now();
        assert_eq!(
            compute_statistics(&[], now, &FixedOffset::east_opt(0).unwrap()),
            Stats::default()
        );
        assert!(summarize_by_section(&Vec::<StudentRecord>::new()).is_empty());
    }

    #[test]
    fn counts_only_submitted_records() {
        let now = Utc.with_ymd_and_hms(2024, 1, 15, 18, 0, 0).unwrap();
        let records = vec![
            submitted("1", "CS", Some("2024-01-15T10:00:00Z")),
            submitted("2", "Law", Some("2024-01-14T10:00:00Z")),
            submitted("3", "CS", Some("garbled")),
            submitted("4", "Medicine", None),
        ];

        let stats = compute_statistics(&records, now, &FixedOffset::east_opt(0).unwrap());
        assert_eq!(
            stats,
            Stats {
                total: 3,
                distinct_sections: 2,
                submitted_today: 1,
            }
        );
    }

    #[test]
    fn today_follows_the_reference_zone() {
        // 22:30 UTC on the 14th is already the 15th at UTC+3.
        let now = Utc.with_ymd_and_hms(2024, 1, 15, 6, 0, 0).unwrap();
        let records = vec![submitted("1", "CS", Some("2024-01-14T22:30:00Z"))];

        let utc = compute_statistics(&records, now, &FixedOffset::east_opt(0).unwrap());
        let baghdad = compute_statistics(&records, now, &FixedOffset::east_opt(3 * 3600).unwrap());
        assert_eq!(utc.submitted_today, 0);
        assert_eq!(baghdad.submitted_today, 1);
    }

    #[test]
    fn sections_sorted_by_count() {
        let records = vec![
            submitted("1", "Law", Some("2024-01-15")),
            submitted("2", "CS", Some("2024-01-15")),
            submitted("3", "CS", Some("2024-01-15")),
            submitted("4", "Art", Some("2024-01-15")),
            submitted("5", "Art", None),
        ];
        let summary = summarize_by_section(&records);
        let flat: Vec<(&str, usize)> = summary
            .iter()
            .map(|s| (s.section.as_str(), s.count))
            .collect();
        assert_eq!(flat, vec![("CS", 2), ("Art", 1), ("Law", 1)]);
    }
}
