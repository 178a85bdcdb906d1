//! Record view model: filtering, sorting and pagination over fetched records.
//!
//! Every operation here is a pure transformation of resident data. The only
//! state is the user's [`FilterSortConfig`] and the memoized filter result
//! held by [`RecordViewModel`].

use std::cell::RefCell;
use std::cmp::Ordering;
use std::rc::Rc;

use thiserror::Error;

use crate::models::StudentRecord;
use crate::source::FetchError;

pub const DEFAULT_PAGE_SIZE: usize = 10;
pub const MAX_PAGE_SIZE: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum SortKey {
    Name,
    Section,
    StudyType,
    #[default]
    SubmittedAt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum SortDirection {
    #[value(name = "asc")]
    Ascending,
    #[default]
    #[value(name = "desc")]
    Descending,
}

impl SortDirection {
    pub fn toggled(self) -> Self {
        match self {
            SortDirection::Ascending => SortDirection::Descending,
            SortDirection::Descending => SortDirection::Ascending,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("page size must be a whole number, got {0:?}")]
    NotANumber(String),
    #[error("page size must be positive, got {0}")]
    NonPositive(i64),
    #[error("page size {0} exceeds the maximum of {max}", max = MAX_PAGE_SIZE)]
    TooLarge(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterSortConfig {
    search_term: String,
    section_filter: String,
    study_type_filter: String,
    sort_key: SortKey,
    sort_direction: SortDirection,
    page_size: usize,
    current_page: usize,
}

impl Default for FilterSortConfig {
    fn default() -> Self {
        Self {
            search_term: String::new(),
            section_filter: String::new(),
            study_type_filter: String::new(),
            sort_key: SortKey::SubmittedAt,
            sort_direction: SortDirection::Descending,
            page_size: DEFAULT_PAGE_SIZE,
            current_page: 1,
        }
    }
}

impl FilterSortConfig {
    pub fn search_term(&self) -> &str {
        &self.search_term
    }

    pub fn section_filter(&self) -> &str {
        &self.section_filter
    }

    pub fn study_type_filter(&self) -> &str {
        &self.study_type_filter
    }

    pub fn sort_key(&self) -> SortKey {
        self.sort_key
    }

    pub fn sort_direction(&self) -> SortDirection {
        self.sort_direction
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn current_page(&self) -> usize {
        self.current_page
    }

    pub fn set_search_term(&mut self, term: impl Into<String>) {
        let term = term.into();
        if term != self.search_term {
            self.search_term = term;
            self.current_page = 1;
        }
    }

    /// Empty string clears the filter.
    pub fn set_section_filter(&mut self, section: impl Into<String>) {
        let section = section.into();
        if section != self.section_filter {
            self.section_filter = section;
            self.current_page = 1;
        }
    }

    /// Empty string clears the filter.
    pub fn set_study_type_filter(&mut self, study_type: impl Into<String>) {
        let study_type = study_type.into();
        if study_type != self.study_type_filter {
            self.study_type_filter = study_type;
            self.current_page = 1;
        }
    }

    pub fn set_sort_key(&mut self, key: SortKey) {
        self.sort_key = key;
    }

    pub fn set_sort_direction(&mut self, direction: SortDirection) {
        self.sort_direction = direction;
    }

    pub fn toggle_sort_direction(&mut self) {
        self.sort_direction = self.sort_direction.toggled();
    }

    pub fn set_page_size(&mut self, size: usize) -> Result<(), ConfigError> {
        if size == 0 {
            return Err(ConfigError::NonPositive(0));
        }
        if size > MAX_PAGE_SIZE {
            return Err(ConfigError::TooLarge(size));
        }
        if size != self.page_size {
            self.page_size = size;
            self.current_page = 1;
        }
        Ok(())
    }

    /// Free-form page size as typed by the user.
    pub fn set_page_size_input(&mut self, input: &str) -> Result<(), ConfigError> {
        let parsed: i64 = input
            .trim()
            .parse()
            .map_err(|_| ConfigError::NotANumber(input.to_string()))?;
        if parsed <= 0 {
            return Err(ConfigError::NonPositive(parsed));
        }
        let size = usize::try_from(parsed).map_err(|_| ConfigError::TooLarge(usize::MAX))?;
        self.set_page_size(size)
    }

    /// Pages are 1-based; 0 is read as the first page.
    pub fn set_current_page(&mut self, page: usize) {
        self.current_page = page.max(1);
    }

    fn matches(&self, record: &StudentRecord, needle: &str) -> bool {
        record.has_submitted()
            && record.name.to_lowercase().contains(needle)
            && (self.section_filter.is_empty() || self.section_filter == record.section)
            && (self.study_type_filter.is_empty() || self.study_type_filter == record.study_type)
    }

    fn compare(&self, a: &StudentRecord, b: &StudentRecord) -> Ordering {
        let ordering = match self.sort_key {
            SortKey::Name => a.name.cmp(&b.name),
            SortKey::Section => a.section.cmp(&b.section),
            SortKey::StudyType => a.study_type.cmp(&b.study_type),
            SortKey::SubmittedAt => submitted_millis(a).cmp(&submitted_millis(b)),
        };
        match self.sort_direction {
            SortDirection::Ascending => ordering,
            SortDirection::Descending => ordering.reverse(),
        }
    }

    /// Everything the filtered order depends on; the page index is excluded.
    fn view_key(&self) -> (String, String, String, SortKey, SortDirection) {
        (
            self.search_term.clone(),
            self.section_filter.clone(),
            self.study_type_filter.clone(),
            self.sort_key,
            self.sort_direction,
        )
    }
}

/// Missing or unparsable timestamps sort as the epoch.
fn submitted_millis(record: &StudentRecord) -> i64 {
    record
        .submitted_instant()
        .map(|instant| instant.timestamp_millis())
        .unwrap_or(0)
}

/// Submitted records matching the active filters, in sort order.
pub fn apply_filters<'a>(
    records: &'a [StudentRecord],
    config: &FilterSortConfig,
) -> Vec<&'a StudentRecord> {
    filtered_indices(records, config)
        .into_iter()
        .map(|index| &records[index])
        .collect()
}

fn filtered_indices(records: &[StudentRecord], config: &FilterSortConfig) -> Vec<usize> {
    let needle = config.search_term.to_lowercase();
    let mut indices: Vec<usize> = records
        .iter()
        .enumerate()
        .filter(|(_, record)| config.matches(record, &needle))
        .map(|(index, _)| index)
        .collect();

    // sort_by is stable: equal keys keep input order in either direction.
    indices.sort_by(|a, b| config.compare(&records[*a], &records[*b]));
    indices
}

#[derive(Debug, Clone, PartialEq)]
pub struct PageSlice<'a, T> {
    pub items: &'a [T],
    pub page_number: usize,
    pub total_pages: usize,
    /// 0-based inclusive.
    pub start_index: usize,
    /// 0-based exclusive.
    pub end_index: usize,
    pub total_items: usize,
}

/// Out-of-range page numbers saturate to the nearest valid page.
pub fn paginate<T>(view: &[T], page_number: usize, page_size: usize) -> PageSlice<'_, T> {
    let page_size = page_size.max(1);
    let total_items = view.len();
    let total_pages = total_items.div_ceil(page_size).max(1);
    let page_number = page_number.clamp(1, total_pages);
    let start_index = ((page_number - 1) * page_size).min(total_items);
    let end_index = (page_number * page_size).min(total_items);

    PageSlice {
        items: &view[start_index..end_index],
        page_number,
        total_pages,
        start_index,
        end_index,
        total_items,
    }
}

/// Identifies one fetch; only the most recently issued ticket may land.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchTicket(u64);

#[derive(Debug, Default)]
pub struct FetchSequence {
    issued: u64,
}

impl FetchSequence {
    pub fn next(&mut self) -> FetchTicket {
        self.issued += 1;
        FetchTicket(self.issued)
    }

    pub fn is_current(&self, ticket: FetchTicket) -> bool {
        ticket.0 == self.issued
    }
}

type ViewKey = (u64, (String, String, String, SortKey, SortDirection));
type ViewCache = Option<(ViewKey, Rc<[usize]>)>;

/// Dashboard session state: fetched records, the user's config and a
/// memoized filtered view.
#[derive(Debug, Default)]
pub struct RecordViewModel {
    records: Vec<StudentRecord>,
    generation: u64,
    config: FilterSortConfig,
    fetches: FetchSequence,
    last_error: Option<FetchError>,
    cache: RefCell<ViewCache>,
}

impl RecordViewModel {
    pub fn new(config: FilterSortConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn records(&self) -> &[StudentRecord] {
        &self.records
    }

    pub fn config(&self) -> &FilterSortConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut FilterSortConfig {
        &mut self.config
    }

    pub fn last_error(&self) -> Option<&FetchError> {
        self.last_error.as_ref()
    }

    pub fn replace_records(&mut self, records: Vec<StudentRecord>) {
        self.records = records;
        self.generation += 1;
    }

    pub fn begin_fetch(&mut self) -> FetchTicket {
        self.fetches.next()
    }

    /// Lands a fetch result unless a newer fetch has been started since.
    /// A failure leaves an empty collection and records the error.
    pub fn accept_fetch(
        &mut self,
        ticket: FetchTicket,
        outcome: Result<Vec<StudentRecord>, FetchError>,
    ) -> bool {
        if !self.fetches.is_current(ticket) {
            tracing::debug!(?ticket, "discarding stale fetch result");
            return false;
        }

        match outcome {
            Ok(records) => {
                self.last_error = None;
                self.replace_records(records);
            }
            Err(error) => {
                tracing::warn!(%error, "record fetch failed");
                self.last_error = Some(error);
                self.replace_records(Vec::new());
            }
        }
        true
    }

    /// Positions into [`records`](Self::records) in view order. Shared with
    /// the cache until records or the filter/sort settings change.
    pub fn view_indices(&self) -> Rc<[usize]> {
        let key = (self.generation, self.config.view_key());
        let mut cache = self.cache.borrow_mut();

        if let Some((cached_key, indices)) = cache.as_ref() {
            if *cached_key == key {
                return Rc::clone(indices);
            }
        }
        let indices: Rc<[usize]> = filtered_indices(&self.records, &self.config).into();
        *cache = Some((key, Rc::clone(&indices)));
        indices
    }

    pub fn view(&self) -> Vec<&StudentRecord> {
        self.view_indices()
            .iter()
            .map(|&index| &self.records[index])
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, name: &str, section: &str, submitted_at: Option<&str>) -> StudentRecord {
        let mut record = StudentRecord::new(id, name);
        record.section = section.to_string();
        record.study_type = "صباحي".to_string();
        record.submitted_at = submitted_at.map(str::to_string);
        record
    }

    fn names<'a>(view: &[&'a StudentRecord]) -> Vec<&'a str> {
        view.iter().map(|r| r.name.as_str()).collect()
    }

    #[test]
    fn default_view_hides_unsubmitted_records() {
        let records = vec![
            record("1", "Ahmed", "CS", Some("2024-01-15T10:00:00Z")),
            record("2", "Sara", "Law", None),
        ];
        let view = apply_filters(&records, &FilterSortConfig::default());
        assert_eq!(names(&view), vec!["Ahmed"]);
    }

    #[test]
    fn search_is_case_insensitive_substring() {
        let records = vec![
            record("1", "Ahmed Ali", "CS", Some("2024-01-15T10:00:00Z")),
            record("2", "Sara", "CS", Some("2024-01-15T11:00:00Z")),
        ];
        let mut config = FilterSortConfig::default();
        config.set_search_term("ahm");
        assert_eq!(names(&apply_filters(&records, &config)), vec!["Ahmed Ali"]);
    }

    #[test]
    fn section_and_study_type_match_exactly() {
        let mut evening = record("3", "Omar", "CS", Some("2024-01-15T12:00:00Z"));
        evening.study_type = "مسائي".to_string();
        let records = vec![
            record("1", "Ahmed", "CS", Some("2024-01-15T10:00:00Z")),
            record("2", "Sara", "CS Extra", Some("2024-01-15T11:00:00Z")),
            evening,
        ];

        let mut config = FilterSortConfig::default();
        config.set_section_filter("CS");
        assert_eq!(names(&apply_filters(&records, &config)), vec!["Omar", "Ahmed"]);

        config.set_study_type_filter("مسائي");
        assert_eq!(names(&apply_filters(&records, &config)), vec!["Omar"]);

        config.set_section_filter("");
        config.set_study_type_filter("");
        assert_eq!(apply_filters(&records, &config).len(), 3);
    }

    #[test]
    fn missing_timestamp_sorts_as_earliest() {
        let records = vec![
            record("1", "T1", "CS", Some("2024-01-15T10:00:00Z")),
            record("2", "Broken", "CS", Some("not a date")),
            record("3", "T2", "CS", Some("2024-01-16T10:00:00Z")),
        ];
        let config = FilterSortConfig::default();
        assert_eq!(
            names(&apply_filters(&records, &config)),
            vec!["T2", "T1", "Broken"]
        );
    }

    #[test]
    fn equal_keys_keep_input_order_both_ways() {
        let records = vec![
            record("1", "B", "CS", Some("2024-01-15T10:00:00Z")),
            record("2", "A", "Law", Some("2024-01-15T10:00:00Z")),
            record("3", "C", "CS", Some("2024-01-15T10:00:00Z")),
        ];
        let mut config = FilterSortConfig::default();
        config.set_sort_key(SortKey::Section);
        config.set_sort_direction(SortDirection::Ascending);
        assert_eq!(names(&apply_filters(&records, &config)), vec!["B", "C", "A"]);

        config.toggle_sort_direction();
        assert_eq!(names(&apply_filters(&records, &config)), vec!["A", "B", "C"]);
    }

    #[test]
    fn every_sort_key_orders_adjacent_pairs() {
        let rows = [
            ("1", "سارة", "القانون", "مسائي", "2024-01-15T10:00:00Z"),
            ("2", "Ahmed", "علوم الحاسوب", "صباحي", "2024-01-17T08:00:00Z"),
            ("3", "أحمد", "CS", "مسائي", "2024-01-16T09:30:00Z"),
            ("4", "zaid", "القانون", "صباحي", "2024-01-14T23:59:00Z"),
            ("5", "علي", "CS", "صباحي", "2024-01-16T09:30:00Z"),
        ];
        let records: Vec<StudentRecord> = rows
            .iter()
            .map(|(id, name, section, study_type, at)| {
                let mut r = record(id, name, section, Some(*at));
                r.study_type = study_type.to_string();
                r
            })
            .collect();

        let keys = [
            SortKey::Name,
            SortKey::Section,
            SortKey::StudyType,
            SortKey::SubmittedAt,
        ];
        for key in keys {
            for direction in [SortDirection::Ascending, SortDirection::Descending] {
                let mut config = FilterSortConfig::default();
                config.set_sort_key(key);
                config.set_sort_direction(direction);
                let view = apply_filters(&records, &config);
                assert_eq!(view.len(), records.len());

                for pair in view.windows(2) {
                    let ordering = match key {
                        SortKey::Name => pair[0].name.cmp(&pair[1].name),
                        SortKey::Section => pair[0].section.cmp(&pair[1].section),
                        SortKey::StudyType => pair[0].study_type.cmp(&pair[1].study_type),
                        SortKey::SubmittedAt => pair[0]
                            .submitted_instant()
                            .cmp(&pair[1].submitted_instant()),
                    };
                    let expected_not = match direction {
                        SortDirection::Ascending => Ordering::Greater,
                        SortDirection::Descending => Ordering::Less,
                    };
                    assert_ne!(
                        ordering, expected_not,
                        "{key:?} {direction:?}: {} before {}",
                        pair[0].id, pair[1].id
                    );
                }
            }
        }
    }

    #[test]
    fn name_sort_places_latin_before_arabic() {
        let records = vec![
            record("1", "سارة", "CS", Some("2024-01-15T10:00:00Z")),
            record("2", "أحمد", "CS", Some("2024-01-15T10:00:00Z")),
            record("3", "Omar", "CS", Some("2024-01-15T10:00:00Z")),
        ];
        let mut config = FilterSortConfig::default();
        config.set_sort_key(SortKey::Name);
        config.set_sort_direction(SortDirection::Ascending);
        assert_eq!(
            names(&apply_filters(&records, &config)),
            vec!["Omar", "أحمد", "سارة"]
        );

        config.toggle_sort_direction();
        assert_eq!(
            names(&apply_filters(&records, &config)),
            vec!["سارة", "أحمد", "Omar"]
        );
    }

    #[test]
    fn filtering_is_idempotent() {
        let records: Vec<StudentRecord> = (0..30)
            .map(|i| {
                record(
                    &i.to_string(),
                    &format!("Student {}", i % 7),
                    if i % 2 == 0 { "CS" } else { "Law" },
                    Some("2024-01-15T10:00:00Z"),
                )
            })
            .collect();
        let mut config = FilterSortConfig::default();
        config.set_sort_key(SortKey::Name);
        assert_eq!(
            apply_filters(&records, &config),
            apply_filters(&records, &config)
        );
    }

    #[test]
    fn empty_input_yields_empty_view() {
        assert!(apply_filters(&[], &FilterSortConfig::default()).is_empty());
    }

    #[test]
    fn third_page_of_twenty_five() {
        let view: Vec<u32> = (0..25).collect();
        let page = paginate(&view, 3, 10);
        assert_eq!(page.items.len(), 5);
        assert_eq!(page.start_index, 20);
        assert_eq!(page.end_index, 25);
        assert_eq!(page.total_pages, 3);
    }

    #[test]
    fn out_of_range_pages_saturate() {
        let view: Vec<u32> = (0..25).collect();
        assert_eq!(paginate(&view, 99, 10), paginate(&view, 3, 10));
        assert_eq!(paginate(&view, 0, 10), paginate(&view, 1, 10));
    }

    #[test]
    fn empty_view_is_page_one_of_one() {
        let view: Vec<u32> = Vec::new();
        let page = paginate(&view, 4, 10);
        assert_eq!(page.page_number, 1);
        assert_eq!(page.total_pages, 1);
        assert!(page.items.is_empty());
        assert_eq!((page.start_index, page.end_index), (0, 0));
    }

    #[test]
    fn filter_changes_reset_page() {
        let mut config = FilterSortConfig::default();
        config.set_current_page(4);
        config.set_sort_key(SortKey::Name);
        assert_eq!(config.current_page(), 4);

        config.set_search_term("a");
        assert_eq!(config.current_page(), 1);

        config.set_current_page(2);
        config.set_page_size(25).unwrap();
        assert_eq!(config.current_page(), 1);
    }

    #[test]
    fn invalid_page_sizes_leave_config_untouched() {
        let mut config = FilterSortConfig::default();
        config.set_current_page(3);
        let before = config.clone();

        assert_eq!(config.set_page_size(0), Err(ConfigError::NonPositive(0)));
        assert_eq!(
            config.set_page_size(MAX_PAGE_SIZE + 1),
            Err(ConfigError::TooLarge(MAX_PAGE_SIZE + 1))
        );
        assert_eq!(
            config.set_page_size_input("ten"),
            Err(ConfigError::NotANumber("ten".to_string()))
        );
        assert_eq!(
            config.set_page_size_input("-5"),
            Err(ConfigError::NonPositive(-5))
        );
        assert_eq!(config, before);

        config.set_page_size_input(" 50 ").unwrap();
        assert_eq!(config.page_size(), 50);
    }

    #[test]
    fn view_model_memoizes_and_tracks_config() {
        let mut model = RecordViewModel::default();
        model.replace_records(vec![
            record("1", "Ahmed", "CS", Some("2024-01-15T10:00:00Z")),
            record("2", "Sara", "Law", Some("2024-01-16T10:00:00Z")),
        ]);
        assert_eq!(names(&model.view()), vec!["Sara", "Ahmed"]);
        let first = model.view_indices();
        assert!(Rc::ptr_eq(&first, &model.view_indices()));

        model.config_mut().set_current_page(2);
        assert!(Rc::ptr_eq(&first, &model.view_indices()));

        model.config_mut().set_section_filter("CS");
        assert!(!Rc::ptr_eq(&first, &model.view_indices()));
        assert_eq!(names(&model.view()), vec!["Ahmed"]);
    }

    #[test]
    fn stale_fetch_results_are_discarded() {
        let mut model = RecordViewModel::default();
        let first = model.begin_fetch();
        let second = model.begin_fetch();

        let late = vec![record("1", "Old", "CS", Some("2024-01-15T10:00:00Z"))];
        assert!(!model.accept_fetch(first, Ok(late)));
        assert!(model.records().is_empty());

        let fresh = vec![record("2", "New", "CS", Some("2024-01-15T10:00:00Z"))];
        assert!(model.accept_fetch(second, Ok(fresh)));
        assert_eq!(names(&model.view()), vec!["New"]);
    }

    #[test]
    fn failed_fetch_becomes_empty_collection_with_error() {
        let mut model = RecordViewModel::default();
        let ticket = model.begin_fetch();
        model.replace_records(vec![record("1", "Ahmed", "CS", None)]);

        assert!(model.accept_fetch(ticket, Err(FetchError::Status(503))));
        assert!(model.records().is_empty());
        assert!(model.view().is_empty());
        assert_eq!(model.last_error(), Some(&FetchError::Status(503)));
    }
}
