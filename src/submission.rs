//! Student-side submission: birth data, photo and the photo's quality flags.

use chrono::{Datelike, NaiveDate};
use thiserror::Error;

use crate::models::{parse_timestamp, ImageAnalysis, StudentLookup};

pub const EARLIEST_BIRTH_YEAR: i32 = 1900;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SubmissionError {
    #[error("birth year {year} is outside {earliest}..={latest}", earliest = EARLIEST_BIRTH_YEAR)]
    BirthYearOutOfRange { year: i32, latest: i32 },
    #[error("birth date {0} is in the future")]
    BirthDateInFuture(NaiveDate),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Missing {
    BirthData,
    Image,
    Analysis,
    FailedChecks,
}

impl Missing {
    pub fn describe(self) -> &'static str {
        match self {
            Missing::BirthData => "birth date or birth year",
            Missing::Image => "photo",
            Missing::Analysis => "photo quality check",
            Missing::FailedChecks => "a photo that passes every quality check",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SubmissionDraft {
    stored_image: Option<String>,
    stored_analysis: Option<ImageAnalysis>,
    birth_year: Option<i32>,
    birth_date: Option<NaiveDate>,
    image: Option<String>,
    analysis: Option<ImageAnalysis>,
}

impl SubmissionDraft {
    /// Seeds the form with whatever the student already submitted.
    pub fn from_lookup(lookup: &StudentLookup) -> Self {
        let birth_date = lookup
            .birth_date
            .as_deref()
            .and_then(parse_timestamp)
            .map(|instant| instant.date_naive());

        Self {
            stored_image: lookup.image_url.clone(),
            stored_analysis: lookup.image_analysis.clone(),
            birth_year: birth_date.map(|date| date.year()),
            birth_date,
            image: lookup.image_url.clone(),
            analysis: lookup.image_analysis.clone(),
        }
    }

    pub fn birth_year(&self) -> Option<i32> {
        self.birth_year
    }

    pub fn birth_date(&self) -> Option<NaiveDate> {
        self.birth_date
    }

    pub fn image(&self) -> Option<&str> {
        self.image.as_deref()
    }

    pub fn analysis(&self) -> Option<&ImageAnalysis> {
        self.analysis.as_ref()
    }

    /// Calendar pick; also fills in the year.
    pub fn set_birth_date(&mut self, date: NaiveDate, today: NaiveDate) -> Result<(), SubmissionError> {
        if date > today {
            return Err(SubmissionError::BirthDateInFuture(date));
        }
        check_year(date.year(), today)?;
        self.birth_date = Some(date);
        self.birth_year = Some(date.year());
        Ok(())
    }

    /// Manual year entry; clears any calendar date.
    pub fn set_birth_year(&mut self, year: i32, today: NaiveDate) -> Result<(), SubmissionError> {
        check_year(year, today)?;
        self.birth_year = Some(year);
        self.birth_date = None;
        Ok(())
    }

    /// A new photo invalidates the previous analysis.
    pub fn attach_image(&mut self, location: impl Into<String>) {
        self.image = Some(location.into());
        self.analysis = None;
    }

    pub fn record_analysis(&mut self, analysis: ImageAnalysis) {
        self.analysis = Some(analysis);
    }

    /// Drops the new photo and falls back to the stored one.
    pub fn remove_image(&mut self) {
        self.image = self.stored_image.clone();
        self.analysis = self.stored_analysis.clone();
    }

    pub fn readiness(&self) -> Vec<Missing> {
        let mut missing = Vec::new();
        if self.birth_year.is_none() && self.birth_date.is_none() {
            missing.push(Missing::BirthData);
        }
        if self.image.is_none() {
            missing.push(Missing::Image);
        }
        match &self.analysis {
            None => missing.push(Missing::Analysis),
            Some(analysis) if analysis.is_empty() => missing.push(Missing::Analysis),
            Some(analysis) if !analysis.all_passed() => missing.push(Missing::FailedChecks),
            Some(_) => {}
        }
        missing
    }

    pub fn is_ready(&self) -> bool {
        self.readiness().is_empty()
    }
}

fn check_year(year: i32, today: NaiveDate) -> Result<(), SubmissionError> {
    let latest = today.year();
    if (EARLIEST_BIRTH_YEAR..=latest).contains(&year) {
        Ok(())
    } else {
        Err(SubmissionError::BirthYearOutOfRange { year, latest })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 9, 1).unwrap()
    }

    fn passing() -> ImageAnalysis {
        ImageAnalysis::from_flags([("headPosition", true), ("eyesOpen", true)])
    }

    #[test]
    fn lookup_seeds_existing_submission() {
        let lookup = StudentLookup {
            birth_date: Some("2000-05-15".to_string()),
            image_url: Some("https://cdn.example/1.jpg".to_string()),
            image_analysis: Some(passing()),
            ..StudentLookup::default()
        };
        let draft = SubmissionDraft::from_lookup(&lookup);
        assert_eq!(draft.birth_year(), Some(2000));
        assert!(draft.is_ready());
    }

    #[test]
    fn empty_draft_lists_everything_missing() {
        let draft = SubmissionDraft::default();
        assert_eq!(
            draft.readiness(),
            vec![Missing::BirthData, Missing::Image, Missing::Analysis]
        );
    }

    #[test]
    fn year_entry_clears_calendar_date() {
        let mut draft = SubmissionDraft::default();
        draft
            .set_birth_date(NaiveDate::from_ymd_opt(2001, 2, 3).unwrap(), today())
            .unwrap();
        assert_eq!(draft.birth_year(), Some(2001));

        draft.set_birth_year(1999, today()).unwrap();
        assert_eq!(draft.birth_year(), Some(1999));
        assert_eq!(draft.birth_date(), None);
    }

    #[test]
    fn rejects_implausible_birth_data() {
        let mut draft = SubmissionDraft::default();
        assert_eq!(
            draft.set_birth_year(1850, today()),
            Err(SubmissionError::BirthYearOutOfRange {
                year: 1850,
                latest: 2025
            })
        );
        let tomorrow = NaiveDate::from_ymd_opt(2025, 9, 2).unwrap();
        assert_eq!(
            draft.set_birth_date(tomorrow, today()),
            Err(SubmissionError::BirthDateInFuture(tomorrow))
        );
        assert_eq!(draft.birth_year(), None);
    }

    #[test]
    fn new_image_needs_fresh_passing_analysis() {
        let lookup = StudentLookup {
            birth_date: Some("2000-05-15".to_string()),
            image_url: Some("stored.jpg".to_string()),
            image_analysis: Some(passing()),
            ..StudentLookup::default()
        };
        let mut draft = SubmissionDraft::from_lookup(&lookup);

        draft.attach_image("new.jpg");
        assert_eq!(draft.readiness(), vec![Missing::Analysis]);

        draft.record_analysis(ImageAnalysis::from_flags([("glasses", false)]));
        assert_eq!(draft.readiness(), vec![Missing::FailedChecks]);

        draft.remove_image();
        assert_eq!(draft.image(), Some("stored.jpg"));
        assert!(draft.is_ready());
    }
}
