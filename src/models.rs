use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// One student-ID submission as delivered by the record source.
///
/// `submitted_at` is the completion signal: a record without it has been
/// provisioned for the student but the flow was never finished.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentRecord {
    #[serde(alias = "_id", deserialize_with = "opaque_id")]
    pub id: String,
    pub name: String,
    #[serde(default, alias = "symbol", deserialize_with = "text_or_null")]
    pub exam_code: String,
    #[serde(default, deserialize_with = "text_or_null")]
    pub section: String,
    #[serde(default, deserialize_with = "text_or_null")]
    pub study_type: String,
    #[serde(default)]
    pub birth_date: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default, alias = "time", alias = "submissionDate")]
    pub submitted_at: Option<String>,
    #[serde(default)]
    pub image_analysis: ImageAnalysis,
}

impl StudentRecord {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            exam_code: String::new(),
            section: String::new(),
            study_type: String::new(),
            birth_date: None,
            image_url: None,
            submitted_at: None,
            image_analysis: ImageAnalysis::default(),
        }
    }

    pub fn has_submitted(&self) -> bool {
        self.submitted_at
            .as_deref()
            .is_some_and(|value| !value.trim().is_empty())
    }

    /// Parsed submission instant, `None` when absent or unparsable.
    pub fn submitted_instant(&self) -> Option<DateTime<Utc>> {
        self.submitted_at.as_deref().and_then(parse_timestamp)
    }

    pub fn birth_year(&self) -> Option<i32> {
        use chrono::Datelike;

        self.birth_date
            .as_deref()
            .and_then(parse_timestamp)
            .map(|instant| instant.year())
    }
}

/// Named quality flags produced by the external photo check.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ImageAnalysis(BTreeMap<String, bool>);

/// `null` decodes as an empty set; a `null` flag counts as failed.
impl<'de> Deserialize<'de> for ImageAnalysis {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<BTreeMap<String, Option<bool>>>::deserialize(deserializer)?;
        Ok(Self(
            raw.unwrap_or_default()
                .into_iter()
                .map(|(flag, passed)| (flag, passed.unwrap_or(false)))
                .collect(),
        ))
    }
}

/// Flags with a fixed column position and display label.
pub const KNOWN_FLAGS: [(&str, &str); 5] = [
    ("headPosition", "وضعية الرأس"),
    ("eyesOpen", "العينان مفتوحتان"),
    ("glasses", "فحص النظارات"),
    ("whiteBackground", "الخلفية البيضاء"),
    ("goodLighting", "جودة الإضاءة"),
];

impl ImageAnalysis {
    pub fn from_flags<I, K>(flags: I) -> Self
    where
        I: IntoIterator<Item = (K, bool)>,
        K: Into<String>,
    {
        Self(flags.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn get(&self, flag: &str) -> Option<bool> {
        self.0.get(flag).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn flag_names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// True when every present flag passed. An empty set passes vacuously.
    pub fn all_passed(&self) -> bool {
        self.0.values().all(|passed| *passed)
    }
}

pub fn flag_label(flag: &str) -> &str {
    KNOWN_FLAGS
        .iter()
        .find(|(name, _)| *name == flag)
        .map(|(_, label)| *label)
        .unwrap_or(flag)
}

/// Orders flag names: known flags in their fixed order, then the rest by name.
pub fn flag_rank(flag: &str) -> (usize, &str) {
    let rank = KNOWN_FLAGS
        .iter()
        .position(|(name, _)| *name == flag)
        .unwrap_or(KNOWN_FLAGS.len());
    (rank, flag)
}

/// Response of the single-student search used by the submission form.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentLookup {
    #[serde(default)]
    pub section: Option<String>,
    #[serde(default)]
    pub study_type: Option<String>,
    #[serde(default)]
    pub birth_date: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub image_analysis: Option<ImageAnalysis>,
}

/// Accepts RFC 3339, a naive date-time (read as UTC) or a bare date.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(instant) = DateTime::parse_from_rfc3339(value) {
        return Some(instant.with_timezone(&Utc));
    }

    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Some(naive.and_utc());
        }
    }

    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

fn opaque_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Number(serde_json::Number),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Text(text) => text,
        RawId::Number(number) => number.to_string(),
    })
}

fn text_or_null<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}
