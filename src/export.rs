use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{FixedOffset, NaiveDate};
use rust_xlsxwriter::{ColNum, Format, RowNum, Workbook};
use tracing::info;

use crate::models::{flag_label, flag_rank, StudentRecord};

const SERIAL: &str = "الرقم التسلسلي";
const NAME: &str = "اسم الطالب";
const EXAM_CODE: &str = "الرقم الامتحاني";
const SECTION: &str = "القسم";
const STUDY_TYPE: &str = "نوع الدراسة";
const BIRTH_YEAR: &str = "سنة الميلاد";
const BIRTH_DATE: &str = "تاريخ الميلاد";
const SUBMISSION_DATE: &str = "تاريخ التقديم";
const SUBMISSION_TIME: &str = "وقت التقديم";
const IMAGE_URL: &str = "رابط الصورة";
const STATUS: &str = "حالة الصورة";

const FLAG_VALID: &str = "صالح";
const FLAG_INVALID: &str = "غير صالح";

pub const SHEET_NAME: &str = "بيانات الطلاب";

pub const FILTERED_STEM: &str = "filtered_students_data";
pub const ALL_STEM: &str = "all_students_data";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverallStatus {
    Accepted,
    Rejected,
}

impl OverallStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            OverallStatus::Accepted => "accepted",
            OverallStatus::Rejected => "rejected",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            OverallStatus::Accepted => "مقبولة",
            OverallStatus::Rejected => "مرفوضة",
        }
    }
}

impl fmt::Display for OverallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// One spreadsheet row: ordered label/value cells plus the derived verdict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportRow {
    pub cells: Vec<(String, String)>,
    pub overall_status: OverallStatus,
}

impl ExportRow {
    pub fn value(&self, label: &str) -> Option<&str> {
        self.cells
            .iter()
            .find(|(cell_label, _)| cell_label == label)
            .map(|(_, value)| value.as_str())
    }

    fn labels(&self) -> impl Iterator<Item = &str> {
        self.cells.iter().map(|(label, _)| label.as_str())
    }
}

/// Flattens records for the spreadsheet. Every row carries the same columns:
/// flag columns are the union of flags across `records`.
pub fn build_export_rows(records: &[&StudentRecord], zone: &FixedOffset) -> Vec<ExportRow> {
    let mut flags: Vec<&str> = records
        .iter()
        .flat_map(|record| record.image_analysis.flag_names())
        .collect();
    flags.sort_by(|a, b| flag_rank(a).cmp(&flag_rank(b)));
    flags.dedup();

    records
        .iter()
        .enumerate()
        .map(|(index, record)| {
            let submitted = record.submitted_instant().map(|at| at.with_timezone(zone));
            let (submission_date, submission_time) = match submitted {
                Some(at) => (at.format("%Y-%m-%d").to_string(), at.format("%H:%M").to_string()),
                None => (record.submitted_at.clone().unwrap_or_default(), String::new()),
            };

            let mut cells = vec![
                (SERIAL.to_string(), (index + 1).to_string()),
                (NAME.to_string(), record.name.clone()),
                (EXAM_CODE.to_string(), record.exam_code.clone()),
                (SECTION.to_string(), record.section.clone()),
                (STUDY_TYPE.to_string(), record.study_type.clone()),
                (
                    BIRTH_YEAR.to_string(),
                    record.birth_year().map(|y| y.to_string()).unwrap_or_default(),
                ),
                (BIRTH_DATE.to_string(), record.birth_date.clone().unwrap_or_default()),
                (SUBMISSION_DATE.to_string(), submission_date),
                (SUBMISSION_TIME.to_string(), submission_time),
                (IMAGE_URL.to_string(), record.image_url.clone().unwrap_or_default()),
            ];

            for flag in &flags {
                let value = match record.image_analysis.get(flag) {
                    Some(true) => FLAG_VALID,
                    Some(false) => FLAG_INVALID,
                    None => "",
                };
                cells.push((flag_label(flag).to_string(), value.to_string()));
            }

            let overall_status = if record.image_analysis.all_passed() {
                OverallStatus::Accepted
            } else {
                OverallStatus::Rejected
            };
            cells.push((STATUS.to_string(), overall_status.label().to_string()));

            ExportRow {
                cells,
                overall_status,
            }
        })
        .collect()
}

/// Picks what the export button exports: the filtered view when it has rows,
/// otherwise everything.
pub fn export_selection<'a>(
    all: &'a [StudentRecord],
    filtered: &[&'a StudentRecord],
) -> (Vec<&'a StudentRecord>, &'static str) {
    if filtered.is_empty() {
        return (all.iter().collect(), ALL_STEM);
    }
    let stem = if filtered.len() < all.len() {
        FILTERED_STEM
    } else {
        ALL_STEM
    };
    (filtered.to_vec(), stem)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum ExportFormat {
    /// Excel workbook with a single named sheet.
    #[default]
    Xlsx,
    /// Comma-separated values with a UTF-8 BOM.
    Csv,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Xlsx => "xlsx",
            ExportFormat::Csv => "csv",
        }
    }
}

pub fn export_file_name(stem: &str, date: NaiveDate, format: ExportFormat) -> String {
    format!("{stem}_{}.{}", date.format("%Y-%m-%d"), format.extension())
}

fn header_labels(rows: &[ExportRow]) -> Vec<&str> {
    match rows.first() {
        Some(first) => first.labels().collect(),
        None => vec![
            SERIAL, NAME, EXAM_CODE, SECTION, STUDY_TYPE, BIRTH_YEAR, BIRTH_DATE,
            SUBMISSION_DATE, SUBMISSION_TIME, IMAGE_URL, STATUS,
        ],
    }
}

/// Column width in characters.
fn column_width(label: &str) -> f64 {
    match label {
        SERIAL => 8.0,
        NAME => 20.0,
        SECTION => 18.0,
        STUDY_TYPE | BIRTH_YEAR | STATUS => 12.0,
        IMAGE_URL => 30.0,
        _ => 15.0,
    }
}

/// Writes rows to a workbook with one right-to-left sheet and a bold header.
pub fn write_xlsx(rows: &[ExportRow], path: &Path) -> anyhow::Result<()> {
    let mut workbook = Workbook::new();
    let header = Format::new().set_bold();
    let sheet = workbook.add_worksheet();
    sheet.set_name(SHEET_NAME)?;
    sheet.set_right_to_left(true);

    for (col, label) in header_labels(rows).into_iter().enumerate() {
        let col = ColNum::try_from(col).context("too many export columns")?;
        sheet.set_column_width(col, column_width(label))?;
        sheet.write_string_with_format(0, col, label, &header)?;
    }
    for (index, row) in rows.iter().enumerate() {
        let line = RowNum::try_from(index + 1).context("too many export rows")?;
        for (col, (_, value)) in row.cells.iter().enumerate() {
            let col = ColNum::try_from(col).context("too many export columns")?;
            sheet.write_string(line, col, value.as_str())?;
        }
    }

    workbook
        .save(path)
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

/// Writes rows as CSV, prefixed with a UTF-8 BOM for right-to-left text.
pub fn write_csv(rows: &[ExportRow], path: &Path) -> anyhow::Result<()> {
    let file = File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    let mut out = BufWriter::new(file);
    out.write_all(b"\xEF\xBB\xBF")?;

    let mut writer = csv::Writer::from_writer(out);
    writer.write_record(header_labels(rows))?;
    for row in rows {
        writer.write_record(row.cells.iter().map(|(_, value)| value.as_str()))?;
    }
    writer.flush()?;
    Ok(())
}

/// Exporter: writes `<stem>_<date>.<ext>` into `dir` on a blocking worker.
pub async fn export_rows(
    rows: Vec<ExportRow>,
    dir: PathBuf,
    stem: String,
    date: NaiveDate,
    format: ExportFormat,
) -> anyhow::Result<PathBuf> {
    let path = dir.join(export_file_name(&stem, date, format));
    let target = path.clone();
    let count = rows.len();

    tokio::task::spawn_blocking(move || match format {
        ExportFormat::Xlsx => write_xlsx(&rows, &target),
        ExportFormat::Csv => write_csv(&rows, &target),
    })
    .await
    .context("export worker panicked")??;

    info!(path = %path.display(), rows = count, %format, "export written");
    Ok(path)
}
