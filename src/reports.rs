//! Excel exports: a single student's attendance history, and a per-batch matrix of students
//! against lecture sessions.

use crate::error::{Error, Result};
use crate::manager::AttendanceManager;
use crate::models::{AttendanceRecord, Batch, Lecture, LectureType, Status, Student};
use crate::schema;
use chrono::NaiveDate;
use diesel::prelude::*;
use regex::Regex;
use rust_xlsxwriter::{Color, Format, FormatAlign, FormatBorder, Workbook, Worksheet, XlsxError};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::info;
use unicode_normalization::UnicodeNormalization;

pub const XLSX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

const PRESENT_FILL: u32 = 0xC6EFCE;
const ABSENT_FILL: u32 = 0xFFC7CE;
const HEADER_FILL: u32 = 0xD9D9D9;

/// Excel refuses sheet names longer than this.
const MAX_SHEET_NAME: usize = 31;

static ROLL_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(23|24|25)[A-Z]{2}\d{4}$").expect("roll number pattern is valid"));

/// Whether `roll` looks like `23CE0001`: intake year, two-letter branch code, four digits.
pub fn is_valid_roll_number(roll: &str) -> bool {
    ROLL_NUMBER.is_match(roll)
}

/// Turns arbitrary text into a filename-safe slug: ASCII letters, digits, `_` and `-` only,
/// lower-cased, with runs of whitespace and hyphens collapsed to one `-`. Accented letters are
/// decomposed (NFKD) and keep their base letter.
pub fn slugify(value: &str) -> String {
    let mut slug = String::with_capacity(value.len());
    let mut pending_dash = false;

    for c in value.nfkd() {
        if c.is_whitespace() || c == '-' {
            pending_dash = true;
        } else if c.is_ascii_alphanumeric() || c == '_' {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
        }
    }

    slug.trim_matches(|c| c == '-' || c == '_').to_string()
}

/// A generated workbook, ready to be written out or served.
#[derive(Debug, Clone)]
pub struct Report {
    pub filename: String,
    pub content_type: &'static str,
    pub bytes: Vec<u8>,
}

impl Report {
    pub(crate) fn xlsx(filename: String, workbook: &mut Workbook) -> Result<Self> {
        Ok(Self {
            filename,
            content_type: XLSX_CONTENT_TYPE,
            bytes: workbook.save_to_buffer()?,
        })
    }

    /// Writes the report into `dir` (created if missing) and returns the file's path.
    pub fn write_to(&self, dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(dir)?;
        let path = dir.join(&self.filename);
        fs::write(&path, &self.bytes)?;
        Ok(path)
    }
}

fn thin_bordered() -> Format {
    Format::new().set_border(FormatBorder::Thin)
}

fn header_format() -> Format {
    thin_bordered()
        .set_bold()
        .set_align(FormatAlign::Center)
        .set_align(FormatAlign::VerticalCenter)
        .set_background_color(Color::RGB(HEADER_FILL))
}

fn status_fill(status: Status) -> Color {
    match status {
        Status::Present => Color::RGB(PRESENT_FILL),
        Status::Absent => Color::RGB(ABSENT_FILL),
    }
}

fn set_column_widths(worksheet: &mut Worksheet, widths: &[f64]) -> std::result::Result<(), XlsxError> {
    for (col, width) in widths.iter().enumerate() {
        worksheet.set_column_width(col as u16, *width)?;
    }
    Ok(())
}

/// One row of a student's attendance history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StudentReportRow {
    pub lecture: Lecture,
    pub batch: Batch,
    pub record: AttendanceRecord,
}

impl AttendanceManager {
    /// Looks up the student for a report by roll number, validating the number's format first.
    pub fn student_for_report(&mut self, roll: &str) -> Result<Student> {
        let roll = roll.trim();

        if roll.is_empty() {
            return Err(Error::Validation("Roll number is required.".to_string()));
        }
        if !is_valid_roll_number(roll) {
            return Err(Error::Validation("Invalid roll number format.".to_string()));
        }

        self.find_by_roll_number(roll)?
            .ok_or_else(|| Error::NotFound(format!("student {roll}")))
    }

    /// Every attendance record of a student, ordered by lecture date and then session.
    pub fn student_report_rows(&mut self, student: &Student) -> Result<Vec<StudentReportRow>> {
        use schema::attendance::dsl::*;

        let mut rows: Vec<StudentReportRow> = attendance
            .inner_join(schema::lectures::table.inner_join(schema::batches::table))
            .filter(student_id.eq(student.id))
            .select((
                AttendanceRecord::as_select(),
                Lecture::as_select(),
                Batch::as_select(),
            ))
            .load::<(AttendanceRecord, Lecture, Batch)>(&mut self.db)?
            .into_iter()
            .map(|(record, lecture, batch)| StudentReportRow {
                lecture,
                batch,
                record,
            })
            .collect();

        rows.sort_by_key(|row| (row.lecture.date, row.lecture.lecture_type));

        Ok(rows)
    }

    /// Builds the single-sheet attendance history workbook for one student.
    pub fn student_attendance_report(&mut self, student: &Student) -> Result<Report> {
        const HEADERS: [&str; 7] = [
            "Lecture Date",
            "Session",
            "Batch",
            "Lecture Title",
            "Status",
            "Marked At",
            "Last Updated",
        ];
        const WIDTHS: [f64; 7] = [15.0, 12.0, 18.0, 30.0, 12.0, 20.0, 20.0];

        let rows = self.student_report_rows(student)?;

        let header = header_format();
        let cell = thin_bordered();
        let date_cell = thin_bordered().set_num_format("yyyy-mm-dd");
        let datetime_cell = thin_bordered().set_num_format("yyyy-mm-dd hh:mm");

        let mut workbook = Workbook::new();
        let worksheet = workbook.add_worksheet();
        worksheet.set_name("Attendance")?;

        for (col, title) in HEADERS.iter().enumerate() {
            worksheet.write_string_with_format(0, col as u16, *title, &header)?;
        }

        for (i, row) in rows.iter().enumerate() {
            let r = i as u32 + 1;
            let title = if row.lecture.title.trim().is_empty() {
                "-"
            } else {
                row.lecture.title.as_str()
            };
            let status_cell = thin_bordered().set_background_color(status_fill(row.record.status));

            worksheet.write_datetime_with_format(r, 0, &row.lecture.date, &date_cell)?;
            worksheet.write_string_with_format(r, 1, row.lecture.lecture_type.label(), &cell)?;
            worksheet.write_string_with_format(r, 2, &row.batch.name, &cell)?;
            worksheet.write_string_with_format(r, 3, title, &cell)?;
            worksheet.write_string_with_format(r, 4, row.record.status.label(), &status_cell)?;
            worksheet.write_datetime_with_format(r, 5, &row.record.marked_at, &datetime_cell)?;
            worksheet.write_datetime_with_format(r, 6, &row.record.updated_at, &datetime_cell)?;
        }

        worksheet.set_freeze_panes(1, 0)?;
        set_column_widths(worksheet, &WIDTHS)?;

        let mut base = slugify(&format!("{}_{}", student.roll_number, student.full_name));
        if base.is_empty() {
            base = "student".to_string();
        }

        info!(roll_number = %student.roll_number, rows = rows.len(), "built student report");

        Report::xlsx(format!("{base}_attendance_report.xlsx"), &mut workbook)
    }

    /// Builds a workbook with one sheet per batch, laying out each active student's status for
    /// every morning and afternoon session between `start` and `end` (inclusive).
    ///
    /// Sessions without a lecture show `-`. A held session without a record counts as absent.
    pub fn lecture_matrix_report(
        &mut self,
        batches: &[Batch],
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Report> {
        const FIXED_HEADERS: [&str; 4] = ["Roll No", "Name", "Branch", "Attendance %"];
        const FIXED_WIDTHS: [f64; 4] = [10.0, 28.0, 14.0, 14.0];
        const SESSION_WIDTH: f64 = 12.0;

        let branch_names: HashMap<i32, String> = self
            .list_branches()?
            .into_iter()
            .map(|branch| (branch.id, branch.name))
            .collect();

        let header = header_format();
        let session_header = thin_bordered()
            .set_align(FormatAlign::Center)
            .set_align(FormatAlign::VerticalCenter)
            .set_background_color(Color::RGB(HEADER_FILL));
        let centered = thin_bordered().set_align(FormatAlign::Center);
        let left = thin_bordered().set_align(FormatAlign::Left);
        let percent = centered.clone().set_num_format("0.00%");
        let present = centered.clone().set_background_color(status_fill(Status::Present));
        let absent = centered.clone().set_background_color(status_fill(Status::Absent));

        let mut workbook = Workbook::new();

        for batch in batches {
            let worksheet = workbook.add_worksheet();
            let sheet_name: String = batch.name.chars().take(MAX_SHEET_NAME).collect();
            worksheet.set_name(sheet_name)?;

            let lectures = self.lectures_in_range(batch.id, start, end)?;
            if lectures.is_empty() {
                continue;
            }

            let mut by_date: BTreeMap<NaiveDate, HashMap<LectureType, i32>> = BTreeMap::new();
            for lecture in &lectures {
                by_date
                    .entry(lecture.date)
                    .or_default()
                    .insert(lecture.lecture_type, lecture.id);
            }

            let lookup: HashMap<(i32, i32), Status> = {
                use schema::attendance::dsl::*;

                let lecture_ids: Vec<i32> = lectures.iter().map(|lecture| lecture.id).collect();
                attendance
                    .filter(lecture_id.eq_any(&lecture_ids))
                    .select((student_id, lecture_id, status))
                    .load::<(i32, i32, Status)>(&mut self.db)?
                    .into_iter()
                    .map(|(student, lecture, marked)| ((student, lecture), marked))
                    .collect()
            };

            let students = self.active_students_in_batch(batch.id)?;

            // Two header rows: fixed headers span both, each date spans its two sessions.
            for (col, title) in FIXED_HEADERS.iter().enumerate() {
                let col = col as u16;
                worksheet.merge_range(0, col, 1, col, title, &header)?;
            }

            let mut col = FIXED_HEADERS.len() as u16;
            for date in by_date.keys() {
                let label = date.format("%d-%b-%Y").to_string();
                worksheet.merge_range(0, col, 0, col + 1, &label, &header)?;
                worksheet.write_string_with_format(1, col, "Morning", &session_header)?;
                worksheet.write_string_with_format(1, col + 1, "Afternoon", &session_header)?;
                col += 2;
            }
            let last_col = col - 1;

            worksheet.set_freeze_panes(2, 4)?;

            let mut row = 2u32;
            for student in &students {
                let branch = branch_names
                    .get(&student.branch_id)
                    .map(String::as_str)
                    .unwrap_or_default();

                worksheet.write_string_with_format(row, 0, &student.roll_number, &centered)?;
                worksheet.write_string_with_format(row, 1, &student.full_name, &left)?;
                worksheet.write_string_with_format(row, 2, branch, &left)?;

                let mut held = 0u32;
                let mut attended = 0u32;
                let mut col = FIXED_HEADERS.len() as u16;

                for sessions in by_date.values() {
                    for session in LectureType::ALL {
                        match sessions.get(session) {
                            Some(lecture) => {
                                let marked = lookup
                                    .get(&(student.id, *lecture))
                                    .copied()
                                    .unwrap_or(Status::Absent);
                                let format = match marked {
                                    Status::Present => &present,
                                    Status::Absent => &absent,
                                };

                                worksheet.write_string_with_format(row, col, marked.code(), format)?;

                                held += 1;
                                if marked == Status::Present {
                                    attended += 1;
                                }
                            }
                            None => {
                                worksheet.write_string_with_format(row, col, "-", &centered)?;
                            }
                        }
                        col += 1;
                    }
                }

                if held > 0 {
                    worksheet.write_number_with_format(
                        row,
                        3,
                        f64::from(attended) / f64::from(held),
                        &percent,
                    )?;
                } else {
                    worksheet.write_blank(row, 3, &percent)?;
                }

                row += 1;
            }

            set_column_widths(worksheet, &FIXED_WIDTHS)?;
            for c in FIXED_HEADERS.len() as u16..=last_col {
                worksheet.set_column_width(c, SESSION_WIDTH)?;
            }

            worksheet.autofilter(0, 0, row.saturating_sub(1).max(1), last_col)?;
        }

        let joined = batches
            .iter()
            .map(|batch| batch.name.as_str())
            .collect::<Vec<_>>()
            .join("_");
        let mut batch_part = slugify(&joined);
        if batch_part.is_empty() {
            batch_part = "batches".to_string();
        }
        let mut range_part = slugify(&format!("{start}_to_{end}"));
        if range_part.is_empty() {
            range_part = "range".to_string();
        }

        info!(batches = batches.len(), %start, %end, "built lecture matrix report");

        Report::xlsx(
            format!("{range_part}_{batch_part}_attendance_report.xlsx"),
            &mut workbook,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugify_matches_filename_expectations() {
        assert_eq!(slugify("23CE0001_Aarav Sharma"), "23ce0001_aarav-sharma");
        assert_eq!(slugify("2025-12-15_to_2025-12-20"), "2025-12-15_to_2025-12-20");
        assert_eq!(slugify("  Batch 1 -- Batch 2  "), "batch-1-batch-2");
        assert_eq!(slugify("Åsa Ørn!"), "asa-rn");
        assert_eq!(slugify("Renée ﬁnal"), "renee-final");
        assert_eq!(slugify("___"), "");
    }

    #[test]
    fn roll_numbers_follow_the_intake_pattern() {
        assert!(is_valid_roll_number("23CE0001"));
        assert!(is_valid_roll_number("25AD1234"));
        assert!(!is_valid_roll_number("22CE0001"));
        assert!(!is_valid_roll_number("23ce0001"));
        assert!(!is_valid_roll_number("23CE001"));
    }
}
