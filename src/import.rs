//! Bulk loading from Excel workbooks: the student roster, attendance matrices kept by hand,
//! and the blank template those matrices are filled into.

use crate::error::{Error, Result};
use crate::manager::AttendanceManager;
use crate::models::{ActionType, Batch, Lecture, LectureType, NewStudent, Role, Status, User};
use crate::reports::Report;
use crate::schema;
use calamine::{Data, DataType, Range, Reader, Xlsx, open_workbook};
use chrono::{Datelike, NaiveDate, Weekday};
use diesel::prelude::*;
use rust_xlsxwriter::{Color, Format, FormatAlign, Workbook};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tracing::{info, warn};
use uuid::Uuid;

/// The account that owns lectures created by an attendance import.
pub const SYSTEM_USER_EMAIL: &str = "admin@tpc.com";

/// Columns every roster sheet must carry in its first row.
pub const STUDENT_HEADERS: [&str; 7] = [
    "Full Name",
    "Roll No.",
    "Branch",
    "Email",
    "Contact",
    "Parent Email",
    "Parent Contact",
];

/// Columns A-G of an attendance sheet; session columns start after these.
pub const ATTENDANCE_FIXED_HEADERS: [&str; 7] = [
    "Sr No.",
    "Full Name",
    "Roll No.",
    "Branch",
    "Present",
    "Absent",
    "Attendance",
];

const ROLL_COLUMN: u32 = 2;
const MAX_ROLL_NUMBER_LEN: usize = 8;

/// Date layouts accepted in attendance sheet headers, tried in order.
const DATE_FORMATS: [&str; 6] = [
    "%d-%m-%Y",
    "%d/%m/%Y",
    "%d-%b-%Y",
    "%d %b %Y",
    "%Y-%m-%d",
    "%m-%d-%Y",
];

/// Normalises a header cell: embedded newlines dropped, non-breaking spaces made plain, and
/// surrounding whitespace trimmed.
pub fn normalize_header(header: &str) -> String {
    header
        .replace('\n', "")
        .replace('\u{a0}', " ")
        .trim()
        .to_string()
}

/// Parses a header date written as text in any of the accepted layouts.
pub fn parse_date_text(text: &str) -> Option<NaiveDate> {
    let text = text.trim();

    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(text, format).ok())
}

fn parse_date_cell(cell: &Data) -> Option<NaiveDate> {
    match cell {
        Data::String(text) => parse_date_text(text),
        Data::DateTime(_) | Data::DateTimeIso(_) => cell.as_date(),
        _ => None,
    }
}

/// The trimmed text of a cell, or an empty string for blank and missing cells.
fn cell_text(range: &Range<Data>, row: u32, col: u32) -> String {
    match range.get_value((row, col)) {
        None | Some(Data::Empty) => String::new(),
        Some(value) => value.to_string().trim().to_string(),
    }
}

fn is_email(candidate: &str) -> bool {
    candidate.parse::<lettre::Address>().is_ok()
}

fn read_sheets(path: &Path) -> Result<Vec<(String, Range<Data>)>> {
    let mut workbook: Xlsx<_> = open_workbook(path)?;

    workbook
        .sheet_names()
        .into_iter()
        .map(|name| {
            let range = workbook.worksheet_range(&name)?;
            Ok((name, range))
        })
        .collect()
}

/// The outcome of a successful roster import.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StudentImport {
    /// Rows that passed validation (and were inserted, unless this was a dry run).
    pub students: usize,
    pub dry_run: bool,
}

/// Counters reported by an attendance import.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AttendanceImportStats {
    pub batches_processed: usize,
    pub batches_not_found: usize,
    pub lectures_created: usize,
    pub attendance_records: usize,
    pub students_not_found: usize,
}

/// A session column found in an attendance sheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SessionColumn {
    date: NaiveDate,
    session: LectureType,
    col: u32,
}

/// Finds the session columns of an attendance sheet. Row 1 holds dates (a blank cell repeats
/// the previous date) and row 2 the session. Holiday columns and unrecognised sessions are
/// skipped.
fn session_columns(range: &Range<Data>) -> Vec<SessionColumn> {
    let Some((_, last_col)) = range.end() else {
        return Vec::new();
    };

    let mut columns = Vec::new();
    let mut last_date = None;

    for col in ATTENDANCE_FIXED_HEADERS.len() as u32..=last_col {
        let date_text = cell_text(range, 0, col);
        let session_text = cell_text(range, 1, col).to_lowercase();

        let date = if date_text.is_empty() {
            last_date
        } else {
            let parsed = range.get_value((0, col)).and_then(parse_date_cell);
            last_date = parsed;
            parsed
        };

        let Some(date) = date else {
            continue;
        };
        if session_text.is_empty()
            || date_text.to_lowercase().contains("holiday")
            || session_text.contains("holiday")
        {
            continue;
        }

        let session = if session_text.contains("morning") {
            LectureType::Morning
        } else if session_text.contains("afternoon") {
            LectureType::Afternoon
        } else {
            continue;
        };

        columns.push(SessionColumn { date, session, col });
    }

    columns
}

/// Reads a mark from an attendance cell. Anything other than P/Present or A/Absent (holidays,
/// blanks, notes) is no mark.
fn parse_mark(text: &str) -> Option<Status> {
    match text.trim().to_uppercase().as_str() {
        "P" | "PRESENT" => Some(Status::Present),
        "A" | "ABSENT" => Some(Status::Absent),
        _ => None,
    }
}

impl AttendanceManager {
    /// Imports students from a workbook with one sheet per batch.
    ///
    /// Every row is validated before anything is kept: if any sheet or row is invalid the whole
    /// import is rolled back and [`Error::ImportFailed`] lists every problem found. A dry run
    /// performs the same inserts and then rolls them back.
    pub fn import_students(
        &mut self,
        actor: Option<&User>,
        path: &Path,
        dry_run: bool,
    ) -> Result<StudentImport> {
        let sheets = read_sheets(path)?;

        let students = self.transaction(|manager| {
            let mut errors = Vec::new();
            let mut seen_rolls = HashSet::new();
            let mut validated = 0;

            for (sheet_name, range) in &sheets {
                let Some((last_row, last_col)) = range.end() else {
                    errors.push(format!("{sheet_name}: Sheet is empty"));
                    continue;
                };

                let headers: Vec<String> = (0..=last_col)
                    .map(|col| normalize_header(&cell_text(range, 0, col)))
                    .collect();

                if !STUDENT_HEADERS.iter().all(|h| headers.iter().any(|x| x == *h)) {
                    errors.push(format!("{sheet_name}: Invalid headers -> {headers:?}"));
                    continue;
                }

                let index: HashMap<&str, u32> = STUDENT_HEADERS
                    .iter()
                    .filter_map(|&h| {
                        headers
                            .iter()
                            .position(|x| x == h)
                            .map(|col| (h, col as u32))
                    })
                    .collect();
                let field = |row: u32, header: &str| cell_text(range, row, index[header]);

                let Some(batch) = manager.find_batch(sheet_name.trim())? else {
                    errors.push(format!("{sheet_name}: Batch missing"));
                    continue;
                };

                for row in 1..=last_row {
                    let row_no = row + 1;

                    if (0..=last_col).all(|col| cell_text(range, row, col).is_empty()) {
                        continue;
                    }

                    let roll = field(row, "Roll No.");
                    if roll.is_empty() {
                        errors.push(format!("{sheet_name} Row {row_no}: Missing roll number"));
                        continue;
                    }
                    if roll.chars().count() > MAX_ROLL_NUMBER_LEN {
                        errors.push(format!(
                            "{sheet_name} Row {row_no}: Roll number {roll} is longer than {MAX_ROLL_NUMBER_LEN} characters"
                        ));
                        continue;
                    }
                    if !seen_rolls.insert(roll.clone()) || manager.find_by_roll_number(&roll)?.is_some() {
                        errors.push(format!("{sheet_name} Row {row_no}: Duplicate roll {roll}"));
                        continue;
                    }

                    let full_name = field(row, "Full Name");
                    let email = field(row, "Email");
                    let parent_email = field(row, "Parent Email");

                    if full_name.is_empty() {
                        errors.push(format!("{sheet_name} Row {row_no}: Missing full name"));
                        continue;
                    }
                    if !is_email(&email) {
                        errors.push(format!("{sheet_name} Row {row_no}: Invalid email '{email}'"));
                        continue;
                    }
                    if !is_email(&parent_email) {
                        errors.push(format!(
                            "{sheet_name} Row {row_no}: Invalid parent email '{parent_email}'"
                        ));
                        continue;
                    }

                    validated += 1;

                    let branch = manager.get_or_create_branch(&field(row, "Branch"))?;
                    let inserted = manager.insert_student(&NewStudent {
                        full_name,
                        roll_number: roll,
                        batch_id: batch.id,
                        branch_id: branch.id,
                        email,
                        contact_number: field(row, "Contact"),
                        parent_contact_number: field(row, "Parent Contact"),
                        parent_email,
                        is_active: true,
                    });

                    // Unique clashes (e.g. a reused email) are reported, not fatal.
                    if let Err(Error::Validation(reason)) = &inserted {
                        errors.push(format!("{sheet_name} Row {row_no}: {reason}"));
                        continue;
                    }
                    inserted?;
                }
            }

            if !errors.is_empty() {
                return Err(Error::ImportFailed(errors));
            }

            // A dry run inserts like a real one so unique clashes surface, then rolls back.
            if dry_run {
                return Err(Error::DryRunRollback(validated));
            }

            manager.record_audit(
                actor,
                ActionType::Create,
                &format!("Imported {validated} students from {}", path.display()),
            )?;

            Ok(validated)
        });

        let students = match students {
            Ok(students) | Err(Error::DryRunRollback(students)) => students,
            Err(err) => return Err(err),
        };

        info!(students, dry_run, "student import finished");

        Ok(StudentImport { students, dry_run })
    }

    /// Returns the system import account, creating it if it does not exist yet.
    pub fn system_user(&mut self) -> Result<User> {
        if let Some(user) = self.find_user_by_email(SYSTEM_USER_EMAIL)? {
            return Ok(user);
        }

        // Nobody logs in as the system user, so its password is random and never shown.
        let password = Uuid::new_v4().to_string();
        self.create_user(SYSTEM_USER_EMAIL, "System Import", &password, Role::Admin)
    }

    /// Imports an attendance matrix workbook with one sheet per batch.
    ///
    /// Lectures named in the sheet headers are created as needed and marks are upserted.
    /// Unknown batches and students are counted and skipped. With `clear`, all attendance and
    /// lectures are deleted first. A dry run reports what would happen without writing.
    pub fn import_attendance(
        &mut self,
        actor: Option<&User>,
        path: &Path,
        clear: bool,
        dry_run: bool,
    ) -> Result<AttendanceImportStats> {
        let sheets = read_sheets(path)?;

        let stats = self.transaction(|manager| {
            let mut stats = AttendanceImportStats::default();

            if clear && !dry_run {
                let records = diesel::delete(schema::attendance::table).execute(&mut manager.db)?;
                let lectures = diesel::delete(schema::lectures::table).execute(&mut manager.db)?;

                warn!(records, lectures, "cleared all attendance and lecture records");
                manager.record_audit(
                    actor,
                    ActionType::Delete,
                    &format!("Cleared {records} attendance records and {lectures} lectures before import"),
                )?;
            }

            let system_user = if dry_run {
                None
            } else {
                Some(manager.system_user()?)
            };

            for (sheet_name, range) in &sheets {
                let batch_name = sheet_name.trim();
                let Some(batch) = manager.find_batch(batch_name)? else {
                    warn!(batch = batch_name, "batch not found, skipping sheet");
                    stats.batches_not_found += 1;
                    continue;
                };
                stats.batches_processed += 1;

                let columns = session_columns(range);
                info!(batch = batch_name, sessions = columns.len(), "found session columns");

                let mut lectures: HashMap<(NaiveDate, LectureType), Option<Lecture>> = HashMap::new();
                for column in &columns {
                    let key = (column.date, column.session);
                    if lectures.contains_key(&key) {
                        continue;
                    }

                    let lecture = match &system_user {
                        Some(owner) => {
                            let title = format!(
                                "{batch_name} - {} - {}",
                                column.session.code(),
                                column.date.format("%d-%b-%Y")
                            );
                            let (lecture, created) = manager.get_or_create_lecture(
                                owner,
                                &batch,
                                column.date,
                                column.session,
                                &title,
                            )?;
                            if created {
                                stats.lectures_created += 1;
                            }
                            Some(lecture)
                        }
                        None => {
                            let existing = manager.find_lecture(batch.id, column.date, column.session)?;
                            if existing.is_none() {
                                stats.lectures_created += 1;
                            }
                            existing
                        }
                    };

                    lectures.insert(key, lecture);
                }

                let (records, missing) = manager.import_sheet_marks(
                    &batch,
                    range,
                    &columns,
                    &lectures,
                    system_user.as_ref(),
                )?;
                stats.attendance_records += records;
                stats.students_not_found += missing;
            }

            if !dry_run {
                manager.record_audit(
                    actor,
                    ActionType::Attendance,
                    &format!(
                        "Imported {} attendance records from {}",
                        stats.attendance_records,
                        path.display()
                    ),
                )?;
            }

            Ok(stats)
        })?;

        info!(?stats, dry_run, "attendance import finished");

        Ok(stats)
    }

    /// Applies the marks of one sheet. Returns how many records were (or would be) written and
    /// how many rows named a student outside the batch.
    ///
    /// Without a `system_user` nothing is written (dry run).
    fn import_sheet_marks(
        &mut self,
        batch: &Batch,
        range: &Range<Data>,
        columns: &[SessionColumn],
        lectures: &HashMap<(NaiveDate, LectureType), Option<Lecture>>,
        system_user: Option<&User>,
    ) -> Result<(usize, usize)> {
        let Some((last_row, _)) = range.end() else {
            return Ok((0, 0));
        };

        let mut records = 0;
        let mut students_not_found = 0;

        for row in 2..=last_row {
            let roll = cell_text(range, row, ROLL_COLUMN);
            if roll.is_empty() {
                continue;
            }

            let student = match self.find_by_roll_number(&roll)? {
                Some(student) if student.batch_id == batch.id => student,
                _ => {
                    warn!(roll_number = %roll, batch = %batch.name, "student not found in batch");
                    students_not_found += 1;
                    continue;
                }
            };

            for column in columns {
                let Some(mark) = parse_mark(&cell_text(range, row, column.col)) else {
                    continue;
                };

                match (system_user, lectures.get(&(column.date, column.session))) {
                    (Some(owner), Some(Some(lecture))) => {
                        self.upsert_attendance(lecture, &student, mark, Some(owner.id))?;
                        records += 1;
                    }
                    (None, Some(_)) => records += 1,
                    _ => warn!(date = %column.date, session = %column.session, "no lecture for column"),
                }
            }
        }

        Ok((records, students_not_found))
    }

    /// Builds a blank attendance sheet per batch in the layout [`Self::import_attendance`]
    /// reads: the batch's active students down the side and a morning and afternoon column for
    /// every weekday from `start` to `end`.
    pub fn attendance_import_template(
        &mut self,
        batches: &[Batch],
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Report> {
        let header = Format::new()
            .set_bold()
            .set_font_color(Color::White)
            .set_background_color(Color::RGB(0x366092))
            .set_align(FormatAlign::Center)
            .set_align(FormatAlign::VerticalCenter);

        let dates: Vec<NaiveDate> = start
            .iter_days()
            .take_while(|date| *date <= end)
            .filter(|date| !matches!(date.weekday(), Weekday::Sat | Weekday::Sun))
            .collect();

        let branch_names: HashMap<i32, String> = self
            .list_branches()?
            .into_iter()
            .map(|branch| (branch.id, branch.name))
            .collect();

        let mut workbook = Workbook::new();

        for batch in batches {
            let worksheet = workbook.add_worksheet();
            worksheet.set_name(batch.name.chars().take(31).collect::<String>())?;

            for (col, title) in ATTENDANCE_FIXED_HEADERS.iter().enumerate() {
                worksheet.write_string_with_format(0, col as u16, *title, &header)?;
            }

            let mut col = ATTENDANCE_FIXED_HEADERS.len() as u16;
            for date in &dates {
                worksheet.write_string_with_format(0, col, date.format("%d-%m-%Y").to_string(), &header)?;
                worksheet.write_string_with_format(1, col, LectureType::Morning.label(), &header)?;
                worksheet.write_string_with_format(1, col + 1, LectureType::Afternoon.label(), &header)?;
                col += 2;
            }

            for (i, student) in self.active_students_in_batch(batch.id)?.iter().enumerate() {
                let row = i as u32 + 2;
                let branch = branch_names
                    .get(&student.branch_id)
                    .map(String::as_str)
                    .unwrap_or_default();

                worksheet.write_number(row, 0, (i + 1) as f64)?;
                worksheet.write_string(row, 1, &student.full_name)?;
                worksheet.write_string(row, 2, &student.roll_number)?;
                worksheet.write_string(row, 3, branch)?;
            }

            for (col, width) in [8.0, 18.0, 12.0, 12.0, 10.0, 10.0, 12.0].into_iter().enumerate() {
                worksheet.set_column_width(col as u16, width)?;
            }
        }

        Report::xlsx(
            format!("attendance_template_{start}_to_{end}.xlsx"),
            &mut workbook,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headers_are_normalised() {
        assert_eq!(normalize_header(" Roll\nNo. "), "RollNo.");
        assert_eq!(normalize_header("Parent\u{a0}Email"), "Parent Email");
    }

    #[test]
    fn header_dates_accept_every_layout() {
        let expected = NaiveDate::from_ymd_opt(2025, 12, 15).unwrap();
        for text in [
            "15-12-2025",
            "15/12/2025",
            "15-Dec-2025",
            "15 Dec 2025",
            "2025-12-15",
            "12-15-2025",
        ] {
            assert_eq!(parse_date_text(text), Some(expected), "{text}");
        }
        assert_eq!(parse_date_text("Holiday"), None);
    }

    #[test]
    fn day_first_wins_when_ambiguous() {
        assert_eq!(
            parse_date_text("03-04-2026"),
            NaiveDate::from_ymd_opt(2026, 4, 3)
        );
    }

    #[test]
    fn marks_are_case_insensitive() {
        assert_eq!(parse_mark(" p "), Some(Status::Present));
        assert_eq!(parse_mark("Absent"), Some(Status::Absent));
        assert_eq!(parse_mark("HOLIDAY"), None);
        assert_eq!(parse_mark(""), None);
    }

    #[test]
    fn session_columns_carry_dates_forward_and_skip_holidays() {
        let mut range = Range::new((0, 0), (1, 12));
        range.set_value((0, 7), Data::String("15-12-2025".into()));
        range.set_value((1, 7), Data::String("Morning Session".into()));
        range.set_value((1, 8), Data::String("Afternoon Session".into()));
        range.set_value((0, 9), Data::String("Holiday".into()));
        range.set_value((1, 9), Data::String("Morning Session".into()));
        range.set_value((0, 11), Data::String("16-12-2025".into()));
        range.set_value((1, 11), Data::String("Holiday".into()));
        range.set_value((1, 12), Data::String("Afternoon Session".into()));

        let first = NaiveDate::from_ymd_opt(2025, 12, 15).unwrap();
        let second = NaiveDate::from_ymd_opt(2025, 12, 16).unwrap();

        assert_eq!(
            session_columns(&range),
            vec![
                SessionColumn { date: first, session: LectureType::Morning, col: 7 },
                SessionColumn { date: first, session: LectureType::Afternoon, col: 8 },
                SessionColumn { date: second, session: LectureType::Afternoon, col: 12 },
            ]
        );
    }
}
