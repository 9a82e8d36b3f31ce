mod common;

use common::{admin, batch, date, lecture, manager, student};
use rust_xlsxwriter::Workbook;
use std::path::{Path, PathBuf};
use tpc_attendance::Error;
use tpc_attendance::import::{ATTENDANCE_FIXED_HEADERS, STUDENT_HEADERS, SYSTEM_USER_EMAIL};
use tpc_attendance::models::{LectureType, Status};

/// Writes a workbook with one sheet per `(name, rows)`, every cell as a string.
fn write_workbook(dir: &Path, sheets: &[(&str, Vec<Vec<&str>>)]) -> PathBuf {
    let mut workbook = Workbook::new();

    for (name, rows) in sheets {
        let worksheet = workbook.add_worksheet();
        worksheet.set_name(*name).unwrap();
        for (r, row) in rows.iter().enumerate() {
            for (c, value) in row.iter().enumerate() {
                if !value.is_empty() {
                    worksheet.write_string(r as u32, c as u16, *value).unwrap();
                }
            }
        }
    }

    let path = dir.join("upload.xlsx");
    workbook.save(&path).unwrap();
    path
}

fn roster_row<'a>(name: &'a str, roll: &'a str, email: &'a str, parent: &'a str) -> Vec<&'a str> {
    vec![name, roll, "IT", email, "9999999999", parent, "8888888888"]
}

#[test]
fn students_are_imported_per_batch_sheet() {
    let mut manager = manager();
    let admin = admin(&mut manager);
    batch(&mut manager, "Batch 1");
    batch(&mut manager, "Batch 2");

    let dir = tempfile::tempdir().unwrap();
    let path = write_workbook(
        dir.path(),
        &[
            (
                "Batch 1",
                vec![
                    STUDENT_HEADERS.to_vec(),
                    roster_row("Asha Rao", "23IT0001", "asha@example.com", "p.asha@example.com"),
                    vec![],
                    roster_row("Dev Shah", "23IT0002", "dev@example.com", "p.dev@example.com"),
                ],
            ),
            (
                "Batch 2",
                vec![
                    STUDENT_HEADERS.to_vec(),
                    roster_row("Isha Jain", "24IT0003", "isha@example.com", "p.isha@example.com"),
                ],
            ),
        ],
    );

    let dry = manager.import_students(Some(&admin), &path, true).unwrap();
    assert_eq!(dry.students, 3);
    assert!(dry.dry_run);
    assert_eq!(manager.num_active_students().unwrap(), 0);

    let import = manager.import_students(Some(&admin), &path, false).unwrap();
    assert_eq!(import.students, 3);
    assert_eq!(manager.num_active_students().unwrap(), 3);

    let isha = manager.find_by_roll_number("24IT0003").unwrap().unwrap();
    assert_eq!(manager.get_batch(isha.batch_id).unwrap().name, "Batch 2");
    assert_eq!(manager.get_branch(isha.branch_id).unwrap().name, "IT");
    assert_eq!(isha.parent_email, "p.isha@example.com");
}

#[test]
fn any_invalid_row_rolls_back_the_whole_import() {
    let mut manager = manager();
    batch(&mut manager, "Batch 1");

    let dir = tempfile::tempdir().unwrap();
    let path = write_workbook(
        dir.path(),
        &[
            (
                "Batch 1",
                vec![
                    STUDENT_HEADERS.to_vec(),
                    roster_row("Asha Rao", "23IT0001", "asha@example.com", "p.asha@example.com"),
                    roster_row("Bad Mail", "23IT0002", "not-an-email", "p.bad@example.com"),
                    roster_row("Again", "23IT0001", "again@example.com", "p.again@example.com"),
                    roster_row("Too Long", "23IT000001", "long@example.com", "p.long@example.com"),
                ],
            ),
            ("Batch 9", vec![STUDENT_HEADERS.to_vec()]),
            ("Batch 1 copy", vec![vec!["Name", "Roll"]]),
        ],
    );

    match manager.import_students(None, &path, false) {
        Err(Error::ImportFailed(errors)) => {
            assert_eq!(errors.len(), 5, "{errors:#?}");
            assert!(errors.contains(&"Batch 1 Row 3: Invalid email 'not-an-email'".to_string()));
            assert!(errors.contains(&"Batch 1 Row 4: Duplicate roll 23IT0001".to_string()));
            assert!(errors.iter().any(|e| e.starts_with("Batch 1 Row 5: Roll number 23IT000001")));
            assert!(errors.contains(&"Batch 9: Batch missing".to_string()));
            assert!(errors.iter().any(|e| e.starts_with("Batch 1 copy: Invalid headers")));
        }
        other => panic!("unexpected result {other:?}"),
    }

    assert_eq!(manager.num_active_students().unwrap(), 0);
    assert!(manager.list_branches().unwrap().is_empty());
}

#[test]
fn dry_run_reports_email_clashes_like_a_real_import() {
    let mut manager = manager();
    let batch = batch(&mut manager, "Batch 1");
    student(&mut manager, "23CE0001", &batch);

    let dir = tempfile::tempdir().unwrap();
    let path = write_workbook(
        dir.path(),
        &[(
            "Batch 1",
            vec![
                STUDENT_HEADERS.to_vec(),
                roster_row("New Face", "23CE0009", "23ce0001@example.com", "p.new@example.com"),
                roster_row("Twin One", "23CE0010", "twin@example.com", "p.one@example.com"),
                roster_row("Twin Two", "23CE0011", "twin@example.com", "p.two@example.com"),
            ],
        )],
    );

    for dry_run in [true, false] {
        match manager.import_students(None, &path, dry_run) {
            Err(Error::ImportFailed(errors)) => {
                assert_eq!(errors.len(), 2, "{errors:#?}");
                assert!(errors[0].starts_with("Batch 1 Row 2: a student with roll number 23CE0009"));
                assert!(errors[1].starts_with("Batch 1 Row 4: a student with roll number 23CE0011"));
            }
            other => panic!("unexpected result {other:?} (dry run: {dry_run})"),
        }
    }

    assert_eq!(manager.num_active_students().unwrap(), 1);
    assert_eq!(manager.list_branches().unwrap().len(), 1);
}

fn attendance_sheet() -> Vec<Vec<&'static str>> {
    let mut header = ATTENDANCE_FIXED_HEADERS.to_vec();
    header.extend(["03-03-2025", "", "04-Mar-2025", ""]);

    vec![
        header,
        vec!["", "", "", "", "", "", "", "Morning", "Afternoon", "Morning", "Afternoon"],
        vec!["1", "A", "23CE0001", "CE", "", "", "", "P", "A", "p", ""],
        vec!["2", "B", "23CE0002", "CE", "", "", "", "A", "Present", "Holiday", ""],
        vec!["3", "C", "23CE0099", "CE", "", "", "", "P", "", "", ""],
    ]
}

#[test]
fn attendance_import_creates_lectures_and_marks() {
    let mut manager = manager();
    let batch = batch(&mut manager, "Batch 1");
    student(&mut manager, "23CE0001", &batch);
    student(&mut manager, "23CE0002", &batch);

    let dir = tempfile::tempdir().unwrap();
    let path = write_workbook(
        dir.path(),
        &[("Batch 1", attendance_sheet()), ("Batch 9", attendance_sheet())],
    );

    let stats = manager.import_attendance(None, &path, false, false).unwrap();
    assert_eq!(stats.batches_processed, 1);
    assert_eq!(stats.batches_not_found, 1);
    assert_eq!(stats.lectures_created, 4);
    assert_eq!(stats.attendance_records, 5);
    assert_eq!(stats.students_not_found, 1);

    let system = manager.find_user_by_email(SYSTEM_USER_EMAIL).unwrap().unwrap();
    let monday_morning = manager
        .find_lecture(batch.id, date(2025, 3, 3), LectureType::Morning)
        .unwrap()
        .unwrap();
    assert_eq!(monday_morning.created_by, system.id);

    let rows = manager.lecture_attendance(&monday_morning).unwrap();
    let statuses: Vec<(&str, Status)> = rows
        .iter()
        .map(|(student, record)| (student.roll_number.as_str(), record.status))
        .collect();
    assert_eq!(
        statuses,
        [("23CE0001", Status::Present), ("23CE0002", Status::Absent)]
    );

    // Importing again overwrites instead of duplicating.
    let again = manager.import_attendance(None, &path, false, false).unwrap();
    assert_eq!(again.lectures_created, 0);
    assert_eq!(manager.lecture_attendance(&monday_morning).unwrap().len(), 2);
}

#[test]
fn attendance_dry_run_writes_nothing() {
    let mut manager = manager();
    let batch = batch(&mut manager, "Batch 1");
    student(&mut manager, "23CE0001", &batch);
    student(&mut manager, "23CE0002", &batch);

    let dir = tempfile::tempdir().unwrap();
    let path = write_workbook(dir.path(), &[("Batch 1", attendance_sheet())]);

    let stats = manager.import_attendance(None, &path, true, true).unwrap();
    assert_eq!(stats.lectures_created, 4);
    assert_eq!(stats.attendance_records, 5);

    assert!(manager.list_lectures().unwrap().is_empty());
    assert!(manager.find_user_by_email(SYSTEM_USER_EMAIL).unwrap().is_none());
}

#[test]
fn clearing_removes_earlier_lectures() {
    let mut manager = manager();
    let admin = admin(&mut manager);
    let batch = batch(&mut manager, "Batch 1");
    student(&mut manager, "23CE0001", &batch);
    let old = lecture(&mut manager, &admin, &batch, date(2025, 2, 3), LectureType::Morning);

    let dir = tempfile::tempdir().unwrap();
    let path = write_workbook(dir.path(), &[("Batch 1", attendance_sheet())]);

    manager.import_attendance(Some(&admin), &path, true, false).unwrap();

    assert!(matches!(manager.get_lecture(old.id), Err(Error::NotFound(_))));
    assert_eq!(manager.list_lectures().unwrap().len(), 4);
}

#[test]
fn blank_template_round_trips_through_the_importer() {
    let mut manager = manager();
    let batch = batch(&mut manager, "Batch 1");
    student(&mut manager, "23CE0001", &batch);

    // Monday to Sunday: five weekdays, two sessions each.
    let report = manager
        .attendance_import_template(&[batch], date(2025, 3, 3), date(2025, 3, 9))
        .unwrap();
    assert_eq!(report.filename, "attendance_template_2025-03-03_to_2025-03-09.xlsx");

    let dir = tempfile::tempdir().unwrap();
    let path = report.write_to(dir.path()).unwrap();

    let stats = manager.import_attendance(None, &path, false, false).unwrap();
    assert_eq!(stats.batches_processed, 1);
    assert_eq!(stats.lectures_created, 10);
    assert_eq!(stats.attendance_records, 0);
    assert_eq!(stats.students_not_found, 0);
}
