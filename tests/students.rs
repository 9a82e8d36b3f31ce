mod common;

use common::{admin, batch, date, lecture, manager, student};
use tpc_attendance::manager::{STUDENTS_PER_PAGE, attendance_percent};
use tpc_attendance::models::{LectureType, Status};

#[test]
fn search_matches_roll_or_name_case_insensitively() {
    let mut manager = manager();
    let batch = batch(&mut manager, "Batch 1");
    student(&mut manager, "23CE0001", &batch);
    student(&mut manager, "23IT0002", &batch);
    student(&mut manager, "24AD0003", &batch);

    let page = manager.search_students("23", 1).unwrap();
    assert_eq!(page.total, 2);
    assert_eq!(page.students[0].roll_number, "23CE0001");

    let page = manager.search_students("student 24ad", 1).unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.students[0].roll_number, "24AD0003");

    // Wildcards in the query are literal.
    assert_eq!(manager.search_students("%", 1).unwrap().total, 0);
    assert_eq!(manager.search_students("", 1).unwrap().total, 3);
}

#[test]
fn pages_are_clamped() {
    let mut manager = manager();
    let batch = batch(&mut manager, "Batch 1");
    for n in 0..30 {
        student(&mut manager, &format!("23CE{n:04}"), &batch);
    }

    let first = manager.search_students("", 0).unwrap();
    assert_eq!(first.page, 1);
    assert_eq!(first.num_pages, 2);
    assert_eq!(first.students.len(), STUDENTS_PER_PAGE as usize);

    let last = manager.search_students("", 99).unwrap();
    assert_eq!(last.page, 2);
    assert_eq!(last.students.len(), 5);
    assert_eq!(last.students[0].roll_number, "23CE0025");

    let empty = manager.search_students("nobody", 3).unwrap();
    assert_eq!(empty.page, 1);
    assert_eq!(empty.num_pages, 1);
    assert!(empty.students.is_empty());
}

#[test]
fn profile_counts_lectures_held_so_far() {
    let mut manager = manager();
    let admin = admin(&mut manager);
    let batch = batch(&mut manager, "Batch 1");
    let student = student(&mut manager, "23CE0001", &batch);

    let monday = date(2025, 3, 3);
    let tuesday = date(2025, 3, 4);
    let friday = date(2025, 3, 7);

    let first = lecture(&mut manager, &admin, &batch, monday, LectureType::Morning);
    lecture(&mut manager, &admin, &batch, monday, LectureType::Afternoon);
    let third = lecture(&mut manager, &admin, &batch, tuesday, LectureType::Morning);
    // Scheduled after `today`, so it does not count yet.
    lecture(&mut manager, &admin, &batch, friday, LectureType::Morning);

    manager
        .mark_attendance(&admin, first.id, "23CE0001", Status::Present, monday)
        .unwrap();
    manager
        .mark_attendance(&admin, third.id, "23CE0001", Status::Present, tuesday)
        .unwrap();

    let profile = manager.student_profile(student.id, tuesday).unwrap();
    assert_eq!(profile.total_lectures, 3);
    assert_eq!(profile.attended_count, 2);
    assert_eq!(profile.attendance_percent, 66.67);
    assert_eq!(profile.last_attended.as_deref(), Some("2025-03-04 (Morning Session)"));
    assert_eq!(profile.recent_lectures.first().map(|l| l.id), Some(third.id));
    assert_eq!(profile.all_attended_lectures.len(), 2);
    assert_eq!(profile.batch.name, "Batch 1");
    assert_eq!(profile.branch.name, "CE");
}

#[test]
fn profile_without_lectures_is_zero_percent() {
    let mut manager = manager();
    let batch = batch(&mut manager, "Batch 1");
    let student = student(&mut manager, "23CE0001", &batch);

    let profile = manager.student_profile(student.id, date(2025, 3, 3)).unwrap();
    assert_eq!(profile.total_lectures, 0);
    assert_eq!(profile.attendance_percent, 0.0);
    assert!(profile.last_attended.is_none());
}

#[test]
fn percentages_round_to_two_places() {
    assert_eq!(attendance_percent(1, 3), 33.33);
    assert_eq!(attendance_percent(3, 3), 100.0);
    assert_eq!(attendance_percent(0, 0), 0.0);
}

#[test]
fn seed_lectures_skips_existing() {
    let mut manager = manager();
    let admin = admin(&mut manager);
    let batches = vec![batch(&mut manager, "Batch 1"), batch(&mut manager, "Batch 2")];
    let dates = [date(2025, 3, 3), date(2025, 3, 4)];

    let counts = manager.seed_lectures(&admin, &dates, &batches).unwrap();
    assert_eq!(counts.created, 8);
    assert_eq!(counts.skipped, 0);

    let counts = manager.seed_lectures(&admin, &dates, &batches).unwrap();
    assert_eq!(counts.created, 0);
    assert_eq!(counts.skipped, 8);

    let on_monday = manager.lectures_on(date(2025, 3, 3)).unwrap();
    assert_eq!(on_monday.len(), 4);
    assert_eq!(on_monday[0].0.title, "Morning Session - Batch 1");
}

#[test]
fn seeding_core_data_is_repeatable() {
    let mut manager = manager();

    let first = manager.seed_core().unwrap();
    assert_eq!(first.batches, 4);
    assert_eq!(first.students, 3);

    let second = manager.seed_core().unwrap();
    assert_eq!(second.batches, 0);
    assert_eq!(second.students, 0);

    assert_eq!(manager.num_active_students().unwrap(), 3);
    assert!(manager.find_by_roll_number("23CE0001").unwrap().is_some());
}
