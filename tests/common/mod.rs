#![allow(dead_code)]

use chrono::NaiveDate;
use tpc_attendance::AttendanceManager;
use tpc_attendance::models::{Batch, Branch, Lecture, LectureType, NewStudent, Role, Student, User};

pub const PASSWORD: &str = "correct horse battery staple";

pub fn manager() -> AttendanceManager {
    AttendanceManager::connect(":memory:").expect("in-memory database")
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

pub fn admin(manager: &mut AttendanceManager) -> User {
    manager
        .create_superuser("admin@example.com", "Admin", PASSWORD)
        .expect("admin")
}

pub fn volunteer(manager: &mut AttendanceManager) -> User {
    manager
        .create_user("volunteer@example.com", "Volunteer", PASSWORD, Role::Volunteer)
        .expect("volunteer")
}

pub fn batch(manager: &mut AttendanceManager, name: &str) -> Batch {
    manager.get_or_create_batch(name).expect("batch").0
}

pub fn branch(manager: &mut AttendanceManager, name: &str) -> Branch {
    manager.get_or_create_branch(name).expect("branch")
}

pub fn student(manager: &mut AttendanceManager, roll: &str, batch: &Batch) -> Student {
    let branch = branch(manager, "CE");
    let lower = roll.to_lowercase();

    manager
        .insert_student(&NewStudent {
            full_name: format!("Student {roll}"),
            roll_number: roll.to_string(),
            batch_id: batch.id,
            branch_id: branch.id,
            email: format!("{lower}@example.com"),
            contact_number: "9999999999".to_string(),
            parent_contact_number: "8888888888".to_string(),
            parent_email: format!("parent.{lower}@example.com"),
            is_active: true,
        })
        .expect("student")
}

pub fn lecture(
    manager: &mut AttendanceManager,
    actor: &User,
    batch: &Batch,
    on: NaiveDate,
    session: LectureType,
) -> Lecture {
    manager
        .create_lecture(actor, batch, on, &format!("{} - {}", session.label(), batch.name), session)
        .expect("lecture")
}
