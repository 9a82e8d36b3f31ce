//! Pretty printing for the console, built on [`tabled`].

use crate::accounts::Dashboard;
use crate::attendance::EodSummary;
use crate::audit::AuditEntry;
use crate::import::AttendanceImportStats;
use crate::manager::{StudentPage, StudentProfile};
use crate::models::{AttendanceRecord, Batch, Branch, Lecture, Student, User};
use crate::notifications::{LectureDelivery, NotificationOverview};
use tabled::{Table, Tabled, settings::Style};

fn print_table<T: Tabled>(title: &str, rows: impl IntoIterator<Item = T>) {
    let mut table = Table::new(rows);
    table.with(Style::modern());

    println!("{title}:\n{table}");
}

#[derive(Tabled)]
struct LectureRow {
    id: i32,
    date: String,
    session: &'static str,
    batch: String,
    title: String,
}

impl LectureRow {
    fn new(lecture: &Lecture, batch: &Batch) -> Self {
        Self {
            id: lecture.id,
            date: lecture.date.to_string(),
            session: lecture.lecture_type.label(),
            batch: batch.name.clone(),
            title: lecture.title.clone(),
        }
    }
}

/// Pretty prints the landing dashboard for a user's role.
pub fn show_dashboard(dashboard: &Dashboard) {
    match dashboard {
        Dashboard::Admin(admin) => {
            println!("Admin dashboard");
            println!("  Active students:            {}", admin.active_students);
            println!("  Batches:                    {}", admin.batches);
            println!("  Lectures today:             {}", admin.lectures_today);
            println!("  Records marked today:       {}", admin.records_marked_today);
            println!(
                "  Lectures awaiting notices:  {}",
                admin.lectures_pending_notification
            );
        }
        Dashboard::Volunteer(volunteer) => {
            #[derive(Tabled)]
            struct ProgressRow {
                lecture: i32,
                batch: String,
                session: &'static str,
                present: i64,
                absent: i64,
                unmarked: i64,
            }

            if volunteer.lectures.is_empty() {
                println!("No lectures scheduled for {}.", volunteer.date);
                return;
            }

            print_table(
                &format!("Lectures on {}", volunteer.date),
                volunteer.lectures.iter().map(|progress| ProgressRow {
                    lecture: progress.lecture.id,
                    batch: progress.batch.name.clone(),
                    session: progress.lecture.lecture_type.label(),
                    present: progress.present,
                    absent: progress.absent,
                    unmarked: progress.unmarked,
                }),
            );
        }
    }
}

pub fn show_users(users: &[User]) {
    #[derive(Tabled)]
    struct UserRow {
        id: i32,
        email: String,
        name: String,
        role: &'static str,
        active: bool,
    }

    print_table(
        "Users",
        users.iter().map(|user| UserRow {
            id: user.id,
            email: user.email.clone(),
            name: user.full_name.clone(),
            role: user.role.label(),
            active: user.is_active,
        }),
    );
}

pub fn show_batches(batches: &[Batch]) {
    #[derive(Tabled)]
    struct BatchRow {
        id: i32,
        name: String,
    }

    print_table(
        "Batches",
        batches.iter().map(|batch| BatchRow {
            id: batch.id,
            name: batch.name.clone(),
        }),
    );
}

pub fn show_branches(branches: &[Branch]) {
    #[derive(Tabled)]
    struct BranchRow {
        id: i32,
        name: String,
    }

    print_table(
        "Branches",
        branches.iter().map(|branch| BranchRow {
            id: branch.id,
            name: branch.name.clone(),
        }),
    );
}

pub fn show_lectures(lectures: &[(Lecture, Batch)]) {
    print_table(
        "Lectures",
        lectures
            .iter()
            .map(|(lecture, batch)| LectureRow::new(lecture, batch)),
    );
}

/// Pretty prints one page of the student search.
pub fn show_student_page(page: &StudentPage) {
    #[derive(Tabled)]
    struct SimpleStudent {
        id: i32,
        roll_number: String,
        full_name: String,
        email: String,
        active: bool,
    }

    print_table(
        &format!(
            "Students (page {} of {}, {} total)",
            page.page, page.num_pages, page.total
        ),
        page.students.iter().map(|student| SimpleStudent {
            id: student.id,
            roll_number: student.roll_number.clone(),
            full_name: student.full_name.clone(),
            email: student.email.clone(),
            active: student.is_active,
        }),
    );
}

/// Prints all info about a student, including how many lectures they attended.
pub fn show_student_profile(profile: &StudentProfile) {
    let student = &profile.student;

    println!("{} ({})", student.full_name, student.roll_number);
    println!("  Batch:          {}", profile.batch.name);
    println!("  Branch:         {}", profile.branch.name);
    println!("  Email:          {}", student.email);
    println!("  Contact:        {}", student.contact_number);
    println!(
        "  Parent:         {} / {}",
        student.parent_email, student.parent_contact_number
    );
    println!(
        "  Attendance:     {}% ({} of {} lectures)",
        profile.attendance_percent, profile.attended_count, profile.total_lectures
    );
    println!(
        "  Last attended:  {}",
        profile.last_attended.as_deref().unwrap_or("never")
    );

    if !profile.all_attended_lectures.is_empty() {
        print_table(
            "Attended lectures",
            profile
                .all_attended_lectures
                .iter()
                .map(|lecture| LectureRow::new(lecture, &profile.batch)),
        );
    }
}

pub fn show_lecture_attendance(lecture: &Lecture, rows: &[(Student, AttendanceRecord)]) {
    #[derive(Tabled)]
    struct MarkRow {
        roll_number: String,
        full_name: String,
        status: &'static str,
        updated: String,
    }

    print_table(
        &format!(
            "Attendance for '{}' on {} ({})",
            lecture.title,
            lecture.date,
            lecture.lecture_type.label()
        ),
        rows.iter().map(|(student, record)| MarkRow {
            roll_number: student.roll_number.clone(),
            full_name: student.full_name.clone(),
            status: record.status.label(),
            updated: record.updated_at.format("%Y-%m-%d %H:%M").to_string(),
        }),
    );
}

pub fn show_audit_log(entries: &[AuditEntry]) {
    #[derive(Tabled)]
    struct AuditRow {
        time: String,
        action: &'static str,
        actor: String,
        target: String,
        description: String,
    }

    print_table(
        "Audit log",
        entries.iter().map(|entry| AuditRow {
            time: entry.log.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
            action: entry.log.action_type.code(),
            actor: entry.actor_email.clone().unwrap_or_else(|| "system".to_string()),
            target: match (&entry.log.target_type, entry.log.target_id) {
                (Some(kind), Some(id)) => format!("{kind} #{id}"),
                _ => String::new(),
            },
            description: entry.log.description.clone(),
        }),
    );
}

pub fn show_notification_overview(overview: &NotificationOverview) {
    #[derive(Tabled)]
    struct NotificationRow {
        lecture: i32,
        batch: String,
        session: &'static str,
        sent: bool,
    }

    if overview.lectures.is_empty() {
        println!("No lectures on {}.", overview.date);
        return;
    }

    print_table(
        &format!("Notifications for {}", overview.date),
        overview.lectures.iter().map(|status| NotificationRow {
            lecture: status.lecture.id,
            batch: status.batch.name.clone(),
            session: status.lecture.lecture_type.label(),
            sent: status.notification_sent,
        }),
    );
}

pub fn show_deliveries(deliveries: &[LectureDelivery]) {
    #[derive(Tabled)]
    struct DeliveryRow {
        lecture: i32,
        sent: usize,
        failed: usize,
        no_parent_email: usize,
        skipped: bool,
    }

    print_table(
        "Absentee notices",
        deliveries.iter().map(|delivery| DeliveryRow {
            lecture: delivery.lecture_id,
            sent: delivery.sent,
            failed: delivery.failed,
            no_parent_email: delivery.no_parent_email,
            skipped: delivery.already_notified,
        }),
    );
}

pub fn show_eod_summary(summary: &EodSummary) {
    if summary.lectures.is_empty() {
        println!("No lectures on {}, nothing to mark.", summary.date);
        return;
    }

    for lecture in &summary.lectures {
        println!(
            "Marked {} absent for lecture {} on {}",
            lecture.marked_absent, lecture.lecture_id, summary.date
        );
    }
}

pub fn show_import_stats(stats: &AttendanceImportStats, dry_run: bool) {
    let rule = "=".repeat(60);

    println!("{rule}");
    println!("IMPORT SUMMARY");
    println!("{rule}");
    println!("Batches processed:        {}", stats.batches_processed);
    println!("Batches not found:        {}", stats.batches_not_found);
    println!("Lectures created:         {}", stats.lectures_created);
    println!("Attendance records:       {}", stats.attendance_records);
    println!("Students not found:       {}", stats.students_not_found);
    println!("{rule}");

    if dry_run {
        println!("DRY RUN: no changes were made to the database.");
    }
}
