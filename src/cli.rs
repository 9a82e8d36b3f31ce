//! This module contains the command-line interface [`Cli`] parser for the `tpc` operator console.

use crate::models::{ActionType, LectureType, Role, Status};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// The command line configuration struct, where the command-line interface parser is automatically
/// derived by [`clap::Parser`].
#[derive(Parser, Debug)]
#[command(name = "tpc", about = "Training & Placement Cell attendance console")]
pub struct Cli {
    /// The different commands available for managing attendance.
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Apply pending database migrations.
    Migrate,

    /// Create an administrator account.
    CreateSuperuser {
        email: String,
        full_name: String,
        #[arg(long)]
        password: String,
    },

    /// Log in and remember the session for later commands.
    Login {
        email: String,
        #[arg(long)]
        password: String,
    },

    /// End the current session.
    Logout,

    /// Show the logged-in user.
    Whoami,

    /// Show the dashboard for the logged-in user's role.
    Dashboard,

    /// Create a staff account (admin only).
    CreateUser {
        email: String,
        full_name: String,
        #[arg(long)]
        password: String,
        #[arg(long, value_enum, default_value_t = Role::Volunteer)]
        role: Role,
    },

    /// List staff accounts (admin only).
    ListUsers,

    /// Add a training batch.
    AddBatch { name: String },

    ListBatches,

    /// Add an engineering branch.
    AddBranch { name: String },

    ListBranches,

    /// Schedule a lecture for a batch.
    AddLecture {
        batch: String,
        date: NaiveDate,
        #[arg(value_enum)]
        session: LectureType,
        title: String,
    },

    /// List lectures, optionally only those on one date.
    ListLectures {
        #[arg(long)]
        date: Option<NaiveDate>,
    },

    /// Create morning and afternoon lectures for every batch on the given dates.
    SeedLectures {
        #[arg(required = true)]
        dates: Vec<NaiveDate>,
        /// Restrict to these batches. Defaults to every batch.
        #[arg(long)]
        batch: Vec<String>,
    },

    /// Search the student list by roll number or name (admin only).
    ListStudents {
        #[arg(default_value = "")]
        query: String,
        #[arg(long, default_value_t = 1)]
        page: i64,
    },

    /// Show a student's attendance profile.
    StudentProfile { roll_number: String },

    /// Import students from a workbook with one sheet per batch.
    ImportStudents {
        file: PathBuf,
        #[arg(long)]
        dry_run: bool,
    },

    /// Mark a student present or absent for one of today's lectures.
    Mark {
        lecture_id: i32,
        roll_number: String,
        #[arg(value_enum)]
        status: Status,
    },

    /// Show the records of a lecture.
    LectureAttendance { lecture_id: i32 },

    /// Mark every unmarked active student absent for the day's lectures.
    Eod {
        /// Defaults to today.
        #[arg(long)]
        date: Option<NaiveDate>,
    },

    /// Import an attendance matrix workbook.
    ImportAttendance {
        file: PathBuf,
        /// Delete all lectures and attendance before importing.
        #[arg(long)]
        clear: bool,
        #[arg(long)]
        dry_run: bool,
    },

    /// Write a blank attendance workbook in the layout `import-attendance` reads.
    AttendanceTemplate {
        start: NaiveDate,
        end: NaiveDate,
        #[arg(long)]
        batch: Vec<String>,
    },

    /// Export one student's attendance history.
    StudentReport { roll_number: String },

    /// Export the session-by-session attendance matrix for a date range.
    LectureReport {
        start: NaiveDate,
        end: NaiveDate,
        #[arg(long)]
        batch: Vec<String>,
    },

    /// Show the day's lectures and whether their absentee notices went out.
    Notifications {
        #[arg(long)]
        date: Option<NaiveDate>,
    },

    /// Email the parents of absent students for the selected lectures.
    Notify {
        #[arg(required = true)]
        lecture_ids: Vec<i32>,
        #[arg(long)]
        date: Option<NaiveDate>,
    },

    /// Review the audit trail (admin only).
    AuditLog {
        #[arg(long)]
        query: Option<String>,
        #[arg(long, value_enum)]
        action: Option<ActionType>,
        /// Email of the acting user.
        #[arg(long)]
        user: Option<String>,
        #[arg(long)]
        start: Option<NaiveDate>,
        #[arg(long)]
        end: Option<NaiveDate>,
    },

    /// Create the standard batches, branches and sample students.
    Seed,
}

impl Command {
    /// Whether the command runs without a logged-in user.
    pub fn is_public(&self) -> bool {
        matches!(
            self,
            Command::Migrate | Command::CreateSuperuser { .. } | Command::Login { .. } | Command::Seed
        )
    }

    /// Whether the command is restricted to administrators.
    pub fn is_admin_only(&self) -> bool {
        matches!(
            self,
            Command::CreateUser { .. }
                | Command::ListUsers
                | Command::ListStudents { .. }
                | Command::ImportStudents { .. }
                | Command::ImportAttendance { .. }
                | Command::Eod { .. }
                | Command::AuditLog { .. }
        )
    }
}
