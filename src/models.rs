//! Row types for every table in [`crate::schema`], plus the short-code enumerations stored in
//! text columns.

use crate::error::UnknownCode;
use crate::schema::{
    attendance, audit_logs, batches, branches, eod_runs, lectures, notification_logs, sessions,
    students, users,
};
use chrono::{NaiveDate, NaiveDateTime};
use clap::ValueEnum;
use diesel::backend::Backend;
use diesel::deserialize::{self, FromSql, FromSqlRow};
use diesel::expression::AsExpression;
use diesel::prelude::*;
use diesel::serialize::{self, IsNull, Output, ToSql};
use diesel::sql_types::Text;
use diesel::sqlite::Sqlite;
use std::fmt;
use std::str::FromStr;

/// Declares an enumeration persisted as a short text code (`"P"`, `"MS"`, ...), with a
/// human-readable label for display.
macro_rules! coded_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident ($kind:literal) {
            $($(#[$vmeta:meta])* $variant:ident => ($code:literal, $label:literal)),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, AsExpression, FromSqlRow, ValueEnum,
        )]
        #[diesel(sql_type = Text)]
        pub enum $name {
            $($(#[$vmeta])* $variant),+
        }

        impl $name {
            /// Every variant, in declaration order.
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// The code stored in the database.
            pub fn code(self) -> &'static str {
                match self {
                    $($name::$variant => $code),+
                }
            }

            pub fn label(self) -> &'static str {
                match self {
                    $($name::$variant => $label),+
                }
            }
        }

        impl FromStr for $name {
            type Err = UnknownCode;

            fn from_str(code: &str) -> Result<Self, Self::Err> {
                match code {
                    $($code => Ok($name::$variant),)+
                    _ => Err(UnknownCode {
                        kind: $kind,
                        code: code.to_string(),
                    }),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.label())
            }
        }

        impl ToSql<Text, Sqlite> for $name {
            fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Sqlite>) -> serialize::Result {
                out.set_value(self.code());
                Ok(IsNull::No)
            }
        }

        impl FromSql<Text, Sqlite> for $name {
            fn from_sql(bytes: <Sqlite as Backend>::RawValue<'_>) -> deserialize::Result<Self> {
                let code = <String as FromSql<Text, Sqlite>>::from_sql(bytes)?;
                Ok(code.parse::<$name>()?)
            }
        }
    };
}

coded_enum! {
    /// The role of a staff account. Admins manage the cell, volunteers mark attendance.
    pub enum Role ("role") {
        Admin => ("ADMIN", "Admin"),
        Volunteer => ("VOLUNTEER", "Volunteer"),
    }
}

coded_enum! {
    /// Which half of the day a lecture occupies.
    pub enum LectureType ("lecture type") {
        Morning => ("MS", "Morning Session"),
        Afternoon => ("AS", "Afternoon Session"),
    }
}

coded_enum! {
    /// A student's attendance status for a single lecture.
    pub enum Status ("status") {
        Present => ("P", "Present"),
        Absent => ("A", "Absent"),
    }
}

coded_enum! {
    /// The kind of action recorded in the audit trail.
    pub enum ActionType ("action type") {
        Create => ("CREATE", "Create"),
        Update => ("UPDATE", "Update"),
        Delete => ("DELETE", "Delete"),
        Attendance => ("ATTENDANCE", "Attendance"),
        Login => ("LOGIN", "Login"),
        Logout => ("LOGOUT", "Logout"),
        System => ("SYSTEM", "System"),
    }
}

#[derive(Queryable, Selectable, Identifiable, Debug, Clone, PartialEq)]
#[diesel(table_name = users)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct User {
    pub id: i32,
    pub email: String,
    pub full_name: String,
    pub password_hash: String,
    pub role: Role,
    pub is_active: bool,
    pub is_staff: bool,
    pub created_at: NaiveDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = users)]
pub struct NewUser<'a> {
    pub email: &'a str,
    pub full_name: &'a str,
    pub password_hash: &'a str,
    pub role: Role,
    pub is_active: bool,
    pub is_staff: bool,
    pub created_at: NaiveDateTime,
}

#[derive(Queryable, Selectable, Debug, Clone, PartialEq)]
#[diesel(table_name = sessions)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Session {
    pub id: i32,
    pub user_id: i32,
    pub token: String,
    pub created_at: NaiveDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = sessions)]
pub struct NewSession<'a> {
    pub user_id: i32,
    pub token: &'a str,
    pub created_at: NaiveDateTime,
}

/// A cohort of students sharing a training schedule.
#[derive(Queryable, Selectable, Identifiable, Debug, Clone, PartialEq, Eq)]
#[diesel(table_name = batches)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Batch {
    pub id: i32,
    pub name: String,
}

#[derive(Insertable)]
#[diesel(table_name = batches)]
pub struct NewBatch<'a> {
    pub name: &'a str,
}

#[derive(Queryable, Selectable, Identifiable, Debug, Clone, PartialEq, Eq)]
#[diesel(table_name = branches)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Branch {
    pub id: i32,
    pub name: String,
}

#[derive(Insertable)]
#[diesel(table_name = branches)]
pub struct NewBranch<'a> {
    pub name: &'a str,
}

#[derive(Queryable, Selectable, Identifiable, Debug, Clone, PartialEq, Eq)]
#[diesel(table_name = students)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Student {
    pub id: i32,
    pub full_name: String,
    pub roll_number: String,
    pub batch_id: i32,
    pub branch_id: i32,
    pub email: String,
    pub contact_number: String,
    pub parent_contact_number: String,
    pub parent_email: String,
    pub is_active: bool,
}

#[derive(Insertable, Debug, Clone, PartialEq, Eq)]
#[diesel(table_name = students)]
pub struct NewStudent {
    pub full_name: String,
    pub roll_number: String,
    pub batch_id: i32,
    pub branch_id: i32,
    pub email: String,
    pub contact_number: String,
    pub parent_contact_number: String,
    pub parent_email: String,
    pub is_active: bool,
}

/// A scheduled session (date + morning/afternoon) for a batch.
#[derive(Queryable, Selectable, Identifiable, Debug, Clone, PartialEq, Eq)]
#[diesel(table_name = lectures)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Lecture {
    pub id: i32,
    pub batch_id: i32,
    pub date: NaiveDate,
    pub title: String,
    pub lecture_type: LectureType,
    pub created_by: i32,
    pub created_at: NaiveDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = lectures)]
pub struct NewLecture<'a> {
    pub batch_id: i32,
    pub date: NaiveDate,
    pub title: &'a str,
    pub lecture_type: LectureType,
    pub created_by: i32,
    pub created_at: NaiveDateTime,
}

/// One student's status for one lecture. Unique per `(lecture_id, student_id)`.
#[derive(Queryable, Selectable, Identifiable, Debug, Clone, PartialEq, Eq)]
#[diesel(table_name = attendance)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct AttendanceRecord {
    pub id: i32,
    pub lecture_id: i32,
    pub student_id: i32,
    pub status: Status,
    pub marked_by: Option<i32>,
    pub marked_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = attendance)]
pub struct NewAttendanceRecord {
    pub lecture_id: i32,
    pub student_id: i32,
    pub status: Status,
    pub marked_by: Option<i32>,
    pub marked_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Queryable, Selectable, Debug, Clone, PartialEq, Eq)]
#[diesel(table_name = notification_logs)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct NotificationLog {
    pub id: i32,
    pub lecture_id: i32,
    pub date: NaiveDate,
    pub sent_by: Option<i32>,
    pub sent_at: NaiveDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = notification_logs)]
pub struct NewNotificationLog {
    pub lecture_id: i32,
    pub date: NaiveDate,
    pub sent_by: Option<i32>,
    pub sent_at: NaiveDateTime,
}

#[derive(Queryable, Selectable, Debug, Clone, PartialEq, Eq)]
#[diesel(table_name = audit_logs)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct AuditLog {
    pub id: i32,
    pub actor_id: Option<i32>,
    pub action_type: ActionType,
    pub description: String,
    pub target_type: Option<String>,
    pub target_id: Option<i32>,
    pub timestamp: NaiveDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = audit_logs)]
pub struct NewAuditLog<'a> {
    pub actor_id: Option<i32>,
    pub action_type: ActionType,
    pub description: &'a str,
    pub target_type: Option<&'a str>,
    pub target_id: Option<i32>,
    pub timestamp: NaiveDateTime,
}

#[derive(Queryable, Selectable, Debug, Clone, PartialEq, Eq)]
#[diesel(table_name = eod_runs)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct EodRun {
    pub id: i32,
    pub run_date: NaiveDate,
    pub lectures_processed: i32,
    pub absences_marked: i32,
    pub ran_at: NaiveDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = eod_runs)]
pub struct NewEodRun {
    pub run_date: NaiveDate,
    pub lectures_processed: i32,
    pub absences_marked: i32,
    pub ran_at: NaiveDateTime,
}

/// Something an audit entry can point at: a type name and a row id.
pub trait AuditTarget {
    const TARGET_TYPE: &'static str;

    fn target_id(&self) -> i32;
}

macro_rules! audit_target {
    ($($ty:ident),+ $(,)?) => {
        $(
            impl AuditTarget for $ty {
                const TARGET_TYPE: &'static str = stringify!($ty);

                fn target_id(&self) -> i32 {
                    self.id
                }
            }
        )+
    };
}

audit_target!(User, Batch, Branch, Student, Lecture, AttendanceRecord);
