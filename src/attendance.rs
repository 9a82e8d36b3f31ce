//! Marking attendance, and the end-of-day job that marks everyone left over as absent.

use crate::error::{Error, Result};
use crate::manager::{AttendanceManager, now};
use crate::models::{
    ActionType, AttendanceRecord, EodRun, Lecture, NewAttendanceRecord, NewEodRun, Status, Student,
    User,
};
use crate::schema;
use backon::{BlockingRetryable, ExponentialBuilder};
use chrono::NaiveDate;
use diesel::prelude::*;
use std::collections::HashSet;
use std::time::Duration;
use tracing::{info, warn};

/// Whether [`AttendanceManager::mark_attendance`] wrote a new record or changed an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Marked {
    Created,
    Updated,
}

/// The absences inserted for one lecture by the end-of-day run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LectureAbsences {
    pub lecture_id: i32,
    pub marked_absent: usize,
}

/// The outcome of [`AttendanceManager::mark_absent_for_date`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EodSummary {
    pub date: NaiveDate,
    pub lectures: Vec<LectureAbsences>,
}

impl EodSummary {
    pub fn total_absences(&self) -> usize {
        self.lectures.iter().map(|lecture| lecture.marked_absent).sum()
    }
}

/// How persistently to retry the end-of-day run.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: usize,
    pub min_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            min_backoff: Duration::from_secs(1),
        }
    }
}

impl AttendanceManager {
    /// Marks one student's status for one of today's lectures, overwriting any earlier mark.
    ///
    /// Lectures on other days cannot be marked and are reported as not found.
    pub fn mark_attendance(
        &mut self,
        actor: &User,
        lecture_id: i32,
        roll_number: &str,
        status: Status,
        today: NaiveDate,
    ) -> Result<(AttendanceRecord, Marked)> {
        let lecture = self.get_lecture(lecture_id)?;
        if lecture.date != today {
            return Err(Error::NotFound(format!("lecture {lecture_id} today")));
        }

        let roll_number = roll_number.trim();
        let student = self
            .find_by_roll_number(roll_number)?
            .ok_or_else(|| Error::Validation("Invalid roll number.".to_string()))?;

        self.transaction(|manager| {
            let (record, marked) =
                manager.upsert_attendance(&lecture, &student, status, Some(actor.id))?;

            let verb = match marked {
                Marked::Created => "marked",
                Marked::Updated => "updated",
            };
            manager.record_audit_for(
                Some(actor),
                ActionType::Attendance,
                &format!(
                    "Attendance {verb}: {} -> {} for lecture {}",
                    student.roll_number,
                    status.code(),
                    lecture.id
                ),
                &record,
            )?;

            Ok((record, marked))
        })
    }

    /// Inserts or overwrites the record for `(lecture, student)`.
    pub(crate) fn upsert_attendance(
        &mut self,
        lecture: &Lecture,
        student: &Student,
        new_status: Status,
        marker: Option<i32>,
    ) -> Result<(AttendanceRecord, Marked)> {
        use schema::attendance::dsl::*;

        let existing = attendance
            .filter(lecture_id.eq(lecture.id))
            .filter(student_id.eq(student.id))
            .select(AttendanceRecord::as_select())
            .first(&mut self.db)
            .optional()?;

        let timestamp = now();

        match existing {
            Some(record) => {
                let record = diesel::update(attendance.find(record.id))
                    .set((
                        status.eq(new_status),
                        marked_by.eq(marker),
                        updated_at.eq(timestamp),
                    ))
                    .returning(AttendanceRecord::as_returning())
                    .get_result(&mut self.db)?;

                Ok((record, Marked::Updated))
            }
            None => {
                let record = diesel::insert_into(attendance)
                    .values(NewAttendanceRecord {
                        lecture_id: lecture.id,
                        student_id: student.id,
                        status: new_status,
                        marked_by: marker,
                        marked_at: timestamp,
                        updated_at: timestamp,
                    })
                    .returning(AttendanceRecord::as_returning())
                    .get_result(&mut self.db)?;

                Ok((record, Marked::Created))
            }
        }
    }

    /// For every lecture on `date`, marks each active student of the lecture's batch who was not
    /// marked present as [`Status::Absent`].
    ///
    /// Students that already have a record (present or absent) are left untouched, so running
    /// this twice for the same date inserts nothing the second time. Dates without lectures are
    /// a no-op and leave no trace.
    pub fn mark_absent_for_date(&mut self, date: NaiveDate) -> Result<EodSummary> {
        self.transaction(|manager| {
            let lectures: Vec<Lecture> = manager
                .lectures_on(date)?
                .into_iter()
                .map(|(lecture, _)| lecture)
                .collect();

            let mut summary = EodSummary {
                date,
                lectures: Vec::with_capacity(lectures.len()),
            };

            if lectures.is_empty() {
                return Ok(summary);
            }

            for lecture in &lectures {
                let marked_absent = manager.mark_remaining_absent(lecture)?;

                info!(
                    lecture = lecture.id,
                    %date,
                    marked_absent,
                    "marked remaining students absent"
                );

                summary.lectures.push(LectureAbsences {
                    lecture_id: lecture.id,
                    marked_absent,
                });
            }

            diesel::insert_into(schema::eod_runs::table)
                .values(NewEodRun {
                    run_date: date,
                    lectures_processed: summary.lectures.len() as i32,
                    absences_marked: summary.total_absences() as i32,
                    ran_at: now(),
                })
                .execute(&mut manager.db)?;

            manager.record_audit(
                None,
                ActionType::System,
                &format!(
                    "End-of-day absence marking for {date}: {} absent across {} lecture(s)",
                    summary.total_absences(),
                    summary.lectures.len()
                ),
            )?;

            Ok(summary)
        })
    }

    /// Inserts absent records for the active students of the lecture's batch that have not been
    /// marked present, ignoring any that already have a record.
    ///
    /// Returns the number of students that were marked absent.
    fn mark_remaining_absent(&mut self, lecture: &Lecture) -> Result<usize> {
        use schema::attendance::dsl::*;

        let present: HashSet<i32> = attendance
            .filter(lecture_id.eq(lecture.id))
            .filter(status.eq(Status::Present))
            .select(student_id)
            .load::<i32>(&mut self.db)?
            .into_iter()
            .collect();

        let timestamp = now();
        let records: Vec<NewAttendanceRecord> = self
            .active_students_in_batch(lecture.batch_id)?
            .into_iter()
            .filter(|student| !present.contains(&student.id))
            .map(|student| NewAttendanceRecord {
                lecture_id: lecture.id,
                student_id: student.id,
                status: Status::Absent,
                marked_by: None,
                marked_at: timestamp,
                updated_at: timestamp,
            })
            .collect();

        if records.is_empty() {
            return Ok(0);
        }

        // Inserts absent records for every student, but if the record already exists, do nothing.
        Ok(diesel::insert_or_ignore_into(attendance)
            .values(records)
            .execute(&mut self.db)?)
    }

    /// Runs [`Self::mark_absent_for_date`], retrying with exponential backoff when it fails.
    pub fn run_eod_with_retry(&mut self, date: NaiveDate, policy: RetryPolicy) -> Result<EodSummary> {
        let backoff = ExponentialBuilder::default()
            .with_min_delay(policy.min_backoff)
            .with_max_times(policy.max_retries);

        (|| self.mark_absent_for_date(date))
            .retry(backoff)
            .sleep(std::thread::sleep)
            .notify(|err: &Error, delay: Duration| {
                warn!(%date, ?delay, error = %err, "end-of-day absence marking failed, retrying");
            })
            .call()
    }

    /// The recorded end-of-day runs for `date`, oldest first.
    pub fn eod_runs_for(&mut self, date: NaiveDate) -> Result<Vec<EodRun>> {
        use schema::eod_runs::dsl::*;

        Ok(eod_runs
            .filter(run_date.eq(date))
            .order(id.asc())
            .select(EodRun::as_select())
            .load(&mut self.db)?)
    }

    /// Lists the records of a lecture alongside their students, ordered by roll number.
    pub fn lecture_attendance(&mut self, lecture: &Lecture) -> Result<Vec<(Student, AttendanceRecord)>> {
        use schema::attendance::dsl::*;

        Ok(attendance
            .inner_join(schema::students::table)
            .filter(lecture_id.eq(lecture.id))
            .order(schema::students::roll_number.asc())
            .select((Student::as_select(), AttendanceRecord::as_select()))
            .load(&mut self.db)?)
    }
}
