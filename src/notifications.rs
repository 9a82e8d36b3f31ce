//! Absentee notices to parents, and the log that keeps each lecture from being notified twice.

use crate::error::Result;
use crate::mailer::{Mailer, Notice};
use crate::manager::{AttendanceManager, now};
use crate::models::{ActionType, Batch, Lecture, NewNotificationLog, Status, Student, User};
use crate::schema;
use chrono::NaiveDate;
use diesel::prelude::*;
use std::collections::HashSet;
use tracing::{info, warn};

/// A lecture on the notifications page, flagged if its notices already went out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LectureNotificationStatus {
    pub lecture: Lecture,
    pub batch: Batch,
    pub notification_sent: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationOverview {
    pub date: NaiveDate,
    pub lectures: Vec<LectureNotificationStatus>,
    /// Whether any lecture on this date has been notified.
    pub already_sent: bool,
}

/// What happened to one lecture's notices.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LectureDelivery {
    pub lecture_id: i32,
    pub sent: usize,
    pub failed: usize,
    /// Absent students without a parent email on file.
    pub no_parent_email: usize,
    /// The lecture had already been notified for this date, so nothing was sent.
    pub already_notified: bool,
}

/// Writes the notice telling a parent their ward missed a session. Students without a parent
/// email get no notice.
pub fn absence_notice(
    student: &Student,
    lecture: &Lecture,
    batch: &Batch,
    date: NaiveDate,
) -> Option<Notice> {
    if student.parent_email.trim().is_empty() {
        return None;
    }

    Some(Notice {
        to: student.parent_email.trim().to_string(),
        subject: format!("Attendance Alert - {} - {date}", batch.name),
        body: format!(
            "Dear Parent,\n\n\
             Your ward {} ({}) was marked ABSENT for the {} on {date}.\n\n\
             Training & Placement Cell",
            student.full_name,
            student.roll_number,
            lecture.lecture_type.label()
        ),
    })
}

impl AttendanceManager {
    fn notified_lectures(&mut self, on: NaiveDate) -> Result<HashSet<i32>> {
        use schema::notification_logs::dsl::*;

        Ok(notification_logs
            .filter(date.eq(on))
            .select(lecture_id)
            .load::<i32>(&mut self.db)?
            .into_iter()
            .collect())
    }

    /// Lists the lectures on `date` and whether each one has been notified.
    pub fn notification_overview(&mut self, date: NaiveDate) -> Result<NotificationOverview> {
        let notified = self.notified_lectures(date)?;

        let lectures = self
            .lectures_on(date)?
            .into_iter()
            .map(|(lecture, batch)| LectureNotificationStatus {
                notification_sent: notified.contains(&lecture.id),
                lecture,
                batch,
            })
            .collect();

        Ok(NotificationOverview {
            date,
            lectures,
            already_sent: !notified.is_empty(),
        })
    }

    /// Emails the parents of every student marked absent in the selected lectures on `date`.
    ///
    /// Delivery failures are logged and skipped. Lectures already notified for `date` are left
    /// alone, and ids that do not name a lecture on `date` are ignored.
    pub fn send_absentee_notifications(
        &mut self,
        actor: &User,
        date: NaiveDate,
        lecture_ids: &[i32],
        mailer: &dyn Mailer,
    ) -> Result<Vec<LectureDelivery>> {
        let notified = self.notified_lectures(date)?;
        let mut deliveries = Vec::new();

        for (lecture, batch) in self.lectures_on(date)? {
            if !lecture_ids.contains(&lecture.id) {
                continue;
            }

            let mut delivery = LectureDelivery {
                lecture_id: lecture.id,
                ..LectureDelivery::default()
            };

            if notified.contains(&lecture.id) {
                delivery.already_notified = true;
                deliveries.push(delivery);
                continue;
            }

            let absentees: Vec<Student> = schema::attendance::table
                .inner_join(schema::students::table)
                .filter(schema::attendance::lecture_id.eq(lecture.id))
                .filter(schema::attendance::status.eq(Status::Absent))
                .order(schema::students::roll_number.asc())
                .select(Student::as_select())
                .load(&mut self.db)?;

            for student in &absentees {
                let Some(notice) = absence_notice(student, &lecture, &batch, date) else {
                    delivery.no_parent_email += 1;
                    continue;
                };

                match mailer.send(&notice) {
                    Ok(()) => delivery.sent += 1,
                    Err(err) => {
                        warn!(roll_number = %student.roll_number, error = %err, "could not send absentee notice");
                        delivery.failed += 1;
                    }
                }
            }

            diesel::insert_into(schema::notification_logs::table)
                .values(NewNotificationLog {
                    lecture_id: lecture.id,
                    date,
                    sent_by: Some(actor.id),
                    sent_at: now(),
                })
                .execute(&mut self.db)?;

            info!(lecture = lecture.id, sent = delivery.sent, failed = delivery.failed, "notified absentees");
            deliveries.push(delivery);
        }

        self.record_audit(
            Some(actor),
            ActionType::System,
            &format!("Absentee notification sent for {date}"),
        )?;

        Ok(deliveries)
    }
}
