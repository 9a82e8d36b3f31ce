//! The append-only audit trail of administrative actions.

use crate::error::Result;
use crate::manager::{AttendanceManager, contains_pattern, now};
use crate::models::{ActionType, AuditLog, AuditTarget, NewAuditLog, User};
use crate::schema;
use chrono::{NaiveDate, NaiveTime};
use diesel::prelude::*;

/// The most entries [`AttendanceManager::audit_log`] will return.
pub const AUDIT_LOG_LIMIT: i64 = 500;

/// Filters for reviewing the audit trail. Every field is optional and they combine with AND.
#[derive(Debug, Clone, Default)]
pub struct AuditFilter {
    /// Case-insensitive substring of the description, target type or actor email.
    pub query: Option<String>,
    pub action: Option<ActionType>,
    /// The id of the acting user.
    pub user: Option<i32>,
    /// Inclusive lower bound on the entry's date.
    pub start: Option<NaiveDate>,
    /// Inclusive upper bound on the entry's date.
    pub end: Option<NaiveDate>,
}

/// An audit entry together with the email of whoever performed it.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditEntry {
    pub log: AuditLog,
    pub actor_email: Option<String>,
}

impl AttendanceManager {
    /// Appends an entry to the audit trail.
    pub fn record_audit(
        &mut self,
        actor: Option<&User>,
        action: ActionType,
        description: &str,
    ) -> Result<AuditLog> {
        self.insert_audit(actor, action, description, None)
    }

    /// Appends an entry to the audit trail that points at a specific row.
    pub fn record_audit_for<T: AuditTarget>(
        &mut self,
        actor: Option<&User>,
        action: ActionType,
        description: &str,
        target: &T,
    ) -> Result<AuditLog> {
        self.insert_audit(
            actor,
            action,
            description,
            Some((T::TARGET_TYPE, target.target_id())),
        )
    }

    fn insert_audit(
        &mut self,
        actor: Option<&User>,
        action: ActionType,
        description: &str,
        target: Option<(&str, i32)>,
    ) -> Result<AuditLog> {
        Ok(diesel::insert_into(schema::audit_logs::table)
            .values(NewAuditLog {
                actor_id: actor.map(|user| user.id),
                action_type: action,
                description,
                target_type: target.map(|(kind, _)| kind),
                target_id: target.map(|(_, id)| id),
                timestamp: now(),
            })
            .returning(AuditLog::as_returning())
            .get_result(&mut self.db)?)
    }

    /// Reviews the audit trail, newest first, capped at [`AUDIT_LOG_LIMIT`] entries.
    pub fn audit_log(&mut self, filter: &AuditFilter) -> Result<Vec<AuditEntry>> {
        use schema::audit_logs::dsl::*;
        use schema::users::dsl::{email, users};

        let mut logs = audit_logs
            .left_join(users)
            .select((AuditLog::as_select(), email.nullable()))
            .into_boxed();

        if let Some(q) = filter.query.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
            let pattern = contains_pattern(q);
            logs = logs.filter(
                description
                    .like(pattern.clone())
                    .escape('\\')
                    .or(target_type.like(pattern.clone()).escape('\\'))
                    .or(email.nullable().like(pattern).escape('\\')),
            );
        }

        if let Some(action) = filter.action {
            logs = logs.filter(action_type.eq(action));
        }

        if let Some(user) = filter.user {
            logs = logs.filter(actor_id.eq(user));
        }

        if let Some(start) = filter.start {
            logs = logs.filter(timestamp.ge(start.and_time(NaiveTime::MIN)));
        }

        if let Some(end) = filter.end {
            // Exclusive bound at the next midnight keeps the whole end day.
            if let Some(next_day) = end.succ_opt() {
                logs = logs.filter(timestamp.lt(next_day.and_time(NaiveTime::MIN)));
            }
        }

        let entries = logs
            .order((timestamp.desc(), id.desc()))
            .limit(AUDIT_LOG_LIMIT)
            .load::<(AuditLog, Option<String>)>(&mut self.db)?;

        Ok(entries
            .into_iter()
            .map(|(log, actor_email)| AuditEntry { log, actor_email })
            .collect())
    }
}
