//! Staff accounts: password authentication, login sessions, role checks and the per-role
//! dashboards shown after login.

use crate::error::{Error, Result};
use crate::manager::{AttendanceManager, now, unique_violation};
use crate::models::{
    ActionType, Batch, Lecture, NewSession, NewUser, Role, Session, Status, User,
};
use crate::schema;
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use chrono::NaiveDate;
use diesel::prelude::*;
use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;
use tracing::{info, warn};
use uuid::Uuid;

/// Hashes a password into a PHC string (`$argon2id$...`).
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);

    Ok(Argon2::default()
        .hash_password(password.as_bytes(), &salt)?
        .to_string())
}

/// Checks a password against a stored PHC hash. A malformed hash never verifies.
pub fn verify_password(password: &str, hash: &str) -> bool {
    PasswordHash::new(hash)
        .map(|parsed| {
            Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok()
        })
        .unwrap_or(false)
}

/// Trims an email address and lower-cases its domain part.
pub fn normalize_email(email: &str) -> String {
    let email = email.trim();

    match email.rsplit_once('@') {
        Some((local, domain)) => format!("{local}@{}", domain.to_lowercase()),
        None => email.to_string(),
    }
}

/// Stores a session token at `path`, readable by the owner only.
pub fn save_session_token(path: &Path, token: &str) -> Result<()> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(path)?;
    // `mode` only applies on creation, so tighten a file left by an older login too.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(fs::Permissions::from_mode(0o600))?;
    }
    file.write_all(token.as_bytes())?;

    Ok(())
}

/// The session token stored at `path`, if there is a non-empty one.
pub fn load_session_token(path: &Path) -> Option<String> {
    fs::read_to_string(path)
        .ok()
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
}

/// Fails with [`Error::PermissionDenied`] unless `user` has `role`.
pub fn require_role(user: &User, role: Role) -> Result<()> {
    if user.role == role {
        Ok(())
    } else {
        Err(Error::PermissionDenied(format!(
            "this requires the {} role, {} is a {}",
            role.label(),
            user.email,
            user.role.label()
        )))
    }
}

/// What an administrator sees after logging in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminDashboard {
    pub active_students: i64,
    pub batches: i64,
    pub lectures_today: i64,
    pub records_marked_today: i64,
    /// Today's lectures that have not had absentee notices sent.
    pub lectures_pending_notification: i64,
}

/// A lecture on a volunteer's dashboard, with how far marking has got.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LectureProgress {
    pub lecture: Lecture,
    pub batch: Batch,
    pub present: i64,
    pub absent: i64,
    pub unmarked: i64,
}

/// What a volunteer sees after logging in: today's lectures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolunteerDashboard {
    pub date: NaiveDate,
    pub lectures: Vec<LectureProgress>,
}

/// The landing page for a freshly logged-in user, picked by role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dashboard {
    Admin(AdminDashboard),
    Volunteer(VolunteerDashboard),
}

impl AttendanceManager {
    /// Creates a staff account. The email is normalised and the password hashed.
    pub fn create_user(
        &mut self,
        email: &str,
        full_name: &str,
        password: &str,
        role: Role,
    ) -> Result<User> {
        let email = normalize_email(email);
        if email.is_empty() {
            return Err(Error::Validation("Email is required".to_string()));
        }

        let password_hash = hash_password(password)?;

        let user = diesel::insert_into(schema::users::table)
            .values(NewUser {
                email: &email,
                full_name,
                password_hash: &password_hash,
                role,
                is_active: true,
                is_staff: role == Role::Admin,
                created_at: now(),
            })
            .returning(User::as_returning())
            .get_result(&mut self.db)
            .map_err(|err| unique_violation(err, || format!("a user with email {email} exists")))?;

        info!(email = %user.email, role = %user.role, "created user");

        Ok(user)
    }

    /// Creates an administrator account.
    pub fn create_superuser(&mut self, email: &str, full_name: &str, password: &str) -> Result<User> {
        self.create_user(email, full_name, password, Role::Admin)
    }

    pub fn get_user(&mut self, user_id: i32) -> Result<User> {
        use schema::users::dsl::*;

        users
            .find(user_id)
            .select(User::as_select())
            .first(&mut self.db)
            .optional()?
            .ok_or_else(|| Error::NotFound(format!("user {user_id}")))
    }

    pub fn find_user_by_email(&mut self, user_email: &str) -> Result<Option<User>> {
        use schema::users::dsl::*;

        Ok(users
            .filter(email.eq(normalize_email(user_email)))
            .select(User::as_select())
            .first(&mut self.db)
            .optional()?)
    }

    pub fn list_users(&mut self) -> Result<Vec<User>> {
        use schema::users::dsl::*;

        Ok(users
            .order(email.asc())
            .select(User::as_select())
            .load(&mut self.db)?)
    }

    /// Checks an email and password. Unknown emails, inactive accounts and wrong passwords all
    /// produce the same [`Error::InvalidCredentials`].
    pub fn authenticate(&mut self, email: &str, password: &str) -> Result<User> {
        match self.find_user_by_email(email)? {
            Some(user) if user.is_active && verify_password(password, &user.password_hash) => {
                Ok(user)
            }
            _ => {
                warn!(email = %normalize_email(email), "failed login attempt");
                Err(Error::InvalidCredentials)
            }
        }
    }

    /// Authenticates and opens a session. Returns the session and the dashboard for the user's
    /// role.
    pub fn login(
        &mut self,
        email: &str,
        password: &str,
        today: NaiveDate,
    ) -> Result<(Session, User, Dashboard)> {
        let user = self.authenticate(email, password)?;
        let token = Uuid::new_v4().simple().to_string();

        let session = diesel::insert_into(schema::sessions::table)
            .values(NewSession {
                user_id: user.id,
                token: &token,
                created_at: now(),
            })
            .returning(Session::as_returning())
            .get_result(&mut self.db)?;

        self.record_audit_for(
            Some(&user),
            ActionType::Login,
            &format!("{} logged in", user.email),
            &user,
        )?;

        let dashboard = self.dashboard_for(&user, today)?;

        Ok((session, user, dashboard))
    }

    /// Ends a session. Logging out of an unknown session is a no-op.
    pub fn logout(&mut self, session_token: &str) -> Result<()> {
        let Some(user) = self.session_user(session_token)? else {
            return Ok(());
        };

        {
            use schema::sessions::dsl::*;
            diesel::delete(sessions.filter(token.eq(session_token))).execute(&mut self.db)?;
        }

        self.record_audit_for(
            Some(&user),
            ActionType::Logout,
            &format!("{} logged out", user.email),
            &user,
        )?;

        Ok(())
    }

    /// Resolves a session token to its active user.
    pub fn current_user(&mut self, session_token: &str) -> Result<User> {
        self.session_user(session_token)?
            .filter(|user| user.is_active)
            .ok_or(Error::NotLoggedIn)
    }

    fn session_user(&mut self, session_token: &str) -> Result<Option<User>> {
        use schema::sessions::dsl::*;

        Ok(sessions
            .inner_join(schema::users::table)
            .filter(token.eq(session_token))
            .select(User::as_select())
            .first(&mut self.db)
            .optional()?)
    }

    /// Picks the dashboard matching the user's role.
    pub fn dashboard_for(&mut self, user: &User, today: NaiveDate) -> Result<Dashboard> {
        match user.role {
            Role::Admin => Ok(Dashboard::Admin(self.admin_dashboard(user, today)?)),
            Role::Volunteer => Ok(Dashboard::Volunteer(self.volunteer_dashboard(user, today)?)),
        }
    }

    pub fn admin_dashboard(&mut self, user: &User, today: NaiveDate) -> Result<AdminDashboard> {
        require_role(user, Role::Admin)?;

        let active_students = self.num_active_students()?;
        let batches: i64 = schema::batches::table.count().get_result(&mut self.db)?;

        let todays_lecture_ids: Vec<i32> = schema::lectures::table
            .filter(schema::lectures::date.eq(today))
            .select(schema::lectures::id)
            .load(&mut self.db)?;

        let records_marked_today: i64 = schema::attendance::table
            .filter(schema::attendance::lecture_id.eq_any(&todays_lecture_ids))
            .count()
            .get_result(&mut self.db)?;

        let notified: HashSet<i32> = schema::notification_logs::table
            .filter(schema::notification_logs::date.eq(today))
            .select(schema::notification_logs::lecture_id)
            .load::<i32>(&mut self.db)?
            .into_iter()
            .collect();

        let lectures_pending_notification = todays_lecture_ids
            .iter()
            .filter(|lecture| !notified.contains(lecture))
            .count() as i64;

        Ok(AdminDashboard {
            active_students,
            batches,
            lectures_today: todays_lecture_ids.len() as i64,
            records_marked_today,
            lectures_pending_notification,
        })
    }

    pub fn volunteer_dashboard(
        &mut self,
        user: &User,
        today: NaiveDate,
    ) -> Result<VolunteerDashboard> {
        require_role(user, Role::Volunteer)?;

        let mut lectures = Vec::new();

        for (lecture, batch) in self.lectures_on(today)? {
            let statuses: Vec<Status> = schema::attendance::table
                .filter(schema::attendance::lecture_id.eq(lecture.id))
                .select(schema::attendance::status)
                .load(&mut self.db)?;

            let present = statuses.iter().filter(|&&s| s == Status::Present).count() as i64;
            let absent = statuses.len() as i64 - present;
            let enrolled = self.active_students_in_batch(batch.id)?.len() as i64;

            lectures.push(LectureProgress {
                lecture,
                batch,
                present,
                absent,
                unmarked: (enrolled - present - absent).max(0),
            });
        }

        Ok(VolunteerDashboard {
            date: today,
            lectures,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_email_lowercases_only_the_domain() {
        assert_eq!(normalize_email("  Jane.Doe@TPC.Example.COM "), "Jane.Doe@tpc.example.com");
        assert_eq!(normalize_email("no-at-sign"), "no-at-sign");
    }

    #[test]
    fn hashed_passwords_verify() {
        let hash = hash_password("hunter2").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("hunter2", &hash));
        assert!(!verify_password("hunter3", &hash));
        assert!(!verify_password("hunter2", "not a phc string"));
    }
}
