use crate::error::{Error, Result};
use crate::models::{
    ActionType, Batch, Branch, Lecture, LectureType, NewBatch, NewBranch, NewLecture, NewStudent,
    Status, Student, User,
};
use crate::schema;
use chrono::{Local, NaiveDate, NaiveDateTime};
use diesel::connection::{AnsiTransactionManager, TransactionManager};
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel::sqlite::Sqlite;
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};
use tracing::{debug, info, warn};

/// The migrations under `migrations/`, compiled into the binary.
pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

/// The number of students shown per page of the admin attendance list.
pub const STUDENTS_PER_PAGE: i64 = 25;

/// The local wall-clock time, used for every stored timestamp.
pub(crate) fn now() -> NaiveDateTime {
    Local::now().naive_local()
}

/// Maps a unique-constraint violation onto a readable validation error.
pub(crate) fn unique_violation(err: DieselError, message: impl FnOnce() -> String) -> Error {
    match err {
        DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
            Error::Validation(message())
        }
        other => Error::Database(other),
    }
}

/// One page of the admin attendance list.
#[derive(Debug, Clone, PartialEq)]
pub struct StudentPage {
    pub students: Vec<Student>,
    /// 1-based, clamped into `1..=num_pages`.
    pub page: i64,
    pub num_pages: i64,
    pub total: i64,
}

/// The attendance summary shown on a student's profile.
#[derive(Debug, Clone, PartialEq)]
pub struct StudentProfile {
    pub student: Student,
    pub batch: Batch,
    pub branch: Branch,
    pub total_lectures: i64,
    pub attended_count: i64,
    pub attendance_percent: f64,
    pub last_attended: Option<String>,
    pub recent_lectures: Vec<Lecture>,
    pub all_attended_lectures: Vec<Lecture>,
}

/// Created/skipped counts from [`AttendanceManager::seed_lectures`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedCounts {
    pub created: usize,
    pub skipped: usize,
}

/// Rounds a present/total ratio to a percentage with two decimals. Zero sessions is 0%.
pub fn attendance_percent(present: i64, total: i64) -> f64 {
    if total <= 0 {
        return 0.0;
    }

    (present as f64 / total as f64 * 10_000.0).round() / 100.0
}

/// A `LIKE` pattern matching `query` anywhere, with `\\` as the escape character.
pub(crate) fn contains_pattern(query: &str) -> String {
    format!(
        "%{}%",
        query
            .replace('\\', "\\\\")
            .replace('%', "\\%")
            .replace('_', "\\_")
    )
}

/// Students whose roll number or name contains `query`. An empty query matches everyone.
fn student_search(query: &str) -> schema::students::BoxedQuery<'static, Sqlite> {
    use schema::students::dsl::*;

    let mut boxed = students.into_boxed();

    if !query.is_empty() {
        let pattern = contains_pattern(query);

        boxed = boxed.filter(
            roll_number
                .like(pattern.clone())
                .escape('\\')
                .or(full_name.like(pattern).escape('\\')),
        );
    }

    boxed
}

/// The manager for recording, modifying, and retrieving attendance data.
pub struct AttendanceManager {
    pub(crate) db: SqliteConnection,
}

impl AttendanceManager {
    /// Connects to the `sqlite3` database at `database_url`, enables foreign keys and applies any
    /// pending migrations.
    ///
    /// Pass `":memory:"` for a throwaway database.
    pub fn connect(database_url: &str) -> Result<Self> {
        let mut db = SqliteConnection::establish(database_url)?;

        diesel::sql_query("PRAGMA foreign_keys = ON").execute(&mut db)?;

        let mut manager = Self { db };
        manager.migrate()?;

        Ok(manager)
    }

    /// Applies pending migrations, returning how many ran.
    pub fn migrate(&mut self) -> Result<usize> {
        let applied = self
            .db
            .run_pending_migrations(MIGRATIONS)
            .map_err(|err| Error::Migration(err.to_string()))?;

        if !applied.is_empty() {
            info!(count = applied.len(), "applied pending migrations");
        }

        Ok(applied.len())
    }

    /// The versions of every migration applied to this database.
    pub fn applied_migrations(&mut self) -> Result<Vec<String>> {
        Ok(self
            .db
            .applied_migrations()
            .map_err(|err| Error::Migration(err.to_string()))?
            .into_iter()
            .map(|version| version.to_string())
            .collect())
    }

    /// Runs `f` inside a database transaction, rolling back if it returns an error.
    pub fn transaction<T, F>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Self) -> Result<T>,
    {
        AnsiTransactionManager::begin_transaction(&mut self.db)?;

        match f(self) {
            Ok(value) => {
                AnsiTransactionManager::commit_transaction(&mut self.db)?;
                Ok(value)
            }
            Err(err) => {
                // The closure's error wins over a failed rollback.
                if let Err(rollback) = AnsiTransactionManager::rollback_transaction(&mut self.db) {
                    warn!(error = %rollback, "rollback failed");
                }
                Err(err)
            }
        }
    }

    /* Batches and branches */

    pub fn create_batch(&mut self, batch_name: &str) -> Result<Batch> {
        diesel::insert_into(schema::batches::table)
            .values(NewBatch { name: batch_name })
            .returning(Batch::as_returning())
            .get_result(&mut self.db)
            .map_err(|err| unique_violation(err, || format!("batch '{batch_name}' already exists")))
    }

    /// Returns the batch with the given name, creating it first if needed. The flag is `true`
    /// when the batch was created.
    pub fn get_or_create_batch(&mut self, batch_name: &str) -> Result<(Batch, bool)> {
        match self.find_batch(batch_name)? {
            Some(batch) => Ok((batch, false)),
            None => Ok((self.create_batch(batch_name)?, true)),
        }
    }

    pub fn find_batch(&mut self, batch_name: &str) -> Result<Option<Batch>> {
        use schema::batches::dsl::*;

        Ok(batches
            .filter(name.eq(batch_name))
            .select(Batch::as_select())
            .first(&mut self.db)
            .optional()?)
    }

    pub fn get_batch(&mut self, batch_id: i32) -> Result<Batch> {
        use schema::batches::dsl::*;

        batches
            .find(batch_id)
            .select(Batch::as_select())
            .first(&mut self.db)
            .optional()?
            .ok_or_else(|| Error::NotFound(format!("batch {batch_id}")))
    }

    pub fn list_batches(&mut self) -> Result<Vec<Batch>> {
        use schema::batches::dsl::*;

        Ok(batches
            .order(id.asc())
            .select(Batch::as_select())
            .load(&mut self.db)?)
    }

    pub fn create_branch(&mut self, branch_name: &str) -> Result<Branch> {
        diesel::insert_into(schema::branches::table)
            .values(NewBranch { name: branch_name })
            .returning(Branch::as_returning())
            .get_result(&mut self.db)
            .map_err(|err| {
                unique_violation(err, || format!("branch '{branch_name}' already exists"))
            })
    }

    pub fn get_or_create_branch(&mut self, branch_name: &str) -> Result<Branch> {
        use schema::branches::dsl::*;

        let existing = branches
            .filter(name.eq(branch_name))
            .select(Branch::as_select())
            .first(&mut self.db)
            .optional()?;

        match existing {
            Some(branch) => Ok(branch),
            None => self.create_branch(branch_name),
        }
    }

    /// Lists all branches, ordered by name.
    pub fn list_branches(&mut self) -> Result<Vec<Branch>> {
        use schema::branches::dsl::*;

        Ok(branches
            .order(name.asc())
            .select(Branch::as_select())
            .load(&mut self.db)?)
    }

    pub fn get_branch(&mut self, branch_id: i32) -> Result<Branch> {
        use schema::branches::dsl::*;

        branches
            .find(branch_id)
            .select(Branch::as_select())
            .first(&mut self.db)
            .optional()?
            .ok_or_else(|| Error::NotFound(format!("branch {branch_id}")))
    }

    /* Students */

    /// Returns the number of active students on the roster.
    pub fn num_active_students(&mut self) -> Result<i64> {
        use schema::students::dsl::*;

        Ok(students
            .filter(is_active.eq(true))
            .count()
            .get_result(&mut self.db)?)
    }

    /// Inserts a student and returns the stored row.
    pub fn insert_student(&mut self, new_student: &NewStudent) -> Result<Student> {
        diesel::insert_into(schema::students::table)
            .values(new_student)
            .returning(Student::as_returning())
            .get_result(&mut self.db)
            .map_err(|err| {
                unique_violation(err, || {
                    format!(
                        "a student with roll number {} or email {} already exists",
                        new_student.roll_number, new_student.email
                    )
                })
            })
    }

    /// Retrieves a specific student based on their ID.
    pub fn get_student(&mut self, student_id: i32) -> Result<Student> {
        use schema::students::dsl::*;

        students
            .find(student_id)
            .select(Student::as_select())
            .first(&mut self.db)
            .optional()?
            .ok_or_else(|| Error::NotFound(format!("student {student_id}")))
    }

    pub fn find_by_roll_number(&mut self, roll: &str) -> Result<Option<Student>> {
        use schema::students::dsl::*;

        Ok(students
            .filter(roll_number.eq(roll))
            .select(Student::as_select())
            .first(&mut self.db)
            .optional()?)
    }

    /// Retrieves the active students of a batch, ordered by roll number.
    pub fn active_students_in_batch(&mut self, batch: i32) -> Result<Vec<Student>> {
        use schema::students::dsl::*;

        Ok(students
            .filter(batch_id.eq(batch))
            .filter(is_active.eq(true))
            .order(roll_number.asc())
            .select(Student::as_select())
            .load(&mut self.db)?)
    }

    /// Searches students by roll number or name (case-insensitive, substring) and returns one
    /// page ordered by roll number. Out-of-range pages clamp to the nearest valid page.
    pub fn search_students(&mut self, query: &str, page: i64) -> Result<StudentPage> {
        use schema::students::dsl::*;

        let query = query.trim();
        let total: i64 = student_search(query).count().get_result(&mut self.db)?;
        let num_pages = ((total + STUDENTS_PER_PAGE - 1) / STUDENTS_PER_PAGE).max(1);
        let page = page.clamp(1, num_pages);

        let found = student_search(query)
            .order(roll_number.asc())
            .limit(STUDENTS_PER_PAGE)
            .offset((page - 1) * STUDENTS_PER_PAGE)
            .select(Student::as_select())
            .load(&mut self.db)?;

        Ok(StudentPage {
            students: found,
            page,
            num_pages,
            total,
        })
    }

    /// Summarises a student's attendance over the lectures of their batch held up to `today`.
    pub fn student_profile(&mut self, student_id: i32, today: NaiveDate) -> Result<StudentProfile> {
        use schema::attendance::dsl as a;
        use schema::lectures::dsl as l;

        let student = self.get_student(student_id)?;
        let batch = self.get_batch(student.batch_id)?;
        let branch = self.get_branch(student.branch_id)?;

        let total_lectures: i64 = l::lectures
            .filter(l::batch_id.eq(student.batch_id))
            .filter(l::date.le(today))
            .count()
            .get_result(&mut self.db)?;

        // Every lecture the student was present for, newest first.
        let mut all_attended_lectures: Vec<Lecture> = a::attendance
            .inner_join(l::lectures)
            .filter(a::student_id.eq(student.id))
            .filter(a::status.eq(Status::Present))
            .select(Lecture::as_select())
            .load(&mut self.db)?;
        all_attended_lectures.sort_by(|x, y| {
            (y.date, y.lecture_type).cmp(&(x.date, x.lecture_type))
        });

        let counted: Vec<&Lecture> = all_attended_lectures
            .iter()
            .filter(|lec| lec.batch_id == student.batch_id && lec.date <= today)
            .collect();

        let attended_count = counted.len() as i64;
        let last_attended = counted
            .first()
            .map(|lec| format!("{} ({})", lec.date, lec.lecture_type.label()));
        let recent_lectures = counted.iter().take(5).map(|&lec| lec.clone()).collect();

        Ok(StudentProfile {
            attendance_percent: attendance_percent(attended_count, total_lectures),
            student,
            batch,
            branch,
            total_lectures,
            attended_count,
            last_attended,
            recent_lectures,
            all_attended_lectures,
        })
    }

    /* Lectures */

    /// Schedules a lecture for a batch. A batch can hold at most one lecture per session per
    /// day.
    pub fn create_lecture(
        &mut self,
        actor: &User,
        batch: &Batch,
        lecture_date: NaiveDate,
        lecture_title: &str,
        session: LectureType,
    ) -> Result<Lecture> {
        let lecture = diesel::insert_into(schema::lectures::table)
            .values(NewLecture {
                batch_id: batch.id,
                date: lecture_date,
                title: lecture_title,
                lecture_type: session,
                created_by: actor.id,
                created_at: now(),
            })
            .returning(Lecture::as_returning())
            .get_result(&mut self.db)
            .map_err(|err| {
                unique_violation(err, || {
                    format!(
                        "{} already has a {} on {lecture_date}",
                        batch.name,
                        session.label()
                    )
                })
            })?;

        self.record_audit_for(
            Some(actor),
            ActionType::Create,
            &format!(
                "Created lecture '{}' for {} on {} ({})",
                lecture.title,
                batch.name,
                lecture.date,
                session.label()
            ),
            &lecture,
        )?;

        Ok(lecture)
    }

    pub fn find_lecture(
        &mut self,
        batch: i32,
        lecture_date: NaiveDate,
        session: LectureType,
    ) -> Result<Option<Lecture>> {
        use schema::lectures::dsl::*;

        Ok(lectures
            .filter(batch_id.eq(batch))
            .filter(date.eq(lecture_date))
            .filter(lecture_type.eq(session))
            .select(Lecture::as_select())
            .first(&mut self.db)
            .optional()?)
    }

    pub fn get_lecture(&mut self, lecture_id: i32) -> Result<Lecture> {
        use schema::lectures::dsl::*;

        lectures
            .find(lecture_id)
            .select(Lecture::as_select())
            .first(&mut self.db)
            .optional()?
            .ok_or_else(|| Error::NotFound(format!("lecture {lecture_id}")))
    }

    /// Lists every lecture with its batch, ordered by date and then session.
    pub fn list_lectures(&mut self) -> Result<Vec<(Lecture, Batch)>> {
        let mut found = schema::lectures::table
            .inner_join(schema::batches::table)
            .select((Lecture::as_select(), Batch::as_select()))
            .load::<(Lecture, Batch)>(&mut self.db)?;

        found.sort_by(|(x, xb), (y, yb)| {
            (x.date, x.lecture_type, &xb.name).cmp(&(y.date, y.lecture_type, &yb.name))
        });

        Ok(found)
    }

    /// Lists the lectures held on a given date with their batches.
    pub fn lectures_on(&mut self, lecture_date: NaiveDate) -> Result<Vec<(Lecture, Batch)>> {
        use schema::lectures::dsl::*;

        let mut found = lectures
            .inner_join(schema::batches::table)
            .filter(date.eq(lecture_date))
            .select((Lecture::as_select(), Batch::as_select()))
            .load::<(Lecture, Batch)>(&mut self.db)?;

        found.sort_by(|(x, xb), (y, yb)| (&xb.name, x.lecture_type).cmp(&(&yb.name, y.lecture_type)));

        Ok(found)
    }

    /// Lists the lectures of one batch within an inclusive date range, ordered by date and
    /// session.
    pub fn lectures_in_range(
        &mut self,
        batch: i32,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Lecture>> {
        use schema::lectures::dsl::*;

        let mut found = lectures
            .filter(batch_id.eq(batch))
            .filter(date.between(start, end))
            .select(Lecture::as_select())
            .load(&mut self.db)?;

        found.sort_by_key(|lec| (lec.date, lec.lecture_type));

        Ok(found)
    }

    /// Returns the lecture for `(batch, date, session)`, creating it with `title` if it does not
    /// exist yet. The flag is `true` when the lecture was created.
    pub fn get_or_create_lecture(
        &mut self,
        actor: &User,
        batch: &Batch,
        lecture_date: NaiveDate,
        session: LectureType,
        title: &str,
    ) -> Result<(Lecture, bool)> {
        match self.find_lecture(batch.id, lecture_date, session)? {
            Some(lecture) => Ok((lecture, false)),
            None => Ok((
                self.create_lecture(actor, batch, lecture_date, title, session)?,
                true,
            )),
        }
    }

    /// Creates a morning and an afternoon lecture for every `(date, batch)` pair, skipping the
    /// ones that already exist.
    pub fn seed_lectures(
        &mut self,
        actor: &User,
        dates: &[NaiveDate],
        batches: &[Batch],
    ) -> Result<SeedCounts> {
        let mut counts = SeedCounts::default();

        for &lecture_date in dates {
            for batch in batches {
                for &session in LectureType::ALL {
                    let title = format!("{} - {}", session.label(), batch.name);
                    let (_, created) =
                        self.get_or_create_lecture(actor, batch, lecture_date, session, &title)?;

                    if created {
                        counts.created += 1;
                    } else {
                        counts.skipped += 1;
                    }
                }
            }
        }

        debug!(?counts, "seeded lectures");

        Ok(counts)
    }
}
