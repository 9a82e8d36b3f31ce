use anyhow::{Context, bail};
use chrono::{Local, NaiveDate};
use clap::Parser;
use std::fs;
use tpc_attendance::accounts::{load_session_token, require_role, save_session_token};
use tpc_attendance::attendance::RetryPolicy;
use tpc_attendance::audit::AuditFilter;
use tpc_attendance::cli::{Cli, Command};
use tpc_attendance::display;
use tpc_attendance::mailer::SmtpMailer;
use tpc_attendance::models::{ActionType, Batch, Role, User};
use tpc_attendance::{AttendanceManager, Error, Settings};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let settings = Settings::load().context("loading configuration")?;
    let mut manager = tpc_attendance::create_default_manager(&settings)
        .with_context(|| format!("opening {}", settings.database_url))?;

    run(&mut manager, &settings, cli.command)
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

fn logged_in_user(manager: &mut AttendanceManager, settings: &Settings) -> anyhow::Result<User> {
    let token = load_session_token(&settings.session_file).ok_or(Error::NotLoggedIn)?;
    Ok(manager.current_user(&token)?)
}

/// Resolves batch names, or every batch when none are given.
fn select_batches(manager: &mut AttendanceManager, names: &[String]) -> anyhow::Result<Vec<Batch>> {
    if names.is_empty() {
        return Ok(manager.list_batches()?);
    }

    let mut batches = Vec::with_capacity(names.len());
    for name in names {
        let batch = manager
            .find_batch(name)?
            .ok_or_else(|| Error::NotFound(format!("batch '{name}'")))?;
        batches.push(batch);
    }

    Ok(batches)
}

fn run(manager: &mut AttendanceManager, settings: &Settings, command: Command) -> anyhow::Result<()> {
    let user = if command.is_public() {
        None
    } else {
        let user = logged_in_user(manager, settings)?;
        if command.is_admin_only() {
            require_role(&user, Role::Admin)?;
        }
        Some(user)
    };
    // Only public commands run without a user, and none of them read it.
    let actor = || user.as_ref().ok_or(Error::NotLoggedIn);

    match command {
        Command::Migrate => {
            let ran = manager.migrate()?;
            for version in manager.applied_migrations()? {
                println!("applied {version}");
            }
            println!("{ran} new migration(s) run");
        }
        Command::CreateSuperuser {
            email,
            full_name,
            password,
        } => {
            let user = manager.create_superuser(&email, &full_name, &password)?;
            println!("Created admin {}", user.email);
        }
        Command::Login { email, password } => {
            let (session, user, dashboard) = manager.login(&email, &password, today())?;
            save_session_token(&settings.session_file, &session.token)
                .with_context(|| format!("writing {}", settings.session_file.display()))?;
            println!("Logged in as {} ({})", user.email, user.role);
            display::show_dashboard(&dashboard);
        }
        Command::Logout => {
            if let Some(token) = load_session_token(&settings.session_file) {
                manager.logout(&token)?;
            }
            let _ = fs::remove_file(&settings.session_file);
            println!("Logged out");
        }
        Command::Whoami => {
            let user = actor()?;
            println!("{} <{}> ({})", user.full_name, user.email, user.role);
        }
        Command::Dashboard => {
            let dashboard = manager.dashboard_for(actor()?, today())?;
            display::show_dashboard(&dashboard);
        }
        Command::CreateUser {
            email,
            full_name,
            password,
            role,
        } => {
            let created = manager.create_user(&email, &full_name, &password, role)?;
            manager.record_audit_for(
                Some(actor()?),
                ActionType::Create,
                &format!("Created {} account {}", created.role, created.email),
                &created,
            )?;
            println!("Created {} {}", created.role, created.email);
        }
        Command::ListUsers => display::show_users(&manager.list_users()?),
        Command::AddBatch { name } => {
            let batch = manager.create_batch(&name)?;
            println!("Created batch {} (id {})", batch.name, batch.id);
        }
        Command::ListBatches => display::show_batches(&manager.list_batches()?),
        Command::AddBranch { name } => {
            let branch = manager.create_branch(&name)?;
            println!("Created branch {} (id {})", branch.name, branch.id);
        }
        Command::ListBranches => display::show_branches(&manager.list_branches()?),
        Command::AddLecture {
            batch,
            date,
            session,
            title,
        } => {
            let batch = manager
                .find_batch(&batch)?
                .ok_or_else(|| Error::NotFound(format!("batch '{batch}'")))?;
            let lecture = manager.create_lecture(actor()?, &batch, date, &title, session)?;
            println!("Created lecture {} for {} on {}", lecture.id, batch.name, lecture.date);
        }
        Command::ListLectures { date } => {
            let lectures = match date {
                Some(date) => manager.lectures_on(date)?,
                None => manager.list_lectures()?,
            };
            display::show_lectures(&lectures);
        }
        Command::SeedLectures { dates, batch } => {
            let batches = select_batches(manager, &batch)?;
            let counts = manager.seed_lectures(actor()?, &dates, &batches)?;
            println!("Created {} lecture(s), {} already existed", counts.created, counts.skipped);
        }
        Command::ListStudents { query, page } => {
            display::show_student_page(&manager.search_students(&query, page)?);
        }
        Command::StudentProfile { roll_number } => {
            let student = manager
                .find_by_roll_number(roll_number.trim())?
                .ok_or_else(|| Error::NotFound(format!("student {roll_number}")))?;
            display::show_student_profile(&manager.student_profile(student.id, today())?);
        }
        Command::ImportStudents { file, dry_run } => {
            match manager.import_students(Some(actor()?), &file, dry_run) {
                Ok(import) if import.dry_run => {
                    println!("DRY RUN: {} student(s) would be imported", import.students)
                }
                Ok(import) => println!("Imported {} student(s)", import.students),
                Err(Error::ImportFailed(errors)) => {
                    for error in &errors {
                        eprintln!("  {error}");
                    }
                    bail!("import failed with {} error(s), nothing was saved", errors.len());
                }
                Err(err) => return Err(err.into()),
            }
        }
        Command::Mark {
            lecture_id,
            roll_number,
            status,
        } => {
            let (record, _) = manager.mark_attendance(actor()?, lecture_id, &roll_number, status, today())?;
            println!("Attendance marked as {}", record.status);
        }
        Command::LectureAttendance { lecture_id } => {
            let lecture = manager.get_lecture(lecture_id)?;
            let rows = manager.lecture_attendance(&lecture)?;
            display::show_lecture_attendance(&lecture, &rows);
        }
        Command::Eod { date } => {
            let policy = RetryPolicy {
                max_retries: settings.eod.max_retries,
                min_backoff: std::time::Duration::from_secs(settings.eod.min_backoff_secs),
            };
            let summary = manager.run_eod_with_retry(date.unwrap_or_else(today), policy)?;
            display::show_eod_summary(&summary);
        }
        Command::ImportAttendance {
            file,
            clear,
            dry_run,
        } => {
            let stats = manager.import_attendance(Some(actor()?), &file, clear, dry_run)?;
            display::show_import_stats(&stats, dry_run);
        }
        Command::AttendanceTemplate { start, end, batch } => {
            let batches = select_batches(manager, &batch)?;
            let report = manager.attendance_import_template(&batches, start, end)?;
            let path = report.write_to(&settings.report_dir)?;
            println!("Wrote {}", path.display());
        }
        Command::StudentReport { roll_number } => {
            let student = manager.student_for_report(&roll_number)?;
            let report = manager.student_attendance_report(&student)?;
            let path = report.write_to(&settings.report_dir)?;
            println!("Wrote {}", path.display());
        }
        Command::LectureReport { start, end, batch } => {
            let batches = select_batches(manager, &batch)?;
            let report = manager.lecture_matrix_report(&batches, start, end)?;
            let path = report.write_to(&settings.report_dir)?;
            println!("Wrote {}", path.display());
        }
        Command::Notifications { date } => {
            let overview = manager.notification_overview(date.unwrap_or_else(today))?;
            display::show_notification_overview(&overview);
            if overview.already_sent {
                println!("Notifications have already been sent for this date.");
            }
        }
        Command::Notify { lecture_ids, date } => {
            let smtp = settings
                .smtp
                .as_ref()
                .context("no [smtp] section configured")?;
            let mailer = SmtpMailer::from_settings(smtp)?;
            let deliveries = manager.send_absentee_notifications(
                actor()?,
                date.unwrap_or_else(today),
                &lecture_ids,
                &mailer,
            )?;
            display::show_deliveries(&deliveries);
        }
        Command::AuditLog {
            query,
            action,
            user: email,
            start,
            end,
        } => {
            let user = match email {
                Some(email) => Some(
                    manager
                        .find_user_by_email(&email)?
                        .ok_or_else(|| Error::NotFound(format!("user {email}")))?
                        .id,
                ),
                None => None,
            };
            let entries = manager.audit_log(&AuditFilter {
                query,
                action,
                user,
                start,
                end,
            })?;
            display::show_audit_log(&entries);
        }
        Command::Seed => {
            let summary = manager.seed_core()?;
            info!(?summary, "seed finished");
            println!(
                "Seeded {} batch(es) and {} student(s)",
                summary.batches, summary.students
            );
        }
    }

    Ok(())
}
