mod common;

use common::{PASSWORD, admin, batch, date, lecture, manager, student, volunteer};
use tpc_attendance::Error;
use tpc_attendance::accounts::{Dashboard, load_session_token, save_session_token};
use tpc_attendance::audit::AuditFilter;
use tpc_attendance::models::{ActionType, LectureType, Role, Status};

#[test]
fn emails_are_normalised_and_unique() {
    let mut manager = manager();

    let user = manager
        .create_user("  Someone@EXAMPLE.com ", "Someone", PASSWORD, Role::Volunteer)
        .unwrap();
    assert_eq!(user.email, "Someone@example.com");
    assert!(!user.is_staff);

    let clash = manager.create_user("Someone@example.COM", "Again", PASSWORD, Role::Volunteer);
    assert!(matches!(clash, Err(Error::Validation(_))));

    assert!(matches!(
        manager.create_user("   ", "Nobody", PASSWORD, Role::Volunteer),
        Err(Error::Validation(_))
    ));
}

#[test]
fn superusers_are_staff_admins() {
    let mut manager = manager();
    let user = admin(&mut manager);

    assert_eq!(user.role, Role::Admin);
    assert!(user.is_staff);
    assert_ne!(user.password_hash, PASSWORD);
}

#[test]
fn wrong_passwords_are_rejected() {
    let mut manager = manager();
    admin(&mut manager);

    assert!(matches!(
        manager.authenticate("admin@example.com", "nope"),
        Err(Error::InvalidCredentials)
    ));
    assert!(matches!(
        manager.authenticate("ghost@example.com", PASSWORD),
        Err(Error::InvalidCredentials)
    ));
    assert!(manager.authenticate("admin@example.com", PASSWORD).is_ok());
}

#[test]
fn login_redirects_by_role() {
    let mut manager = manager();
    admin(&mut manager);
    volunteer(&mut manager);
    let today = date(2025, 3, 3);

    let (_, user, dashboard) = manager.login("admin@example.com", PASSWORD, today).unwrap();
    assert_eq!(user.role, Role::Admin);
    assert!(matches!(dashboard, Dashboard::Admin(_)));

    let (_, user, dashboard) = manager
        .login("volunteer@example.com", PASSWORD, today)
        .unwrap();
    assert_eq!(user.role, Role::Volunteer);
    assert!(matches!(dashboard, Dashboard::Volunteer(_)));
}

#[test]
fn sessions_resolve_until_logout() {
    let mut manager = manager();
    admin(&mut manager);

    let (session, user, _) = manager
        .login("admin@example.com", PASSWORD, date(2025, 3, 3))
        .unwrap();
    assert_eq!(manager.current_user(&session.token).unwrap().id, user.id);

    manager.logout(&session.token).unwrap();
    assert!(matches!(
        manager.current_user(&session.token),
        Err(Error::NotLoggedIn)
    ));

    // A second logout is harmless.
    manager.logout(&session.token).unwrap();

    let logins = manager
        .audit_log(&AuditFilter {
            action: Some(ActionType::Login),
            ..AuditFilter::default()
        })
        .unwrap();
    let logouts = manager
        .audit_log(&AuditFilter {
            action: Some(ActionType::Logout),
            ..AuditFilter::default()
        })
        .unwrap();
    assert_eq!(logins.len(), 1);
    assert_eq!(logouts.len(), 1);
}

#[test]
fn dashboards_are_role_gated() {
    let mut manager = manager();
    let admin = admin(&mut manager);
    let volunteer = volunteer(&mut manager);
    let today = date(2025, 3, 3);

    assert!(matches!(
        manager.admin_dashboard(&volunteer, today),
        Err(Error::PermissionDenied(_))
    ));
    assert!(matches!(
        manager.volunteer_dashboard(&admin, today),
        Err(Error::PermissionDenied(_))
    ));
}

#[test]
fn dashboards_count_todays_work() {
    let mut manager = manager();
    let admin = admin(&mut manager);
    let volunteer = volunteer(&mut manager);
    let today = date(2025, 3, 3);

    let batch = batch(&mut manager, "Batch 1");
    let first = student(&mut manager, "23CE0001", &batch);
    student(&mut manager, "23CE0002", &batch);
    student(&mut manager, "23CE0003", &batch);

    let morning = lecture(&mut manager, &admin, &batch, today, LectureType::Morning);
    lecture(&mut manager, &admin, &batch, date(2025, 3, 4), LectureType::Morning);

    manager
        .mark_attendance(&volunteer, morning.id, &first.roll_number, Status::Present, today)
        .unwrap();
    manager
        .mark_attendance(&volunteer, morning.id, "23CE0002", Status::Absent, today)
        .unwrap();

    let overview = manager.admin_dashboard(&admin, today).unwrap();
    assert_eq!(overview.active_students, 3);
    assert_eq!(overview.batches, 1);
    assert_eq!(overview.lectures_today, 1);
    assert_eq!(overview.records_marked_today, 2);
    assert_eq!(overview.lectures_pending_notification, 1);

    let progress = manager.volunteer_dashboard(&volunteer, today).unwrap();
    assert_eq!(progress.lectures.len(), 1);
    assert_eq!(progress.lectures[0].present, 1);
    assert_eq!(progress.lectures[0].absent, 1);
    assert_eq!(progress.lectures[0].unmarked, 1);
}

#[test]
fn session_token_file_is_private() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session");
    std::fs::write(&path, "stale").unwrap();

    save_session_token(&path, "  fresh-token\n").unwrap();
    assert_eq!(load_session_token(&path).as_deref(), Some("fresh-token"));

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    std::fs::write(&path, "   ").unwrap();
    assert_eq!(load_session_token(&path), None);
    assert_eq!(load_session_token(&dir.path().join("missing")), None);
}
