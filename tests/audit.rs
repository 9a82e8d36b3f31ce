mod common;

use common::{admin, date, manager, volunteer};
use tpc_attendance::audit::{AUDIT_LOG_LIMIT, AuditFilter};
use tpc_attendance::models::ActionType;

#[test]
fn entries_are_newest_first_with_actor() {
    let mut manager = manager();
    let admin = admin(&mut manager);

    manager
        .record_audit(Some(&admin), ActionType::Create, "first")
        .unwrap();
    manager
        .record_audit(None, ActionType::System, "second")
        .unwrap();

    let entries = manager.audit_log(&AuditFilter::default()).unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].log.description, "second");
    assert_eq!(entries[0].actor_email, None);
    assert_eq!(entries[1].actor_email.as_deref(), Some("admin@example.com"));
}

#[test]
fn filters_combine() {
    let mut manager = manager();
    let admin = admin(&mut manager);
    let volunteer = volunteer(&mut manager);

    manager
        .record_audit(Some(&admin), ActionType::Create, "Created lecture Aptitude")
        .unwrap();
    manager
        .record_audit(Some(&volunteer), ActionType::Attendance, "Attendance marked: 23CE0001")
        .unwrap();
    manager
        .record_audit_for(Some(&admin), ActionType::Update, "Renamed batch", &admin)
        .unwrap();

    let by_user = manager
        .audit_log(&AuditFilter {
            user: Some(volunteer.id),
            ..AuditFilter::default()
        })
        .unwrap();
    assert_eq!(by_user.len(), 1);
    assert_eq!(by_user[0].log.action_type, ActionType::Attendance);

    let by_text = manager
        .audit_log(&AuditFilter {
            query: Some("APTITUDE".to_string()),
            ..AuditFilter::default()
        })
        .unwrap();
    assert_eq!(by_text.len(), 1);

    // The query also matches the actor's email and the target type.
    let by_email = manager
        .audit_log(&AuditFilter {
            query: Some("volunteer@".to_string()),
            ..AuditFilter::default()
        })
        .unwrap();
    assert_eq!(by_email.len(), 1);

    let by_target = manager
        .audit_log(&AuditFilter {
            query: Some("user".to_string()),
            action: Some(ActionType::Update),
            ..AuditFilter::default()
        })
        .unwrap();
    assert_eq!(by_target.len(), 1);
    assert_eq!(by_target[0].log.target_id, Some(admin.id));

    let none = manager
        .audit_log(&AuditFilter {
            user: Some(admin.id),
            action: Some(ActionType::Attendance),
            ..AuditFilter::default()
        })
        .unwrap();
    assert!(none.is_empty());
}

#[test]
fn query_wildcards_match_literally() {
    let mut manager = manager();

    manager
        .record_audit(None, ActionType::System, "nightly job")
        .unwrap();
    manager
        .record_audit(None, ActionType::System, "Imported 100% of rows_ok")
        .unwrap();

    let search = |manager: &mut tpc_attendance::AttendanceManager, text: &str| {
        manager
            .audit_log(&AuditFilter {
                query: Some(text.to_string()),
                ..AuditFilter::default()
            })
            .unwrap()
            .into_iter()
            .map(|entry| entry.log.description)
            .collect::<Vec<_>>()
    };

    assert_eq!(search(&mut manager, "_"), ["Imported 100% of rows_ok"]);
    assert_eq!(search(&mut manager, "%"), ["Imported 100% of rows_ok"]);
    assert!(search(&mut manager, "nightly_job").is_empty());
}

#[test]
fn date_bounds_are_inclusive() {
    let mut manager = manager();
    manager
        .record_audit(None, ActionType::System, "today")
        .unwrap();

    let today = chrono::Local::now().date_naive();

    let inside = manager
        .audit_log(&AuditFilter {
            start: Some(today),
            end: Some(today),
            ..AuditFilter::default()
        })
        .unwrap();
    assert_eq!(inside.len(), 1);

    let before = manager
        .audit_log(&AuditFilter {
            end: Some(date(2000, 1, 1)),
            ..AuditFilter::default()
        })
        .unwrap();
    assert!(before.is_empty());
}

#[test]
fn results_are_capped() {
    let mut manager = manager();
    for n in 0..(AUDIT_LOG_LIMIT + 5) {
        manager
            .record_audit(None, ActionType::System, &format!("entry {n}"))
            .unwrap();
    }

    let entries = manager.audit_log(&AuditFilter::default()).unwrap();
    assert_eq!(entries.len() as i64, AUDIT_LOG_LIMIT);
}
