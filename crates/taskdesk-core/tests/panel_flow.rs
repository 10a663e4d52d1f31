use chrono::{Duration, TimeZone, Utc};
use taskdesk_core::filter::Filter;
use taskdesk_core::session::{Session, SessionStore, SessionUser};
use taskdesk_core::status::{Status, classify_for_display, resolve_completion_status};
use taskdesk_core::task::Task;
use tempfile::tempdir;
use uuid::Uuid;

#[test]
fn session_roundtrip_and_role_gate() {
    let temp = tempdir().expect("tempdir");
    let store = SessionStore::open(temp.path()).expect("open session store");

    assert!(store.load().expect("load empty").is_none());
    assert!(store.require().is_err());

    let session = Session {
        token: "opaque-bearer-token".to_string(),
        user: SessionUser {
            id: Uuid::new_v4(),
            name: "Sam Admin".to_string(),
            email: "sam@example.com".to_string(),
            role: Some("ADMIN".to_string()),
        },
    };
    store.save(&session).expect("save session");

    let loaded = store.require().expect("session after save");
    assert_eq!(loaded.user.email, "sam@example.com");
    assert!(loaded.is_admin());
    store.require_admin().expect("admin gate passes");

    store.clear().expect("clear session");
    assert!(store.load().expect("load after clear").is_none());
}

#[test]
fn employee_session_fails_admin_gate() {
    let temp = tempdir().expect("tempdir");
    let store = SessionStore::open(temp.path()).expect("open session store");

    let session = Session {
        token: "opaque-bearer-token".to_string(),
        user: SessionUser {
            id: Uuid::new_v4(),
            name: "Jane Doe".to_string(),
            email: "jane@example.com".to_string(),
            role: Some("employee".to_string()),
        },
    };
    store.save(&session).expect("save session");

    assert!(store.require().is_ok());
    assert!(store.require_admin().is_err());
}

#[test]
fn fetched_tasks_filter_and_resolve() {
    let now = Utc.with_ymd_and_hms(2025, 6, 20, 12, 0, 0).unwrap();

    // Two tasks as they would come off the wire: one open, one finished.
    let open: Task = serde_json::from_str(
        r#"{
            "id": "5f0f6f5e-8b66-4f78-9f47-6a2b1c3d4e5f",
            "title": "Replace lobby lighting",
            "description": "Both west-wing fixtures",
            "deadline": "2025-06-30T17:00:00.000Z",
            "status": "ACTIVE",
            "assignedTo": {
                "id": "b1b2c3d4-0000-4000-8000-000000000003",
                "name": "Jane Doe",
                "department": { "id": "c1b2c3d4-0000-4000-8000-000000000004", "name": "Maintenance" }
            }
        }"#,
    )
    .expect("open task json");

    let finished: Task = serde_json::from_str(
        r#"{
            "id": "6f0f6f5e-8b66-4f78-9f47-6a2b1c3d4e5f",
            "title": "Quarterly inspection",
            "deadline": "2025-06-01T17:00:00.000Z",
            "status": "completed",
            "assignedTo": {
                "id": "b1b2c3d4-0000-4000-8000-000000000003",
                "name": "Jane Doe",
                "department": { "id": "c1b2c3d4-0000-4000-8000-000000000004", "name": "Maintenance" }
            }
        }"#,
    )
    .expect("finished task json");

    let tasks = vec![open.clone(), finished.clone()];

    let dept_filter = Filter::parse(&["dept:maintenance".to_string()]).expect("parse filter");
    assert!(tasks.iter().all(|task| dept_filter.matches(task, now)));

    let editable = Filter::parse(&["+editable".to_string()]).expect("parse filter");
    let open_tasks: Vec<&Task> = tasks
        .iter()
        .filter(|task| editable.matches(task, now))
        .collect();
    assert_eq!(open_tasks.len(), 1);
    assert_eq!(open_tasks[0].id, open.id);

    // Finished task renders read-only regardless of how the deadline
    // relates to now.
    assert!(!classify_for_display(&finished.status).editable);

    // Completing the open task before its deadline lands on COMPLETE,
    // afterwards on DELAYED.
    assert_eq!(
        resolve_completion_status(now, open.deadline),
        Status::Complete
    );
    assert_eq!(
        resolve_completion_status(open.deadline + Duration::days(1), open.deadline),
        Status::Delayed
    );
}
