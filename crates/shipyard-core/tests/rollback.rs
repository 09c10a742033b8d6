mod support;

use std::fs;

use shipyard_core::audit::{AuditRecord, Outcome};
use shipyard_core::error::Error;

use support::{Harness, INITIAL_DB, stamp};

#[test]
fn rollback_restores_database_and_removes_active_instance() {
    let h = Harness::new();
    h.deploy("aaa111").unwrap();
    let db_after_first = h.database.contents();
    h.deploy("bbb222").unwrap();
    assert!(h.database.contents().contains("migrated bbb222"));

    let report = h.rollback_manager().rollback().unwrap();

    assert_eq!(report.restored, stamp("aaa111"));
    assert_eq!(report.removed, stamp("bbb222"));
    assert_eq!(h.database.contents(), db_after_first);
    assert_eq!(h.current().as_deref(), Some("aaa111"));
    assert_eq!(h.previous(), None);
    assert!(!h.instance_dir("bbb222").exists());
    assert!(h.instance_dir("aaa111").exists());

    let last = AuditRecord::parse(h.audit_lines().last().unwrap()).unwrap();
    assert_eq!(last.task, "ROLLBACK");
    assert_eq!(last.outcome, Outcome::Success);
    assert_eq!(last.stamp, Some(stamp("bbb222")));
}

#[test]
fn second_rollback_is_impossible() {
    let h = Harness::new();
    h.deploy("aaa111").unwrap();
    h.deploy("bbb222").unwrap();
    h.rollback_manager().rollback().unwrap();
    let audit_before = h.audit_lines();

    let err = h.rollback_manager().rollback().unwrap_err();

    assert!(matches!(err, Error::RollbackImpossible(_)));
    assert!(err.to_string().contains("no previous instance"));
    assert_eq!(h.audit_lines(), audit_before);
    assert_eq!(h.current().as_deref(), Some("aaa111"));
}

#[test]
fn rollback_on_empty_root_is_impossible() {
    let h = Harness::new();
    let err = h.rollback_manager().rollback().unwrap_err();
    assert!(matches!(err, Error::RollbackImpossible(_)));
    assert!(h.audit_lines().is_empty());
}

#[test]
fn rollback_refuses_when_both_pointers_name_the_active_instance() {
    let h = Harness::new();
    h.deploy("aaa111").unwrap();
    h.deploy("bbb222").unwrap();
    let previous = h.layout().previous_pointer();
    fs::remove_file(&previous).unwrap();
    std::os::unix::fs::symlink(h.instance_dir("bbb222"), &previous).unwrap();
    let db_before = h.database.contents();

    let err = h.rollback_manager().rollback().unwrap_err();

    assert!(matches!(err, Error::RollbackImpossible(ref msg) if msg.contains("bbb222")));
    assert!(h.instance_dir("bbb222").join("source").is_dir());
    assert_eq!(h.current().as_deref(), Some("bbb222"));
    assert_eq!(h.database.contents(), db_before);
    assert_eq!(h.database.restores(), 0);
}

#[test]
fn missing_snapshot_blocks_rollback() {
    let h = Harness::new();
    h.deploy("aaa111").unwrap();
    h.deploy("bbb222").unwrap();
    fs::remove_file(h.instance_dir("bbb222").join("backup").join("db_backup_start.sql")).unwrap();
    let db_before = h.database.contents();

    let err = h.rollback_manager().rollback().unwrap_err();

    assert!(matches!(err, Error::RollbackImpossible(ref msg) if msg.contains("db_backup_start.sql")));
    assert_eq!(h.database.contents(), db_before);
    assert_eq!(h.current().as_deref(), Some("bbb222"));
    assert_eq!(h.previous().as_deref(), Some("aaa111"));
}

#[test]
fn failed_restore_leaves_pointers_and_is_audited() {
    let h = Harness::new();
    h.deploy("aaa111").unwrap();
    h.deploy("bbb222").unwrap();
    h.database.fail_restore();

    let err = h.rollback_manager().rollback().unwrap_err();

    match err {
        Error::RollbackFailed(inner) => assert!(matches!(
            *inner,
            Error::DatabaseOperationFailed {
                operation: "restore",
                ..
            }
        )),
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(h.current().as_deref(), Some("bbb222"));
    assert_eq!(h.previous().as_deref(), Some("aaa111"));
    assert!(h.instance_dir("bbb222").exists());
    assert!(h.audit_lines().last().unwrap().contains("ROLLBACK FAILED"));
    assert!(!h.root.join(".shipyard.lock").exists());
}

#[test]
fn rollback_respects_deploy_lock() {
    let h = Harness::new();
    h.deploy("aaa111").unwrap();
    h.deploy("bbb222").unwrap();
    fs::create_dir(h.root.join(".shipyard.lock")).unwrap();

    let err = h.rollback_manager().rollback().unwrap_err();

    assert!(matches!(err, Error::Locked(_)));
    assert_eq!(h.current().as_deref(), Some("bbb222"));
    assert!(h.database.contents().contains("migrated bbb222"));
}

#[test]
fn redeploy_after_rollback_uses_fresh_snapshot() {
    let h = Harness::new();
    h.deploy("aaa111").unwrap();
    h.deploy("bbb222").unwrap();
    h.rollback_manager().rollback().unwrap();

    h.deploy("bbb222").unwrap();

    assert_eq!(h.current().as_deref(), Some("bbb222"));
    assert_eq!(h.previous().as_deref(), Some("aaa111"));
    let start = fs::read_to_string(
        h.instance_dir("bbb222")
            .join("backup")
            .join("db_backup_start.sql"),
    )
    .unwrap();
    assert!(start.starts_with(INITIAL_DB));
    assert!(!start.contains("bbb222"));
}
