//! End-to-end upgrade of a SQLite database from SQL scripts and generic units.

#![cfg(feature = "sqlite")]

use schemaflow_core::{
    cloned, AddColumnIfMissing, Attributes, ColumnDef, ColumnType, Executor, MemoryInstallLog,
    MigrationError, MigrationRunner, MigrationVersion, Registry, RenameContextSetting, RunContext,
    RunnerConfig, SledLedger, SqlDirectorySource, SqliteExecutor, Value, VariantConfig,
};
use std::fs;
use std::path::Path;
use std::sync::Arc;

fn v(token: &str) -> MigrationVersion {
    MigrationVersion::new(token).unwrap()
}

fn write(root: &Path, relative: &str, contents: &str) {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, contents).unwrap();
}

fn scripts(root: &Path) {
    write(
        root,
        "v3_4_0/I1_journals.up.sql",
        "CREATE TABLE journals (journal_id INTEGER PRIMARY KEY, path TEXT NOT NULL);
         CREATE TABLE journal_settings (
             journal_id INTEGER NOT NULL,
             setting_name TEXT NOT NULL,
             setting_value TEXT
         );
         INSERT INTO journals VALUES (1, 'demo');
         INSERT INTO journal_settings VALUES (1, 'copyrightNoticeAgree', '1');",
    );
    write(
        root,
        "v3_4_0/I1_journals.down.sql",
        "DROP TABLE journal_settings; DROP TABLE journals;",
    );
    write(
        root,
        "v3_5_0/I20_bad_insert.up.sql",
        "INSERT INTO journals VALUES (1, 'duplicate');",
    );
}

fn registry(root: &Path) -> Registry {
    SqlDirectorySource::new(root)
        .register(Registry::builder())
        .unwrap()
        .unit(
            v("v3_4_0/I5_journal_locale"),
            "journal primary locale",
            cloned(AddColumnIfMissing::new(
                "journals",
                ColumnDef::nullable("primary_locale", ColumnType::VarChar(14)).with_default("en"),
            )),
        )
        .abstract_unit(v("v3_4_0/I9_copyright"), "copyright setting", "context_setting_rename")
        .bind(
            "context_setting_rename",
            cloned(RenameContextSetting::new("copyrightNoticeAgree", "copyrightNotice")),
        )
        .build()
        .unwrap()
}

#[test]
fn test_upgrade_branch_then_fail_on_constraint() {
    let scripts_dir = tempfile::tempdir().unwrap();
    scripts(scripts_dir.path());
    let db_dir = tempfile::tempdir().unwrap();

    let executor = SqliteExecutor::open(db_dir.path().join("app.db")).unwrap();
    let ledger = SledLedger::open_path(db_dir.path().join("ledger")).unwrap();
    let mut runner = MigrationRunner::new(
        registry(scripts_dir.path()),
        executor,
        ledger,
        RunnerConfig::default(),
    );

    let log = MemoryInstallLog::new();
    let run = RunContext::new(Attributes::new().with_fallback(v("v3_4_0")))
        .with_variant(VariantConfig::journal())
        .with_log(Arc::new(log.clone()));

    // Everything in the v3_4_0 branch.
    let summary = runner.run_upgrade(None, &v("v3_4_0"), &run).unwrap();
    assert_eq!(
        summary.executed,
        vec![
            v("v3_4_0/I1_journals"),
            v("v3_4_0/I5_journal_locale"),
            v("v3_4_0/I9_copyright"),
        ]
    );

    let exec = runner.executor_mut();
    assert!(exec.has_column("journals", "primary_locale").unwrap());
    let renamed = exec
        .execute(
            "SELECT COUNT(*) FROM journal_settings WHERE setting_name = ?",
            &[Value::from("copyrightNotice")],
        )
        .unwrap();
    assert_eq!(renamed.scalar().and_then(Value::as_i64), Some(1));

    // The next branch violates the primary key.
    let err = runner
        .run_upgrade(Some(&v("v3_4_0")), &v("v3_5_0"), &run)
        .unwrap_err();
    match err.root_cause() {
        MigrationError::ExecutorFailure(failure) => {
            assert!(failure.statement.as_deref().unwrap_or("").contains("duplicate"));
        }
        other => panic!("unexpected error: {other}"),
    }

    let status = runner.status().unwrap();
    assert_eq!(status.applied_versions.len(), 3);
    assert_eq!(status.fallback_version, Some(v("v3_4_0")));
    assert!(log.contains("Running migration v3_5_0/I20_bad_insert"));
}

#[test]
fn test_downgrade_reverts_scripts() {
    let scripts_dir = tempfile::tempdir().unwrap();
    scripts(scripts_dir.path());

    let mut runner = MigrationRunner::new(
        registry(scripts_dir.path()),
        SqliteExecutor::open_in_memory().unwrap(),
        SledLedger::temporary().unwrap(),
        RunnerConfig::default(),
    );
    let run = RunContext::default().with_variant(VariantConfig::journal());

    runner.run_upgrade(None, &v("v3_4_0"), &run).unwrap();
    let summary = runner.run_downgrade(&v("v3_4_0"), None, &run).unwrap();

    assert_eq!(
        summary.executed,
        vec![
            v("v3_4_0/I9_copyright"),
            v("v3_4_0/I5_journal_locale"),
            v("v3_4_0/I1_journals"),
        ]
    );
    assert!(!runner.executor_mut().has_table("journals").unwrap());
    assert!(runner.status().unwrap().applied_versions.is_empty());
}
