//! Integration tests for upgrade/downgrade runs against the ledger.

use parking_lot::Mutex;
use schemaflow_core::{
    factory, Attributes, Direction, Executor, ExecutorError, InFlight, Ledger, LedgerEntry,
    LedgerError, MemoryInstallLog, MemoryLedger, Migration, MigrationContext, MigrationError,
    MigrationFactory, MigrationRunner, MigrationVersion, Registry, Resolution, RowSet, RunContext,
    RunState, RunnerConfig, SchemaChange, SledLedger, Value,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

type Journal = Arc<Mutex<Vec<String>>>;

#[derive(Default)]
struct NoopExecutor;

impl Executor for NoopExecutor {
    fn execute(&mut self, _sql: &str, _params: &[Value]) -> Result<RowSet, ExecutorError> {
        Ok(RowSet::default())
    }

    fn begin(&mut self) -> Result<(), ExecutorError> {
        Ok(())
    }

    fn commit(&mut self) -> Result<(), ExecutorError> {
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), ExecutorError> {
        Ok(())
    }

    fn alter_schema(&mut self, _change: &SchemaChange) -> Result<(), ExecutorError> {
        Ok(())
    }

    fn has_table(&mut self, _table: &str) -> Result<bool, ExecutorError> {
        Ok(true)
    }

    fn has_column(&mut self, _table: &str, _column: &str) -> Result<bool, ExecutorError> {
        Ok(true)
    }
}

struct Recorder {
    name: &'static str,
    journal: Journal,
    fail_up: Arc<AtomicBool>,
    reversible: bool,
}

impl Migration for Recorder {
    fn up(&self, _ctx: &mut MigrationContext<'_>) -> Result<(), MigrationError> {
        self.journal.lock().push(format!("up:{}", self.name));
        if self.fail_up.load(Ordering::SeqCst) {
            return Err(MigrationError::precondition(format!("{} is broken", self.name)));
        }
        Ok(())
    }

    fn down(&self, _ctx: &mut MigrationContext<'_>) -> Result<(), MigrationError> {
        self.journal.lock().push(format!("down:{}", self.name));
        if !self.reversible {
            return Err(MigrationError::downgrade_unsupported(format!(
                "{} discarded data",
                self.name
            )));
        }
        Ok(())
    }
}

/// Three recorded units A(v1), B(v2), C(v3).
struct Fixture {
    journal: Journal,
    fail_b: Arc<AtomicBool>,
    registry: Registry,
}

impl Fixture {
    fn new(b_reversible: bool) -> Self {
        let journal: Journal = Arc::default();
        let fail_b = Arc::new(AtomicBool::new(false));
        let unit = |name: &'static str, fail: Arc<AtomicBool>, reversible: bool| -> MigrationFactory {
            let journal = journal.clone();
            factory(move |_| Recorder {
                name,
                journal: journal.clone(),
                fail_up: fail.clone(),
                reversible,
            })
        };

        let registry = Registry::builder()
            .unit(v("v1"), "A", unit("A", Arc::new(AtomicBool::new(false)), true))
            .unit(v("v2"), "B", unit("B", fail_b.clone(), b_reversible))
            .unit(v("v3"), "C", unit("C", Arc::new(AtomicBool::new(false)), true))
            .build()
            .unwrap();

        Self {
            journal,
            fail_b,
            registry,
        }
    }

    fn calls(&self) -> Vec<String> {
        self.journal.lock().clone()
    }

    fn runner<L: Ledger>(self, ledger: L) -> (MigrationRunner<NoopExecutor, L>, Journal, Arc<AtomicBool>) {
        let runner = MigrationRunner::new(self.registry, NoopExecutor, ledger, RunnerConfig::default());
        (runner, self.journal, self.fail_b)
    }
}

/// Ledger wrapper counting fallback writes.
#[derive(Default)]
struct CountingLedger {
    inner: MemoryLedger,
    fallback_writes: AtomicUsize,
}

impl Ledger for CountingLedger {
    fn is_applied(&self, version: &MigrationVersion) -> Result<bool, LedgerError> {
        self.inner.is_applied(version)
    }

    fn record_applied(&self, version: &MigrationVersion, applied_at: u64) -> Result<(), LedgerError> {
        self.inner.record_applied(version, applied_at)
    }

    fn remove_applied(&self, version: &MigrationVersion) -> Result<(), LedgerError> {
        self.inner.remove_applied(version)
    }

    fn entries(&self) -> Result<Vec<LedgerEntry>, LedgerError> {
        self.inner.entries()
    }

    fn set_fallback(&self, version: &MigrationVersion) -> Result<(), LedgerError> {
        self.fallback_writes.fetch_add(1, Ordering::SeqCst);
        self.inner.set_fallback(version)
    }

    fn clear_fallback(&self) -> Result<(), LedgerError> {
        self.inner.clear_fallback()
    }

    fn fallback(&self) -> Result<Option<MigrationVersion>, LedgerError> {
        self.inner.fallback()
    }

    fn begin(&self, version: &MigrationVersion, direction: Direction) -> Result<(), LedgerError> {
        self.inner.begin(version, direction)
    }

    fn finish(&self) -> Result<(), LedgerError> {
        self.inner.finish()
    }

    fn in_flight(&self) -> Result<Option<InFlight>, LedgerError> {
        self.inner.in_flight()
    }
}

fn v(token: &str) -> MigrationVersion {
    MigrationVersion::new(token).unwrap()
}

fn versions(tokens: &[&str]) -> Vec<MigrationVersion> {
    tokens.iter().map(|t| v(t)).collect()
}

#[test]
fn test_all_units_succeed() {
    let dir = tempfile::tempdir().unwrap();
    let (mut runner, journal, _) = Fixture::new(true).runner(SledLedger::open_path(dir.path()).unwrap());

    let summary = runner
        .run_upgrade(None, &v("v3"), &RunContext::default())
        .unwrap();

    assert_eq!(summary.state, RunState::Succeeded);
    assert_eq!(runner.state(), &RunState::Succeeded);
    assert_eq!(summary.executed, versions(&["v1", "v2", "v3"]));
    assert_eq!(*journal.lock(), vec!["up:A", "up:B", "up:C"]);

    let status = runner.status().unwrap();
    assert_eq!(status.applied_versions, versions(&["v1", "v2", "v3"]));
    assert_eq!(status.fallback_version, None);

    // The ledger survives a restart.
    drop(runner);
    let reopened = SledLedger::open_path(dir.path()).unwrap();
    assert_eq!(reopened.list_applied().unwrap(), versions(&["v1", "v2", "v3"]));
}

#[test]
fn test_failure_records_fallback_and_halts() {
    let (mut runner, journal, fail_b) = Fixture::new(true).runner(CountingLedger::default());
    fail_b.store(true, Ordering::SeqCst);
    let log = MemoryInstallLog::new();
    let run = RunContext::new(Attributes::new().with_fallback(v("v1"))).with_log(Arc::new(log.clone()));

    let err = runner.run_upgrade(None, &v("v3"), &run).unwrap_err();

    match &err {
        MigrationError::UnitFailed {
            version,
            direction,
            fallback,
            ..
        } => {
            assert_eq!(version, &v("v2"));
            assert_eq!(*direction, Direction::Up);
            assert_eq!(fallback.as_ref(), Some(&v("v1")));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(matches!(err.root_cause(), MigrationError::PreconditionFailed { .. }));

    // C is never invoked once B fails.
    assert_eq!(*journal.lock(), vec!["up:A", "up:B"]);
    assert_eq!(runner.state().failed_version(), Some(&v("v2")));
    assert!(matches!(
        runner.state(),
        RunState::RolledBackTo { fallback, .. } if fallback == &v("v1")
    ));

    let status = runner.status().unwrap();
    assert_eq!(status.applied_versions, versions(&["v1"]));
    assert_eq!(status.fallback_version, Some(v("v1")));
    assert!(status.in_flight.is_none());
    assert!(!runner.ledger().is_applied(&v("v2")).unwrap());
    assert_eq!(runner.ledger().fallback_writes.load(Ordering::SeqCst), 1);

    assert!(log.contains("Migration v2 (B) failed"));
    assert!(log.contains("Fallback version v1 recorded"));
}

#[test]
fn test_rerun_after_fix_resumes() {
    let (mut runner, journal, fail_b) = Fixture::new(true).runner(MemoryLedger::new());
    let run = RunContext::new(Attributes::new().with_fallback(v("v1")));

    fail_b.store(true, Ordering::SeqCst);
    runner.run_upgrade(None, &v("v3"), &run).unwrap_err();

    fail_b.store(false, Ordering::SeqCst);
    journal.lock().clear();
    let summary = runner.run_upgrade(None, &v("v3"), &run).unwrap();

    assert_eq!(*journal.lock(), vec!["up:B", "up:C"]);
    assert_eq!(summary.skipped, versions(&["v1"]));
    assert_eq!(summary.executed, versions(&["v2", "v3"]));
    assert_eq!(
        runner.status().unwrap().applied_versions,
        versions(&["v1", "v2", "v3"])
    );
}

#[test]
fn test_already_applied_unit_is_skipped() {
    let fixture = Fixture::new(true);
    let ledger = MemoryLedger::with_applied(&versions(&["v2"]));
    let (mut runner, journal, _) = fixture.runner(ledger);
    let log = MemoryInstallLog::new();

    runner
        .run_upgrade(None, &v("v3"), &RunContext::default().with_log(Arc::new(log.clone())))
        .unwrap();
    assert_eq!(*journal.lock(), vec!["up:A", "up:C"]);
    assert!(log.contains("Migration v1 sorts before already applied v2"));
    assert!(!log.contains("Migration v3 sorts before"));
}

#[test]
fn test_downgrade_halts_on_unsupported() {
    let (mut runner, journal, _) = Fixture::new(false).runner(MemoryLedger::new());
    runner
        .run_upgrade(None, &v("v3"), &RunContext::default())
        .unwrap();
    journal.lock().clear();

    let err = runner
        .run_downgrade(&v("v3"), Some(&v("v1")), &RunContext::default())
        .unwrap_err();

    assert!(matches!(
        err.root_cause(),
        MigrationError::DowngradeUnsupported { .. }
    ));
    assert_eq!(err.failed_version(), Some(&v("v2")));
    assert_eq!(*journal.lock(), vec!["down:C", "down:B"]);
    assert_eq!(
        runner.status().unwrap().applied_versions,
        versions(&["v1", "v2"])
    );
    assert!(matches!(runner.state(), RunState::FailedAt { version, .. } if version == &v("v2")));
    // Downgrades never record a fallback.
    assert_eq!(runner.status().unwrap().fallback_version, None);
}

#[test]
fn test_downgrade_to_start() {
    let (mut runner, journal, _) = Fixture::new(true).runner(MemoryLedger::new());
    runner
        .run_upgrade(None, &v("v2"), &RunContext::default())
        .unwrap();
    journal.lock().clear();

    assert_eq!(runner.plan_downgrade(&v("v3"), None).unwrap(), versions(&["v2", "v1"]));
    let summary = runner
        .run_downgrade(&v("v3"), None, &RunContext::default())
        .unwrap();

    assert_eq!(summary.direction, Direction::Down);
    assert_eq!(summary.executed, versions(&["v2", "v1"]));
    assert_eq!(*journal.lock(), vec!["down:B", "down:A"]);
    assert!(runner.status().unwrap().applied_versions.is_empty());
}

#[test]
fn test_unresolved_abstract_unit_runs_nothing() {
    let journal: Journal = Arc::default();
    let recorded = journal.clone();
    let registry = Registry::builder()
        .unit(
            v("v1"),
            "A",
            factory(move |_| Recorder {
                name: "A",
                journal: recorded.clone(),
                fail_up: Arc::new(AtomicBool::new(false)),
                reversible: true,
            }),
        )
        .abstract_unit(v("v2"), "context settings", "ojs_context_settings")
        .build()
        .unwrap();
    let mut runner = MigrationRunner::new(
        registry,
        NoopExecutor,
        MemoryLedger::new(),
        RunnerConfig::default(),
    );
    let run = RunContext::new(Attributes::new().with_fallback(v("v1")));

    let err = runner.run_upgrade(None, &v("v2"), &run).unwrap_err();

    assert!(matches!(
        err,
        MigrationError::UnresolvedAbstractMigration { ref version, .. } if version == &v("v2")
    ));
    assert!(journal.lock().is_empty());
    assert_eq!(runner.state(), &RunState::Pending);

    let status = runner.status().unwrap();
    assert!(status.applied_versions.is_empty());
    assert!(status.fallback_version.is_none());
    assert!(status.in_flight.is_none());
}

#[test]
fn test_interrupted_run_requires_resolution() {
    let dir = tempfile::tempdir().unwrap();
    {
        // A process that died while running v2.
        let ledger = SledLedger::open_path(dir.path()).unwrap();
        ledger.record_applied(&v("v1"), 1).unwrap();
        ledger.begin(&v("v2"), Direction::Up).unwrap();
    }

    let fixture = Fixture::new(true);
    let (mut runner, journal, _) = fixture.runner(SledLedger::open_path(dir.path()).unwrap());

    let err = runner
        .run_upgrade(None, &v("v3"), &RunContext::default())
        .unwrap_err();
    assert!(matches!(err, MigrationError::IndeterminateState { ref version } if version == &v("v2")));
    assert!(journal.lock().is_empty());

    let cleared = runner.resolve_in_flight(Resolution::NotApplied).unwrap();
    assert_eq!(cleared.map(|m| m.version), Some(v("v2")));
    assert_eq!(runner.resolve_in_flight(Resolution::NotApplied).unwrap(), None);

    runner
        .run_upgrade(None, &v("v3"), &RunContext::default())
        .unwrap();
    assert_eq!(*journal.lock(), vec!["up:B", "up:C"]);
}

#[test]
fn test_ledger_rejects_duplicate_version() {
    let dir = tempfile::tempdir().unwrap();
    let ledger = SledLedger::open_path(dir.path()).unwrap();

    ledger.record_applied(&v("v1"), 1).unwrap();
    assert!(matches!(
        ledger.record_applied(&v("v1"), 2),
        Err(LedgerError::DuplicateVersion(_))
    ));
    assert_eq!(ledger.list_applied().unwrap(), versions(&["v1"]));
}

#[test]
fn test_plan_upgrade_excludes_applied() {
    let fixture = Fixture::new(true);
    let calls_before = fixture.calls();
    let (runner, _, _) = fixture.runner(MemoryLedger::with_applied(&versions(&["v1"])));

    assert!(calls_before.is_empty());
    assert_eq!(
        runner.plan_upgrade(Some(&v("v1")), &v("v3")).unwrap(),
        versions(&["v2", "v3"])
    );
    assert_eq!(runner.plan_upgrade(None, &v("v2")).unwrap(), versions(&["v2"]));
}
