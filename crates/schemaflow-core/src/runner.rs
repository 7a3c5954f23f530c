//! Migration runner.
//!
//! Applies or reverts the registry's ordered unit list one unit at a time.
//! Each unit is bracketed by the ledger's in-flight marker; the ledger write
//! is the only point at which a unit counts as done.

use crate::config::RunnerConfig;
use crate::context::{MigrationContext, RunContext};
use crate::error::{Direction, MigrationError};
use crate::executor::Executor;
use crate::ledger::{current_timestamp, InFlight, Ledger, LedgerStatus};
use crate::registry::{Registry, ResolvedMigration};
use crate::version::MigrationVersion;
use serde::Serialize;
use std::time::{Duration, Instant};

/// Runner state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RunState {
    /// No unit has started.
    Pending,
    /// A unit is executing.
    Running {
        /// Version being run.
        version: MigrationVersion,
    },
    /// Every unit in range completed.
    Succeeded,
    /// A unit failed and no fallback was recorded.
    FailedAt {
        /// Version that failed.
        version: MigrationVersion,
        /// Rendered error.
        error: String,
    },
    /// A unit failed and the fallback marker was recorded.
    RolledBackTo {
        /// Recorded fallback version.
        fallback: MigrationVersion,
        /// Version that failed.
        failed: MigrationVersion,
        /// Rendered error.
        error: String,
    },
}

impl RunState {
    /// Whether the run halted on a unit failure.
    pub fn is_failed(&self) -> bool {
        matches!(self, RunState::FailedAt { .. } | RunState::RolledBackTo { .. })
    }

    /// Version of the failed unit.
    pub fn failed_version(&self) -> Option<&MigrationVersion> {
        match self {
            RunState::FailedAt { version, .. } => Some(version),
            RunState::RolledBackTo { failed, .. } => Some(failed),
            _ => None,
        }
    }
}

/// Outcome of a completed run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    /// Direction of the run.
    pub direction: Direction,
    /// Versions run, in order. In dry-run mode, the versions that would run.
    pub executed: Vec<MigrationVersion>,
    /// Versions skipped because the ledger already had them.
    pub skipped: Vec<MigrationVersion>,
    /// Final state.
    pub state: RunState,
    /// Wall time.
    pub elapsed: Duration,
    /// Whether this was a dry run.
    pub dry_run: bool,
}

/// Operator verdict on a unit interrupted by a previous run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// The unit's forward changes are present in the database.
    Applied,
    /// The unit's forward changes are absent.
    NotApplied,
}

/// Sequential migration runner.
pub struct MigrationRunner<E: Executor, L: Ledger> {
    registry: Registry,
    executor: E,
    ledger: L,
    config: RunnerConfig,
    state: RunState,
}

impl<E: Executor, L: Ledger> MigrationRunner<E, L> {
    /// Create a runner.
    pub fn new(registry: Registry, executor: E, ledger: L, config: RunnerConfig) -> Self {
        Self {
            registry,
            executor,
            ledger,
            config,
            state: RunState::Pending,
        }
    }

    /// The registry.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// The ledger.
    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    /// The executor.
    pub fn executor_mut(&mut self) -> &mut E {
        &mut self.executor
    }

    /// The configuration.
    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// State of the last run.
    pub fn state(&self) -> &RunState {
        &self.state
    }

    /// Take the executor and ledger back.
    pub fn into_parts(self) -> (E, L) {
        (self.executor, self.ledger)
    }

    /// Ledger snapshot.
    pub fn status(&self) -> Result<LedgerStatus, MigrationError> {
        Ok(self.ledger.status()?)
    }

    /// Versions an upgrade over `(from, to]` would run.
    pub fn plan_upgrade(
        &self,
        from: Option<&MigrationVersion>,
        to: &MigrationVersion,
    ) -> Result<Vec<MigrationVersion>, MigrationError> {
        let mut plan = Vec::new();
        for unit in self.registry.for_upgrade(from, to)? {
            if !self.ledger.is_applied(&unit.version)? {
                plan.push(unit.version);
            }
        }
        Ok(plan)
    }

    /// Versions a downgrade over `(to, from]` would revert, in order.
    pub fn plan_downgrade(
        &self,
        from: &MigrationVersion,
        to: Option<&MigrationVersion>,
    ) -> Result<Vec<MigrationVersion>, MigrationError> {
        Ok(self
            .registry
            .for_downgrade(from, to, &self.ledger)?
            .into_iter()
            .map(|unit| unit.version)
            .collect())
    }

    /// Apply every unit in `(from, to]` that the ledger does not record.
    ///
    /// Halts on the first failure. If the run attributes carry a fallback
    /// version it is recorded in the ledger before the error is returned.
    pub fn run_upgrade(
        &mut self,
        from: Option<&MigrationVersion>,
        to: &MigrationVersion,
        run: &RunContext,
    ) -> Result<RunSummary, MigrationError> {
        let started = Instant::now();
        self.state = RunState::Pending;
        self.check_preconditions()?;

        let units = self.registry.for_upgrade(from, to)?;
        tracing::info!(
            from = from.map(|v| v.as_str()).unwrap_or("<start>"),
            to = %to,
            units = units.len(),
            dry_run = self.config.dry_run,
            "starting upgrade"
        );

        let newest_applied = self.ledger.list_applied()?.into_iter().max();
        let mut executed = Vec::new();
        let mut skipped = Vec::new();

        for unit in units {
            if self.ledger.is_applied(&unit.version)? {
                tracing::debug!(version = %unit.version, "already applied, skipping");
                skipped.push(unit.version);
                continue;
            }

            if let Some(newest) = newest_applied.as_ref().filter(|newest| unit.version < **newest) {
                tracing::warn!(
                    version = %unit.version,
                    newest_applied = %newest,
                    "applying migration out of order"
                );
                run.log.log(&format!(
                    "Migration {} sorts before already applied {}; applying out of order",
                    unit.version, newest
                ));
            }

            if self.config.dry_run {
                run.log.log(&format!("Would run migration {} ({})", unit.version, unit.name));
                executed.push(unit.version);
                continue;
            }

            self.run_unit(&unit, Direction::Up, run)?;
            executed.push(unit.version);
        }

        self.state = RunState::Succeeded;
        let summary = RunSummary {
            direction: Direction::Up,
            executed,
            skipped,
            state: self.state.clone(),
            elapsed: started.elapsed(),
            dry_run: self.config.dry_run,
        };

        tracing::info!(
            executed = summary.executed.len(),
            skipped = summary.skipped.len(),
            elapsed_ms = summary.elapsed.as_millis() as u64,
            "upgrade complete"
        );
        Ok(summary)
    }

    /// Revert every applied unit in `(to, from]`, newest first.
    ///
    /// Halts on the first failure, including a unit that cannot be inverted.
    /// No fallback is recorded for downgrades.
    pub fn run_downgrade(
        &mut self,
        from: &MigrationVersion,
        to: Option<&MigrationVersion>,
        run: &RunContext,
    ) -> Result<RunSummary, MigrationError> {
        let started = Instant::now();
        self.state = RunState::Pending;
        self.check_preconditions()?;

        let units = self.registry.for_downgrade(from, to, &self.ledger)?;
        tracing::info!(
            from = %from,
            to = to.map(|v| v.as_str()).unwrap_or("<start>"),
            units = units.len(),
            dry_run = self.config.dry_run,
            "starting downgrade"
        );

        let mut executed = Vec::new();
        for unit in units {
            if self.config.dry_run {
                run.log.log(&format!("Would revert migration {} ({})", unit.version, unit.name));
                executed.push(unit.version);
                continue;
            }

            self.run_unit(&unit, Direction::Down, run)?;
            executed.push(unit.version);
        }

        self.state = RunState::Succeeded;
        let summary = RunSummary {
            direction: Direction::Down,
            executed,
            skipped: Vec::new(),
            state: self.state.clone(),
            elapsed: started.elapsed(),
            dry_run: self.config.dry_run,
        };

        tracing::info!(
            reverted = summary.executed.len(),
            elapsed_ms = summary.elapsed.as_millis() as u64,
            "downgrade complete"
        );
        Ok(summary)
    }

    /// Settle a unit interrupted by a previous run.
    ///
    /// Brings the ledger entry in line with the operator's verdict and clears
    /// the in-flight marker. Returns the marker that was cleared, if any.
    pub fn resolve_in_flight(
        &mut self,
        resolution: Resolution,
    ) -> Result<Option<InFlight>, MigrationError> {
        let Some(marker) = self.ledger.in_flight()? else {
            return Ok(None);
        };

        let recorded = self.ledger.is_applied(&marker.version)?;
        match resolution {
            Resolution::Applied if !recorded => {
                self.ledger.record_applied(&marker.version, current_timestamp())?;
            }
            Resolution::NotApplied if recorded => {
                self.ledger.remove_applied(&marker.version)?;
            }
            _ => {}
        }
        self.ledger.finish()?;

        tracing::warn!(
            version = %marker.version,
            direction = %marker.direction,
            resolution = ?resolution,
            "in-flight migration resolved by operator"
        );
        Ok(Some(marker))
    }

    /// Record a version without running it.
    pub fn mark_applied(&mut self, version: &MigrationVersion) -> Result<(), MigrationError> {
        if !self.registry.contains(version) {
            tracing::warn!(version = %version, "marking a version the registry does not know");
        }
        self.ledger.record_applied(version, current_timestamp())?;
        tracing::info!(version = %version, "version marked applied");
        Ok(())
    }

    /// Remove a version from the ledger without running its inverse.
    pub fn forget(&mut self, version: &MigrationVersion) -> Result<(), MigrationError> {
        self.ledger.remove_applied(version)?;
        tracing::info!(version = %version, "version removed from ledger");
        Ok(())
    }

    /// Set the fallback marker by hand.
    pub fn set_fallback(&mut self, version: &MigrationVersion) -> Result<(), MigrationError> {
        self.ledger.set_fallback(version)?;
        tracing::info!(version = %version, "fallback marker set");
        Ok(())
    }

    /// Clear the fallback marker.
    pub fn clear_fallback(&mut self) -> Result<(), MigrationError> {
        self.ledger.clear_fallback()?;
        tracing::info!("fallback marker cleared");
        Ok(())
    }

    fn check_preconditions(&self) -> Result<(), MigrationError> {
        if let Some(marker) = self.ledger.in_flight()? {
            tracing::error!(
                version = %marker.version,
                direction = %marker.direction,
                "previous run was interrupted mid-migration"
            );
            return Err(MigrationError::IndeterminateState {
                version: marker.version,
            });
        }

        if self.config.stop_on_unknown_applied {
            let unknown = self.registry.unknown_applied(&self.ledger)?;
            if !unknown.is_empty() {
                let listed: Vec<&str> = unknown.iter().map(|v| v.as_str()).collect();
                return Err(MigrationError::InvalidRegistry {
                    message: format!(
                        "ledger records versions the registry does not know: {}",
                        listed.join(", ")
                    ),
                });
            }
        }

        Ok(())
    }

    fn run_unit(
        &mut self,
        unit: &ResolvedMigration,
        direction: Direction,
        run: &RunContext,
    ) -> Result<(), MigrationError> {
        self.state = RunState::Running {
            version: unit.version.clone(),
        };
        let verb = match direction {
            Direction::Up => "Running",
            Direction::Down => "Reverting",
        };
        run.log.log(&format!("{} migration {} ({})", verb, unit.version, unit.name));
        tracing::info!(version = %unit.version, name = %unit.name, direction = %direction, "migration started");

        self.ledger.begin(&unit.version, direction)?;
        let unit_started = Instant::now();

        let migration = unit.instantiate(&run.attributes);
        let result = {
            let mut ctx = MigrationContext::new(
                &mut self.executor,
                run,
                &unit.version,
                self.config.backfill_batch_size,
            );
            let step = |ctx: &mut MigrationContext<'_>| match direction {
                Direction::Up => migration.up(ctx),
                Direction::Down => migration.down(ctx),
            };
            if migration.transactional() {
                ctx.transaction(step)
            } else {
                step(&mut ctx)
            }
        };

        if let Err(err) = result {
            // The unit reported its own failure, so its state is known.
            if let Err(ledger_err) = self.ledger.finish() {
                tracing::error!(
                    version = %unit.version,
                    error = %ledger_err,
                    "failed to clear in-flight marker"
                );
                run.log.log(&format!(
                    "Could not clear in-flight marker for {}: {}",
                    unit.version, ledger_err
                ));
            }
            return Err(self.fail(unit, direction, err, run));
        }

        let recorded = match direction {
            Direction::Up => self.ledger.record_applied(&unit.version, current_timestamp()),
            Direction::Down => self.ledger.remove_applied(&unit.version),
        };
        if let Err(err) = recorded {
            // The marker stays: the unit ran but the ledger does not say so.
            return Err(self.fail(unit, direction, err.into(), run));
        }
        if let Err(err) = self.ledger.finish() {
            // Recorded, but the marker stays and blocks the next run.
            tracing::error!(
                version = %unit.version,
                error = %err,
                "failed to clear in-flight marker"
            );
            let err = MigrationError::from(err);
            run.log.log(&format!(
                "Migration {} ({}) completed but its in-flight marker remains: {}",
                unit.version, unit.name, err
            ));
            self.state = RunState::FailedAt {
                version: unit.version.clone(),
                error: err.to_string(),
            };
            return Err(MigrationError::UnitFailed {
                version: unit.version.clone(),
                direction,
                fallback: None,
                source: Box::new(err),
            });
        }

        tracing::info!(
            version = %unit.version,
            direction = %direction,
            elapsed_ms = unit_started.elapsed().as_millis() as u64,
            "migration finished"
        );
        Ok(())
    }

    fn fail(
        &mut self,
        unit: &ResolvedMigration,
        direction: Direction,
        err: MigrationError,
        run: &RunContext,
    ) -> MigrationError {
        tracing::error!(
            version = %unit.version,
            name = %unit.name,
            direction = %direction,
            error = %err,
            "migration failed"
        );
        run.log.log(&format!("Migration {} ({}) failed: {}", unit.version, unit.name, err));

        let mut fallback = None;
        if direction == Direction::Up {
            if let Some(version) = run.attributes.fallback() {
                match self.ledger.set_fallback(version) {
                    Ok(()) => {
                        run.log.log(&format!("Fallback version {} recorded", version));
                        tracing::warn!(fallback = %version, "fallback version recorded");
                        fallback = Some(version.clone());
                    }
                    Err(ledger_err) => {
                        tracing::error!(
                            fallback = %version,
                            error = %ledger_err,
                            "failed to record fallback version"
                        );
                    }
                }
            }
        }

        self.state = match &fallback {
            Some(version) => RunState::RolledBackTo {
                fallback: version.clone(),
                failed: unit.version.clone(),
                error: err.to_string(),
            },
            None => RunState::FailedAt {
                version: unit.version.clone(),
                error: err.to_string(),
            },
        };

        MigrationError::UnitFailed {
            version: unit.version.clone(),
            direction,
            fallback,
            source: Box::new(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{ExecutorError, RowSet, SchemaChange, Value};
    use crate::ledger::MemoryLedger;
    use crate::log::MemoryInstallLog;
    use crate::context::Attributes;
    use crate::ledger::{LedgerEntry, LedgerError};
    use crate::unit::{factory, Migration};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[derive(Default)]
    struct NullExecutor {
        begins: usize,
        commits: usize,
        rollbacks: usize,
    }

    impl Executor for NullExecutor {
        fn execute(&mut self, _sql: &str, _params: &[Value]) -> Result<RowSet, ExecutorError> {
            Ok(RowSet::default())
        }

        fn begin(&mut self) -> Result<(), ExecutorError> {
            self.begins += 1;
            Ok(())
        }

        fn commit(&mut self) -> Result<(), ExecutorError> {
            self.commits += 1;
            Ok(())
        }

        fn rollback(&mut self) -> Result<(), ExecutorError> {
            self.rollbacks += 1;
            Ok(())
        }

        fn alter_schema(&mut self, _change: &SchemaChange) -> Result<(), ExecutorError> {
            Ok(())
        }

        fn has_table(&mut self, _table: &str) -> Result<bool, ExecutorError> {
            Ok(false)
        }

        fn has_column(&mut self, _table: &str, _column: &str) -> Result<bool, ExecutorError> {
            Ok(false)
        }
    }

    struct Step {
        fail: bool,
        transactional: bool,
    }

    impl Migration for Step {
        fn up(&self, _ctx: &mut MigrationContext<'_>) -> Result<(), MigrationError> {
            if self.fail {
                Err(MigrationError::precondition("boom"))
            } else {
                Ok(())
            }
        }

        fn down(&self, _ctx: &mut MigrationContext<'_>) -> Result<(), MigrationError> {
            Ok(())
        }

        fn transactional(&self) -> bool {
            self.transactional
        }
    }

    fn v(token: &str) -> MigrationVersion {
        MigrationVersion::new(token).unwrap()
    }

    fn runner(fail_v2: bool, transactional: bool) -> MigrationRunner<NullExecutor, MemoryLedger> {
        runner_with(MemoryLedger::new(), fail_v2, transactional)
    }

    fn runner_with<L: Ledger>(
        ledger: L,
        fail_v2: bool,
        transactional: bool,
    ) -> MigrationRunner<NullExecutor, L> {
        let registry = Registry::builder()
            .unit(v("v1"), "a", factory(move |_| Step { fail: false, transactional }))
            .unit(v("v2"), "b", factory(move |_| Step { fail: fail_v2, transactional }))
            .build()
            .unwrap();
        MigrationRunner::new(registry, NullExecutor::default(), ledger, RunnerConfig::default())
    }

    /// Memory ledger whose marker and record writes can be made to fail.
    #[derive(Default)]
    struct FlakyLedger {
        inner: MemoryLedger,
        fail_finish: AtomicBool,
        fail_record: AtomicBool,
    }

    impl FlakyLedger {
        fn disk_full() -> LedgerError {
            LedgerError::Serialization("disk full".to_string())
        }
    }

    impl Ledger for FlakyLedger {
        fn is_applied(&self, version: &MigrationVersion) -> Result<bool, LedgerError> {
            self.inner.is_applied(version)
        }

        fn record_applied(&self, version: &MigrationVersion, applied_at: u64) -> Result<(), LedgerError> {
            if self.fail_record.load(Ordering::SeqCst) {
                return Err(Self::disk_full());
            }
            self.inner.record_applied(version, applied_at)
        }

        fn remove_applied(&self, version: &MigrationVersion) -> Result<(), LedgerError> {
            self.inner.remove_applied(version)
        }

        fn entries(&self) -> Result<Vec<LedgerEntry>, LedgerError> {
            self.inner.entries()
        }

        fn set_fallback(&self, version: &MigrationVersion) -> Result<(), LedgerError> {
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
            if self.fail_finish.load(Ordering::SeqCst) {
                return Err(Self::disk_full());
            }
            self.inner.finish()
        }

        fn in_flight(&self) -> Result<Option<InFlight>, LedgerError> {
            self.inner.in_flight()
        }
    }

    #[test]
    fn test_state_transitions() {
        let mut runner = runner(false, false);
        assert_eq!(runner.state(), &RunState::Pending);

        let summary = runner
            .run_upgrade(None, &v("v2"), &RunContext::default())
            .unwrap();
        assert_eq!(summary.state, RunState::Succeeded);
        assert_eq!(summary.executed, vec![v("v1"), v("v2")]);
        assert!(runner.ledger().in_flight().unwrap().is_none());
    }

    #[test]
    fn test_failure_without_fallback() {
        let mut runner = runner(true, false);
        let err = runner
            .run_upgrade(None, &v("v2"), &RunContext::default())
            .unwrap_err();

        assert_eq!(err.failed_version(), Some(&v("v2")));
        assert!(matches!(runner.state(), RunState::FailedAt { version, .. } if version == &v("v2")));
        assert!(runner.ledger().fallback().unwrap().is_none());
        assert!(runner.ledger().in_flight().unwrap().is_none());
    }

    #[test]
    fn test_unit_error_survives_marker_failure() {
        let ledger = FlakyLedger::default();
        ledger.fail_finish.store(true, Ordering::SeqCst);
        let mut runner = runner_with(ledger, true, false);
        runner.ledger().inner.record_applied(&v("v1"), 1).unwrap();
        let run = RunContext::new(Attributes::new().with_fallback(v("v1")));

        let err = runner.run_upgrade(None, &v("v2"), &run).unwrap_err();

        assert_eq!(err.failed_version(), Some(&v("v2")));
        assert!(matches!(err.root_cause(), MigrationError::PreconditionFailed { .. }));
        assert!(matches!(
            runner.state(),
            RunState::RolledBackTo { fallback, failed, .. } if fallback == &v("v1") && failed == &v("v2")
        ));
        assert_eq!(runner.ledger().fallback().unwrap(), Some(v("v1")));
        assert_eq!(runner.ledger().in_flight().unwrap().map(|m| m.version), Some(v("v2")));
    }

    #[test]
    fn test_record_failure_keeps_marker() {
        let ledger = FlakyLedger::default();
        ledger.fail_record.store(true, Ordering::SeqCst);
        let mut runner = runner_with(ledger, false, false);

        let err = runner
            .run_upgrade(None, &v("v2"), &RunContext::default())
            .unwrap_err();

        assert_eq!(err.failed_version(), Some(&v("v1")));
        assert!(matches!(err.root_cause(), MigrationError::Ledger(LedgerError::Serialization(_))));
        assert!(matches!(runner.state(), RunState::FailedAt { version, .. } if version == &v("v1")));
        assert!(!runner.ledger().is_applied(&v("v1")).unwrap());
        assert_eq!(runner.ledger().in_flight().unwrap().map(|m| m.version), Some(v("v1")));
    }

    #[test]
    fn test_recorded_unit_with_stuck_marker() {
        let ledger = FlakyLedger::default();
        ledger.fail_finish.store(true, Ordering::SeqCst);
        let mut runner = runner_with(ledger, false, false);

        let err = runner
            .run_upgrade(None, &v("v2"), &RunContext::default())
            .unwrap_err();

        assert_eq!(err.failed_version(), Some(&v("v1")));
        assert!(runner.ledger().is_applied(&v("v1")).unwrap());
        assert!(!runner.ledger().is_applied(&v("v2")).unwrap());
        assert!(matches!(runner.state(), RunState::FailedAt { version, .. } if version == &v("v1")));
        assert_eq!(runner.ledger().in_flight().unwrap().map(|m| m.version), Some(v("v1")));
    }

    #[test]
    fn test_out_of_order_unit_is_logged() {
        let mut runner = runner(false, false);
        runner.mark_applied(&v("v2")).unwrap();
        let log = MemoryInstallLog::new();
        let run = RunContext::default().with_log(Arc::new(log.clone()));

        let summary = runner.run_upgrade(None, &v("v2"), &run).unwrap();
        assert_eq!(summary.executed, vec![v("v1")]);
        assert!(log.contains("Migration v1 sorts before already applied v2"));
    }

    #[test]
    fn test_transactional_unit_rolls_back() {
        let mut runner = runner(true, true);
        let _ = runner.run_upgrade(None, &v("v2"), &RunContext::default());

        let (executor, _) = runner.into_parts();
        assert_eq!(executor.begins, 2);
        assert_eq!(executor.commits, 1);
        assert_eq!(executor.rollbacks, 1);
    }

    #[test]
    fn test_dry_run_touches_nothing() {
        let mut runner = runner(true, false);
        runner.config = RunnerConfig::new().with_dry_run(true);
        let log = MemoryInstallLog::new();
        let run = RunContext::default().with_log(Arc::new(log.clone()));

        let summary = runner.run_upgrade(None, &v("v2"), &run).unwrap();
        assert!(summary.dry_run);
        assert_eq!(summary.executed, vec![v("v1"), v("v2")]);
        assert!(runner.ledger().list_applied().unwrap().is_empty());
        assert!(log.contains("Would run migration v2"));
    }

    #[test]
    fn test_in_flight_marker_blocks_run() {
        let mut runner = runner(false, false);
        runner.ledger().begin(&v("v1"), Direction::Up).unwrap();

        let err = runner
            .run_upgrade(None, &v("v2"), &RunContext::default())
            .unwrap_err();
        assert!(matches!(err, MigrationError::IndeterminateState { ref version } if version == &v("v1")));

        let marker = runner.resolve_in_flight(Resolution::Applied).unwrap();
        assert_eq!(marker.map(|m| m.version), Some(v("v1")));
        assert!(runner.ledger().is_applied(&v("v1")).unwrap());

        let summary = runner
            .run_upgrade(None, &v("v2"), &RunContext::default())
            .unwrap();
        assert_eq!(summary.skipped, vec![v("v1")]);
        assert_eq!(summary.executed, vec![v("v2")]);
    }

    #[test]
    fn test_stop_on_unknown_applied() {
        let mut runner = runner(false, false);
        runner.config = RunnerConfig::new().with_stop_on_unknown_applied(true);
        runner.mark_applied(&v("v0_legacy")).unwrap();

        let err = runner
            .run_upgrade(None, &v("v2"), &RunContext::default())
            .unwrap_err();
        assert!(matches!(err, MigrationError::InvalidRegistry { .. }));
        assert_eq!(runner.plan_upgrade(None, &v("v2")).unwrap(), vec![v("v1"), v("v2")]);
    }

    #[test]
    fn test_admin_repair() {
        let mut runner = runner(false, false);
        runner.mark_applied(&v("v1")).unwrap();
        assert!(matches!(
            runner.mark_applied(&v("v1")),
            Err(MigrationError::DuplicateVersion { .. })
        ));
        runner.forget(&v("v1")).unwrap();
        assert!(matches!(runner.forget(&v("v1")), Err(MigrationError::NotFound { .. })));

        runner.set_fallback(&v("v1")).unwrap();
        assert_eq!(runner.status().unwrap().fallback_version, Some(v("v1")));
        runner.clear_fallback().unwrap();
        assert_eq!(runner.status().unwrap().fallback_version, None);
    }
}
