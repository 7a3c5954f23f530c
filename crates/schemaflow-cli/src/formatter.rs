//! Output formatters for command results.

use chrono::{DateTime, Utc};
use clap::ValueEnum;
use comfy_table::{Cell, Table};
use schemaflow_core::{Direction, InFlight, LedgerEntry, MigrationVersion, RunState, RunSummary};
use serde::Serialize;

/// Output format for results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// ASCII table format
    Table,
    /// JSON format
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Table => write!(f, "table"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

/// Ledger contents as shown by `status`.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    /// Applied entries in application order.
    pub applied: Vec<LedgerEntry>,
    /// Fallback marker.
    pub fallback_version: Option<MigrationVersion>,
    /// Interrupted migration, if any.
    pub in_flight: Option<InFlight>,
}

/// Versions a run would touch.
#[derive(Debug, Clone, Serialize)]
pub struct PlanReport {
    /// Direction of the planned run.
    pub direction: Direction,
    /// Versions in execution order.
    pub versions: Vec<MigrationVersion>,
}

/// Trait for formatting output.
pub trait Formatter {
    /// Format the ledger status.
    fn format_status(&self, status: &StatusReport) -> String;

    /// Format a plan.
    fn format_plan(&self, plan: &PlanReport) -> String;

    /// Format a run summary.
    fn format_summary(&self, summary: &RunSummary) -> String;

    /// Format a simple message.
    fn format_message(&self, message: &str) -> String;
}

/// Create a formatter for the given output format.
pub fn create_formatter(format: OutputFormat) -> Box<dyn Formatter> {
    match format {
        OutputFormat::Table => Box::new(TableFormatter),
        OutputFormat::Json => Box::new(JsonFormatter),
    }
}

fn format_timestamp(micros: u64) -> String {
    let secs = (micros / 1_000_000) as i64;
    let nanos = ((micros % 1_000_000) * 1_000) as u32;
    DateTime::<Utc>::from_timestamp(secs, nanos)
        .map(|ts| ts.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| micros.to_string())
}

fn describe_state(state: &RunState) -> String {
    match state {
        RunState::Pending => "pending".to_string(),
        RunState::Running { version } => format!("running {}", version),
        RunState::Succeeded => "succeeded".to_string(),
        RunState::FailedAt { version, .. } => format!("failed at {}", version),
        RunState::RolledBackTo { fallback, failed, .. } => {
            format!("failed at {}, fallback {}", failed, fallback)
        }
    }
}

/// Table formatter using comfy-table.
pub struct TableFormatter;

impl Formatter for TableFormatter {
    fn format_status(&self, status: &StatusReport) -> String {
        let mut output = if status.applied.is_empty() {
            "No migrations applied".to_string()
        } else {
            let mut table = Table::new();
            table.set_header(vec!["#", "Version", "Applied at"]);
            for (idx, entry) in status.applied.iter().enumerate() {
                table.add_row(vec![
                    Cell::new(idx + 1),
                    Cell::new(entry.version.as_str()),
                    Cell::new(format_timestamp(entry.applied_at)),
                ]);
            }
            table.to_string()
        };

        output.push_str(&format!(
            "\nFallback version: {}",
            status
                .fallback_version
                .as_ref()
                .map_or("none", |v| v.as_str())
        ));
        if let Some(marker) = &status.in_flight {
            output.push_str(&format!(
                "\nInterrupted {} of {} (started {})",
                marker.direction,
                marker.version,
                format_timestamp(marker.started_at)
            ));
        }
        output
    }

    fn format_plan(&self, plan: &PlanReport) -> String {
        if plan.versions.is_empty() {
            return format!("Nothing to {}", plan.direction);
        }

        let mut table = Table::new();
        table.set_header(vec!["Step", "Version", "Branch"]);
        for (idx, version) in plan.versions.iter().enumerate() {
            table.add_row(vec![
                Cell::new(idx + 1),
                Cell::new(version.as_str()),
                Cell::new(version.branch().unwrap_or("-")),
            ]);
        }
        format!("{}\n{} migration(s) to {}", table, plan.versions.len(), plan.direction)
    }

    fn format_summary(&self, summary: &RunSummary) -> String {
        let verb = match (summary.direction, summary.dry_run) {
            (Direction::Up, false) => "Applied",
            (Direction::Down, false) => "Reverted",
            (_, true) => "Would run",
        };
        let mut output = format!(
            "{} {} migration(s) in {:.2?}",
            verb,
            summary.executed.len(),
            summary.elapsed
        );
        for version in &summary.executed {
            output.push_str(&format!("\n  {}", version));
        }
        if !summary.skipped.is_empty() {
            output.push_str(&format!("\nSkipped {} already applied", summary.skipped.len()));
        }
        output.push_str(&format!("\nState: {}", describe_state(&summary.state)));
        output
    }

    fn format_message(&self, message: &str) -> String {
        message.to_string()
    }
}

/// JSON formatter.
pub struct JsonFormatter;

impl JsonFormatter {
    fn render<T: Serialize>(value: &T) -> String {
        serde_json::to_string_pretty(value)
            .unwrap_or_else(|e| serde_json::json!({ "error": e.to_string() }).to_string())
    }
}

impl Formatter for JsonFormatter {
    fn format_status(&self, status: &StatusReport) -> String {
        Self::render(status)
    }

    fn format_plan(&self, plan: &PlanReport) -> String {
        Self::render(plan)
    }

    fn format_summary(&self, summary: &RunSummary) -> String {
        Self::render(summary)
    }

    fn format_message(&self, message: &str) -> String {
        Self::render(&serde_json::json!({ "message": message }))
    }
}
