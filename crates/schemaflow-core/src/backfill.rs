//! Batched data rewrites.
//!
//! Large backfills walk a table in key order, one bounded batch at a time,
//! so no step holds every row in memory or keeps locks for the whole table.

use crate::context::MigrationContext;
use crate::error::MigrationError;
use crate::executor::{RowSet, Value};

/// Keyset-paginated read over one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeysetQuery {
    table: String,
    key_column: String,
    columns: Vec<String>,
    filter: Option<String>,
}

impl KeysetQuery {
    /// Walk `table` ordered by `key_column`, which must be unique and non-null.
    pub fn new(table: impl Into<String>, key_column: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            key_column: key_column.into(),
            columns: Vec::new(),
            filter: None,
        }
    }

    /// Extra columns to select. The key column is always selected first.
    pub fn columns<S: Into<String>>(mut self, columns: impl IntoIterator<Item = S>) -> Self {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Additional `WHERE` condition. Must not contain placeholders.
    pub fn filter(mut self, condition: impl Into<String>) -> Self {
        self.filter = Some(condition.into());
        self
    }

    fn sql(&self, first: bool, limit: usize) -> String {
        let mut select = vec![self.key_column.as_str()];
        select.extend(self.columns.iter().map(String::as_str));

        let mut conditions = Vec::new();
        if let Some(filter) = &self.filter {
            conditions.push(format!("({})", filter));
        }
        if !first {
            conditions.push(format!("{} > ?", self.key_column));
        }

        let mut sql = format!("SELECT {} FROM {}", select.join(", "), self.table);
        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }
        sql.push_str(&format!(" ORDER BY {} LIMIT {}", self.key_column, limit));
        sql
    }
}

/// Totals for a finished backfill.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackfillReport {
    /// Batches processed.
    pub batches: usize,
    /// Rows processed.
    pub rows: usize,
}

/// Feed `query`'s rows to `process` in batches of at most
/// `ctx.batch_size()` rows, in key order.
///
/// Each batch resumes strictly after the last key of the previous one, so
/// `process` may update the rows it is given.
pub fn run_batched<F>(
    ctx: &mut MigrationContext<'_>,
    query: &KeysetQuery,
    mut process: F,
) -> Result<BackfillReport, MigrationError>
where
    F: FnMut(&mut MigrationContext<'_>, &RowSet) -> Result<(), MigrationError>,
{
    let limit = ctx.batch_size();
    let mut report = BackfillReport::default();
    let mut last_key: Option<Value> = None;

    loop {
        let rows = match &last_key {
            None => ctx.execute(&query.sql(true, limit), &[])?,
            Some(key) => ctx.execute(&query.sql(false, limit), std::slice::from_ref(key))?,
        };
        if rows.is_empty() {
            break;
        }

        process(ctx, &rows)?;
        report.batches += 1;
        report.rows += rows.len();

        tracing::debug!(
            version = %ctx.version(),
            table = %query.table,
            batch = report.batches,
            rows = report.rows,
            "backfill batch processed"
        );

        let key = rows
            .rows
            .last()
            .and_then(|row| row.first())
            .filter(|value| !value.is_null())
            .cloned()
            .ok_or_else(|| {
                MigrationError::precondition(format!(
                    "{}.{} contains NULL keys",
                    query.table, query.key_column
                ))
            })?;
        last_key = Some(key);

        if rows.len() < limit {
            break;
        }
    }

    Ok(report)
}
