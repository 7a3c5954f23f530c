//! Database executor abstraction.
//!
//! The engine never talks to a database driver directly. Every statement,
//! transaction boundary and structural change goes through [`Executor`], and
//! dialect differences (quoting, type names, DDL syntax) stay inside the
//! adapter that implements it.

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteExecutor;

use std::fmt;
use thiserror::Error;

/// A scalar value bound to or read from a statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// SQL NULL.
    Null,
    /// 64-bit integer.
    Integer(i64),
    /// Double precision float.
    Real(f64),
    /// UTF-8 text.
    Text(String),
    /// Raw bytes.
    Blob(Vec<u8>),
}

impl Value {
    /// Returns true for SQL NULL.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Integer payload, if this is an integer.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(v) => Some(*v),
            _ => None,
        }
    }

    /// Text payload, if this is text.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Integer(v) => write!(f, "{}", v),
            Value::Real(v) => write!(f, "{}", v),
            Value::Text(v) => write!(f, "{}", v),
            Value::Blob(v) => write!(f, "<{} bytes>", v.len()),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(i64::from(v))
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Integer(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Real(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Blob(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// Result of executing a statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowSet {
    /// Column names, in select order.
    pub columns: Vec<String>,
    /// Row values, each aligned with `columns`.
    pub rows: Vec<Vec<Value>>,
    /// Rows changed by a DML statement.
    pub rows_affected: usize,
}

impl RowSet {
    /// Result of a statement that returned no rows.
    pub fn affected(rows_affected: usize) -> Self {
        Self {
            rows_affected,
            ..Default::default()
        }
    }

    /// Number of returned rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether no rows were returned.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of a column by name.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Value at `row` in the named column.
    pub fn value(&self, row: usize, column: &str) -> Option<&Value> {
        let idx = self.column_index(column)?;
        self.rows.get(row)?.get(idx)
    }

    /// First column of the first row, for scalar queries.
    pub fn scalar(&self) -> Option<&Value> {
        self.rows.first()?.first()
    }
}

/// Logical column type. Adapters map these to dialect type names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Integer,
    BigInteger,
    Real,
    Text,
    VarChar(u32),
    Blob,
    Boolean,
    Timestamp,
    Json,
}

/// Column definition used by structural changes.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDef {
    /// Column name.
    pub name: String,
    /// Logical type.
    pub ty: ColumnType,
    /// Whether NULL is allowed.
    pub nullable: bool,
    /// Default value, if any.
    pub default: Option<Value>,
}

impl ColumnDef {
    /// A NOT NULL column without a default.
    pub fn new(name: impl Into<String>, ty: ColumnType) -> Self {
        Self {
            name: name.into(),
            ty,
            nullable: false,
            default: None,
        }
    }

    /// A nullable column.
    pub fn nullable(name: impl Into<String>, ty: ColumnType) -> Self {
        Self {
            nullable: true,
            ..Self::new(name, ty)
        }
    }

    /// Set the default value.
    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }
}

/// A structural schema change.
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaChange {
    CreateTable {
        table: String,
        columns: Vec<ColumnDef>,
        primary_key: Vec<String>,
    },
    DropTable {
        table: String,
    },
    RenameTable {
        from: String,
        to: String,
    },
    AddColumn {
        table: String,
        column: ColumnDef,
    },
    DropColumn {
        table: String,
        column: String,
    },
    RenameColumn {
        table: String,
        from: String,
        to: String,
    },
    CreateIndex {
        table: String,
        name: String,
        columns: Vec<String>,
        unique: bool,
    },
    DropIndex {
        table: String,
        name: String,
    },
}

impl fmt::Display for SchemaChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaChange::CreateTable { table, .. } => write!(f, "create table {}", table),
            SchemaChange::DropTable { table } => write!(f, "drop table {}", table),
            SchemaChange::RenameTable { from, to } => write!(f, "rename table {} to {}", from, to),
            SchemaChange::AddColumn { table, column } => {
                write!(f, "add column {}.{}", table, column.name)
            }
            SchemaChange::DropColumn { table, column } => {
                write!(f, "drop column {}.{}", table, column)
            }
            SchemaChange::RenameColumn { table, from, to } => {
                write!(f, "rename column {}.{} to {}", table, from, to)
            }
            SchemaChange::CreateIndex { table, name, .. } => {
                write!(f, "create index {} on {}", name, table)
            }
            SchemaChange::DropIndex { table, name } => write!(f, "drop index {} on {}", name, table),
        }
    }
}

/// Category of an executor failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutorErrorKind {
    /// Constraint violation (unique, foreign key, not null, check).
    Constraint,
    /// Lock contention or deadlock.
    Busy,
    /// Statement or lock wait timed out.
    Timeout,
    /// Invalid or conflicting schema object.
    Schema,
    /// Anything else reported by the driver.
    Other,
}

impl fmt::Display for ExecutorErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutorErrorKind::Constraint => write!(f, "constraint violation"),
            ExecutorErrorKind::Busy => write!(f, "database busy"),
            ExecutorErrorKind::Timeout => write!(f, "timeout"),
            ExecutorErrorKind::Schema => write!(f, "schema error"),
            ExecutorErrorKind::Other => write!(f, "database error"),
        }
    }
}

/// Error reported by an [`Executor`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}{}{}", describe_constraint(.constraint), describe_statement(.statement))]
pub struct ExecutorError {
    /// Failure category.
    pub kind: ExecutorErrorKind,
    /// Driver message.
    pub message: String,
    /// The statement that failed, if known.
    pub statement: Option<String>,
    /// The violated constraint, if known.
    pub constraint: Option<String>,
}

impl ExecutorError {
    /// Create a new error.
    pub fn new(kind: ExecutorErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            statement: None,
            constraint: None,
        }
    }

    /// Attach the failing statement.
    pub fn with_statement(mut self, statement: impl Into<String>) -> Self {
        self.statement = Some(statement.into());
        self
    }

    /// Attach the violated constraint.
    pub fn with_constraint(mut self, constraint: impl Into<String>) -> Self {
        self.constraint = Some(constraint.into());
        self
    }

    /// Whether re-running after investigation could succeed unchanged.
    pub fn is_transient(&self) -> bool {
        matches!(self.kind, ExecutorErrorKind::Busy | ExecutorErrorKind::Timeout)
    }
}

fn describe_constraint(constraint: &Option<String>) -> String {
    constraint
        .as_ref()
        .map(|c| format!(" (constraint {})", c))
        .unwrap_or_default()
}

fn describe_statement(statement: &Option<String>) -> String {
    statement
        .as_ref()
        .map(|s| format!(" [statement: {}]", s))
        .unwrap_or_default()
}

/// Transactional access to the target database.
pub trait Executor {
    /// Run a statement with positional parameters.
    fn execute(&mut self, sql: &str, params: &[Value]) -> Result<RowSet, ExecutorError>;

    /// Begin a transaction.
    fn begin(&mut self) -> Result<(), ExecutorError>;

    /// Commit the open transaction.
    fn commit(&mut self) -> Result<(), ExecutorError>;

    /// Roll back the open transaction.
    fn rollback(&mut self) -> Result<(), ExecutorError>;

    /// Apply a structural change.
    fn alter_schema(&mut self, change: &SchemaChange) -> Result<(), ExecutorError>;

    /// Whether a table exists.
    fn has_table(&mut self, table: &str) -> Result<bool, ExecutorError>;

    /// Whether a column exists on a table.
    fn has_column(&mut self, table: &str, column: &str) -> Result<bool, ExecutorError>;
}

impl<E: Executor + ?Sized> Executor for Box<E> {
    fn execute(&mut self, sql: &str, params: &[Value]) -> Result<RowSet, ExecutorError> {
        (**self).execute(sql, params)
    }

    fn begin(&mut self) -> Result<(), ExecutorError> {
        (**self).begin()
    }

    fn commit(&mut self) -> Result<(), ExecutorError> {
        (**self).commit()
    }

    fn rollback(&mut self) -> Result<(), ExecutorError> {
        (**self).rollback()
    }

    fn alter_schema(&mut self, change: &SchemaChange) -> Result<(), ExecutorError> {
        (**self).alter_schema(change)
    }

    fn has_table(&mut self, table: &str) -> Result<bool, ExecutorError> {
        (**self).has_table(table)
    }

    fn has_column(&mut self, table: &str, column: &str) -> Result<bool, ExecutorError> {
        (**self).has_column(table, column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rowset_lookup() {
        let rows = RowSet {
            columns: vec!["id".into(), "name".into()],
            rows: vec![vec![Value::Integer(1), Value::from("journal")]],
            rows_affected: 0,
        };
        assert_eq!(rows.value(0, "name"), Some(&Value::from("journal")));
        assert_eq!(rows.value(0, "missing"), None);
        assert_eq!(rows.value(1, "id"), None);
        assert_eq!(rows.scalar(), Some(&Value::Integer(1)));
    }

    #[test]
    fn test_executor_error_display() {
        let err = ExecutorError::new(ExecutorErrorKind::Constraint, "UNIQUE constraint failed")
            .with_constraint("users.email")
            .with_statement("INSERT INTO users VALUES (?1)");
        let text = err.to_string();
        assert!(text.contains("constraint violation"));
        assert!(text.contains("users.email"));
        assert!(text.contains("INSERT INTO users"));
        assert!(!err.is_transient());
        assert!(ExecutorError::new(ExecutorErrorKind::Busy, "deadlock").is_transient());
    }

    #[test]
    fn test_value_conversions() {
        assert_eq!(Value::from(Some(3i64)), Value::Integer(3));
        assert_eq!(Value::from(None::<String>), Value::Null);
        assert_eq!(Value::from(true), Value::Integer(1));
        assert_eq!(Value::from("x").as_str(), Some("x"));
    }
}
