//! SQLite executor backed by `rusqlite`.

use super::{
    ColumnDef, ColumnType, Executor, ExecutorError, ExecutorErrorKind, RowSet, SchemaChange, Value,
};
use rusqlite::types::{ToSqlOutput, ValueRef};
use rusqlite::{params_from_iter, Connection, ErrorCode, ToSql};
use std::path::Path;

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Null => ToSqlOutput::Borrowed(ValueRef::Null),
            Value::Integer(v) => ToSqlOutput::Borrowed(ValueRef::Integer(*v)),
            Value::Real(v) => ToSqlOutput::Borrowed(ValueRef::Real(*v)),
            Value::Text(v) => ToSqlOutput::Borrowed(ValueRef::Text(v.as_bytes())),
            Value::Blob(v) => ToSqlOutput::Borrowed(ValueRef::Blob(v)),
        })
    }
}

impl From<ValueRef<'_>> for Value {
    fn from(value: ValueRef<'_>) -> Self {
        match value {
            ValueRef::Null => Value::Null,
            ValueRef::Integer(v) => Value::Integer(v),
            ValueRef::Real(v) => Value::Real(v),
            ValueRef::Text(v) => Value::Text(String::from_utf8_lossy(v).into_owned()),
            ValueRef::Blob(v) => Value::Blob(v.to_vec()),
        }
    }
}

/// Executor over a single SQLite connection.
pub struct SqliteExecutor {
    conn: Connection,
}

impl SqliteExecutor {
    /// Open (or create) a database file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ExecutorError> {
        let conn = Connection::open(path).map_err(|e| map_error(e, None))?;
        Ok(Self { conn })
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> Result<Self, ExecutorError> {
        let conn = Connection::open_in_memory().map_err(|e| map_error(e, None))?;
        Ok(Self { conn })
    }

    /// Wrap an existing connection.
    pub fn from_connection(conn: Connection) -> Self {
        Self { conn }
    }

    /// Borrow the underlying connection.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Consume the executor, returning the connection.
    pub fn into_inner(self) -> Connection {
        self.conn
    }

    fn run_batch(&self, sql: &str) -> Result<(), ExecutorError> {
        self.conn
            .execute_batch(sql)
            .map_err(|e| map_error(e, Some(sql)))
    }
}

impl Executor for SqliteExecutor {
    fn execute(&mut self, sql: &str, params: &[Value]) -> Result<RowSet, ExecutorError> {
        let mut stmt = self.conn.prepare(sql).map_err(|e| map_error(e, Some(sql)))?;

        if stmt.column_count() == 0 {
            let rows_affected = stmt
                .execute(params_from_iter(params.iter()))
                .map_err(|e| map_error(e, Some(sql)))?;
            return Ok(RowSet::affected(rows_affected));
        }

        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let width = columns.len();
        let mut rows = Vec::new();
        let mut cursor = stmt
            .query(params_from_iter(params.iter()))
            .map_err(|e| map_error(e, Some(sql)))?;
        while let Some(row) = cursor.next().map_err(|e| map_error(e, Some(sql)))? {
            let mut values = Vec::with_capacity(width);
            for idx in 0..width {
                let value = row.get_ref(idx).map_err(|e| map_error(e, Some(sql)))?;
                values.push(Value::from(value));
            }
            rows.push(values);
        }

        Ok(RowSet {
            columns,
            rows,
            rows_affected: 0,
        })
    }

    fn begin(&mut self) -> Result<(), ExecutorError> {
        self.run_batch("BEGIN")
    }

    fn commit(&mut self) -> Result<(), ExecutorError> {
        self.run_batch("COMMIT")
    }

    fn rollback(&mut self) -> Result<(), ExecutorError> {
        self.run_batch("ROLLBACK")
    }

    fn alter_schema(&mut self, change: &SchemaChange) -> Result<(), ExecutorError> {
        let sql = render_change(change);
        tracing::debug!(%change, sql = %sql, "applying schema change");
        self.run_batch(&sql)
    }

    fn has_table(&mut self, table: &str) -> Result<bool, ExecutorError> {
        let rows = self.execute(
            "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
            &[Value::from(table)],
        )?;
        Ok(!rows.is_empty())
    }

    fn has_column(&mut self, table: &str, column: &str) -> Result<bool, ExecutorError> {
        let rows = self.execute(
            "SELECT 1 FROM pragma_table_info(?1) WHERE name = ?2",
            &[Value::from(table), Value::from(column)],
        )?;
        Ok(!rows.is_empty())
    }
}

fn map_error(err: rusqlite::Error, statement: Option<&str>) -> ExecutorError {
    let (kind, constraint) = match &err {
        rusqlite::Error::SqliteFailure(failure, message) => {
            let kind = match failure.code {
                ErrorCode::ConstraintViolation => ExecutorErrorKind::Constraint,
                ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked => ExecutorErrorKind::Busy,
                ErrorCode::OperationInterrupted => ExecutorErrorKind::Timeout,
                ErrorCode::SchemaChanged => ExecutorErrorKind::Schema,
                _ => ExecutorErrorKind::Other,
            };
            let constraint = message
                .as_deref()
                .and_then(|m| m.split_once("constraint failed: "))
                .map(|(_, name)| name.to_string());
            (kind, constraint)
        }
        _ => (ExecutorErrorKind::Other, None),
    };

    let mut error = ExecutorError::new(kind, err.to_string());
    if let Some(statement) = statement {
        error = error.with_statement(statement);
    }
    if let Some(constraint) = constraint {
        error = error.with_constraint(constraint);
    }
    error
}

fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

fn quote_list(idents: &[String]) -> String {
    idents
        .iter()
        .map(|i| quote_ident(i))
        .collect::<Vec<_>>()
        .join(", ")
}

fn type_name(ty: ColumnType) -> String {
    match ty {
        ColumnType::Integer | ColumnType::BigInteger | ColumnType::Boolean => "INTEGER".into(),
        ColumnType::Real => "REAL".into(),
        ColumnType::Text | ColumnType::Timestamp | ColumnType::Json => "TEXT".into(),
        ColumnType::VarChar(len) => format!("VARCHAR({})", len),
        ColumnType::Blob => "BLOB".into(),
    }
}

fn literal(value: &Value) -> String {
    match value {
        Value::Null => "NULL".into(),
        Value::Integer(v) => v.to_string(),
        Value::Real(v) => v.to_string(),
        Value::Text(v) => format!("'{}'", v.replace('\'', "''")),
        Value::Blob(v) => {
            let hex: String = v.iter().map(|b| format!("{:02x}", b)).collect();
            format!("X'{}'", hex)
        }
    }
}

fn column_sql(column: &ColumnDef) -> String {
    let mut sql = format!("{} {}", quote_ident(&column.name), type_name(column.ty));
    if !column.nullable {
        sql.push_str(" NOT NULL");
    }
    if let Some(default) = &column.default {
        sql.push_str(" DEFAULT ");
        sql.push_str(&literal(default));
    }
    sql
}

fn render_change(change: &SchemaChange) -> String {
    match change {
        SchemaChange::CreateTable {
            table,
            columns,
            primary_key,
        } => {
            let mut parts: Vec<String> = columns.iter().map(column_sql).collect();
            if !primary_key.is_empty() {
                parts.push(format!("PRIMARY KEY ({})", quote_list(primary_key)));
            }
            format!("CREATE TABLE {} ({})", quote_ident(table), parts.join(", "))
        }
        SchemaChange::DropTable { table } => format!("DROP TABLE {}", quote_ident(table)),
        SchemaChange::RenameTable { from, to } => {
            format!("ALTER TABLE {} RENAME TO {}", quote_ident(from), quote_ident(to))
        }
        SchemaChange::AddColumn { table, column } => {
            format!("ALTER TABLE {} ADD COLUMN {}", quote_ident(table), column_sql(column))
        }
        SchemaChange::DropColumn { table, column } => {
            format!("ALTER TABLE {} DROP COLUMN {}", quote_ident(table), quote_ident(column))
        }
        SchemaChange::RenameColumn { table, from, to } => format!(
            "ALTER TABLE {} RENAME COLUMN {} TO {}",
            quote_ident(table),
            quote_ident(from),
            quote_ident(to)
        ),
        SchemaChange::CreateIndex {
            table,
            name,
            columns,
            unique,
        } => format!(
            "CREATE {}INDEX {} ON {} ({})",
            if *unique { "UNIQUE " } else { "" },
            quote_ident(name),
            quote_ident(table),
            quote_list(columns)
        ),
        SchemaChange::DropIndex { name, .. } => format!("DROP INDEX {}", quote_ident(name)),
    }
}
