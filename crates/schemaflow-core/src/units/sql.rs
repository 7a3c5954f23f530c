//! Units defined as plain SQL statement lists.

use crate::context::MigrationContext;
use crate::error::MigrationError;
use crate::unit::Migration;

/// Runs a fixed list of statements in order.
///
/// Without a down script the unit is not reversible.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlMigration {
    up: Vec<String>,
    down: Option<Vec<String>>,
    transactional: bool,
}

impl SqlMigration {
    /// Unit running `statements` on upgrade.
    pub fn new<S: Into<String>>(statements: impl IntoIterator<Item = S>) -> Self {
        Self {
            up: statements.into_iter().map(Into::into).collect(),
            down: None,
            transactional: false,
        }
    }

    /// Unit built from whole scripts, split into statements.
    pub fn from_scripts(up: &str, down: Option<&str>) -> Self {
        Self {
            up: split_statements(up),
            down: down.map(split_statements),
            transactional: false,
        }
    }

    /// Statements run on downgrade.
    pub fn with_down<S: Into<String>>(mut self, statements: impl IntoIterator<Item = S>) -> Self {
        self.down = Some(statements.into_iter().map(Into::into).collect());
        self
    }

    /// Wrap each direction in a transaction.
    pub fn with_transaction(mut self, enabled: bool) -> Self {
        self.transactional = enabled;
        self
    }

    /// Upgrade statements.
    pub fn up_statements(&self) -> &[String] {
        &self.up
    }

    /// Downgrade statements, if reversible.
    pub fn down_statements(&self) -> Option<&[String]> {
        self.down.as_deref()
    }
}

fn run_all(ctx: &mut MigrationContext<'_>, statements: &[String]) -> Result<(), MigrationError> {
    for statement in statements {
        tracing::debug!(version = %ctx.version(), statement = %statement, "executing statement");
        ctx.execute(statement, &[])?;
    }
    Ok(())
}

impl Migration for SqlMigration {
    fn up(&self, ctx: &mut MigrationContext<'_>) -> Result<(), MigrationError> {
        run_all(ctx, &self.up)
    }

    fn down(&self, ctx: &mut MigrationContext<'_>) -> Result<(), MigrationError> {
        match &self.down {
            Some(statements) => run_all(ctx, statements),
            None => Err(MigrationError::downgrade_unsupported(
                "no down script is defined",
            )),
        }
    }

    fn transactional(&self) -> bool {
        self.transactional
    }
}

/// Split a script on top-level semicolons.
///
/// Semicolons inside quoted strings, quoted identifiers and comments do not
/// end a statement. Comment-only fragments are dropped.
pub fn split_statements(script: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut has_code = false;
    let mut chars = script.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '\'' | '"' | '`' => {
                has_code = true;
                current.push(ch);
                while let Some(inner) = chars.next() {
                    current.push(inner);
                    if inner == ch {
                        // Doubled quote is an escape.
                        if chars.peek() == Some(&ch) {
                            if let Some(escaped) = chars.next() {
                                current.push(escaped);
                            }
                            continue;
                        }
                        break;
                    }
                }
            }
            '-' if chars.peek() == Some(&'-') => {
                for inner in chars.by_ref() {
                    if inner == '\n' {
                        current.push('\n');
                        break;
                    }
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = '\0';
                for inner in chars.by_ref() {
                    if prev == '*' && inner == '/' {
                        break;
                    }
                    prev = inner;
                }
                current.push(' ');
            }
            ';' => {
                if has_code {
                    statements.push(current.trim().to_string());
                }
                current.clear();
                has_code = false;
            }
            _ => {
                if !ch.is_whitespace() {
                    has_code = true;
                }
                current.push(ch);
            }
        }
    }

    if has_code {
        statements.push(current.trim().to_string());
    }
    statements
}
