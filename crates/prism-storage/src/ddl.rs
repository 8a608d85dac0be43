use crate::{probe, quote_ident, StorageError};
use rusqlite::Connection;
use serde::Serialize;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DdlOutcome {
    Applied,
    AlreadyPresent,
}

impl DdlOutcome {
    pub fn applied(self) -> bool {
        matches!(self, DdlOutcome::Applied)
    }
}

pub fn ensure_column(
    conn: &Connection,
    table: &str,
    column: &str,
    sql_type: &str,
) -> Result<DdlOutcome, StorageError> {
    if probe::has_column(conn, table, column)? {
        debug!(table, column, "column already present");
        return Ok(DdlOutcome::AlreadyPresent);
    }

    let statement = format!(
        "ALTER TABLE {} ADD COLUMN {} {}",
        quote_ident(table)?,
        quote_ident(column)?,
        column_type(sql_type)?
    );
    apply(conn, table, &statement)?;
    info!(table, column, sql_type, "added column");
    Ok(DdlOutcome::Applied)
}

/// Non-enforcing lookup index.
pub fn ensure_index(
    conn: &Connection,
    table: &str,
    column: &str,
    index_name: &str,
) -> Result<DdlOutcome, StorageError> {
    if probe::has_index(conn, table, index_name)? {
        debug!(table, index = index_name, "index already present");
        return Ok(DdlOutcome::AlreadyPresent);
    }

    let statement = format!(
        "CREATE INDEX {} ON {} ({})",
        quote_ident(index_name)?,
        quote_ident(table)?,
        quote_ident(column)?
    );
    apply(conn, table, &statement)?;
    info!(table, column, index = index_name, "created index");
    Ok(DdlOutcome::Applied)
}

/// Creates `index_name` as UNIQUE, or upgrades a non-enforcing index of that name.
///
/// Refuses while any row of `column` is NULL or shares a value with another row.
pub fn ensure_unique_index(
    conn: &Connection,
    table: &str,
    column: &str,
    index_name: &str,
) -> Result<DdlOutcome, StorageError> {
    let existing = probe::index_is_unique(conn, table, index_name)?;
    if existing == Some(true) {
        debug!(table, index = index_name, "unique index already present");
        return Ok(DdlOutcome::AlreadyPresent);
    }

    if !probe::has_column(conn, table, column)? {
        return Err(StorageError::StructuralChange {
            table: table.to_string(),
            statement: format!("CREATE UNIQUE INDEX {index_name}"),
            source: rusqlite::Error::InvalidColumnName(column.to_string()),
        });
    }

    let unset = probe::count_unset(conn, table, column)?;
    let duplicated = probe::count_duplicated(conn, table, column)?;
    if unset > 0 || duplicated > 0 {
        return Err(StorageError::PreconditionViolation {
            table: table.to_string(),
            column: column.to_string(),
            unset,
            duplicated,
        });
    }

    let create = format!(
        "CREATE UNIQUE INDEX {} ON {} ({})",
        quote_ident(index_name)?,
        quote_ident(table)?,
        quote_ident(column)?
    );
    let statement = if existing.is_some() {
        format!("DROP INDEX {};\n{create};", quote_ident(index_name)?)
    } else {
        create
    };
    apply(conn, table, &statement)?;
    info!(
        table,
        column,
        index = index_name,
        upgraded = existing.is_some(),
        "enforced unique index"
    );
    Ok(DdlOutcome::Applied)
}

fn apply(conn: &Connection, table: &str, statement: &str) -> Result<(), StorageError> {
    let structural = |source: rusqlite::Error| StorageError::StructuralChange {
        table: table.to_string(),
        statement: statement.to_string(),
        source,
    };
    let tx = conn.unchecked_transaction().map_err(structural)?;
    tx.execute_batch(statement).map_err(structural)?;
    tx.commit().map_err(structural)
}

fn column_type(sql_type: &str) -> Result<&str, StorageError> {
    let valid = !sql_type.is_empty()
        && sql_type
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, ' ' | '(' | ')' | ','));
    if valid {
        Ok(sql_type)
    } else {
        Err(StorageError::InvalidIdentifier(sql_type.to_string()))
    }
}
