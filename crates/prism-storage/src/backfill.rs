use crate::{probe, quote_ident, StorageError};
use prism_core::schema::IdentifierColumn;
use prism_core::{IdSource, StableIdError};
use rusqlite::{params, Connection};
use serde::Serialize;
use tracing::{debug, info};

pub const DEFAULT_BATCH_SIZE: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackfillOptions {
    /// Rows identified per committed transaction.
    pub batch_size: usize,
    /// Stop after this many committed batches; the remainder is picked up by the next run.
    pub max_batches: Option<usize>,
}

impl Default for BackfillOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            max_batches: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BackfillReport {
    pub rows_updated: u64,
    pub batches: u64,
    pub remaining: u64,
}

/// Gives every row whose `id_column` is NULL a fresh identifier, one committed batch at a time.
///
/// A failed batch rolls back on its own; batches committed before it stay, and a re-run
/// resumes from the same `IS NULL` predicate.
pub fn backfill_identifiers(
    conn: &Connection,
    target: &IdentifierColumn,
    options: &BackfillOptions,
    ids: &mut dyn IdSource,
) -> Result<BackfillReport, StorageError> {
    let table = quote_ident(target.table)?;
    let seq = quote_ident(target.seq_column)?;
    let id_column = quote_ident(target.id_column)?;
    let select_sql =
        format!("SELECT {seq} FROM {table} WHERE {id_column} IS NULL ORDER BY {seq} LIMIT ?1");
    let update_sql =
        format!("UPDATE {table} SET {id_column} = ?1 WHERE {seq} = ?2 AND {id_column} IS NULL");

    let batch_size = options.batch_size.max(1);
    let mut report = BackfillReport::default();

    loop {
        if options
            .max_batches
            .is_some_and(|max| report.batches as usize >= max)
        {
            break;
        }

        let (selected, written) = run_batch(conn, &select_sql, &update_sql, batch_size, ids)
            .map_err(|err| match err {
                BatchError::Write(source) => StorageError::BackfillWrite {
                    table: target.table.to_string(),
                    column: target.id_column.to_string(),
                    committed: report.rows_updated,
                    source,
                },
                BatchError::Identifier(source) => StorageError::Identifier(source),
            })?;
        if selected == 0 {
            break;
        }

        report.rows_updated += written;
        report.batches += 1;
        debug!(
            table = target.table,
            column = target.id_column,
            batch = report.batches,
            written,
            "committed backfill batch"
        );

        if selected < batch_size {
            break;
        }
    }

    report.remaining = probe::count_unset(conn, target.table, target.id_column)?;
    if report.rows_updated > 0 {
        info!(
            table = target.table,
            column = target.id_column,
            rows = report.rows_updated,
            batches = report.batches,
            remaining = report.remaining,
            "backfilled stable identifiers"
        );
    }
    Ok(report)
}

/// Either way the batch's transaction is dropped uncommitted.
enum BatchError {
    Write(rusqlite::Error),
    Identifier(StableIdError),
}

impl From<rusqlite::Error> for BatchError {
    fn from(err: rusqlite::Error) -> Self {
        BatchError::Write(err)
    }
}

fn run_batch(
    conn: &Connection,
    select_sql: &str,
    update_sql: &str,
    batch_size: usize,
    ids: &mut dyn IdSource,
) -> Result<(usize, u64), BatchError> {
    let limit = i64::try_from(batch_size).unwrap_or(i64::MAX);
    let tx = conn.unchecked_transaction()?;
    let pending = {
        let mut select = tx.prepare(select_sql)?;
        let rows = select.query_map([limit], |row| row.get::<_, i64>(0))?;
        rows.collect::<Result<Vec<i64>, _>>()?
    };

    let mut written = 0_u64;
    {
        let mut update = tx.prepare(update_sql)?;
        for seq in &pending {
            let id = ids.next_id().map_err(BatchError::Identifier)?;
            written += update.execute(params![id.as_str(), seq])? as u64;
        }
    }
    tx.commit()?;
    Ok((pending.len(), written))
}
