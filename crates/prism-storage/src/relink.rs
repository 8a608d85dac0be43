use crate::{quote_ident, StorageError};
use prism_core::schema::ReferenceLink;
use rusqlite::Connection;
use serde::Serialize;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RelinkReport {
    pub relinked: u64,
    /// Children that still carry only a sequence-number reference: the parent is missing or has
    /// no stable identifier yet.
    pub unresolved: u64,
}

/// Copies the parent's stable identifier into `new_ref_column` for every child that has a
/// sequence-number reference and no identifier reference yet. `child_ref_column` is left as is.
pub fn relink(conn: &Connection, link: &ReferenceLink) -> Result<RelinkReport, StorageError> {
    let child = quote_ident(link.child_table)?;
    let child_ref = quote_ident(link.child_ref_column)?;
    let parent = quote_ident(link.parent_table)?;
    let parent_seq = quote_ident(link.parent_seq_column)?;
    let parent_id = quote_ident(link.parent_id_column)?;
    let new_ref = quote_ident(link.new_ref_column)?;

    let update_sql = format!(
        "
        UPDATE {child}
        SET {new_ref} = (
            SELECT parent.{parent_id}
            FROM {parent} AS parent
            WHERE parent.{parent_seq} = {child}.{child_ref}
        )
        WHERE {new_ref} IS NULL
          AND {child_ref} IS NOT NULL
          AND EXISTS (
              SELECT 1
              FROM {parent} AS parent
              WHERE parent.{parent_seq} = {child}.{child_ref}
                AND parent.{parent_id} IS NOT NULL
          )
        "
    );
    let unresolved_sql = format!(
        "SELECT COUNT(*) FROM {child} WHERE {new_ref} IS NULL AND {child_ref} IS NOT NULL"
    );

    let tx = conn.unchecked_transaction()?;
    let relinked = tx.execute(&update_sql, [])? as u64;
    tx.commit()?;

    let unresolved: i64 = conn.query_row(&unresolved_sql, [], |row| row.get(0))?;
    let report = RelinkReport {
        relinked,
        unresolved: unresolved as u64,
    };

    if report.relinked > 0 {
        info!(
            child = link.child_table,
            column = link.new_ref_column,
            rows = report.relinked,
            "relinked references to stable identifiers"
        );
    }
    if report.unresolved > 0 {
        warn!(
            child = link.child_table,
            column = link.child_ref_column,
            rows = report.unresolved,
            "references left on legacy sequence numbers"
        );
    }
    Ok(report)
}
