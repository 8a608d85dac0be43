use crate::{probe, quote_ident, schema_version, StorageError};
use prism_core::schema::{
    ReferenceLink, BACKFILL_ORDER, OBSERVATION_SOURCE_LINK, TARGET_SCHEMA_VERSION,
};
use rusqlite::Connection;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdentifierProgress {
    pub table: String,
    pub column: String,
    pub column_present: bool,
    pub unset: u64,
    pub duplicated: u64,
    pub unique_index: bool,
}

impl IdentifierProgress {
    pub fn is_complete(&self) -> bool {
        self.column_present && self.unset == 0 && self.duplicated == 0 && self.unique_index
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EvolutionProgress {
    pub schema_version: i64,
    pub identifiers: Vec<IdentifierProgress>,
    /// Observations the next relink will move onto a message identifier.
    pub relinkable_references: u64,
    /// Observations pointing at a message that no longer exists.
    pub unresolved_references: u64,
}

impl EvolutionProgress {
    pub fn is_complete(&self) -> bool {
        self.schema_version >= TARGET_SCHEMA_VERSION
            && self.relinkable_references == 0
            && self.identifiers.iter().all(IdentifierProgress::is_complete)
    }

    pub fn unset_total(&self) -> u64 {
        self.identifiers.iter().map(|column| column.unset).sum()
    }
}

/// Counts what the evolution still has to do, without changing anything.
pub fn progress(conn: &Connection) -> Result<EvolutionProgress, StorageError> {
    let mut identifiers = Vec::with_capacity(BACKFILL_ORDER.len());
    for target in BACKFILL_ORDER {
        let column_present = probe::has_column(conn, target.table, target.id_column)?;
        let (unset, duplicated) = if column_present {
            (
                probe::count_unset(conn, target.table, target.id_column)?,
                probe::count_duplicated(conn, target.table, target.id_column)?,
            )
        } else {
            (probe::count_rows(conn, target.table)?, 0)
        };
        let unique_index =
            probe::index_is_unique(conn, target.table, target.unique_index)? == Some(true);

        identifiers.push(IdentifierProgress {
            table: target.table.to_string(),
            column: target.id_column.to_string(),
            column_present,
            unset,
            duplicated,
            unique_index,
        });
    }

    let (relinkable_references, unresolved_references) =
        pending_references(conn, &OBSERVATION_SOURCE_LINK)?;

    Ok(EvolutionProgress {
        schema_version: schema_version(conn)?,
        identifiers,
        relinkable_references,
        unresolved_references,
    })
}

/// Children still holding only a sequence-number reference, split by whether the parent row
/// exists. Those whose parent exists are picked up by the next relink once the parent has its
/// identifier.
fn pending_references(conn: &Connection, link: &ReferenceLink) -> Result<(u64, u64), StorageError> {
    let child = quote_ident(link.child_table)?;
    let child_ref = quote_ident(link.child_ref_column)?;
    let parent = quote_ident(link.parent_table)?;
    let parent_seq = quote_ident(link.parent_seq_column)?;

    let not_relinked = if probe::has_column(conn, link.child_table, link.new_ref_column)? {
        format!("child.{} IS NULL AND", quote_ident(link.new_ref_column)?)
    } else {
        String::new()
    };
    let sql = format!(
        "
        SELECT
            COALESCE(SUM(parent_found), 0),
            COALESCE(SUM(1 - parent_found), 0)
        FROM (
            SELECT EXISTS (
                SELECT 1 FROM {parent} AS parent WHERE parent.{parent_seq} = child.{child_ref}
            ) AS parent_found
            FROM {child} AS child
            WHERE {not_relinked} child.{child_ref} IS NOT NULL
        )
        "
    );
    let (relinkable, unresolved): (i64, i64) =
        conn.query_row(&sql, [], |row| Ok((row.get(0)?, row.get(1)?)))?;
    Ok((relinkable as u64, unresolved as u64))
}
