//! Read-only inspection of the live schema. Nothing here is cached, so every answer reflects
//! DDL applied earlier in the same run.

use crate::{quote_ident, StorageError};
use rusqlite::{params, Connection, OptionalExtension};

pub fn has_table(conn: &Connection, table: &str) -> Result<bool, StorageError> {
    let exists = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1 LIMIT 1",
            [table],
            |_| Ok(()),
        )
        .optional()?;
    Ok(exists.is_some())
}

pub fn has_column(conn: &Connection, table: &str, column: &str) -> Result<bool, StorageError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM pragma_table_info(?1) WHERE name = ?2",
        params![table, column],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

pub fn has_index(conn: &Connection, table: &str, index_name: &str) -> Result<bool, StorageError> {
    let exists = conn
        .query_row(
            "
            SELECT 1
            FROM sqlite_master
            WHERE type = 'index' AND tbl_name = ?1 AND name = ?2
            LIMIT 1
            ",
            params![table, index_name],
            |_| Ok(()),
        )
        .optional()?;
    Ok(exists.is_some())
}

/// `None` when the index does not exist.
pub fn index_is_unique(
    conn: &Connection,
    table: &str,
    index_name: &str,
) -> Result<Option<bool>, StorageError> {
    let unique: Option<i64> = conn
        .query_row(
            "SELECT \"unique\" FROM pragma_index_list(?1) WHERE name = ?2",
            params![table, index_name],
            |row| row.get(0),
        )
        .optional()?;
    Ok(unique.map(|flag| flag != 0))
}

pub fn count_rows(conn: &Connection, table: &str) -> Result<u64, StorageError> {
    let sql = format!("SELECT COUNT(*) FROM {}", quote_ident(table)?);
    let count: i64 = conn.query_row(&sql, [], |row| row.get(0))?;
    Ok(count as u64)
}

pub fn count_unset(conn: &Connection, table: &str, column: &str) -> Result<u64, StorageError> {
    let sql = format!(
        "SELECT COUNT(*) FROM {} WHERE {} IS NULL",
        quote_ident(table)?,
        quote_ident(column)?
    );
    let count: i64 = conn.query_row(&sql, [], |row| row.get(0))?;
    Ok(count as u64)
}

/// Rows that would have to change for `column` to hold only distinct non-null values.
pub fn count_duplicated(conn: &Connection, table: &str, column: &str) -> Result<u64, StorageError> {
    let column = quote_ident(column)?;
    let sql = format!(
        "
        SELECT COALESCE(SUM(copies - 1), 0)
        FROM (
            SELECT COUNT(*) AS copies
            FROM {table}
            WHERE {column} IS NOT NULL
            GROUP BY {column}
            HAVING COUNT(*) > 1
        )
        ",
        table = quote_ident(table)?,
    );
    let count: i64 = conn.query_row(&sql, [], |row| row.get(0))?;
    Ok(count as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conn() -> Connection {
        let conn = Connection::open_in_memory().expect("open db");
        conn.execute_batch(
            "
            CREATE TABLE notes (id INTEGER PRIMARY KEY, body TEXT, slug TEXT);
            CREATE INDEX ix_notes_body ON notes (body);
            CREATE UNIQUE INDEX ux_notes_slug ON notes (slug);
            INSERT INTO notes (body, slug) VALUES ('a', 'x'), ('a', 'y'), ('a', NULL), (NULL, NULL);
            ",
        )
        .expect("fixture");
        conn
    }

    #[test]
    fn reports_tables_columns_and_indexes() {
        let conn = conn();
        assert!(has_table(&conn, "notes").expect("table"));
        assert!(!has_table(&conn, "ghosts").expect("table"));
        assert!(has_column(&conn, "notes", "body").expect("column"));
        assert!(!has_column(&conn, "notes", "title").expect("column"));
        assert!(!has_column(&conn, "ghosts", "body").expect("missing table"));
        assert!(has_index(&conn, "notes", "ix_notes_body").expect("index"));
        assert!(!has_index(&conn, "notes", "ix_notes_title").expect("index"));
    }

    #[test]
    fn distinguishes_enforcing_indexes() {
        let conn = conn();
        assert_eq!(index_is_unique(&conn, "notes", "ux_notes_slug").expect("unique"), Some(true));
        assert_eq!(index_is_unique(&conn, "notes", "ix_notes_body").expect("plain"), Some(false));
        assert_eq!(index_is_unique(&conn, "notes", "ix_missing").expect("missing"), None);
    }

    #[test]
    fn sees_columns_added_after_a_previous_probe() {
        let conn = conn();
        assert!(!has_column(&conn, "notes", "title").expect("before"));
        conn.execute_batch("ALTER TABLE notes ADD COLUMN title TEXT")
            .expect("alter");
        assert!(has_column(&conn, "notes", "title").expect("after"));
    }

    #[test]
    fn counts_unset_and_duplicated_values() {
        let conn = conn();
        assert_eq!(count_rows(&conn, "notes").expect("rows"), 4);
        assert_eq!(count_unset(&conn, "notes", "body").expect("unset"), 1);
        assert_eq!(count_duplicated(&conn, "notes", "body").expect("dupes"), 2);
        assert_eq!(count_duplicated(&conn, "notes", "slug").expect("dupes"), 0);
        assert!(matches!(
            count_unset(&conn, "notes; DROP TABLE notes", "body"),
            Err(StorageError::InvalidIdentifier(_))
        ));
    }
}
