//! Database schema definitions
//!
//! This module contains the SQL schema for the Sumi-Extract database: one
//! table of raw document bodies and one table of extracted page metadata.

use crate::storage::Table;
use rusqlite::{params, Connection};

/// Returns the DDL for a table
fn table_sql(table: Table) -> &'static str {
    match table {
        Table::Html => {
            r#"
CREATE TABLE IF NOT EXISTS html (
    id TEXT PRIMARY KEY NOT NULL,
    contents TEXT NOT NULL
);
"#
        }
        Table::Page => {
            r#"
CREATE TABLE IF NOT EXISTS pages (
    id TEXT PRIMARY KEY NOT NULL,
    metadata TEXT NOT NULL
);
"#
        }
    }
}

/// Checks whether a table is present in the database
pub fn table_exists(conn: &Connection, name: &str) -> Result<bool, rusqlite::Error> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
        params![name],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// Creates every table that does not exist yet
///
/// Tables that already exist are logged and left untouched, so this is safe
/// to run on every startup.
///
/// # Returns
///
/// * `Ok(Vec<Table>)` - The tables created by this call
/// * `Err(rusqlite::Error)` - Failed to inspect or create a table
pub fn initialize_schema(conn: &Connection) -> Result<Vec<Table>, rusqlite::Error> {
    let mut created = Vec::new();

    for table in Table::ALL {
        if table_exists(conn, table.name())? {
            tracing::info!("Table already existed: {}", table);
            continue;
        }

        conn.execute_batch(table_sql(table))?;
        tracing::info!("Created table: {}", table);
        created.push(table);
    }

    Ok(created)
}
