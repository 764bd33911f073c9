//! Table provisioning for the SQLite store.
//!
//! Provisioning runs once at startup, before the store serves traffic. It is
//! idempotent: an existing table is left untouched, a table without its
//! secondary index gets the index, and a missing table is created together
//! with the index in one transaction.

use rusqlite::Connection;
use thiserror::Error;
use tracing::info;

use super::Database;
use crate::store::{StoreError, StoreResult};

/// Provisioning errors. Any of these is fatal at startup.
#[derive(Error, Debug)]
pub enum ProvisionError {
    #[error("Invalid table name: {0}")]
    InvalidTableName(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// What a provisioning run did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionOutcome {
    /// Table and index were created
    Created,
    /// Table existed without its index; the index was added
    IndexCreated,
    /// Nothing to do
    AlreadyProvisioned,
}

/// Current state of the patient table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDescription {
    pub table_name: String,
    pub index_name: String,
    pub has_index: bool,
}

/// Name of the MRN secondary index for `table`.
pub fn index_name(table: &str) -> String {
    format!("{table}_gsi1")
}

/// Table names are interpolated into SQL, so only plain identifiers pass.
pub fn validate_table_name(table: &str) -> Result<(), ProvisionError> {
    let mut chars = table.chars();
    let valid_start = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    let valid_rest = chars.all(|c| c.is_ascii_alphanumeric() || c == '_');

    if valid_start && valid_rest && !table.starts_with("sqlite_") {
        Ok(())
    } else {
        Err(ProvisionError::InvalidTableName(table.to_string()))
    }
}

/// Single-table layout. Attribute columns are nullable so other record kinds
/// can share the table; patient rows always fill them.
fn table_ddl(table: &str) -> String {
    format!(
        r#"
        CREATE TABLE {table} (
            pk TEXT NOT NULL,
            sk TEXT NOT NULL,
            gsi1pk TEXT,
            gsi1sk TEXT,
            id TEXT,
            name TEXT,
            date_of_birth TEXT,                  -- YYYY-MM-DD
            medical_record_number TEXT,
            status TEXT,
            created_at TEXT,                     -- RFC 3339, nanosecond precision
            updated_at TEXT,
            PRIMARY KEY (pk, sk)
        );
        "#
    )
}

/// The index covers the row itself, so every attribute is projected.
fn index_ddl(table: &str) -> String {
    format!(
        "CREATE INDEX IF NOT EXISTS {index} ON {table} (gsi1pk, gsi1sk);",
        index = index_name(table)
    )
}

// SQLite identifiers are case-insensitive, so names are compared with NOCASE.
fn describe(conn: &Connection, table: &str) -> rusqlite::Result<Option<TableDescription>> {
    let table_count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1 COLLATE NOCASE",
        [table],
        |row| row.get(0),
    )?;
    if table_count == 0 {
        return Ok(None);
    }

    let index_name = index_name(table);
    let index_count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master
         WHERE type = 'index' AND tbl_name = ?1 COLLATE NOCASE AND name = ?2 COLLATE NOCASE",
        [table, index_name.as_str()],
        |row| row.get(0),
    )?;

    Ok(Some(TableDescription {
        table_name: table.to_string(),
        index_name,
        has_index: index_count > 0,
    }))
}

/// The store's own "already exists" signal.
///
/// Depending on how SQLite was built, rusqlite reports a failed `CREATE` as
/// either a plain failure or an input error pointing into the statement.
fn is_already_exists(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(_, Some(msg)) => msg.contains("already exists"),
        rusqlite::Error::SqlInputError { msg, .. } => msg.contains("already exists"),
        _ => false,
    }
}

/// Bring an existing table up to date: add the index if it is missing.
fn ensure_index(
    conn: &Connection,
    description: &TableDescription,
) -> Result<ProvisionOutcome, ProvisionError> {
    let table = description.table_name.as_str();
    if description.has_index {
        info!(table, "patient table already provisioned");
        return Ok(ProvisionOutcome::AlreadyProvisioned);
    }

    info!(table, index = %description.index_name, "creating missing secondary index");
    conn.execute_batch(&index_ddl(table))?;
    Ok(ProvisionOutcome::IndexCreated)
}

/// Create table and index together. Losing a creation race to another
/// provisioner falls back to [`ensure_index`] on whatever that one left.
fn create_table(conn: &mut Connection, table: &str) -> Result<ProvisionOutcome, ProvisionError> {
    info!(table, "creating patient table");
    let tx = conn.transaction()?;
    match tx.execute_batch(&table_ddl(table)) {
        Ok(()) => {}
        Err(e) if is_already_exists(&e) => {
            drop(tx);
            info!(table, "patient table created concurrently");
            return match describe(conn, table)? {
                Some(description) => ensure_index(conn, &description),
                // Reported as existing but not visible: surface the original error
                None => Err(e.into()),
            };
        }
        Err(e) => return Err(e.into()),
    }
    tx.execute_batch(&index_ddl(table))?;
    tx.commit()?;
    info!(table, "patient table created");
    Ok(ProvisionOutcome::Created)
}

impl Database {
    /// Describe the patient table, or `None` if it does not exist.
    pub fn describe_table(&self) -> StoreResult<Option<TableDescription>> {
        let conn = self.conn()?;
        Ok(describe(&conn, &self.table)?)
    }

    /// Ensure the patient table and its secondary index exist.
    pub fn provision(&self) -> Result<ProvisionOutcome, ProvisionError> {
        let mut conn = self.conn()?;
        let table = self.table.as_str();

        let description = describe(&conn, table)?;
        match description {
            Some(description) => ensure_index(&conn, &description),
            None => create_table(&mut conn, table),
        }
    }
}
