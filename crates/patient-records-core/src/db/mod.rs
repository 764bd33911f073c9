//! SQLite single-table store.
//!
//! One table holds patient rows addressed by `(pk, sk)`, with a secondary
//! index over `(gsi1pk, gsi1sk)`. See [`crate::keys`] for the key layout.

mod patients;
mod schema;

pub use schema::*;

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::Connection;

use crate::store::StoreResult;

/// Database connection wrapper.
pub struct Database {
    conn: Mutex<Connection>,
    table: String,
}

impl Database {
    /// Open database at path, creating and provisioning it if needed.
    pub fn open<P: AsRef<Path>>(path: P, table: &str) -> Result<Self, ProvisionError> {
        let (db, _) = UnprovisionedDatabase::connect(path, table)?.provision()?;
        Ok(db)
    }

    /// Create an in-memory database (for testing).
    pub fn open_in_memory(table: &str) -> Result<Self, ProvisionError> {
        validate_table_name(table)?;
        let db = Self {
            conn: Mutex::new(Connection::open_in_memory()?),
            table: table.to_string(),
        };
        db.provision()?;
        Ok(db)
    }

    /// Name of the patient table.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Get raw connection (for advanced queries).
    pub fn conn(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        Ok(self.conn.lock()?)
    }
}

/// A connection whose patient table may not exist yet.
///
/// It is not a [`crate::PatientStore`]; [`UnprovisionedDatabase::provision`]
/// hands out the [`Database`] once the table and index are in place.
pub struct UnprovisionedDatabase {
    inner: Database,
}

impl UnprovisionedDatabase {
    /// Open a connection without touching the schema.
    pub fn connect<P: AsRef<Path>>(path: P, table: &str) -> Result<Self, ProvisionError> {
        validate_table_name(table)?;
        Ok(Self {
            inner: Database {
                conn: Mutex::new(Connection::open(path)?),
                table: table.to_string(),
            },
        })
    }

    pub fn table(&self) -> &str {
        self.inner.table()
    }

    /// Describe the patient table, or `None` if it does not exist.
    pub fn describe_table(&self) -> StoreResult<Option<TableDescription>> {
        self.inner.describe_table()
    }

    /// Provision the table and return the usable store.
    pub fn provision(self) -> Result<(Database, ProvisionOutcome), ProvisionError> {
        let outcome = self.inner.provision()?;
        Ok((self.inner, outcome))
    }
}
