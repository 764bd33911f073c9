//! Storage backend interface.
//!
//! [`PatientStore`] is implemented by exactly two backends:
//!
//! - [`InMemoryPatientStore`] for local development and tests
//! - [`Database`](crate::db::Database), the SQLite single-table store
//!
//! The backend is chosen once from [`AppConfig`] by [`open_store`]; nothing
//! downstream inspects which one it got.

mod memory;

pub use memory::*;

use std::sync::{Arc, PoisonError};

use thiserror::Error;
use tracing::info;

use crate::config::{AppConfig, StoreBackend};
use crate::db::{Database, ProvisionError};
use crate::models::Patient;

/// Storage errors.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Medical record number {mrn} already belongs to patient {existing_id}")]
    MrnConflict { mrn: String, existing_id: String },

    #[error("Corrupt record {key}: {reason}")]
    CorruptRecord { key: String, reason: String },

    #[error("Lock poisoned: {0}")]
    LockPoisoned(String),
}

impl<T> From<PoisonError<T>> for StoreError {
    fn from(e: PoisonError<T>) -> Self {
        StoreError::LockPoisoned(e.to_string())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Capability contract shared by every patient backend.
///
/// Absence is reported as `None`/`false`, never as an error. `put` and
/// `delete_by_id` are atomic with respect to the pair (primary record, MRN
/// index entry).
pub trait PatientStore: Send + Sync {
    /// Upsert by primary key and refresh the MRN association.
    ///
    /// The caller supplies a complete record; no id is generated here.
    /// Fails with [`StoreError::MrnConflict`] if another live patient holds
    /// the same MRN.
    fn put(&self, patient: &Patient) -> StoreResult<Patient>;

    fn get_by_id(&self, id: &str) -> StoreResult<Option<Patient>>;

    /// Resolve through the MRN index.
    ///
    /// A dangling index entry is logged and reported as `None`; multiple hits
    /// are logged and the first one is returned.
    fn get_by_mrn(&self, mrn: &str) -> StoreResult<Option<Patient>>;

    /// Every stored patient, in no particular order.
    ///
    /// This is a full scan: O(table size) and not paginated.
    fn list_all(&self) -> StoreResult<Vec<Patient>>;

    /// Remove the record and its index entry. `false` if nothing was stored.
    fn delete_by_id(&self, id: &str) -> StoreResult<bool>;
}

/// Build the backend selected by `config`.
///
/// The SQLite backend is provisioned before it is returned; a provisioning
/// failure means no store is handed out.
pub fn open_store(config: &AppConfig) -> Result<Arc<dyn PatientStore>, ProvisionError> {
    match config.backend() {
        StoreBackend::Memory => {
            info!("using in-memory patient store");
            Ok(Arc::new(InMemoryPatientStore::new()))
        }
        StoreBackend::Sqlite { path } => {
            info!(path = %path.display(), table = config.table_name(), "using SQLite patient store");
            let db = Database::open(path, config.table_name())?;
            Ok(Arc::new(db))
        }
    }
}
