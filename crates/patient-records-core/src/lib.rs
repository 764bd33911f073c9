//! Patient Records Core Library
//!
//! Patient persistence with two interchangeable storage backends and a
//! single-table key layout that supports lookup by id and by MRN.
//!
//! # Architecture
//!
//! ```text
//!                       Host app (FFI)
//!                             │
//!                      PatientService
//!          id assignment · timestamps · merge-on-update
//!                             │
//!                  dyn PatientStore (chosen once)
//!                 ┌───────────┴───────────┐
//!                 ▼                       ▼
//!       InMemoryPatientStore         Database (SQLite)
//!       id → patient                 pk = PATIENT#<id>  sk = METADATA
//!       MRN → id                     gsi1pk = MRN#<mrn> gsi1sk = PATIENT
//!       (one guard)                  provisioned before first use
//! ```
//!
//! # Modules
//!
//! - [`keys`]: key derivation for the single-table layout
//! - [`models`]: Patient and its input/update shapes
//! - [`store`]: the `PatientStore` contract and the in-memory backend
//! - [`db`]: SQLite backend and table provisioning
//! - [`service`]: `PatientService`
//! - [`config`]: startup configuration

pub mod config;
pub mod db;
pub mod keys;
pub mod models;
pub mod service;
pub mod store;

// Re-export commonly used types
pub use config::{AppConfig, ConfigError, StoreBackend};
pub use db::{
    Database, ProvisionError, ProvisionOutcome, TableDescription, UnprovisionedDatabase,
};
pub use models::{Patient, PatientInput, PatientStatus, PatientUpdate};
pub use service::{Clock, IdGenerator, PatientError, PatientResult, PatientService};
pub use store::{InMemoryPatientStore, PatientStore, StoreError, StoreResult};

// UniFFI setup - using proc macros
uniffi::setup_scaffolding!();

use std::sync::Arc;

use chrono::NaiveDate;
use tracing::error;
use tracing_subscriber::EnvFilter;

// =========================================================================
// FFI Error Type
// =========================================================================

/// Client-facing errors. Storage details stay in the logs.
#[derive(Debug, thiserror::Error, uniffi::Error)]
pub enum PatientRecordsError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<PatientError> for PatientRecordsError {
    fn from(e: PatientError) -> Self {
        match e {
            PatientError::InvalidInput(msg) => PatientRecordsError::InvalidInput(msg),
            PatientError::Store(StoreError::MrnConflict { mrn, .. }) => {
                PatientRecordsError::Conflict(format!("medical record number {mrn} is already in use"))
            }
            other => {
                error!(error = %other, "patient storage failure");
                PatientRecordsError::StorageError("the patient store could not complete the request".into())
            }
        }
    }
}

impl From<ConfigError> for PatientRecordsError {
    fn from(e: ConfigError) -> Self {
        PatientRecordsError::ConfigurationError(e.to_string())
    }
}

impl From<serde_json::Error> for PatientRecordsError {
    fn from(e: serde_json::Error) -> Self {
        PatientRecordsError::SerializationError(e.to_string())
    }
}

// =========================================================================
// Factory Functions (exported to FFI)
// =========================================================================

/// Install a `tracing` subscriber. Later calls are no-ops.
#[uniffi::export]
pub fn init_logging(filter: String) {
    let filter = EnvFilter::try_new(&filter).unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Open a core backed by the in-memory store.
#[uniffi::export]
pub fn open_in_memory() -> Arc<PatientRecordsCore> {
    let store: Arc<dyn PatientStore> = Arc::new(InMemoryPatientStore::new());
    Arc::new(PatientRecordsCore {
        service: PatientService::new(store),
    })
}

/// Open or create a SQLite database at the given path.
#[uniffi::export]
pub fn open_database(path: String) -> Result<Arc<PatientRecordsCore>, PatientRecordsError> {
    let service = PatientService::from_config(&AppConfig::sqlite(path))?;
    Ok(Arc::new(PatientRecordsCore { service }))
}

/// Open the backend named by the process environment.
#[uniffi::export]
pub fn open_from_env() -> Result<Arc<PatientRecordsCore>, PatientRecordsError> {
    let config = AppConfig::from_env()?;
    let service = PatientService::from_config(&config)?;
    Ok(Arc::new(PatientRecordsCore { service }))
}

// =========================================================================
// Main API Object
// =========================================================================

/// Thread-safe patient API for FFI.
#[derive(uniffi::Object)]
pub struct PatientRecordsCore {
    service: PatientService,
}

#[uniffi::export]
impl PatientRecordsCore {
    /// Create a new patient.
    pub fn create_patient(&self, input: FfiPatientInput) -> Result<FfiPatient, PatientRecordsError> {
        let patient = self.service.create_patient(input.try_into()?)?;
        Ok(patient.into())
    }

    /// Get a patient by id.
    pub fn get_patient(&self, id: String) -> Result<Option<FfiPatient>, PatientRecordsError> {
        let patient = self.service.get_patient(&id)?;
        Ok(patient.map(|p| p.into()))
    }

    /// List every patient (full scan).
    pub fn list_patients(&self) -> Result<Vec<FfiPatient>, PatientRecordsError> {
        let patients = self.service.get_all_patients()?;
        Ok(patients.into_iter().map(|p| p.into()).collect())
    }

    /// List every patient as a JSON array.
    pub fn list_patients_json(&self) -> Result<String, PatientRecordsError> {
        let patients = self.service.get_all_patients()?;
        Ok(serde_json::to_string(&patients)?)
    }

    /// Update a patient. `None` if the id is unknown.
    pub fn update_patient(
        &self,
        id: String,
        update: FfiPatientUpdate,
    ) -> Result<Option<FfiPatient>, PatientRecordsError> {
        let patient = self.service.update_patient(&id, update.try_into()?)?;
        Ok(patient.map(|p| p.into()))
    }

    /// Delete a patient. `false` if the id is unknown.
    pub fn delete_patient(&self, id: String) -> Result<bool, PatientRecordsError> {
        Ok(self.service.delete_patient(&id)?)
    }

    /// Find a patient by medical record number.
    pub fn find_by_medical_record_number(
        &self,
        mrn: String,
    ) -> Result<Option<FfiPatient>, PatientRecordsError> {
        let patient = self.service.find_by_medical_record_number(&mrn)?;
        Ok(patient.map(|p| p.into()))
    }
}

// =========================================================================
// FFI Types
// =========================================================================

/// FFI-safe patient. Dates are `YYYY-MM-DD`, timestamps RFC 3339.
#[derive(Debug, Clone, PartialEq, uniffi::Record)]
pub struct FfiPatient {
    pub id: String,
    pub name: String,
    pub date_of_birth: String,
    pub medical_record_number: String,
    pub status: String,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Patient> for FfiPatient {
    fn from(patient: Patient) -> Self {
        Self {
            id: patient.id,
            name: patient.name,
            date_of_birth: patient.date_of_birth.to_string(),
            medical_record_number: patient.medical_record_number,
            status: patient.status.to_string(),
            created_at: patient.created_at.to_rfc3339(),
            updated_at: patient.updated_at.to_rfc3339(),
        }
    }
}

/// FFI-safe create request.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiPatientInput {
    pub name: String,
    pub date_of_birth: String,
    pub medical_record_number: String,
    pub status: Option<String>,
}

impl TryFrom<FfiPatientInput> for PatientInput {
    type Error = PatientRecordsError;

    fn try_from(input: FfiPatientInput) -> Result<Self, Self::Error> {
        Ok(PatientInput {
            name: input.name,
            date_of_birth: parse_date(&input.date_of_birth)?,
            medical_record_number: input.medical_record_number,
            status: input.status.as_deref().map(parse_status).transpose()?,
        })
    }
}

/// FFI-safe partial update.
#[derive(Debug, Clone, Default, uniffi::Record)]
pub struct FfiPatientUpdate {
    pub name: Option<String>,
    pub date_of_birth: Option<String>,
    pub medical_record_number: Option<String>,
    pub status: Option<String>,
}

impl TryFrom<FfiPatientUpdate> for PatientUpdate {
    type Error = PatientRecordsError;

    fn try_from(update: FfiPatientUpdate) -> Result<Self, Self::Error> {
        Ok(PatientUpdate {
            name: update.name,
            date_of_birth: update.date_of_birth.as_deref().map(parse_date).transpose()?,
            medical_record_number: update.medical_record_number,
            status: update.status.as_deref().map(parse_status).transpose()?,
        })
    }
}

fn parse_date(value: &str) -> Result<NaiveDate, PatientRecordsError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|e| PatientRecordsError::InvalidInput(format!("dateOfBirth {value:?}: {e}")))
}

fn parse_status(value: &str) -> Result<PatientStatus, PatientRecordsError> {
    value
        .parse()
        .map_err(|e: models::UnknownStatus| PatientRecordsError::InvalidInput(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jane() -> FfiPatientInput {
        FfiPatientInput {
            name: "Jane Doe".into(),
            date_of_birth: "1990-01-01".into(),
            medical_record_number: "MRN-100".into(),
            status: None,
        }
    }

    #[test]
    fn test_patient_lifecycle() {
        let core = open_in_memory();

        let created = core.create_patient(jane()).unwrap();
        assert!(!created.id.is_empty());
        assert_eq!(created.status, "ACTIVE");
        assert_eq!(created.date_of_birth, "1990-01-01");

        let found = core
            .find_by_medical_record_number("MRN-100".into())
            .unwrap()
            .unwrap();
        assert_eq!(found, created);

        assert!(core.delete_patient(created.id.clone()).unwrap());
        assert_eq!(core.get_patient(created.id).unwrap(), None);
        assert_eq!(core.find_by_medical_record_number("MRN-100".into()).unwrap(), None);
    }

    #[test]
    fn test_invalid_date_is_rejected() {
        let core = open_in_memory();
        let mut input = jane();
        input.date_of_birth = "01/01/1990".into();

        let err = core.create_patient(input).unwrap_err();
        assert!(matches!(err, PatientRecordsError::InvalidInput(_)));
    }

    #[test]
    fn test_invalid_status_is_rejected() {
        let core = open_in_memory();
        let created = core.create_patient(jane()).unwrap();

        let err = core
            .update_patient(
                created.id,
                FfiPatientUpdate {
                    status: Some("ARCHIVED".into()),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, PatientRecordsError::InvalidInput(_)));
    }

    #[test]
    fn test_duplicate_mrn_is_a_conflict() {
        let core = open_in_memory();
        core.create_patient(jane()).unwrap();

        let err = core.create_patient(jane()).unwrap_err();
        assert!(matches!(err, PatientRecordsError::Conflict(_)));
    }

    #[test]
    fn test_update_through_facade() {
        let core = open_in_memory();
        let created = core.create_patient(jane()).unwrap();

        let updated = core
            .update_patient(
                created.id.clone(),
                FfiPatientUpdate {
                    status: Some("inactive".into()),
                    ..Default::default()
                },
            )
            .unwrap()
            .unwrap();
        assert_eq!(updated.id, created.id);
        assert_eq!(updated.status, "INACTIVE");
        assert_eq!(updated.created_at, created.created_at);

        let missing = core
            .update_patient("nobody".into(), FfiPatientUpdate::default())
            .unwrap();
        assert_eq!(missing, None);
    }

    #[test]
    fn test_storage_faults_are_not_leaked() {
        let err: PatientRecordsError = PatientError::Store(StoreError::CorruptRecord {
            key: "PATIENT#p-1".into(),
            reason: "bad date_of_birth".into(),
        })
        .into();

        let message = err.to_string();
        assert!(matches!(err, PatientRecordsError::StorageError(_)));
        assert!(!message.contains("PATIENT#"));
    }

    #[test]
    fn test_list_patients_json() {
        let core = open_in_memory();
        core.create_patient(jane()).unwrap();

        let json: serde_json::Value = serde_json::from_str(&core.list_patients_json().unwrap()).unwrap();
        assert_eq!(json[0]["medicalRecordNumber"], "MRN-100");
        assert_eq!(core.list_patients().unwrap().len(), 1);
    }

    #[test]
    fn test_open_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.db");

        let core = open_database(path.to_string_lossy().into_owned()).unwrap();
        let created = core.create_patient(jane()).unwrap();
        drop(core);

        let reopened = open_database(path.to_string_lossy().into_owned()).unwrap();
        assert_eq!(reopened.get_patient(created.id).unwrap().unwrap().name, "Jane Doe");
    }
}
