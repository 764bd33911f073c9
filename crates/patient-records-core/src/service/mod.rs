//! Patient service.
//!
//! Orchestrates id assignment, timestamps and merge-on-update on top of
//! whichever [`PatientStore`] was wired in. Updates are last-writer-wins.

mod clock;

pub use clock::*;

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;
use tracing::{debug, info};

use crate::config::AppConfig;
use crate::db::ProvisionError;
use crate::models::{Patient, PatientInput, PatientUpdate};
use crate::store::{self, PatientStore, StoreError};

/// Service errors.
#[derive(Error, Debug)]
pub enum PatientError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Provision(#[from] ProvisionError),
}

pub type PatientResult<T> = Result<T, PatientError>;

/// Backend-agnostic patient operations.
#[derive(Clone)]
pub struct PatientService {
    store: Arc<dyn PatientStore>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
}

impl PatientService {
    /// Create a service using the system clock and UUID ids.
    pub fn new(store: Arc<dyn PatientStore>) -> Self {
        Self::with_sources(store, Arc::new(SystemClock), Arc::new(UuidGenerator))
    }

    pub fn with_sources(
        store: Arc<dyn PatientStore>,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
    ) -> Self {
        Self { store, clock, ids }
    }

    /// Wire the backend selected by `config`, provisioning it first.
    pub fn from_config(config: &AppConfig) -> PatientResult<Self> {
        let store = store::open_store(config)?;
        info!(backend = config.backend().name(), "patient service ready");
        Ok(Self::new(store))
    }

    pub fn create_patient(&self, input: PatientInput) -> PatientResult<Patient> {
        require_non_blank("medicalRecordNumber", &input.medical_record_number)?;

        let now = self.clock.now();
        let patient = Patient {
            id: self.ids.generate(),
            name: input.name,
            date_of_birth: input.date_of_birth,
            medical_record_number: input.medical_record_number,
            status: input.status.unwrap_or_default(),
            created_at: now,
            updated_at: now,
        };

        let created = self.store.put(&patient)?;
        debug!(id = %created.id, "created patient");
        Ok(created)
    }

    pub fn get_patient(&self, id: &str) -> PatientResult<Option<Patient>> {
        require_non_blank("id", id)?;
        Ok(self.store.get_by_id(id)?)
    }

    pub fn get_all_patients(&self) -> PatientResult<Vec<Patient>> {
        Ok(self.store.list_all()?)
    }

    /// Merge `update` onto the stored patient. `None` if `id` is unknown.
    pub fn update_patient(&self, id: &str, update: PatientUpdate) -> PatientResult<Option<Patient>> {
        require_non_blank("id", id)?;
        if let Some(mrn) = &update.medical_record_number {
            require_non_blank("medicalRecordNumber", mrn)?;
        }

        let Some(mut patient) = self.store.get_by_id(id)? else {
            return Ok(None);
        };

        let previous_update = patient.updated_at;
        patient.merge(update);
        patient.updated_at = self.next_update_time(previous_update);

        let updated = self.store.put(&patient)?;
        debug!(id = %updated.id, "updated patient");
        Ok(Some(updated))
    }

    pub fn delete_patient(&self, id: &str) -> PatientResult<bool> {
        require_non_blank("id", id)?;
        Ok(self.store.delete_by_id(id)?)
    }

    pub fn find_by_medical_record_number(&self, mrn: &str) -> PatientResult<Option<Patient>> {
        require_non_blank("medicalRecordNumber", mrn)?;
        Ok(self.store.get_by_mrn(mrn)?)
    }

    /// `updatedAt` must strictly increase even if the clock has not moved.
    fn next_update_time(&self, previous: DateTime<Utc>) -> DateTime<Utc> {
        let now = self.clock.now();
        if now > previous {
            now
        } else {
            previous + Duration::microseconds(1)
        }
    }
}

fn require_non_blank(field: &str, value: &str) -> PatientResult<()> {
    if value.trim().is_empty() {
        return Err(PatientError::InvalidInput(format!("{field} must not be empty")));
    }
    Ok(())
}
