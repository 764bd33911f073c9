//! In-memory patient store.

use std::collections::HashMap;
use std::sync::RwLock;

use tracing::{debug, warn};

use super::{PatientStore, StoreError, StoreResult};
use crate::models::Patient;

/// Both maps live in one struct so a single guard covers the pair.
#[derive(Debug, Default)]
struct Tables {
    patients: HashMap<String, Patient>,
    /// MRN -> patient id
    mrn_index: HashMap<String, String>,
}

/// Map-backed store for local development and tests.
#[derive(Debug, Default)]
pub struct InMemoryPatientStore {
    tables: RwLock<Tables>,
}

impl InMemoryPatientStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PatientStore for InMemoryPatientStore {
    fn put(&self, patient: &Patient) -> StoreResult<Patient> {
        let mut tables = self.tables.write()?;
        let mrn = &patient.medical_record_number;

        if let Some(owner) = tables.mrn_index.get(mrn) {
            if owner != &patient.id && tables.patients.contains_key(owner) {
                return Err(StoreError::MrnConflict {
                    mrn: mrn.clone(),
                    existing_id: owner.clone(),
                });
            }
        }

        let previous_mrn = tables
            .patients
            .get(&patient.id)
            .map(|previous| previous.medical_record_number.clone())
            .filter(|previous| previous != mrn);
        if let Some(previous_mrn) = previous_mrn {
            if tables.mrn_index.get(&previous_mrn) == Some(&patient.id) {
                tables.mrn_index.remove(&previous_mrn);
                debug!(id = %patient.id, mrn = %previous_mrn, "dropped stale MRN index entry");
            }
        }

        tables.mrn_index.insert(mrn.clone(), patient.id.clone());
        tables.patients.insert(patient.id.clone(), patient.clone());
        Ok(patient.clone())
    }

    fn get_by_id(&self, id: &str) -> StoreResult<Option<Patient>> {
        let tables = self.tables.read()?;
        Ok(tables.patients.get(id).cloned())
    }

    fn get_by_mrn(&self, mrn: &str) -> StoreResult<Option<Patient>> {
        let tables = self.tables.read()?;
        let Some(id) = tables.mrn_index.get(mrn) else {
            return Ok(None);
        };

        match tables.patients.get(id) {
            Some(patient) => Ok(Some(patient.clone())),
            None => {
                warn!(%mrn, %id, "MRN index entry points to a missing patient");
                Ok(None)
            }
        }
    }

    fn list_all(&self) -> StoreResult<Vec<Patient>> {
        let tables = self.tables.read()?;
        Ok(tables.patients.values().cloned().collect())
    }

    fn delete_by_id(&self, id: &str) -> StoreResult<bool> {
        let mut tables = self.tables.write()?;
        let Some(patient) = tables.patients.remove(id) else {
            return Ok(false);
        };

        if tables.mrn_index.get(&patient.medical_record_number).map(String::as_str) == Some(id) {
            tables.mrn_index.remove(&patient.medical_record_number);
        }
        debug!(%id, "deleted patient");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PatientStatus;
    use chrono::{NaiveDate, Utc};
    use std::sync::Arc;
    use std::thread;

    fn patient(id: &str, mrn: &str) -> Patient {
        let now = Utc::now();
        Patient {
            id: id.into(),
            name: "Jane Doe".into(),
            date_of_birth: NaiveDate::from_ymd_opt(1990, 1, 1).unwrap(),
            medical_record_number: mrn.into(),
            status: PatientStatus::Active,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_put_and_get() {
        let store = InMemoryPatientStore::new();
        let stored = store.put(&patient("p-1", "MRN-100")).unwrap();

        assert_eq!(store.get_by_id("p-1").unwrap(), Some(stored.clone()));
        assert_eq!(store.get_by_mrn("MRN-100").unwrap(), Some(stored));
        assert_eq!(store.get_by_id("p-2").unwrap(), None);
    }

    #[test]
    fn test_rejects_conflicting_mrn() {
        let store = InMemoryPatientStore::new();
        store.put(&patient("p-1", "MRN-100")).unwrap();

        let err = store.put(&patient("p-2", "MRN-100")).unwrap_err();
        assert!(matches!(
            err,
            StoreError::MrnConflict { ref existing_id, .. } if existing_id == "p-1"
        ));
        assert_eq!(store.get_by_id("p-2").unwrap(), None);
        assert_eq!(store.get_by_mrn("MRN-100").unwrap().unwrap().id, "p-1");
    }

    #[test]
    fn test_mrn_change_drops_stale_entry() {
        let store = InMemoryPatientStore::new();
        store.put(&patient("p-1", "MRN-100")).unwrap();
        store.put(&patient("p-1", "MRN-200")).unwrap();

        assert_eq!(store.get_by_mrn("MRN-100").unwrap(), None);
        assert_eq!(store.get_by_mrn("MRN-200").unwrap().unwrap().id, "p-1");

        // The old MRN is free again
        store.put(&patient("p-2", "MRN-100")).unwrap();
        assert_eq!(store.get_by_mrn("MRN-100").unwrap().unwrap().id, "p-2");
    }

    #[test]
    fn test_delete_removes_both_entries() {
        let store = InMemoryPatientStore::new();
        store.put(&patient("p-1", "MRN-100")).unwrap();

        assert!(store.delete_by_id("p-1").unwrap());
        assert!(!store.delete_by_id("p-1").unwrap());
        assert_eq!(store.get_by_id("p-1").unwrap(), None);
        assert_eq!(store.get_by_mrn("MRN-100").unwrap(), None);

        let tables = store.tables.read().unwrap();
        assert!(tables.mrn_index.is_empty());
    }

    #[test]
    fn test_dangling_index_entry_reads_as_absent() {
        let store = InMemoryPatientStore::new();
        store
            .tables
            .write()
            .unwrap()
            .mrn_index
            .insert("MRN-404".into(), "ghost".into());

        assert_eq!(store.get_by_mrn("MRN-404").unwrap(), None);
        // A dangling entry does not block a new owner
        store.put(&patient("p-1", "MRN-404")).unwrap();
        assert_eq!(store.get_by_mrn("MRN-404").unwrap().unwrap().id, "p-1");
    }

    #[test]
    fn test_concurrent_put_and_delete_leave_no_orphans() {
        let store = Arc::new(InMemoryPatientStore::new());

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    for i in 0..50 {
                        let id = format!("p-{t}-{i}");
                        store.put(&patient(&id, &format!("MRN-{t}-{i}"))).unwrap();
                        if i % 2 == 0 {
                            assert!(store.delete_by_id(&id).unwrap());
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let tables = store.tables.read().unwrap();
        assert_eq!(tables.patients.len(), 8 * 25);
        assert_eq!(tables.mrn_index.len(), tables.patients.len());
        for (mrn, id) in &tables.mrn_index {
            assert_eq!(&tables.patients[id].medical_record_number, mrn);
        }
    }
}
