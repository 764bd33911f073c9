//! Provisioning tests against file-backed databases.

use chrono::NaiveDate;
use patient_records_core::{
    AppConfig, Database, PatientInput, PatientService, PatientStore, ProvisionOutcome, StoreBackend,
    UnprovisionedDatabase,
};

fn schema_sql(db: &Database) -> Vec<String> {
    let conn = db.conn().unwrap();
    let mut stmt = conn
        .prepare("SELECT sql FROM sqlite_master WHERE tbl_name = ?1 AND sql IS NOT NULL ORDER BY name")
        .unwrap();
    let rows = stmt.query_map([db.table()], |row| row.get(0)).unwrap();
    rows.collect::<Result<Vec<String>, _>>().unwrap()
}

#[test]
fn test_provisioning_twice_changes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("patients.db");

    let (db, outcome) = UnprovisionedDatabase::connect(&path, "patients")
        .unwrap()
        .provision()
        .unwrap();
    assert_eq!(outcome, ProvisionOutcome::Created);
    let after_first = schema_sql(&db);

    assert_eq!(db.provision().unwrap(), ProvisionOutcome::AlreadyProvisioned);
    assert_eq!(schema_sql(&db), after_first);
}

#[test]
fn test_restart_keeps_data() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("patients.db");
    let config = AppConfig::sqlite(&path);
    assert!(matches!(config.backend(), StoreBackend::Sqlite { .. }));

    let service = PatientService::from_config(&config).unwrap();
    let created = service
        .create_patient(PatientInput::new(
            "Jane Doe",
            NaiveDate::from_ymd_opt(1990, 1, 1).unwrap(),
            "MRN-100",
        ))
        .unwrap();
    drop(service);

    // Second startup provisions again against the existing table
    let (db, outcome) = UnprovisionedDatabase::connect(&path, "patients")
        .unwrap()
        .provision()
        .unwrap();
    assert_eq!(outcome, ProvisionOutcome::AlreadyProvisioned);
    assert_eq!(db.get_by_mrn("MRN-100").unwrap(), Some(created));
}

#[test]
fn test_second_process_sees_provisioned_table() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("patients.db");

    let first = UnprovisionedDatabase::connect(&path, "patients").unwrap();
    let second = UnprovisionedDatabase::connect(&path, "patients").unwrap();

    let (first, outcome) = first.provision().unwrap();
    assert_eq!(outcome, ProvisionOutcome::Created);
    let (second, outcome) = second.provision().unwrap();
    assert_eq!(outcome, ProvisionOutcome::AlreadyProvisioned);
    assert_eq!(schema_sql(&first), schema_sql(&second));
}

#[test]
fn test_tables_are_isolated_by_name() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("shared.db");

    let clinic_a = Database::open(&path, "clinic_a_patients").unwrap();
    let clinic_b = Database::open(&path, "clinic_b_patients").unwrap();

    let service_a = PatientService::new(std::sync::Arc::new(clinic_a));
    service_a
        .create_patient(PatientInput::new(
            "Jane Doe",
            NaiveDate::from_ymd_opt(1990, 1, 1).unwrap(),
            "MRN-100",
        ))
        .unwrap();

    assert_eq!(clinic_b.get_by_mrn("MRN-100").unwrap(), None);
    assert!(clinic_b.list_all().unwrap().is_empty());
}
