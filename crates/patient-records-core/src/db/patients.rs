//! Patient operations on the single-table store.

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rusqlite::{params, OptionalExtension, Row};
use tracing::{debug, warn};

use super::Database;
use crate::keys::{self, METADATA_SK, PATIENT_GSI1SK};
use crate::models::{Patient, PatientStatus};
use crate::store::{PatientStore, StoreError, StoreResult};

const COLUMNS: &str = "pk, gsi1pk, id, name, date_of_birth, medical_record_number, status, created_at, updated_at";

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Raw patient row before decoding.
struct PatientRow {
    pk: String,
    gsi1pk: String,
    id: String,
    name: String,
    date_of_birth: String,
    medical_record_number: String,
    status: String,
    created_at: String,
    updated_at: String,
}

impl PatientRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            pk: row.get(0)?,
            gsi1pk: row.get(1)?,
            id: row.get(2)?,
            name: row.get(3)?,
            date_of_birth: row.get(4)?,
            medical_record_number: row.get(5)?,
            status: row.get(6)?,
            created_at: row.get(7)?,
            updated_at: row.get(8)?,
        })
    }
}

impl TryFrom<PatientRow> for Patient {
    type Error = StoreError;

    fn try_from(row: PatientRow) -> Result<Self, Self::Error> {
        let corrupt = |reason: String| StoreError::CorruptRecord {
            key: row.pk.clone(),
            reason,
        };

        if keys::id_from_partition(&row.pk) != Some(row.id.as_str()) {
            return Err(corrupt(format!("primary key does not match id {}", row.id)));
        }
        if keys::mrn_from_partition(&row.gsi1pk) != Some(row.medical_record_number.as_str()) {
            return Err(corrupt(format!(
                "index key {} does not match MRN {}",
                row.gsi1pk, row.medical_record_number
            )));
        }

        let date_of_birth = NaiveDate::parse_from_str(&row.date_of_birth, DATE_FORMAT)
            .map_err(|e| corrupt(format!("bad date_of_birth: {e}")))?;
        let status = row
            .status
            .parse::<PatientStatus>()
            .map_err(|e| corrupt(e.to_string()))?;
        let created_at = parse_timestamp(&row.created_at)
            .map_err(|e| corrupt(format!("bad created_at: {e}")))?;
        let updated_at = parse_timestamp(&row.updated_at)
            .map_err(|e| corrupt(format!("bad updated_at: {e}")))?;

        Ok(Patient {
            id: row.id,
            name: row.name,
            date_of_birth,
            medical_record_number: row.medical_record_number,
            status,
            created_at,
            updated_at,
        })
    }
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(value).map(|ts| ts.with_timezone(&Utc))
}

fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

impl PatientStore for Database {
    fn put(&self, patient: &Patient) -> StoreResult<Patient> {
        let primary = patient.primary_key();
        let index = patient.index_key();

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let owner: Option<String> = tx
            .query_row(
                &format!(
                    "SELECT id FROM {} WHERE gsi1pk = ?1 AND gsi1sk = ?2 AND pk != ?3 LIMIT 1",
                    self.table
                ),
                params![index.partition, index.sort, primary.partition],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(existing_id) = owner {
            return Err(StoreError::MrnConflict {
                mrn: patient.medical_record_number.clone(),
                existing_id,
            });
        }

        // Replacing the whole row also rewrites gsi1pk, so an MRN change
        // leaves no stale index entry behind.
        tx.execute(
            &format!(
                r#"
                INSERT OR REPLACE INTO {} (
                    pk, sk, gsi1pk, gsi1sk, id, name, date_of_birth,
                    medical_record_number, status, created_at, updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                "#,
                self.table
            ),
            params![
                primary.partition,
                primary.sort,
                index.partition,
                index.sort,
                patient.id,
                patient.name,
                patient.date_of_birth.format(DATE_FORMAT).to_string(),
                patient.medical_record_number,
                patient.status.as_str(),
                format_timestamp(&patient.created_at),
                format_timestamp(&patient.updated_at),
            ],
        )?;
        tx.commit()?;

        debug!(id = %patient.id, pk = %primary.partition, gsi1pk = %index.partition, "put patient");
        Ok(patient.clone())
    }

    fn get_by_id(&self, id: &str) -> StoreResult<Option<Patient>> {
        let key = keys::derive_from_id(id);
        let conn = self.conn()?;

        conn.query_row(
            &format!("SELECT {COLUMNS} FROM {} WHERE pk = ?1 AND sk = ?2", self.table),
            params![key.partition, key.sort],
            PatientRow::from_row,
        )
        .optional()?
        .map(Patient::try_from)
        .transpose()
    }

    fn get_by_mrn(&self, mrn: &str) -> StoreResult<Option<Patient>> {
        let key = keys::derive_from_mrn(mrn);
        let conn = self.conn()?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {COLUMNS} FROM {} WHERE gsi1pk = ?1 AND gsi1sk = ?2 ORDER BY created_at, pk",
            self.table
        ))?;
        let rows = stmt
            .query_map(params![key.partition, key.sort], PatientRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        if rows.len() > 1 {
            let ids: Vec<&str> = rows.iter().map(|row| row.id.as_str()).collect();
            warn!(%mrn, ?ids, "MRN index resolves to more than one patient; returning the first");
        }

        rows.into_iter().next().map(Patient::try_from).transpose()
    }

    fn list_all(&self) -> StoreResult<Vec<Patient>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {COLUMNS} FROM {} WHERE sk = ?1 AND gsi1sk = ?2",
            self.table
        ))?;
        let rows = stmt.query_map(params![METADATA_SK, PATIENT_GSI1SK], PatientRow::from_row)?;

        let mut patients = Vec::new();
        for row in rows {
            patients.push(Patient::try_from(row?)?);
        }

        debug!(count = patients.len(), table = %self.table, "scanned patient table");
        Ok(patients)
    }

    fn delete_by_id(&self, id: &str) -> StoreResult<bool> {
        let key = keys::derive_from_id(id);
        let conn = self.conn()?;

        let rows_affected = conn.execute(
            &format!("DELETE FROM {} WHERE pk = ?1 AND sk = ?2", self.table),
            params![key.partition, key.sort],
        )?;

        debug!(%id, deleted = rows_affected > 0, "delete patient");
        Ok(rows_affected > 0)
    }
}
