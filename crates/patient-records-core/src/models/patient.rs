//! Patient models.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::keys::{self, StoreKey};

/// Lifecycle status of a patient record.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PatientStatus {
    #[default]
    Active,
    Inactive,
    Deceased,
}

impl PatientStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PatientStatus::Active => "ACTIVE",
            PatientStatus::Inactive => "INACTIVE",
            PatientStatus::Deceased => "DECEASED",
        }
    }
}

impl fmt::Display for PatientStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a status string is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown patient status: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for PatientStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ACTIVE" => Ok(PatientStatus::Active),
            "INACTIVE" => Ok(PatientStatus::Inactive),
            "DECEASED" => Ok(PatientStatus::Deceased),
            _ => Err(UnknownStatus(s.to_string())),
        }
    }
}

/// A stored patient record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Patient {
    /// Server-generated opaque identifier
    pub id: String,
    pub name: String,
    pub date_of_birth: NaiveDate,
    /// Externally issued MRN, unique among live patients
    pub medical_record_number: String,
    pub status: PatientStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Patient {
    /// Address of this patient's metadata record.
    pub fn primary_key(&self) -> StoreKey {
        keys::derive_from_id(&self.id)
    }

    /// Address of this patient's entry in the MRN index.
    pub fn index_key(&self) -> StoreKey {
        keys::derive_from_mrn(&self.medical_record_number)
    }

    /// Apply the supplied fields of an update, leaving identity untouched.
    pub fn merge(&mut self, update: PatientUpdate) {
        if let Some(name) = update.name {
            self.name = name;
        }
        if let Some(date_of_birth) = update.date_of_birth {
            self.date_of_birth = date_of_birth;
        }
        if let Some(mrn) = update.medical_record_number {
            self.medical_record_number = mrn;
        }
        if let Some(status) = update.status {
            self.status = status;
        }
    }
}

/// Caller-supplied fields for a new patient.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PatientInput {
    pub name: String,
    pub date_of_birth: NaiveDate,
    pub medical_record_number: String,
    /// Defaults to `ACTIVE` when omitted
    #[serde(default)]
    pub status: Option<PatientStatus>,
}

impl PatientInput {
    pub fn new(name: impl Into<String>, date_of_birth: NaiveDate, mrn: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            date_of_birth,
            medical_record_number: mrn.into(),
            status: None,
        }
    }
}

/// Partial update; `None` fields keep their stored value.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PatientUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub date_of_birth: Option<NaiveDate>,
    #[serde(default)]
    pub medical_record_number: Option<String>,
    #[serde(default)]
    pub status: Option<PatientStatus>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Patient {
        let now = Utc::now();
        Patient {
            id: "p-1".into(),
            name: "Jane Doe".into(),
            date_of_birth: NaiveDate::from_ymd_opt(1990, 1, 1).unwrap(),
            medical_record_number: "MRN-100".into(),
            status: PatientStatus::Active,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_derived_keys() {
        let patient = sample();
        assert_eq!(patient.primary_key().partition, "PATIENT#p-1");
        assert_eq!(patient.index_key().partition, "MRN#MRN-100");
    }

    #[test]
    fn test_merge_only_supplied_fields() {
        let mut patient = sample();
        patient.merge(PatientUpdate {
            medical_record_number: Some("MRN-200".into()),
            ..Default::default()
        });

        assert_eq!(patient.name, "Jane Doe");
        assert_eq!(patient.medical_record_number, "MRN-200");
        assert_eq!(patient.index_key().partition, "MRN#MRN-200");
        assert_eq!(patient.primary_key().partition, "PATIENT#p-1");
    }

    #[test]
    fn test_status_parsing() {
        assert_eq!("inactive".parse::<PatientStatus>().unwrap(), PatientStatus::Inactive);
        assert_eq!(PatientStatus::Deceased.to_string(), "DECEASED");
        assert!("ARCHIVED".parse::<PatientStatus>().is_err());
    }

    #[test]
    fn test_json_shape() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(json["dateOfBirth"], "1990-01-01");
        assert_eq!(json["medicalRecordNumber"], "MRN-100");
        assert_eq!(json["status"], "ACTIVE");
    }

    #[test]
    fn test_input_status_is_optional() {
        let input: PatientInput = serde_json::from_str(
            r#"{"name":"Jane Doe","dateOfBirth":"1990-01-01","medicalRecordNumber":"MRN-100"}"#,
        )
        .unwrap();
        assert_eq!(input.status, None);
    }
}
