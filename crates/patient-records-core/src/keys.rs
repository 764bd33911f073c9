//! Key derivation for the single-table layout.
//!
//! Every patient lives at two addresses in the store:
//!
//! ```text
//! primary record   pk = PATIENT#<id>   sk = METADATA
//! secondary index  pk = MRN#<mrn>      sk = PATIENT
//! ```
//!
//! Keys are pure projections of `id` and `medical_record_number`. They are
//! recomputed on every write and never treated as a source of truth. The
//! functions here do not validate their input; callers reject blank ids and
//! MRNs before deriving anything.

/// Namespace tag for primary patient records.
pub const PATIENT_PREFIX: &str = "PATIENT#";

/// Namespace tag for the MRN secondary index.
pub const MRN_PREFIX: &str = "MRN#";

/// Sort key of the patient metadata record.
pub const METADATA_SK: &str = "METADATA";

/// Sort key of the patient entry in the MRN index.
pub const PATIENT_GSI1SK: &str = "PATIENT";

/// A physical (partition, sort) address in the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StoreKey {
    pub partition: String,
    pub sort: &'static str,
}

/// Primary key of the patient with the given id.
pub fn derive_from_id(id: &str) -> StoreKey {
    StoreKey {
        partition: format!("{PATIENT_PREFIX}{id}"),
        sort: METADATA_SK,
    }
}

/// Secondary-index key of the patient with the given MRN.
pub fn derive_from_mrn(mrn: &str) -> StoreKey {
    StoreKey {
        partition: format!("{MRN_PREFIX}{mrn}"),
        sort: PATIENT_GSI1SK,
    }
}

/// Recover the patient id from a primary partition key.
pub fn id_from_partition(partition: &str) -> Option<&str> {
    partition.strip_prefix(PATIENT_PREFIX)
}

/// Recover the MRN from a secondary-index partition key.
pub fn mrn_from_partition(partition: &str) -> Option<&str> {
    partition.strip_prefix(MRN_PREFIX)
}
