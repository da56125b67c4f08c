//! Storage Layer - SQLite-backed persistence
//!
//! System of record is SQLite with tables:
//! - Patients(id, gender, dob, race)
//! - Labs(patient_id, lab_name, lab_value, lab_units, lab_date)
//!
//! Labs rows are addressed and ordered by SQLite's implicit `rowid`.

pub mod schema;
pub mod sqlite;

pub use sqlite::{DbStats, EhrStore, StoredLab};
