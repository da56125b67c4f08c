//! # ehr-analysis - patient and lab record analysis
//!
//! Loads tab-delimited patient and lab tables into SQLite and answers
//! small derived questions about them.
//!
//! ehr-analysis provides:
//! - Destructive, transactional ingestion of a patients/labs file pair
//! - `Patient` and `Lab` handles that hold identifiers only and re-query the store on every access
//! - Derived queries: age, earliest admission, lab threshold checks
//! - SQLite-backed storage behind a single `EhrStore` connection

pub mod config;
pub mod ingest;
pub mod lab;
pub mod patient;
pub mod storage;
pub mod timestamp;
pub mod ui;

// Re-exports for convenient access
pub use ingest::{parse_data, parse_readers};
pub use lab::{Lab, LabField, LabRecord};
pub use patient::{Operator, Patient, PatientField, PatientRecord};
pub use storage::EhrStore;

/// Result type alias for ehr-analysis operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for ehr-analysis operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Malformed row in {source_name} at line {line}: expected {expected} fields, found {found}")]
    MalformedRow {
        source_name: String,
        line: usize,
        expected: usize,
        found: usize,
    },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid lab value {value:?}: {reason}")]
    ValueParse { value: String, reason: String },

    #[error("Invalid timestamp {0:?}: expected YYYY-MM-DD HH:MM:SS.ffffff")]
    DateParse(String),

    #[error("Unsupported comparison operator: {0:?}")]
    UnsupportedOperator(String),

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
