//! Database schema definitions

/// Drop statements, run before every reload. Labs goes first.
pub const DROP_TABLES: &[&str] = &[
    "DROP TABLE IF EXISTS Labs",
    "DROP TABLE IF EXISTS Patients",
];

/// SQL to create the Labs table
///
/// No foreign key on `patient_id`: labs for unknown patients are accepted.
pub const CREATE_LABS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS Labs (
    patient_id TEXT,
    lab_name TEXT,
    lab_value TEXT,
    lab_units TEXT,
    lab_date TEXT
)
"#;

/// SQL to create the Patients table
pub const CREATE_PATIENTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS Patients (
    id TEXT PRIMARY KEY,
    gender TEXT,
    dob TEXT,
    race TEXT
)
"#;

/// SQL to create indexes
pub const CREATE_INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_labs_patient ON Labs(patient_id)",
];

/// Column order of the Patients table
pub const PATIENT_COLUMNS: [&str; 4] = ["id", "gender", "dob", "race"];

/// Column order of the Labs table
pub const LAB_COLUMNS: [&str; 5] = ["patient_id", "lab_name", "lab_value", "lab_units", "lab_date"];

/// All schema creation statements
pub fn all_schema_statements() -> Vec<&'static str> {
    let mut stmts = vec![CREATE_LABS_TABLE, CREATE_PATIENTS_TABLE];
    stmts.extend(CREATE_INDEXES.iter().copied());
    stmts
}
