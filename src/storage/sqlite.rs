//! SQLite storage implementation

use std::path::Path;
use rusqlite::{Connection, params, OptionalExtension};
use crate::{Result, Error};
use crate::lab::{LabField, LabRecord};
use crate::patient::{PatientField, PatientRecord};
use super::schema;

/// SQLite-backed storage for patients and labs.
///
/// Owns the only connection to the database. Reads borrow it shared,
/// reloads borrow it mutably, so access is serialized by the borrow checker.
pub struct EhrStore {
    conn: Connection,
}

/// A Labs row together with its `rowid`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredLab {
    pub row_id: i64,
    pub record: LabRecord,
}

impl EhrStore {
    /// Open a database file (creates if doesn't exist)
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        let store = Self { conn };
        store.initialize_schema()?;
        Ok(store)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.initialize_schema()?;
        Ok(store)
    }

    /// Create the tables if they are missing
    fn initialize_schema(&self) -> Result<()> {
        for stmt in schema::all_schema_statements() {
            self.conn.execute(stmt, [])?;
        }
        Ok(())
    }

    /// Drop and recreate both tables, discarding every row
    pub fn reset(&self) -> Result<()> {
        for stmt in schema::DROP_TABLES {
            self.conn.execute(stmt, [])?;
        }
        tracing::debug!("Dropped Labs and Patients tables");
        self.initialize_schema()
    }

    // ========== Patient Operations ==========

    /// Insert a patient row. Fails on a duplicate id.
    pub fn insert_patient(&self, patient: &PatientRecord) -> Result<()> {
        self.conn.execute(
            "INSERT INTO Patients (id, gender, dob, race) VALUES (?1, ?2, ?3, ?4)",
            params![patient.id, patient.gender, patient.dob, patient.race],
        )?;
        Ok(())
    }

    /// Get a whole patient row by id
    pub fn get_patient(&self, id: &str) -> Result<Option<PatientRecord>> {
        self.conn
            .query_row(
                "SELECT id, gender, dob, race FROM Patients WHERE id = ?1",
                [id],
                |row| {
                    Ok(PatientRecord {
                        id: row.get(0)?,
                        gender: row.get(1)?,
                        dob: row.get(2)?,
                        race: row.get(3)?,
                    })
                },
            )
            .optional()
            .map_err(Into::into)
    }

    /// Get one column of a patient row
    pub fn get_patient_field(&self, id: &str, field: PatientField) -> Result<String> {
        // Column names come from a closed enum, never from input.
        let sql = format!("SELECT {} FROM Patients WHERE id = ?1", field.as_str());
        self.conn
            .query_row(&sql, [id], |row| row.get::<_, String>(0))
            .optional()?
            .ok_or_else(|| Error::NotFound(format!("patient {}", id)))
    }

    /// All patient ids in insertion order
    pub fn list_patient_ids(&self) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare("SELECT id FROM Patients ORDER BY rowid")?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(ids)
    }

    /// Count all patients
    pub fn count_patients(&self) -> Result<usize> {
        let count: i64 = self.conn.query_row("SELECT COUNT(*) FROM Patients", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    // ========== Lab Operations ==========

    /// Insert a lab row, returning its rowid
    pub fn insert_lab(&self, lab: &LabRecord) -> Result<i64> {
        self.conn.execute(
            r#"
            INSERT INTO Labs (patient_id, lab_name, lab_value, lab_units, lab_date)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![lab.patient_id, lab.lab_name, lab.lab_value, lab.lab_units, lab.lab_date],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Every lab row of a patient, ordered by rowid
    pub fn list_labs_for_patient(&self, patient_id: &str) -> Result<Vec<StoredLab>> {
        let mut stmt = self.conn.prepare(
            "SELECT rowid, patient_id, lab_name, lab_value, lab_units, lab_date FROM Labs WHERE patient_id = ?1 ORDER BY rowid"
        )?;

        let labs = stmt
            .query_map([patient_id], Self::row_to_lab)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(labs)
    }

    /// The lab row with the lowest rowid for a patient
    pub fn first_lab_for_patient(&self, patient_id: &str) -> Result<Option<StoredLab>> {
        self.conn
            .query_row(
                "SELECT rowid, patient_id, lab_name, lab_value, lab_units, lab_date FROM Labs WHERE patient_id = ?1 ORDER BY rowid LIMIT 1",
                [patient_id],
                Self::row_to_lab,
            )
            .optional()
            .map_err(Into::into)
    }

    /// Get a lab row by rowid, provided it still belongs to `patient_id`
    pub fn get_lab_by_row(&self, patient_id: &str, row_id: i64) -> Result<Option<StoredLab>> {
        self.conn
            .query_row(
                "SELECT rowid, patient_id, lab_name, lab_value, lab_units, lab_date FROM Labs WHERE rowid = ?1 AND patient_id = ?2",
                params![row_id, patient_id],
                Self::row_to_lab,
            )
            .optional()
            .map_err(Into::into)
    }

    /// One column of the first lab row (lowest rowid) of a patient
    pub fn get_lab_field(&self, patient_id: &str, field: LabField) -> Result<String> {
        let sql = format!(
            "SELECT {} FROM Labs WHERE patient_id = ?1 ORDER BY rowid LIMIT 1",
            field.as_str()
        );
        self.conn
            .query_row(&sql, [patient_id], |row| row.get::<_, String>(0))
            .optional()?
            .ok_or_else(|| Error::NotFound(format!("lab for patient {}", patient_id)))
    }

    /// One column of a specific lab row
    pub fn get_lab_field_by_row(&self, patient_id: &str, row_id: i64, field: LabField) -> Result<String> {
        let sql = format!(
            "SELECT {} FROM Labs WHERE rowid = ?1 AND patient_id = ?2",
            field.as_str()
        );
        self.conn
            .query_row(&sql, params![row_id, patient_id], |row| row.get::<_, String>(0))
            .optional()?
            .ok_or_else(|| Error::NotFound(format!("lab row {} for patient {}", row_id, patient_id)))
    }

    /// Count all labs
    pub fn count_labs(&self) -> Result<usize> {
        let count: i64 = self.conn.query_row("SELECT COUNT(*) FROM Labs", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Count labs whose patient_id has no Patients row
    pub fn count_orphan_labs(&self) -> Result<usize> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM Labs WHERE patient_id NOT IN (SELECT id FROM Patients)",
            [],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// Helper to convert a row to a StoredLab
    fn row_to_lab(row: &rusqlite::Row) -> rusqlite::Result<StoredLab> {
        Ok(StoredLab {
            row_id: row.get(0)?,
            record: LabRecord {
                patient_id: row.get(1)?,
                lab_name: row.get(2)?,
                lab_value: row.get(3)?,
                lab_units: row.get(4)?,
                lab_date: row.get(5)?,
            },
        })
    }

    // ========== Bulk Operations ==========

    /// Begin a transaction for bulk operations
    pub fn begin_transaction(&mut self) -> Result<()> {
        self.conn.execute("BEGIN TRANSACTION", [])?;
        Ok(())
    }

    /// Commit a transaction
    pub fn commit(&mut self) -> Result<()> {
        self.conn.execute("COMMIT", [])?;
        Ok(())
    }

    /// Rollback a transaction
    pub fn rollback(&mut self) -> Result<()> {
        self.conn.execute("ROLLBACK", [])?;
        Ok(())
    }

    /// Run `work` inside a transaction. Any failure, including a failed
    /// COMMIT, rolls the transaction back before the error is returned.
    pub fn in_transaction<T>(&mut self, work: impl FnOnce(&Self) -> Result<T>) -> Result<T> {
        self.begin_transaction()?;
        match work(self).and_then(|value| self.commit().map(|()| value)) {
            Ok(value) => Ok(value),
            Err(e) => {
                if let Err(rollback_err) = self.rollback() {
                    tracing::error!("Rollback after failed transaction also failed: {}", rollback_err);
                }
                Err(e)
            }
        }
    }

    /// Get database statistics
    pub fn stats(&self) -> Result<DbStats> {
        Ok(DbStats {
            patients: self.count_patients()?,
            labs: self.count_labs()?,
            orphan_labs: self.count_orphan_labs()?,
        })
    }
}

/// Database statistics
#[derive(Debug, Clone, serde::Serialize)]
pub struct DbStats {
    pub patients: usize,
    pub labs: usize,
    pub orphan_labs: usize,
}

impl std::fmt::Display for DbStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Database Statistics:")?;
        writeln!(f, "  Patients: {}", self.patients)?;
        writeln!(f, "  Labs: {}", self.labs)?;
        writeln!(f, "  Labs without patient: {}", self.orphan_labs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_patient(id: &str) -> PatientRecord {
        PatientRecord {
            id: id.to_string(),
            gender: "F".to_string(),
            dob: "1947-01-01 00:00:00.000000".to_string(),
            race: "white".to_string(),
        }
    }

    fn sample_lab(patient_id: &str, name: &str, date: &str) -> LabRecord {
        LabRecord {
            patient_id: patient_id.to_string(),
            lab_name: name.to_string(),
            lab_value: "50".to_string(),
            lab_units: "mg/dL".to_string(),
            lab_date: date.to_string(),
        }
    }

    #[test]
    fn test_patient_crud() {
        let store = EhrStore::open_in_memory().unwrap();
        store.insert_patient(&sample_patient("1")).unwrap();

        let retrieved = store.get_patient("1").unwrap().unwrap();
        assert_eq!(retrieved, sample_patient("1"));
        assert_eq!(store.get_patient_field("1", PatientField::Race).unwrap(), "white");
        assert!(store.get_patient("2").unwrap().is_none());
    }

    #[test]
    fn test_missing_patient_field_is_not_found() {
        let store = EhrStore::open_in_memory().unwrap();
        let err = store.get_patient_field("nobody", PatientField::Gender).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn test_duplicate_patient_id_rejected() {
        let store = EhrStore::open_in_memory().unwrap();
        store.insert_patient(&sample_patient("1")).unwrap();
        let err = store.insert_patient(&sample_patient("1")).unwrap_err();
        assert!(matches!(err, Error::Storage(_)));
    }

    #[test]
    fn test_labs_ordered_by_rowid() {
        let store = EhrStore::open_in_memory().unwrap();
        let first = store.insert_lab(&sample_lab("1", "LDL", "2019-01-01 00:00:00.000000")).unwrap();
        store.insert_lab(&sample_lab("2", "HDL", "2007-01-01 00:00:00.000000")).unwrap();
        let third = store.insert_lab(&sample_lab("1", "HDL", "1980-01-01 00:00:00.000000")).unwrap();

        let labs = store.list_labs_for_patient("1").unwrap();
        assert_eq!(labs.len(), 2);
        assert_eq!(labs[0].row_id, first);
        assert_eq!(labs[1].row_id, third);
        assert_eq!(labs[1].record.lab_name, "HDL");

        let head = store.first_lab_for_patient("1").unwrap().unwrap();
        assert_eq!(head.row_id, first);
        assert_eq!(store.get_lab_field("1", LabField::Name).unwrap(), "LDL");
        assert_eq!(store.get_lab_field_by_row("1", third, LabField::Name).unwrap(), "HDL");
    }

    #[test]
    fn test_lab_row_must_belong_to_patient() {
        let store = EhrStore::open_in_memory().unwrap();
        let row = store.insert_lab(&sample_lab("1", "HDL", "1980-01-01 00:00:00.000000")).unwrap();

        assert!(store.get_lab_by_row("2", row).unwrap().is_none());
        let err = store.get_lab_field_by_row("2", row, LabField::Value).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn test_reset_discards_rows() {
        let store = EhrStore::open_in_memory().unwrap();
        store.insert_patient(&sample_patient("1")).unwrap();
        store.insert_lab(&sample_lab("1", "HDL", "1980-01-01 00:00:00.000000")).unwrap();

        store.reset().unwrap();

        let stats = store.stats().unwrap();
        assert_eq!(stats.patients, 0);
        assert_eq!(stats.labs, 0);
    }

    #[test]
    fn test_stats_counts_orphans() {
        let store = EhrStore::open_in_memory().unwrap();
        store.insert_patient(&sample_patient("1")).unwrap();
        store.insert_lab(&sample_lab("1", "HDL", "1980-01-01 00:00:00.000000")).unwrap();
        store.insert_lab(&sample_lab("9", "HDL", "1980-01-01 00:00:00.000000")).unwrap();

        let stats = store.stats().unwrap();
        assert_eq!(stats.patients, 1);
        assert_eq!(stats.labs, 2);
        assert_eq!(stats.orphan_labs, 1);
        assert_eq!(store.list_patient_ids().unwrap(), vec!["1".to_string()]);
    }

    #[test]
    fn test_failed_commit_rolls_back() {
        let mut store = EhrStore::open_in_memory().unwrap();
        store.insert_patient(&sample_patient("1")).unwrap();
        // A deferred foreign key is only checked at COMMIT, and a COMMIT that
        // fails this way leaves the transaction open.
        store
            .conn
            .execute_batch(
                "PRAGMA foreign_keys = ON;
                 CREATE TABLE Wards (id INTEGER PRIMARY KEY);
                 CREATE TABLE Beds (ward_id INTEGER REFERENCES Wards(id) DEFERRABLE INITIALLY DEFERRED);",
            )
            .unwrap();

        let result = store.in_transaction(|store| {
            store.insert_patient(&sample_patient("2"))?;
            store.conn.execute("INSERT INTO Beds (ward_id) VALUES (42)", [])?;
            Ok(())
        });
        assert!(matches!(result, Err(Error::Storage(_))));

        assert_eq!(store.count_patients().unwrap(), 1);
        store.in_transaction(|store| store.insert_patient(&sample_patient("3"))).unwrap();
        assert_eq!(store.list_patient_ids().unwrap(), vec!["1", "3"]);
    }

    #[test]
    fn test_work_error_rolls_back() {
        let mut store = EhrStore::open_in_memory().unwrap();
        let result: Result<()> = store.in_transaction(|store| {
            store.insert_patient(&sample_patient("1"))?;
            Err(Error::NotFound("patient 2".to_string()))
        });
        assert!(matches!(result, Err(Error::NotFound(_))));
        assert_eq!(store.count_patients().unwrap(), 0);
    }

    #[test]
    fn test_file_backed_store_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ehr.db");
        {
            let store = EhrStore::open(&path).unwrap();
            store.insert_patient(&sample_patient("1")).unwrap();
        }
        let reopened = EhrStore::open(&path).unwrap();
        assert_eq!(reopened.count_patients().unwrap(), 1);
    }
}
