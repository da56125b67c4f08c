//! Ingestion - loads a patients/labs TSV pair into the store
//!
//! Each source is a header line followed by one record per line, fields
//! separated by `\t`. A leading UTF-8 byte-order mark is stripped.
//!
//! Loading is a reset: both tables are dropped and recreated, then filled
//! from the new pair. Both sources are read and validated before the store
//! is touched, and the reload runs in one transaction, so a failed call
//! leaves the previous contents in place.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::lab::{Lab, LabRecord};
use crate::patient::{Patient, PatientRecord};
use crate::storage::schema::{LAB_COLUMNS, PATIENT_COLUMNS};
use crate::storage::EhrStore;
use crate::{Error, Result};

const BOM: char = '\u{feff}';

/// Reload the store from a patients file and a labs file.
///
/// Returns one handle per data row, in file order.
pub fn parse_data(store: &mut EhrStore, patient_path: &Path, lab_path: &Path) -> Result<(Vec<Patient>, Vec<Lab>)> {
    let patients = BufReader::new(File::open(patient_path)?);
    let labs = BufReader::new(File::open(lab_path)?);

    let lab_table = TsvTable::read(&lab_path.display().to_string(), labs)?;
    let patient_table = TsvTable::read(&patient_path.display().to_string(), patients)?;
    load(store, &patient_table, &lab_table)
}

/// Reload the store from two in-memory or streamed TSV sources
pub fn parse_readers<P: BufRead, L: BufRead>(store: &mut EhrStore, patients: P, labs: L) -> Result<(Vec<Patient>, Vec<Lab>)> {
    let lab_table = TsvTable::read("labs", labs)?;
    let patient_table = TsvTable::read("patients", patients)?;
    load(store, &patient_table, &lab_table)
}

/// A fully read TSV source
#[derive(Debug)]
struct TsvTable {
    source_name: String,
    columns: Vec<String>,
    /// (1-based line number, fields)
    rows: Vec<(usize, Vec<String>)>,
}

impl TsvTable {
    fn read<R: BufRead>(source_name: &str, reader: R) -> Result<Self> {
        let mut lines = reader.lines().enumerate();

        let columns: Vec<String> = match lines.next() {
            Some((_, header)) => {
                let header = header?;
                header
                    .strip_prefix(BOM)
                    .unwrap_or(header.as_str())
                    .split('\t')
                    .map(|name| name.trim().to_string())
                    .collect()
            }
            None => return Err(Error::Schema(format!("{}: missing header row", source_name))),
        };

        let mut rows = Vec::new();
        for (index, line) in lines {
            let line = line?;
            if line.is_empty() {
                continue;
            }
            let fields: Vec<String> = line.split('\t').map(str::to_string).collect();
            if fields.len() != columns.len() {
                return Err(Error::MalformedRow {
                    source_name: source_name.to_string(),
                    line: index + 1,
                    expected: columns.len(),
                    found: fields.len(),
                });
            }
            rows.push((index + 1, fields));
        }

        tracing::debug!("Read {} rows from {}", rows.len(), source_name);
        Ok(Self {
            source_name: source_name.to_string(),
            columns,
            rows,
        })
    }

    /// For each table column, the index of the header column feeding it.
    ///
    /// Header names equal to a table column map by name. Remaining table
    /// columns take the remaining header columns in header order. `key`
    /// must be present by name.
    fn column_mapping(&self, table_columns: &[&str], key: &str) -> Result<Vec<usize>> {
        if self.columns.len() != table_columns.len() {
            return Err(Error::Schema(format!(
                "{}: header has {} columns, expected {} ({})",
                self.source_name,
                self.columns.len(),
                table_columns.len(),
                table_columns.join(", ")
            )));
        }

        for (i, name) in self.columns.iter().enumerate() {
            if self.columns[..i].contains(name) {
                return Err(Error::Schema(format!("{}: duplicate column {:?}", self.source_name, name)));
            }
        }

        if !self.columns.iter().any(|name| name == key) {
            return Err(Error::Schema(format!("{}: missing required column {:?}", self.source_name, key)));
        }

        let by_name: Vec<Option<usize>> = table_columns
            .iter()
            .map(|column| self.columns.iter().position(|name| name == column))
            .collect();

        let mut unclaimed = (0..self.columns.len())
            .filter(|i| !by_name.contains(&Some(*i)))
            .collect::<Vec<_>>()
            .into_iter();

        by_name
            .into_iter()
            .map(|slot| {
                slot.or_else(|| unclaimed.next())
                    .ok_or_else(|| Error::Schema(format!("{}: cannot map header columns", self.source_name)))
            })
            .collect()
    }
}

fn load(store: &mut EhrStore, patients: &TsvTable, labs: &TsvTable) -> Result<(Vec<Patient>, Vec<Lab>)> {
    let lab_mapping = labs.column_mapping(&LAB_COLUMNS, "patient_id")?;
    let patient_mapping = patients.column_mapping(&PATIENT_COLUMNS, "id")?;

    let handles = store.in_transaction(|store| fill(store, patients, &patient_mapping, labs, &lab_mapping))?;
    tracing::info!(
        "Loaded {} patients from {} and {} labs from {}",
        handles.0.len(),
        patients.source_name,
        handles.1.len(),
        labs.source_name
    );
    Ok(handles)
}

fn fill(
    store: &EhrStore,
    patients: &TsvTable,
    patient_mapping: &[usize],
    labs: &TsvTable,
    lab_mapping: &[usize],
) -> Result<(Vec<Patient>, Vec<Lab>)> {
    store.reset()?;

    let mut lab_handles = Vec::with_capacity(labs.rows.len());
    for (_, fields) in &labs.rows {
        let record = LabRecord {
            patient_id: fields[lab_mapping[0]].clone(),
            lab_name: fields[lab_mapping[1]].clone(),
            lab_value: fields[lab_mapping[2]].clone(),
            lab_units: fields[lab_mapping[3]].clone(),
            lab_date: fields[lab_mapping[4]].clone(),
        };
        let row_id = store.insert_lab(&record)?;
        lab_handles.push(Lab::at_row(record.patient_id, row_id));
    }

    let mut patient_handles = Vec::with_capacity(patients.rows.len());
    for (line, fields) in &patients.rows {
        let record = PatientRecord {
            id: fields[patient_mapping[0]].clone(),
            gender: fields[patient_mapping[1]].clone(),
            dob: fields[patient_mapping[2]].clone(),
            race: fields[patient_mapping[3]].clone(),
        };
        store.insert_patient(&record).map_err(|e| {
            tracing::error!("{} line {}: cannot insert patient {}", patients.source_name, line, record.id);
            e
        })?;
        patient_handles.push(Patient::new(record.id));
    }

    Ok((patient_handles, lab_handles))
}
