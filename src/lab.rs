//! Lab handles
//!
//! A lab handle is addressed by patient id and, when known, by the Labs
//! `rowid` of the exact row it stands for.
//!
//! Row selection:
//! - `Lab::new(patient_id)` resolves to the patient's lab row with the
//!   lowest rowid, i.e. the first one ingested.
//! - Handles returned by ingestion and by `Patient::labs` carry their rowid
//!   and resolve to that row only.

use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::storage::EhrStore;
use crate::timestamp::parse_timestamp;
use crate::{Error, Result};

/// Value columns of the Labs table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LabField {
    PatientId,
    Name,
    Value,
    Units,
    Date,
}

impl LabField {
    /// Column name in the Labs table
    pub fn as_str(&self) -> &'static str {
        match self {
            LabField::PatientId => "patient_id",
            LabField::Name => "lab_name",
            LabField::Value => "lab_value",
            LabField::Units => "lab_units",
            LabField::Date => "lab_date",
        }
    }
}

/// One row of the Labs table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabRecord {
    pub patient_id: String,
    pub lab_name: String,
    pub lab_value: String,
    pub lab_units: String,
    pub lab_date: String,
}

/// Handle to a Labs row
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Lab {
    pub patient_id: String,
    /// Labs rowid; `None` means "first row of the patient"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row_id: Option<i64>,
}

impl Lab {
    /// Handle for the first lab row of `patient_id`
    pub fn new(patient_id: impl Into<String>) -> Self {
        Self {
            patient_id: patient_id.into(),
            row_id: None,
        }
    }

    /// Handle for one specific lab row
    pub fn at_row(patient_id: impl Into<String>, row_id: i64) -> Self {
        Self {
            patient_id: patient_id.into(),
            row_id: Some(row_id),
        }
    }

    fn field(&self, store: &EhrStore, field: LabField) -> Result<String> {
        match self.row_id {
            Some(row_id) => store.get_lab_field_by_row(&self.patient_id, row_id, field),
            None => store.get_lab_field(&self.patient_id, field),
        }
    }

    pub fn lab_name(&self, store: &EhrStore) -> Result<String> {
        self.field(store, LabField::Name)
    }

    /// Raw lab value text, e.g. `"50"`
    pub fn lab_value(&self, store: &EhrStore) -> Result<String> {
        self.field(store, LabField::Value)
    }

    pub fn lab_units(&self, store: &EhrStore) -> Result<String> {
        self.field(store, LabField::Units)
    }

    pub fn lab_date(&self, store: &EhrStore) -> Result<String> {
        self.field(store, LabField::Date)
    }

    /// The whole Labs row in one query
    pub fn record(&self, store: &EhrStore) -> Result<LabRecord> {
        let stored = match self.row_id {
            Some(row_id) => store.get_lab_by_row(&self.patient_id, row_id)?,
            None => store.first_lab_for_patient(&self.patient_id)?,
        };
        stored
            .map(|stored| stored.record)
            .ok_or_else(|| Error::NotFound(format!("lab for patient {}", self.patient_id)))
    }

    /// Lab value as a number
    pub fn value(&self, store: &EhrStore) -> Result<f64> {
        parse_lab_value(&self.lab_value(store)?)
    }

    /// Lab date as a timestamp
    pub fn date(&self, store: &EhrStore) -> Result<NaiveDateTime> {
        parse_timestamp(&self.lab_date(store)?)
    }

    /// Names the lab itself, e.g. `lab HDL info for patient 1`.
    /// `Display` stays store-free and only knows the patient id.
    pub fn describe(&self, store: &EhrStore) -> Result<String> {
        Ok(format!("lab {} info for patient {}", self.lab_name(store)?, self.patient_id))
    }
}

impl fmt::Display for Lab {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "lab {} info", self.patient_id)
    }
}

/// Parse a stored lab value. Surrounding whitespace is ignored.
pub fn parse_lab_value(value: &str) -> Result<f64> {
    value.trim().parse::<f64>().map_err(|e| Error::ValueParse {
        value: value.to_string(),
        reason: e.to_string(),
    })
}
