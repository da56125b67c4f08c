//! Patient handles and the derived patient queries
//!
//! A [`Patient`] holds only its identifier. Every accessor takes the
//! [`EhrStore`] explicitly and re-reads the Patients or Labs table, so the
//! cost of each call is one query and nothing is cached between calls.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::lab::{parse_lab_value, Lab};
use crate::storage::EhrStore;
use crate::timestamp::{self, parse_timestamp, years_between};
use crate::{Error, Result};

/// Text columns of the Patients table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PatientField {
    Id,
    Gender,
    Dob,
    Race,
}

impl PatientField {
    /// Column name in the Patients table
    pub fn as_str(&self) -> &'static str {
        match self {
            PatientField::Id => "id",
            PatientField::Gender => "gender",
            PatientField::Dob => "dob",
            PatientField::Race => "race",
        }
    }
}

/// One row of the Patients table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatientRecord {
    pub id: String,
    pub gender: String,
    pub dob: String,
    pub race: String,
}

/// Comparison applied by [`Patient::is_sick`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    GreaterThan,
    LessThan,
}

impl Operator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::GreaterThan => ">",
            Operator::LessThan => "<",
        }
    }

    /// Strict comparison of a lab value against a threshold
    pub fn holds(&self, value: f64, threshold: f64) -> bool {
        match self {
            Operator::GreaterThan => value > threshold,
            Operator::LessThan => value < threshold,
        }
    }
}

impl FromStr for Operator {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            ">" => Ok(Operator::GreaterThan),
            "<" => Ok(Operator::LessThan),
            _ => Err(Error::UnsupportedOperator(s.to_string())),
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Handle to a Patients row, addressed by id.
///
/// Construction never touches the store; a handle for an unknown id is
/// valid and fails with [`Error::NotFound`] on first lookup.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Patient {
    pub id: String,
}

impl Patient {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }

    pub fn gender(&self, store: &EhrStore) -> Result<String> {
        store.get_patient_field(&self.id, PatientField::Gender)
    }

    /// Date of birth, as stored
    pub fn dob(&self, store: &EhrStore) -> Result<String> {
        store.get_patient_field(&self.id, PatientField::Dob)
    }

    pub fn race(&self, store: &EhrStore) -> Result<String> {
        store.get_patient_field(&self.id, PatientField::Race)
    }

    /// The whole Patients row in one query
    pub fn record(&self, store: &EhrStore) -> Result<PatientRecord> {
        store
            .get_patient(&self.id)?
            .ok_or_else(|| Error::NotFound(format!("patient {}", self.id)))
    }

    /// One handle per Labs row of this patient, in rowid order.
    ///
    /// Returned handles carry their rowid and resolve to exactly that row.
    pub fn labs(&self, store: &EhrStore) -> Result<Vec<Lab>> {
        let labs = store
            .list_labs_for_patient(&self.id)?
            .into_iter()
            .map(|stored| Lab::at_row(stored.record.patient_id, stored.row_id))
            .collect();
        Ok(labs)
    }

    /// Whether any lab named `lab_name` is strictly above (`">"`) or below
    /// (`"<"`) `threshold`.
    ///
    /// Any other operator yields `Ok(false)` without looking at the labs.
    /// A matching lab whose value is not a number fails with
    /// [`Error::ValueParse`], unless an earlier lab already matched.
    pub fn is_sick(&self, store: &EhrStore, lab_name: &str, operator: &str, threshold: f64) -> Result<bool> {
        let op = match operator.parse::<Operator>() {
            Ok(op) => op,
            Err(_) => {
                tracing::warn!("Unsupported operator {:?} for patient {}; treating as no match", operator, self.id);
                return Ok(false);
            }
        };

        for stored in store.list_labs_for_patient(&self.id)? {
            if stored.record.lab_name != lab_name {
                continue;
            }
            let value = parse_lab_value(&stored.record.lab_value)?;
            if op.holds(value, threshold) {
                return Ok(true);
            }
        }

        Ok(false)
    }

    /// Age in years as of now, by the day/365 rule
    pub fn age(&self, store: &EhrStore) -> Result<i64> {
        self.age_at(store, timestamp::now())
    }

    /// Age in years as of `now`, by the day/365 rule
    pub fn age_at(&self, store: &EhrStore, now: NaiveDateTime) -> Result<i64> {
        let birth = parse_timestamp(&self.dob(store)?)?;
        Ok(years_between(birth, now))
    }

    /// Age in years at the earliest lab date, by the day/365 rule.
    ///
    /// Fails with [`Error::NotFound`] if the patient has no labs.
    pub fn earliest_admission(&self, store: &EhrStore) -> Result<i64> {
        let earliest = store
            .list_labs_for_patient(&self.id)?
            .iter()
            .map(|stored| parse_timestamp(&stored.record.lab_date))
            .collect::<Result<Vec<_>>>()?
            .into_iter()
            .min()
            .ok_or_else(|| Error::NotFound(format!("labs for patient {}", self.id)))?;

        let birth = parse_timestamp(&self.dob(store)?)?;
        Ok(years_between(birth, earliest))
    }
}

impl fmt::Display for Patient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "patient {} info", self.id)
    }
}
