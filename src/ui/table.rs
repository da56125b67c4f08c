use tabled::{settings::Style, Table, Tabled};

use crate::storage::StoredLab;

#[derive(Tabled)]
pub struct TableRow {
    #[tabled(rename = "Field")]
    pub field: String,
    #[tabled(rename = "Value")]
    pub value: String,
}

/// Two-column key/value table
pub struct TableBuilder {
    rows: Vec<TableRow>,
}

impl TableBuilder {
    pub fn new() -> Self {
        Self { rows: Vec::new() }
    }

    pub fn add_row(&mut self, label: &str, value: &str) {
        self.rows.push(TableRow {
            field: label.to_string(),
            value: value.to_string(),
        });
    }

    pub fn build(&self) -> String {
        if self.rows.is_empty() {
            return String::new();
        }

        Table::new(&self.rows).with(Style::rounded()).to_string()
    }
}

impl Default for TableBuilder {
    fn default() -> Self {
        Self::new()
    }
}

pub fn stats_table(stats: &[(&str, &str)]) -> String {
    let mut builder = TableBuilder::new();
    for (label, value) in stats {
        builder.add_row(label, value);
    }
    builder.build()
}

#[derive(Tabled)]
pub struct LabRow {
    #[tabled(rename = "Row")]
    pub row_id: i64,
    #[tabled(rename = "Lab")]
    pub name: String,
    #[tabled(rename = "Value")]
    pub value: String,
    #[tabled(rename = "Units")]
    pub units: String,
    #[tabled(rename = "Date")]
    pub date: String,
}

impl From<&StoredLab> for LabRow {
    fn from(stored: &StoredLab) -> Self {
        Self {
            row_id: stored.row_id,
            name: stored.record.lab_name.clone(),
            value: stored.record.lab_value.clone(),
            units: stored.record.lab_units.clone(),
            date: stored.record.lab_date.clone(),
        }
    }
}

pub fn labs_table(labs: &[StoredLab]) -> String {
    if labs.is_empty() {
        return String::new();
    }
    let rows: Vec<LabRow> = labs.iter().map(LabRow::from).collect();
    Table::new(&rows).with(Style::rounded()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lab::LabRecord;

    #[test]
    fn test_stats_table() {
        let table = stats_table(&[("Patients", "3"), ("Labs", "7")]);
        assert!(table.contains("Patients"));
        assert!(table.contains("7"));
        assert!(stats_table(&[]).is_empty());
    }

    #[test]
    fn test_labs_table() {
        let labs = vec![StoredLab {
            row_id: 1,
            record: LabRecord {
                patient_id: "1".into(),
                lab_name: "HDL".into(),
                lab_value: "50".into(),
                lab_units: "mg/dL".into(),
                lab_date: "1980-01-01 00:00:00.000000".into(),
            },
        }];
        let table = labs_table(&labs);
        assert!(table.contains("HDL"));
        assert!(table.contains("mg/dL"));
        assert!(labs_table(&[]).is_empty());
    }
}
