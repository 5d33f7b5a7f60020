use crate::records::AgentRecord;
use chrono::NaiveDate;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const EXPORT_HEADERS: [&str; 15] = [
    "TSA ID",
    "Employee Name",
    "Role",
    "Division",
    "Department",
    "Personal Address",
    "State/Location",
    "Contact Number",
    "Manager Name",
    "Manager Contact Number",
    "2Up Manager Name",
    "2Up Manager Contact Number",
    "Emergency Contact",
    "Emergency Contact Number",
    "Emergency Contact Relationship",
];

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("I/O error writing '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Receives the records inside a completed selection polygon.
pub trait SelectionExporter {
    fn deliver(&mut self, selection: &[AgentRecord]) -> Result<(), ExportError>;
}

/// Keeps every delivered selection in memory.
#[derive(Debug, Default)]
pub struct MemoryExporter {
    pub selections: Vec<Vec<AgentRecord>>,
}

impl SelectionExporter for MemoryExporter {
    fn deliver(&mut self, selection: &[AgentRecord]) -> Result<(), ExportError> {
        self.selections.push(selection.to_vec());
        Ok(())
    }
}

pub fn export_file_name(date: NaiveDate) -> String {
    format!("selected_employees_{}.csv", date.format("%Y-%m-%d"))
}

fn cell(value: &Option<String>) -> &str {
    value.as_deref().unwrap_or("")
}

fn export_row(record: &AgentRecord) -> [&str; 15] {
    [
        cell(&record.tsa_id),
        cell(&record.emp_name),
        cell(&record.role),
        cell(&record.division),
        cell(&record.department),
        cell(&record.personal_address),
        cell(&record.state_location),
        cell(&record.emp_contact_number),
        cell(&record.manager_name),
        cell(&record.manager_contact_number),
        cell(&record.secondary_manager_name),
        cell(&record.secondary_manager_contact_number),
        cell(&record.emergency_contact_name),
        cell(&record.emergency_contact_number),
        cell(&record.emergency_contact_relationship),
    ]
}

/// Writes one CSV document, header first, records in selection order.
pub fn write_selection_csv<W: Write>(writer: W, selection: &[AgentRecord]) -> Result<(), ExportError> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    csv_writer.write_record(EXPORT_HEADERS)?;

    for record in selection {
        csv_writer.write_record(export_row(record))?;
    }

    csv_writer.flush().map_err(csv::Error::from)?;
    Ok(())
}

/// Writes each selection to a CSV file, `selected_employees_<date>.csv` by default.
///
/// A later selection on the same day overwrites the earlier file.
#[derive(Debug)]
pub struct CsvFileExporter {
    path: PathBuf,
    pub written: Vec<PathBuf>,
}

impl CsvFileExporter {
    pub fn new(dir: &Path, date: NaiveDate) -> Self {
        Self::to_path(dir.join(export_file_name(date)))
    }

    pub fn to_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            written: Vec::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SelectionExporter for CsvFileExporter {
    fn deliver(&mut self, selection: &[AgentRecord]) -> Result<(), ExportError> {
        let file = std::fs::File::create(&self.path).map_err(|source| ExportError::Io {
            path: self.path.clone(),
            source,
        })?;

        write_selection_csv(std::io::BufWriter::new(file), selection)?;
        self.written.push(self.path.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::test_record;

    #[test]
    fn file_name_carries_the_date() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 7).unwrap();
        assert_eq!(export_file_name(date), "selected_employees_2025-03-07.csv");
    }

    #[test]
    fn csv_has_header_then_rows_in_order() {
        let mut first = test_record("7", "Ada, Jr.", "NSW", "Sales", "Retail", "Grace", 1.0, 1.0);
        first.emergency_contact_relationship = Some("Spouse".to_string());
        let second = test_record("8", "Bob", "VIC", "Ops", "Logistics", "Linus", 2.0, 2.0);

        let mut buffer = Vec::new();
        write_selection_csv(&mut buffer, &[first, second]).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("TSA ID,Employee Name,Role,Division"));
        assert!(lines[1].starts_with("7,\"Ada, Jr.\",Field Agent,Sales,Retail"));
        assert!(lines[1].ends_with(",Spouse"));
        assert!(lines[2].starts_with("8,Bob,"));
    }

    #[test]
    fn empty_selection_is_header_only() {
        let mut buffer = Vec::new();
        write_selection_csv(&mut buffer, &[]).unwrap();
        assert_eq!(String::from_utf8(buffer).unwrap().lines().count(), 1);
    }

    #[test]
    fn file_exporter_writes_dated_file() {
        let dir = std::env::temp_dir().join(format!("agentmap-export-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let date = NaiveDate::from_ymd_opt(2025, 1, 2).unwrap();

        let mut exporter = CsvFileExporter::new(&dir, date);
        let record = test_record("1", "Ada", "NSW", "Sales", "Retail", "Grace", 1.0, 1.0);
        exporter.deliver(&[record]).unwrap();

        let path = dir.join("selected_employees_2025-01-02.csv");
        assert_eq!(exporter.written, vec![path.clone()]);
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 2);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn memory_exporter_keeps_each_delivery() {
        let mut exporter = MemoryExporter::default();
        exporter.deliver(&[]).unwrap();
        let record = test_record("1", "Ada", "NSW", "Sales", "Retail", "Grace", 1.0, 1.0);
        exporter.deliver(&[record]).unwrap();
        assert_eq!(exporter.selections.len(), 2);
        assert_eq!(exporter.selections[1].len(), 1);
    }
}
