use anyhow::{Context, Result};
use calamine::{open_workbook_auto, Data, Reader};
use std::collections::BTreeMap;
use std::path::Path;

use crate::output::writer::is_workbook_extension;

/// A header row plus string cells. Every row is padded or cut to the
/// header width on load.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(headers: Vec<String>) -> Self {
        Self {
            headers,
            rows: Vec::new(),
        }
    }

    /// Position of `name` in the header row (whitespace-insensitive).
    pub fn column_index(&self, name: &str) -> Option<usize> {
        let name = name.trim();
        self.headers.iter().position(|h| h.trim() == name)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn push_row(&mut self, mut row: Vec<String>) {
        row.resize(self.headers.len(), String::new());
        self.rows.push(row);
    }

    /// Group rows by the value of `column`, keeping row order inside each
    /// group. Groups come back sorted by value.
    pub fn partition_by(&self, column: &str) -> Result<Vec<(String, Table)>> {
        let index = self
            .column_index(column)
            .with_context(|| format!("Column '{}' not found", column))?;

        let mut groups: BTreeMap<String, Table> = BTreeMap::new();
        for row in &self.rows {
            let key = row.get(index).map(|v| v.trim().to_string()).unwrap_or_default();
            groups
                .entry(key)
                .or_insert_with(|| Table::new(self.headers.clone()))
                .rows
                .push(row.clone());
        }
        Ok(groups.into_iter().collect())
    }
}

/// Read a CSV file with a header row.
pub fn read_csv(path: &Path) -> Result<Table> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;

    let headers: Vec<String> = reader
        .headers()
        .with_context(|| format!("Failed to read header row of {}", path.display()))?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let mut table = Table::new(headers);
    for (i, record) in reader.records().enumerate() {
        let record = record
            .with_context(|| format!("Failed to read row {} of {}", i + 1, path.display()))?;
        table.push_row(record.iter().map(str::to_string).collect());
    }
    Ok(table)
}

/// Read the first sheet of a workbook. The first row holds the headers.
pub fn read_workbook(path: &Path) -> Result<Table> {
    let mut workbook = open_workbook_auto(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    let sheet = workbook
        .sheet_names()
        .first()
        .cloned()
        .with_context(|| format!("No sheets found in {}", path.display()))?;
    let range = workbook
        .worksheet_range(&sheet)
        .with_context(|| format!("Failed to read sheet '{}' of {}", sheet, path.display()))?;

    let mut rows = range.rows();
    let headers: Vec<String> = rows
        .next()
        .map(|row| row.iter().map(|c| cell_text(c).trim().to_string()).collect())
        .unwrap_or_default();

    let mut table = Table::new(headers);
    for row in rows {
        table.push_row(row.iter().map(cell_text).collect());
    }
    Ok(table)
}

/// Cell text as a CSV export would hold it: whole floats without `.0`.
fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) => f.to_string(),
        Data::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

/// Read `path` as a workbook or CSV, by extension.
pub fn read_table(path: &Path) -> Result<Table> {
    let is_workbook = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(is_workbook_extension);
    if is_workbook {
        read_workbook(path)
    } else {
        read_csv(path)
    }
}
