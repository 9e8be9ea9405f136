//! Tabular data boundary
//!
//! Collaborators exchange plain tables (headers + string cells) with the core.
//! [`RawTable`] is that exchange format; CSV is the on-disk encoding.

use crate::{Error, Result};
use std::io::{Read, Write};
use std::path::Path;

/// Header row plus string cells, all rows padded to the header width
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RawTable {
    name: String,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl RawTable {
    /// Empty table with the given headers
    pub fn new(name: impl Into<String>, headers: Vec<String>) -> Self {
        Self {
            name: name.into(),
            headers: headers.into_iter().map(|h| h.trim().to_string()).collect(),
            rows: Vec::new(),
        }
    }

    /// Table from string slices, convenient for fixtures
    pub fn from_rows(name: &str, headers: &[&str], rows: &[&[&str]]) -> Self {
        let mut table = Self::new(name, headers.iter().map(|h| h.to_string()).collect());
        for row in rows {
            table.push_row(row.iter().map(|c| c.to_string()).collect());
        }
        table
    }

    /// Append one row, padding or truncating it to the header width
    pub fn push_row(&mut self, mut row: Vec<String>) {
        row.resize(self.headers.len(), String::new());
        self.rows.push(row);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of `header`, exact match after trimming
    pub fn column_index(&self, header: &str) -> Option<usize> {
        let header = header.trim();
        self.headers.iter().position(|h| h == header)
    }

    /// Positions of every required column, or a configuration error naming
    /// all the absent ones
    pub fn require_columns(&self, required: &[&str]) -> Result<Vec<usize>> {
        let mut indices = Vec::with_capacity(required.len());
        let mut missing = Vec::new();
        for column in required {
            match self.column_index(column) {
                Some(idx) => indices.push(idx),
                None => missing.push(column.to_string()),
            }
        }
        if missing.is_empty() {
            Ok(indices)
        } else {
            Err(Error::MissingColumns {
                table: self.name.clone(),
                columns: missing,
            })
        }
    }

    /// Cell text, empty when the row is out of range
    pub fn cell(&self, row: usize, column: usize) -> &str {
        self.rows
            .get(row)
            .and_then(|r| r.get(column))
            .map(String::as_str)
            .unwrap_or("")
    }

    /// Parse CSV with a header row
    pub fn from_reader<R: Read>(name: &str, reader: R) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(reader);

        let headers = reader
            .headers()?
            .iter()
            .map(|h| h.trim_start_matches('\u{feff}').to_string())
            .collect();
        let mut table = Self::new(name, headers);

        for record in reader.records() {
            let record = record?;
            table.push_row(record.iter().map(String::from).collect());
        }
        Ok(table)
    }

    /// Read a CSV file; the table is named after the file stem
    pub fn read_csv(path: &Path) -> Result<Self> {
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let file = std::fs::File::open(path).map_err(|e| {
            Error::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to open {}: {}", path.display(), e),
            ))
        })?;
        Self::from_reader(&name, file)
    }

    /// Write CSV with a header row
    pub fn to_writer<W: Write>(&self, writer: W) -> Result<()> {
        let mut writer = csv::Writer::from_writer(writer);
        writer.write_record(&self.headers)?;
        for row in &self.rows {
            writer.write_record(row)?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Write a CSV file, creating parent directories
    pub fn write_csv(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = std::fs::File::create(path)?;
        self.to_writer(file)
    }
}
