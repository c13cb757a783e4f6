//! Source adapters and patient-table selection.
//!
//! An adapter exposes every table it can see as a [`SourceTable`]. A
//! readable source that holds no tables returns an empty list; only an
//! unreadable source is an error. [`select_patient_table()`] then picks the
//! table that looks most like a patient register.

use std::{
    fs,
    path::{Path, PathBuf},
};

use encoding_rs::Encoding;
use log::{debug, info};
use thiserror::Error;

use crate::{data::RawValue, io_utils};

/// Header fragments that suggest a table holds patient demographics.
const PATIENT_INDICATORS: &[&str] = &[
    "name", "patient", "client", "first", "last", "phone", "contact",
];
const MIN_PATIENT_SCORE: usize = 2;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Source {path:?} is unreadable: {reason}")]
    Unreadable { path: PathBuf, reason: String },
    #[error("No patient-like table found in {0}")]
    NoPatientTable(String),
}

/// One row of a source table, with its 1-based position in the table.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord {
    ordinal: usize,
    fields: Vec<(String, RawValue)>,
}

impl RawRecord {
    pub fn new(ordinal: usize, fields: Vec<(String, RawValue)>) -> Self {
        Self { ordinal, fields }
    }

    pub fn ordinal(&self) -> usize {
        self.ordinal
    }

    pub fn get(&self, column: &str) -> Option<&RawValue> {
        self.fields
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SourceTable {
    pub name: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<RawValue>>,
}

impl SourceTable {
    pub fn new(name: impl Into<String>, headers: Vec<String>) -> Self {
        Self {
            name: name.into(),
            headers,
            rows: Vec::new(),
        }
    }

    pub fn with_rows(mut self, rows: Vec<Vec<RawValue>>) -> Self {
        self.rows = rows;
        self
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Rows as ordered column/value pairs. Short rows are padded with nulls.
    pub fn records(&self) -> impl Iterator<Item = RawRecord> + '_ {
        self.rows.iter().enumerate().map(|(idx, row)| {
            let fields = self
                .headers
                .iter()
                .enumerate()
                .map(|(col, header)| {
                    let value = row.get(col).cloned().unwrap_or(RawValue::Null);
                    (header.clone(), value)
                })
                .collect();
            RawRecord::new(idx + 1, fields)
        })
    }

    pub fn patient_score(&self) -> usize {
        let lowered = self
            .headers
            .iter()
            .map(|h| h.to_lowercase())
            .collect::<Vec<_>>();
        PATIENT_INDICATORS
            .iter()
            .filter(|indicator| lowered.iter().any(|h| h.contains(*indicator)))
            .count()
    }
}

pub trait SourceAdapter {
    fn describe(&self) -> String;

    fn tables(&self) -> Result<Vec<SourceTable>, SourceError>;
}

/// Reads a single CSV/TSV export, or every export in a directory.
#[derive(Debug, Clone)]
pub struct CsvSource {
    path: PathBuf,
    delimiter: Option<u8>,
    encoding: &'static Encoding,
}

impl CsvSource {
    pub fn new(path: impl Into<PathBuf>, delimiter: Option<u8>, encoding: &'static Encoding) -> Self {
        Self {
            path: path.into(),
            delimiter,
            encoding,
        }
    }

    fn unreadable(&self, path: &Path, err: impl std::fmt::Display) -> SourceError {
        SourceError::Unreadable {
            path: path.to_path_buf(),
            reason: format!("{err:#}"),
        }
    }

    fn table_files(&self) -> Result<Vec<PathBuf>, SourceError> {
        let metadata = fs::metadata(&self.path).map_err(|e| self.unreadable(&self.path, e))?;
        if metadata.is_file() {
            return Ok(vec![self.path.clone()]);
        }
        let entries = fs::read_dir(&self.path).map_err(|e| self.unreadable(&self.path, e))?;
        let mut files = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| self.unreadable(&self.path, e))?;
            let path = entry.path();
            if path.is_file() && io_utils::is_table_file(&path) {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    fn read_table(&self, path: &Path) -> Result<SourceTable, SourceError> {
        let delimiter = io_utils::resolve_input_delimiter(path, self.delimiter);
        let mut reader =
            io_utils::open_csv_reader_from_path(path, delimiter).map_err(|e| self.unreadable(path, e))?;
        let headers = io_utils::reader_headers(&mut reader, self.encoding)
            .map_err(|e| self.unreadable(path, e))?;
        let mut rows = Vec::new();
        for (row_idx, record) in reader.byte_records().enumerate() {
            let record = record.map_err(|e| {
                self.unreadable(path, format!("Reading row {}: {e}", row_idx + 2))
            })?;
            let decoded = io_utils::decode_record(&record, self.encoding)
                .map_err(|e| self.unreadable(path, format!("Decoding row {}: {e}", row_idx + 2)))?;
            if decoded.iter().all(|cell| cell.trim().is_empty()) {
                continue;
            }
            rows.push(decoded.iter().map(|cell| RawValue::from_field(cell)).collect());
        }
        let name = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or("table")
            .to_string();
        debug!(
            "Read {} row(s) across {} column(s) from {:?}",
            rows.len(),
            headers.len(),
            path
        );
        Ok(SourceTable::new(name, headers).with_rows(rows))
    }
}

impl SourceAdapter for CsvSource {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    fn tables(&self) -> Result<Vec<SourceTable>, SourceError> {
        self.table_files()?
            .iter()
            .map(|path| self.read_table(path))
            .collect()
    }
}

/// Tables that are already in memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    tables: Vec<SourceTable>,
}

impl MemorySource {
    pub fn new(tables: Vec<SourceTable>) -> Self {
        Self { tables }
    }
}

impl SourceAdapter for MemorySource {
    fn describe(&self) -> String {
        "memory".to_string()
    }

    fn tables(&self) -> Result<Vec<SourceTable>, SourceError> {
        Ok(self.tables.clone())
    }
}

/// Picks the patient table: the preferred table when present, otherwise the
/// largest table whose headers carry at least two patient indicators.
pub fn select_patient_table(
    tables: Vec<SourceTable>,
    preferred: Option<&str>,
) -> Option<SourceTable> {
    if let Some(name) = preferred {
        if let Some(position) = tables.iter().position(|t| t.name.eq_ignore_ascii_case(name)) {
            return tables.into_iter().nth(position);
        }
        info!("Preferred table '{name}' not found; falling back to header scoring");
    }
    let mut best: Option<SourceTable> = None;
    for table in tables {
        let score = table.patient_score();
        debug!(
            "Table '{}' scored {} with {} row(s)",
            table.name,
            score,
            table.row_count()
        );
        if score < MIN_PATIENT_SCORE {
            continue;
        }
        let better = best
            .as_ref()
            .is_none_or(|current| table.row_count() > current.row_count());
        if better {
            best = Some(table);
        }
    }
    best
}

pub fn read_patient_table(
    adapter: &dyn SourceAdapter,
    preferred: Option<&str>,
) -> Result<SourceTable, SourceError> {
    let tables = adapter.tables()?;
    info!(
        "Found {} table(s) in {}",
        tables.len(),
        adapter.describe()
    );
    select_patient_table(tables, preferred)
        .ok_or_else(|| SourceError::NoPatientTable(adapter.describe()))
}
