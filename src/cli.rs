use std::path::PathBuf;

use clap::Parser;

use crate::mapping::CanonicalField;

#[derive(Debug, Parser)]
#[command(
    name = "patient-migrate",
    author,
    version,
    about = "Migrate exported patient tables into a patients/transactions/patient_tests store",
    long_about = None
)]
pub struct Cli {
    /// Exported table (.csv/.tsv) or a directory of exported tables
    #[arg(short, long)]
    pub source: PathBuf,
    /// CSV delimiter character (supports ',', 'tab', ';', '|')
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Character encoding of the exported tables (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
    /// Name of the table holding patients (skips header scoring when present)
    #[arg(long)]
    pub table: Option<String>,
    /// Destination SQLite database file (created if missing)
    #[arg(short, long, env = "PATIENT_MIGRATE_DATABASE")]
    pub database: Option<PathBuf>,
    /// YAML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    /// Explicit column for a field, e.g. --map last_name=Client (repeatable)
    #[arg(long = "map", value_name = "FIELD=COLUMN", value_parser = parse_column_override)]
    pub map: Vec<(CanonicalField, String)>,
    /// Prefix for synthesized patient identifiers
    #[arg(long)]
    pub id_prefix: Option<String>,
    /// Records per committed batch
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    pub batch_size: Option<u64>,
    /// Delete existing patients, transactions and tests before loading
    #[arg(long)]
    pub replace: bool,
    /// With --replace, keep patients whose identifier starts with this prefix
    #[arg(long, requires = "replace")]
    pub keep_prefix: Option<String>,
    /// Synthesize visit transactions and lab tests for the loaded patients
    #[arg(long)]
    pub activity: bool,
    /// Seed for activity synthesis
    #[arg(long)]
    pub seed: Option<u64>,
    /// Surname counted during verification
    #[arg(long)]
    pub surname: Option<String>,
    /// Write a JSON run report to this path (also written on failure)
    #[arg(long)]
    pub report: Option<PathBuf>,
    /// Append log output to this file as well as stderr
    #[arg(long)]
    pub log_file: Option<PathBuf>,
    /// Read, map and normalize only; print a preview and write nothing
    #[arg(long)]
    pub dry_run: bool,
    /// Rows shown by --dry-run
    #[arg(long, default_value_t = 10)]
    pub preview_rows: usize,
}

pub fn parse_delimiter(value: &str) -> Result<u8, String> {
    match value {
        "tab" | "\t" => Ok(b'\t'),
        "comma" | "," => Ok(b','),
        "|" | "pipe" => Ok(b'|'),
        ";" | "semicolon" => Ok(b';'),
        other => {
            let mut chars = other.chars();
            let first = chars
                .next()
                .ok_or_else(|| "Delimiter cannot be empty".to_string())?;
            if chars.next().is_some() {
                return Err("Delimiter must be a single character".to_string());
            }
            if !first.is_ascii() {
                return Err("Delimiter must be ASCII".to_string());
            }
            Ok(first as u8)
        }
    }
}

pub fn parse_column_override(value: &str) -> Result<(CanonicalField, String), String> {
    let (field, column) = value
        .split_once('=')
        .ok_or_else(|| format!("Expected FIELD=COLUMN, got '{value}'"))?;
    let column = column.trim();
    if column.is_empty() {
        return Err(format!("Column name missing in '{value}'"));
    }
    let field = field.parse::<CanonicalField>().map_err(|e| e.to_string())?;
    Ok((field, column.to_string()))
}
