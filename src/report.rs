//! JSON run report, written whether the run succeeds or fails.

use std::{
    fs::File,
    io::{BufWriter, Write},
    path::Path,
};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{
    loader::{ActivityLoadStats, PatientLoadStats},
    mapping::FieldMapping,
    store::PurgeCounts,
    verify::Verification,
};

/// Fallback warnings beyond this many are counted but not listed.
const MAX_LISTED_WARNINGS: usize = 500;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Statistics {
    pub rows_read: usize,
    pub rows_skipped: usize,
    pub records_normalized: usize,
    pub field_fallbacks: usize,
    pub patients_purged: usize,
    pub patients_inserted: usize,
    pub patients_existing: usize,
    pub patient_batches: usize,
    pub transactions_generated: usize,
    pub transactions_inserted: usize,
    pub transactions_existing: usize,
    pub tests_generated: usize,
    pub tests_inserted: usize,
    pub tests_existing: usize,
    pub dropped_unresolved: usize,
}

impl Statistics {
    pub fn record_purge(&mut self, counts: PurgeCounts) {
        self.patients_purged = counts.patients;
    }

    pub fn record_patients(&mut self, stats: PatientLoadStats) {
        self.patients_inserted = stats.inserted;
        self.patients_existing = stats.existing;
        self.patient_batches = stats.batches;
    }

    pub fn record_activity(&mut self, stats: ActivityLoadStats) {
        self.transactions_inserted = stats.transactions_inserted;
        self.transactions_existing = stats.transactions_existing;
        self.tests_inserted = stats.tests_inserted;
        self.tests_existing = stats.tests_existing;
        self.dropped_unresolved = stats.dropped_unresolved;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Succeeded,
    Failed,
    DryRun,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub status: RunStatus,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct MigrationReport {
    pub migration_date: DateTime<Utc>,
    pub source: String,
    pub source_table: Option<String>,
    pub database: Option<String>,
    pub backup: Option<String>,
    pub mapping: Option<FieldMapping>,
    pub statistics: Statistics,
    pub verification: Option<Verification>,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
    pub summary: Summary,
}

impl MigrationReport {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            migration_date: Utc::now(),
            source: source.into(),
            source_table: None,
            database: None,
            backup: None,
            mapping: None,
            statistics: Statistics::default(),
            verification: None,
            warnings: Vec::new(),
            errors: Vec::new(),
            summary: Summary {
                status: RunStatus::Running,
                message: String::new(),
            },
        }
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        if self.warnings.len() < MAX_LISTED_WARNINGS {
            self.warnings.push(message.into());
        }
    }

    pub fn succeed(&mut self, dry_run: bool) {
        let stats = &self.statistics;
        self.summary = if dry_run {
            Summary {
                status: RunStatus::DryRun,
                message: format!(
                    "Normalized {} of {} row(s); nothing written",
                    stats.records_normalized, stats.rows_read
                ),
            }
        } else {
            Summary {
                status: RunStatus::Succeeded,
                message: format!(
                    "Migrated {} new patient(s) ({} already present, {} skipped row(s))",
                    stats.patients_inserted, stats.patients_existing, stats.rows_skipped
                ),
            }
        };
    }

    pub fn fail(&mut self, error: &anyhow::Error) {
        let message = format!("{error:#}");
        self.errors.push(message.clone());
        self.summary = Summary {
            status: RunStatus::Failed,
            message,
        };
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let file = File::create(path).with_context(|| format!("Creating report {path:?}"))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, self)
            .with_context(|| format!("Serializing report to {path:?}"))?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(())
    }
}
