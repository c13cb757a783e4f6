//! Raw row to [`PatientRecord`] normalization.
//!
//! Every field degrades to a default instead of failing: a bad date becomes
//! the sentinel date, a missing phone becomes the placeholder number. The
//! only outcome that drops a row is both name fields being empty.

use std::fmt;

use chrono::NaiveDate;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::{
    data::{RawValue, parse_date_value},
    mapping::{CanonicalField, FieldMapping},
    source::{RawRecord, SourceTable},
};

pub const DEFAULT_ID_PREFIX: &str = "OMC-REAL";
pub const DEFAULT_PHONE: &str = "08000000000";
pub const DEFAULT_ADDRESS: &str = "Benin City, Edo State";

pub const DEFAULT_DATE_OF_BIRTH: NaiveDate = sentinel_date(1980, 1, 1);
pub const DEFAULT_CREATED_AT: NaiveDate = sentinel_date(2024, 1, 1);

const fn sentinel_date(year: i32, month: u32, day: u32) -> NaiveDate {
    match NaiveDate::from_ymd_opt(year, month, day) {
        Some(date) => date,
        None => panic!("invalid sentinel date"),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    #[default]
    Male,
    Female,
}

impl Gender {
    const FEMALE_MARKERS: &'static [&'static str] = &["f", "woman", "female"];

    /// Substring classification: anything containing `f` counts as female.
    pub fn classify(value: Option<&str>) -> Self {
        match value {
            Some(raw) => {
                let lowered = raw.trim().to_lowercase();
                if Self::FEMALE_MARKERS.iter().any(|m| lowered.contains(m)) {
                    Gender::Female
                } else {
                    Gender::Male
                }
            }
            None => Gender::Male,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Male => "male",
            Gender::Female => "female",
        }
    }
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Pathway {
    #[default]
    #[serde(rename = "self")]
    SelfReferred,
    #[serde(rename = "referral")]
    Referral,
}

impl Pathway {
    pub fn classify(value: Option<&str>) -> Self {
        match value {
            Some(raw) if raw.to_lowercase().contains("referral") => Pathway::Referral,
            _ => Pathway::SelfReferred,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Pathway::SelfReferred => "self",
            Pathway::Referral => "referral",
        }
    }
}

impl fmt::Display for Pathway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatientRecord {
    pub patient_id: String,
    pub first_name: String,
    pub last_name: String,
    pub full_name: String,
    pub phone: String,
    pub gender: Gender,
    pub date_of_birth: NaiveDate,
    pub address: String,
    pub pathway: Pathway,
    pub created_at: NaiveDate,
    pub updated_at: NaiveDate,
}

/// A present value that could not be used and was replaced by a default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldFallback {
    pub ordinal: usize,
    pub field: CanonicalField,
    pub value: String,
    pub reason: String,
}

impl fmt::Display for FieldFallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "row {}: {} value '{}' replaced by default ({})",
            self.ordinal, self.field, self.value, self.reason
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Normalized {
    Patient {
        record: PatientRecord,
        fallbacks: Vec<FieldFallback>,
    },
    Skip,
}

/// Outcome of normalizing a whole table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedTable {
    pub records: Vec<PatientRecord>,
    pub fallbacks: Vec<FieldFallback>,
    pub rows_read: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizeOptions {
    pub id_prefix: String,
    pub default_phone: String,
    pub default_address: String,
    pub default_date_of_birth: NaiveDate,
    pub default_created_at: NaiveDate,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            id_prefix: DEFAULT_ID_PREFIX.to_string(),
            default_phone: DEFAULT_PHONE.to_string(),
            default_address: DEFAULT_ADDRESS.to_string(),
            default_date_of_birth: DEFAULT_DATE_OF_BIRTH,
            default_created_at: DEFAULT_CREATED_AT,
        }
    }
}

pub struct Normalizer<'a> {
    mapping: &'a FieldMapping,
    options: &'a NormalizeOptions,
}

impl<'a> Normalizer<'a> {
    pub fn new(mapping: &'a FieldMapping, options: &'a NormalizeOptions) -> Self {
        Self { mapping, options }
    }

    fn raw<'r>(&self, record: &'r RawRecord, field: CanonicalField) -> Option<&'r RawValue> {
        self.mapping
            .get(field)
            .and_then(|column| record.get(column))
    }

    fn text(&self, record: &RawRecord, field: CanonicalField) -> Option<String> {
        self.raw(record, field).and_then(RawValue::present_text)
    }

    fn name(&self, record: &RawRecord, field: CanonicalField) -> String {
        self.text(record, field)
            .map(|value| value.to_uppercase())
            .unwrap_or_default()
    }

    fn date(
        &self,
        record: &RawRecord,
        field: CanonicalField,
        default: NaiveDate,
        fallbacks: &mut Vec<FieldFallback>,
    ) -> NaiveDate {
        let Some(value) = self.raw(record, field) else {
            return default;
        };
        let Some(text) = value.present_text() else {
            return default;
        };
        match parse_date_value(value) {
            Ok(date) => date,
            Err(err) => {
                fallbacks.push(FieldFallback {
                    ordinal: record.ordinal(),
                    field,
                    value: text,
                    reason: err.to_string(),
                });
                default
            }
        }
    }

    pub fn normalize(&self, record: &RawRecord) -> Normalized {
        let first_name = self.name(record, CanonicalField::FirstName);
        let last_name = self.name(record, CanonicalField::LastName);
        if first_name.is_empty() && last_name.is_empty() {
            return Normalized::Skip;
        }

        let mut fallbacks = Vec::new();
        let patient_id = self
            .text(record, CanonicalField::PatientId)
            .unwrap_or_else(|| synthesize_patient_id(&self.options.id_prefix, record.ordinal()));
        let phone = self
            .text(record, CanonicalField::Phone)
            .unwrap_or_else(|| self.options.default_phone.clone());
        let gender = Gender::classify(self.text(record, CanonicalField::Gender).as_deref());
        let date_of_birth = self.date(
            record,
            CanonicalField::DateOfBirth,
            self.options.default_date_of_birth,
            &mut fallbacks,
        );
        let address = self
            .text(record, CanonicalField::Address)
            .unwrap_or_else(|| self.options.default_address.clone());
        let pathway = Pathway::classify(self.text(record, CanonicalField::Pathway).as_deref());
        let created_at = self.date(
            record,
            CanonicalField::CreatedAt,
            self.options.default_created_at,
            &mut fallbacks,
        );
        let full_name = format!("{first_name} {last_name}").trim().to_string();

        Normalized::Patient {
            record: PatientRecord {
                patient_id,
                first_name,
                last_name,
                full_name,
                phone,
                gender,
                date_of_birth,
                address,
                pathway,
                created_at,
                updated_at: created_at,
            },
            fallbacks,
        }
    }

    pub fn normalize_table(&self, table: &SourceTable) -> NormalizedTable {
        let mut out = NormalizedTable::default();
        for raw in table.records() {
            out.rows_read += 1;
            match self.normalize(&raw) {
                Normalized::Patient { record, fallbacks } => {
                    for fallback in &fallbacks {
                        warn!("{fallback}");
                    }
                    out.records.push(record);
                    out.fallbacks.extend(fallbacks);
                }
                Normalized::Skip => {
                    debug!("Row {} skipped: no first or last name", raw.ordinal());
                    out.skipped += 1;
                }
            }
        }
        info!(
            "Normalized {} record(s) from {} row(s); {} skipped, {} field fallback(s)",
            out.records.len(),
            out.rows_read,
            out.skipped,
            out.fallbacks.len()
        );
        out
    }
}

pub fn synthesize_patient_id(prefix: &str, ordinal: usize) -> String {
    format!("{prefix}-{ordinal:05}")
}
