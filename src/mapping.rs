//! Column-to-field inference for arbitrary patient tables.
//!
//! A source table arrives with whatever headers the exporting system chose.
//! [`infer_mapping()`] assigns each header to at most one [`CanonicalField`]
//! by keyword matching, walking the fields in a fixed precedence order. The
//! resulting [`FieldMapping`] is built once per table and reused for every
//! row.
//!
//! Rules:
//!
//! - Matching is a case-insensitive substring test on the header.
//! - A header belongs to the first field (in precedence order) whose keyword
//!   it contains.
//! - When a field is already claimed by an earlier header, later headers that
//!   would map to it are left unmapped.
//! - Headers matching nothing are ignored.

use std::{collections::BTreeMap, fmt, str::FromStr};

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::data::normalize_column_name;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CanonicalField {
    FirstName,
    LastName,
    Phone,
    Gender,
    DateOfBirth,
    Address,
    PatientId,
    CreatedAt,
    Pathway,
}

/// Fields and their header keywords, in precedence order.
const FIELD_KEYWORDS: &[(CanonicalField, &[&str])] = &[
    (CanonicalField::FirstName, &["first", "fname", "given"]),
    (
        CanonicalField::LastName,
        &["last", "lname", "surname", "family"],
    ),
    (
        CanonicalField::Phone,
        &["phone", "mobile", "tel", "contact", "cell"],
    ),
    (CanonicalField::Gender, &["gender", "sex"]),
    (CanonicalField::DateOfBirth, &["birth", "dob", "age"]),
    (
        CanonicalField::Address,
        &["address", "location", "residence"],
    ),
    (
        CanonicalField::PatientId,
        &["id", "patientid", "clientid", "number"],
    ),
    (
        CanonicalField::CreatedAt,
        &["date", "created", "reg", "entry"],
    ),
    (
        CanonicalField::Pathway,
        &["pathway", "referral", "source"],
    ),
];

impl CanonicalField {
    pub const ALL: [CanonicalField; 9] = [
        CanonicalField::FirstName,
        CanonicalField::LastName,
        CanonicalField::Phone,
        CanonicalField::Gender,
        CanonicalField::DateOfBirth,
        CanonicalField::Address,
        CanonicalField::PatientId,
        CanonicalField::CreatedAt,
        CanonicalField::Pathway,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CanonicalField::FirstName => "first_name",
            CanonicalField::LastName => "last_name",
            CanonicalField::Phone => "phone",
            CanonicalField::Gender => "gender",
            CanonicalField::DateOfBirth => "date_of_birth",
            CanonicalField::Address => "address",
            CanonicalField::PatientId => "patient_id",
            CanonicalField::CreatedAt => "created_at",
            CanonicalField::Pathway => "pathway",
        }
    }

    /// First field, in precedence order, whose keywords occur in `column`.
    pub fn classify(column: &str) -> Option<CanonicalField> {
        let lowered = column.to_lowercase();
        FIELD_KEYWORDS
            .iter()
            .find(|(_, keywords)| keywords.iter().any(|kw| lowered.contains(kw)))
            .map(|(field, _)| *field)
    }
}

impl fmt::Display for CanonicalField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CanonicalField {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = normalize_column_name(value.trim());
        CanonicalField::ALL
            .into_iter()
            .find(|field| field.as_str() == normalized)
            .ok_or_else(|| {
                anyhow!(
                    "Unknown canonical field '{value}'. Supported fields: {}",
                    CanonicalField::ALL
                        .iter()
                        .map(|f| f.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                )
            })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldMapping {
    assignments: BTreeMap<CanonicalField, String>,
}

impl FieldMapping {
    pub fn get(&self, field: CanonicalField) -> Option<&str> {
        self.assignments.get(&field).map(String::as_str)
    }

    pub fn contains(&self, field: CanonicalField) -> bool {
        self.assignments.contains_key(&field)
    }

    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }

    pub fn len(&self) -> usize {
        self.assignments.len()
    }

    /// Assignments in field precedence order.
    pub fn iter(&self) -> impl Iterator<Item = (CanonicalField, &str)> {
        self.assignments
            .iter()
            .map(|(field, column)| (*field, column.as_str()))
    }

    pub fn is_column_mapped(&self, column: &str) -> bool {
        self.assignments.values().any(|c| c == column)
    }

    /// Applies explicit `field -> column` overrides, then lets inference fill
    /// the remaining fields from the headers the overrides left untouched.
    /// Override columns are matched case-insensitively against `columns`.
    pub fn with_overrides<S: AsRef<str>>(
        columns: &[S],
        overrides: &BTreeMap<CanonicalField, String>,
    ) -> Result<Self> {
        let mut mapping = FieldMapping::default();
        for (field, wanted) in overrides {
            let wanted_key = normalize_column_name(wanted.trim());
            let column = columns
                .iter()
                .map(AsRef::as_ref)
                .find(|c| normalize_column_name(c.trim()) == wanted_key)
                .ok_or_else(|| {
                    anyhow!("Column '{wanted}' configured for {field} is not present in the source")
                })?;
            if mapping.is_column_mapped(column) {
                return Err(anyhow!(
                    "Column '{column}' is configured for more than one field"
                ));
            }
            mapping.assignments.insert(*field, column.to_string());
        }
        for column in columns.iter().map(AsRef::as_ref) {
            if mapping.is_column_mapped(column) {
                continue;
            }
            mapping.claim(column);
        }
        Ok(mapping)
    }

    fn claim(&mut self, column: &str) {
        if let Some(field) = CanonicalField::classify(column) {
            self.assignments
                .entry(field)
                .or_insert_with(|| column.to_string());
        }
    }
}

impl fmt::Display for FieldMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("(no columns mapped)");
        }
        let rendered = self
            .iter()
            .map(|(field, column)| format!("{field} <- '{column}'"))
            .collect::<Vec<_>>()
            .join(", ");
        f.write_str(&rendered)
    }
}

pub fn infer_mapping<S: AsRef<str>>(columns: &[S]) -> FieldMapping {
    let mut mapping = FieldMapping::default();
    for column in columns {
        mapping.claim(column.as_ref());
    }
    mapping
}
