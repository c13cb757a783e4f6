use std::{borrow::Cow, fmt};

use anyhow::{Result, anyhow};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Cell strings that legacy exports write in place of a missing value.
const SENTINEL_TOKENS: &[&str] = &["nan", "none", "null"];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum RawValue {
    Null,
    Text(String),
    Number(f64),
    Date(NaiveDate),
}

impl RawValue {
    /// Builds a value from a decoded CSV cell. Empty cells become `Null`;
    /// everything else stays text so identifiers and phone numbers keep
    /// their leading zeros.
    pub fn from_field(field: &str) -> Self {
        if field.is_empty() {
            RawValue::Null
        } else {
            RawValue::Text(field.to_string())
        }
    }

    pub fn as_display(&self) -> Cow<'_, str> {
        match self {
            RawValue::Null => Cow::Borrowed(""),
            RawValue::Text(s) => Cow::Borrowed(s.as_str()),
            RawValue::Number(n) => {
                if n.fract() == 0.0 && n.is_finite() {
                    Cow::Owned((*n as i64).to_string())
                } else {
                    Cow::Owned(n.to_string())
                }
            }
            RawValue::Date(d) => Cow::Owned(d.format("%Y-%m-%d").to_string()),
        }
    }

    /// Trimmed text of the value, or `None` when it is null, blank or a
    /// sentinel token.
    pub fn present_text(&self) -> Option<String> {
        let display = self.as_display();
        let trimmed = display.trim();
        if trimmed.is_empty() || is_sentinel(trimmed) {
            None
        } else {
            Some(trimmed.to_string())
        }
    }
}

impl fmt::Display for RawValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_display())
    }
}

pub fn is_sentinel(value: &str) -> bool {
    let trimmed = value.trim();
    SENTINEL_TOKENS
        .iter()
        .any(|token| trimmed.eq_ignore_ascii_case(token))
}

pub fn parse_naive_date(value: &str) -> Result<NaiveDate> {
    const DATE_FORMATS: &[&str] = &[
        "%Y-%m-%d",
        "%d/%m/%Y",
        "%m/%d/%Y",
        "%Y/%m/%d",
        "%d-%m-%Y",
        "%d-%b-%Y",
        "%d %b %Y",
        "%d %B %Y",
    ];
    for fmt in DATE_FORMATS {
        if let Ok(parsed) = NaiveDate::parse_from_str(value, fmt) {
            return Ok(parsed);
        }
    }
    Err(anyhow!("Failed to parse '{value}' as date"))
}

pub fn parse_naive_datetime(value: &str) -> Result<NaiveDateTime> {
    const DATETIME_FORMATS: &[&str] = &[
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%d/%m/%Y %H:%M:%S",
        "%m/%d/%Y %H:%M:%S",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M",
    ];
    for fmt in DATETIME_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(value, fmt) {
            return Ok(parsed);
        }
    }
    Err(anyhow!("Failed to parse '{value}' as datetime"))
}

/// Parses a calendar date out of a raw cell, accepting plain dates and
/// timestamps (whose time part is dropped).
pub fn parse_date_value(value: &RawValue) -> Result<NaiveDate> {
    match value {
        RawValue::Date(date) => Ok(*date),
        RawValue::Text(text) => {
            let trimmed = text.trim();
            parse_naive_date(trimmed)
                .or_else(|_| parse_naive_datetime(trimmed).map(|dt| dt.date()))
                .map_err(|_| anyhow!("Failed to parse '{trimmed}' as date"))
        }
        RawValue::Number(n) => Err(anyhow!("Numeric value {n} is not a date")),
        RawValue::Null => Err(anyhow!("Missing date value")),
    }
}

pub fn normalize_column_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' => c,
            _ => '_',
        })
        .collect::<String>()
        .to_ascii_lowercase()
}
