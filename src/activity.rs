//! Visit activity: transactions and lab tests.
//!
//! Exports rarely carry usable payment history, so activity is synthesized
//! from the loaded patients with a seeded generator. The same seed and the
//! same patients always produce the same records, and every transaction
//! carries a deterministic `reference` so a rerun upserts instead of
//! duplicating.

use std::{collections::BTreeSet, fmt};

use anyhow::{Context, Result};
use chrono::{Days, NaiveDate};
use log::debug;
use rand::{
    Rng, SeedableRng,
    distr::{Distribution, weighted::WeightedIndex},
    rngs::StdRng,
    seq::IndexedRandom,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::normalize::PatientRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Cash,
    Card,
    Transfer,
    Insurance,
}

impl PaymentMethod {
    const WEIGHTED: [(PaymentMethod, u32); 4] = [
        (PaymentMethod::Cash, 60),
        (PaymentMethod::Card, 25),
        (PaymentMethod::Transfer, 10),
        (PaymentMethod::Insurance, 5),
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::Card => "card",
            PaymentMethod::Transfer => "transfer",
            PaymentMethod::Insurance => "insurance",
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultStatus {
    Pending,
    Completed,
    Reported,
}

impl ResultStatus {
    const ALL: [ResultStatus; 3] = [
        ResultStatus::Pending,
        ResultStatus::Completed,
        ResultStatus::Reported,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResultStatus::Pending => "pending",
            ResultStatus::Completed => "completed",
            ResultStatus::Reported => "reported",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub name: String,
    pub price: Decimal,
}

const DEFAULT_CATALOG: &[(&str, i64)] = &[
    ("FULL BLOOD COUNT", 2500),
    ("MALARIA PARASITE", 1500),
    ("BLOOD GLUCOSE", 1200),
    ("URINALYSIS", 1000),
    ("HEPATITIS B SURFACE ANTIGEN", 3500),
    ("HIV SCREENING", 2000),
    ("WIDAL TEST", 2500),
    ("BLOOD GROUP", 1500),
    ("PREGNANCY TEST", 1500),
    ("CHEST X-RAY", 4000),
    ("ABDOMINAL ULTRASOUND", 8000),
    ("PELVIC ULTRASOUND", 6000),
    ("ECG", 3000),
    ("LIPID PROFILE", 5000),
    ("LIVER FUNCTION TEST", 4500),
    ("KIDNEY FUNCTION TEST", 3500),
    ("THYROID FUNCTION TEST", 7500),
    ("PROSTATE SPECIFIC ANTIGEN", 5500),
    ("BLOOD CULTURE", 4000),
    ("STOOL EXAMINATION", 1200),
    ("SPUTUM EXAMINATION", 2000),
    ("BONE X-RAY", 3500),
    ("CT SCAN", 25000),
    ("MRI", 45000),
    ("MAMMOGRAPHY", 15000),
];

pub fn default_catalog() -> Vec<CatalogEntry> {
    DEFAULT_CATALOG
        .iter()
        .map(|(name, price)| CatalogEntry {
            name: (*name).to_string(),
            price: Decimal::from(*price),
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransactionRecord {
    pub reference: String,
    pub patient_id: String,
    pub amount: Decimal,
    pub payment_method: PaymentMethod,
    pub payment_status: String,
    pub transaction_date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TestRecord {
    pub transaction_reference: String,
    pub patient_id: String,
    pub test_name: String,
    pub test_price: Decimal,
    pub test_date: NaiveDate,
    pub result_status: ResultStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Activity {
    pub transactions: Vec<TransactionRecord>,
    pub tests: Vec<TestRecord>,
}

impl Activity {
    pub fn revenue(&self) -> Decimal {
        self.transactions.iter().map(|t| t.amount).sum()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActivityOptions {
    pub seed: u64,
    pub active_ratio: f64,
    pub max_visits: u32,
    pub max_tests_per_visit: usize,
    pub max_days_after_registration: u64,
    pub max_transactions: usize,
    pub catalog: Vec<CatalogEntry>,
}

impl Default for ActivityOptions {
    fn default() -> Self {
        Self {
            seed: 42,
            active_ratio: 0.6,
            max_visits: 8,
            max_tests_per_visit: 5,
            max_days_after_registration: 365 * 3,
            max_transactions: 23_000,
            catalog: default_catalog(),
        }
    }
}

pub fn transaction_reference(patient_id: &str, visit: u32) -> String {
    format!("{patient_id}-V{visit:02}")
}

pub fn generate_activity(
    patients: &[PatientRecord],
    options: &ActivityOptions,
) -> Result<Activity> {
    let mut activity = Activity::default();
    if patients.is_empty() || options.catalog.is_empty() || options.max_transactions == 0 {
        return Ok(activity);
    }
    let mut rng = StdRng::seed_from_u64(options.seed);
    let methods = WeightedIndex::new(PaymentMethod::WEIGHTED.iter().map(|(_, w)| *w))
        .context("Building payment method weights")?;

    let ratio = options.active_ratio.clamp(0.0, 1.0);
    let active_count = ((patients.len() as f64) * ratio).floor() as usize;
    let mut active = patients
        .choose_multiple(&mut rng, active_count)
        .collect::<Vec<_>>();
    active.sort_by(|a, b| a.patient_id.cmp(&b.patient_id));
    // Duplicate patient_ids collapse into one store row, so they get one
    // set of visits.
    let mut seen = BTreeSet::new();

    'patients: for patient in active {
        if !seen.insert(patient.patient_id.as_str()) {
            continue;
        }
        let visits = rng.random_range(1..=options.max_visits.max(1));
        for visit in 1..=visits {
            let offset = rng.random_range(0..=options.max_days_after_registration);
            let visit_date = patient
                .created_at
                .checked_add_days(Days::new(offset))
                .unwrap_or(patient.created_at);
            let upper = options.max_tests_per_visit.clamp(1, options.catalog.len());
            let test_count = rng.random_range(1..=upper);
            let selected = options
                .catalog
                .choose_multiple(&mut rng, test_count)
                .collect::<Vec<_>>();
            let reference = transaction_reference(&patient.patient_id, visit);
            let amount = selected.iter().map(|entry| entry.price).sum();
            let payment_method = PaymentMethod::WEIGHTED[methods.sample(&mut rng)].0;
            for entry in &selected {
                let status = *ResultStatus::ALL
                    .choose(&mut rng)
                    .unwrap_or(&ResultStatus::Pending);
                activity.tests.push(TestRecord {
                    transaction_reference: reference.clone(),
                    patient_id: patient.patient_id.clone(),
                    test_name: entry.name.clone(),
                    test_price: entry.price,
                    test_date: visit_date,
                    result_status: status,
                });
            }
            activity.transactions.push(TransactionRecord {
                reference,
                patient_id: patient.patient_id.clone(),
                amount,
                payment_method,
                payment_status: "completed".to_string(),
                transaction_date: visit_date,
            });
            if activity.transactions.len() >= options.max_transactions {
                break 'patients;
            }
        }
    }
    debug!(
        "Generated {} transaction(s) and {} test(s)",
        activity.transactions.len(),
        activity.tests.len()
    );
    Ok(activity)
}
