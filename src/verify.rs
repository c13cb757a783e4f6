use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::{
    normalize::PatientRecord,
    store::{Database, StoreResult, Table},
    table::{Align, TextTable},
};

pub const DEFAULT_SURNAME: &str = "OMOKARO";
const RECENT_SAMPLE: usize = 10;

/// Aggregates re-queried from the store after a load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Verification {
    pub patients: u64,
    pub transactions: u64,
    pub tests: u64,
    pub surname: String,
    pub surname_count: u64,
    pub total_revenue: Decimal,
    pub today: NaiveDate,
    pub today_revenue: Decimal,
    pub orphaned_rows: u64,
    pub recent_patients: Vec<PatientRecord>,
}

pub fn verify(db: &Database, surname: &str, today: NaiveDate) -> StoreResult<Verification> {
    let surname = surname.trim().to_uppercase();
    Ok(Verification {
        patients: db.count(Table::Patients)?,
        transactions: db.count(Table::Transactions)?,
        tests: db.count(Table::PatientTests)?,
        surname_count: db.count_surname(&surname)?,
        surname,
        total_revenue: db.total_revenue()?,
        today,
        today_revenue: db.revenue_on(today)?,
        orphaned_rows: db.orphan_count()?,
        recent_patients: db.recent_patients(RECENT_SAMPLE)?,
    })
}

impl Verification {
    pub fn summary_rows(&self) -> Vec<Vec<String>> {
        vec![
            vec![Table::Patients.as_str().to_string(), self.patients.to_string()],
            vec![
                Table::Transactions.as_str().to_string(),
                self.transactions.to_string(),
            ],
            vec![Table::PatientTests.as_str().to_string(), self.tests.to_string()],
            vec![
                format!("surname {}", self.surname),
                self.surname_count.to_string(),
            ],
            vec!["total revenue".to_string(), format_money(self.total_revenue)],
            vec![
                format!("revenue {}", self.today),
                format_money(self.today_revenue),
            ],
        ]
    }

    pub fn render(&self) -> String {
        let mut summary = TextTable::new(["check", "value"]).align(1, Align::Right);
        for row in self.summary_rows() {
            summary.push_row(row);
        }
        if self.recent_patients.is_empty() {
            return summary.to_string();
        }
        let mut recent = TextTable::new(["patient_id", "full_name", "phone", "registered"]);
        for p in &self.recent_patients {
            recent.push_row([
                p.patient_id.clone(),
                p.full_name.clone(),
                p.phone.clone(),
                p.created_at.to_string(),
            ]);
        }
        format!("{summary}\nRecent patients\n{recent}")
    }
}

pub fn format_money(value: Decimal) -> String {
    format!("{:.2}", value.round_dp(2))
}
