//! Destination store: an SQLite database holding `patients`,
//! `transactions` and `patient_tests`.
//!
//! The store assigns its own integer primary keys; `patient_id` and the
//! transaction `reference` are the natural keys the loader upserts on.

mod activity;
mod patients;
mod schema;

pub use schema::SCHEMA;

use std::path::Path;

use std::str::FromStr;

use chrono::NaiveDate;
use rusqlite::types::{FromSqlError, Type, ValueRef};
use rusqlite::{Connection, Params, params};
use rust_decimal::{Decimal, prelude::FromPrimitive};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Batch {batch} failed after {committed} row(s) were committed: {source}")]
    BatchFailed {
        batch: usize,
        committed: usize,
        #[source]
        source: rusqlite::Error,
    },
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Tenant and branch stamped onto every inserted row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tenancy {
    pub tenant_id: i64,
    pub branch_id: i64,
}

impl Default for Tenancy {
    fn default() -> Self {
        Self {
            tenant_id: 1,
            branch_id: 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Table {
    Patients,
    Transactions,
    PatientTests,
}

impl Table {
    pub fn as_str(&self) -> &'static str {
        match self {
            Table::Patients => "patients",
            Table::Transactions => "transactions",
            Table::PatientTests => "patient_tests",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PurgeCounts {
    pub patients: usize,
    pub transactions: usize,
    pub tests: usize,
}

pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open the store at `path`, creating the file and schema if needed.
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.initialize()?;
        Ok(db)
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.initialize()?;
        Ok(db)
    }

    fn initialize(&self) -> StoreResult<()> {
        self.conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    pub fn count(&self, table: Table) -> StoreResult<u64> {
        let sql = format!("SELECT COUNT(*) FROM {}", table.as_str());
        let count: i64 = self.conn.query_row(&sql, [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Patients whose upper-cased last name contains `surname`.
    pub fn count_surname(&self, surname: &str) -> StoreResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM patients WHERE instr(UPPER(last_name), UPPER(?1)) > 0",
            [surname],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    pub fn total_revenue(&self) -> StoreResult<Decimal> {
        self.sum_money("SELECT amount FROM transactions", [])
    }

    pub fn revenue_on(&self, day: NaiveDate) -> StoreResult<Decimal> {
        self.sum_money(
            "SELECT amount FROM transactions WHERE date(transaction_date) = ?1",
            params![day],
        )
    }

    /// Sums the single money column selected by `sql`. SQLite's `SUM` goes
    /// through floating point, so the addition happens on `Decimal`s here.
    fn sum_money<P: Params>(&self, sql: &str, params: P) -> StoreResult<Decimal> {
        let mut stmt = self.conn.prepare(sql)?;
        let mut rows = stmt.query(params)?;
        let mut total = Decimal::ZERO;
        while let Some(row) = rows.next()? {
            total += read_money(row.get_ref(0)?)
                .map_err(|err| rusqlite::Error::FromSqlConversionFailure(0, Type::Text, err.into()))?;
        }
        Ok(total)
    }

    /// Writes a compacted copy of the store to `path`, which must not exist.
    pub fn snapshot_to(&self, path: &Path) -> StoreResult<()> {
        let target = path.to_string_lossy().into_owned();
        self.conn.execute("VACUUM INTO ?1", [target])?;
        Ok(())
    }

    /// Deletes migrated rows ahead of a fresh run. Patients whose
    /// `patient_id` starts with `keep_prefix` survive together with their
    /// transactions and tests.
    pub fn purge(&mut self, keep_prefix: Option<&str>) -> StoreResult<PurgeCounts> {
        let tx = self.conn.transaction()?;
        let counts = match keep_prefix {
            Some(prefix) => {
                let doomed = "SELECT id FROM patients \
                              WHERE substr(patient_id, 1, length(?1)) <> ?1";
                let tests = tx.execute(
                    &format!("DELETE FROM patient_tests WHERE patient_id IN ({doomed})"),
                    [prefix],
                )?;
                let transactions = tx.execute(
                    &format!("DELETE FROM transactions WHERE patient_id IN ({doomed})"),
                    [prefix],
                )?;
                let patients = tx.execute(
                    "DELETE FROM patients WHERE substr(patient_id, 1, length(?1)) <> ?1",
                    [prefix],
                )?;
                PurgeCounts {
                    patients,
                    transactions,
                    tests,
                }
            }
            None => {
                let tests = tx.execute("DELETE FROM patient_tests", [])?;
                let transactions = tx.execute("DELETE FROM transactions", [])?;
                let patients = tx.execute("DELETE FROM patients", [])?;
                PurgeCounts {
                    patients,
                    transactions,
                    tests,
                }
            }
        };
        tx.commit()?;
        Ok(counts)
    }
}

/// Reads a stored amount. Stores created before money moved to TEXT still
/// hold REAL values, which are rounded to kobo.
fn read_money(value: ValueRef<'_>) -> Result<Decimal, FromSqlError> {
    match value {
        ValueRef::Text(bytes) => {
            let text = std::str::from_utf8(bytes).map_err(|err| FromSqlError::Other(err.into()))?;
            Decimal::from_str(text.trim()).map_err(|err| FromSqlError::Other(err.into()))
        }
        ValueRef::Integer(i) => Ok(Decimal::from(i)),
        ValueRef::Real(f) => Decimal::from_f64(f)
            .map(|d| d.round_dp(2))
            .ok_or(FromSqlError::InvalidType),
        ValueRef::Null | ValueRef::Blob(_) => Err(FromSqlError::InvalidType),
    }
}
