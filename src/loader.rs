//! Batched, idempotent writes into the destination store.
//!
//! Patients go in first, in batches of `batch_size`, each batch committed on
//! its own. A failing batch stops the load; everything committed before it
//! stays. Activity is loaded afterwards with its string keys re-resolved to
//! the store's integer ids through a [`PatientIdMap`] built once per run.

use std::collections::{HashMap, HashSet};

use itertools::{Either, Itertools};
use log::{debug, info, warn};
use serde::Serialize;

use crate::{
    activity::{Activity, TestRecord, TransactionRecord},
    normalize::PatientRecord,
    store::{Database, StoreError, StoreResult, Tenancy},
};

pub const DEFAULT_BATCH_SIZE: usize = 1000;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PatientLoadStats {
    pub inserted: usize,
    pub existing: usize,
    pub batches: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ActivityLoadStats {
    pub transactions_inserted: usize,
    pub transactions_existing: usize,
    pub tests_inserted: usize,
    pub tests_existing: usize,
    pub dropped_unresolved: usize,
}

/// `patient_id` to store primary key, read from the store in one pass.
#[derive(Debug, Clone, Default)]
pub struct PatientIdMap {
    ids: HashMap<String, i64>,
}

impl PatientIdMap {
    pub fn load(db: &Database) -> StoreResult<Self> {
        let ids = db.patient_keys()?.into_iter().collect::<HashMap<_, _>>();
        debug!("Resolved {} patient id(s) from the store", ids.len());
        Ok(Self { ids })
    }

    pub fn resolve(&self, patient_id: &str) -> Option<i64> {
        self.ids.get(patient_id).copied()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Loader {
    batch_size: usize,
    tenancy: Tenancy,
}

impl Loader {
    pub fn new(batch_size: usize, tenancy: Tenancy) -> Self {
        Self {
            batch_size: batch_size.max(1),
            tenancy,
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn load_patients(
        &self,
        db: &mut Database,
        records: &[PatientRecord],
    ) -> StoreResult<PatientLoadStats> {
        let total = records.len().div_ceil(self.batch_size);
        let mut stats = PatientLoadStats::default();
        for (idx, batch) in records.chunks(self.batch_size).enumerate() {
            let inserted = db.upsert_patients(batch, self.tenancy).map_err(|source| {
                StoreError::BatchFailed {
                    batch: idx + 1,
                    committed: stats.inserted,
                    source,
                }
            })?;
            stats.inserted += inserted;
            stats.existing += batch.len() - inserted;
            stats.batches += 1;
            info!(
                "Patient batch {}/{}: {} inserted, {} already present",
                idx + 1,
                total,
                inserted,
                batch.len() - inserted
            );
        }
        Ok(stats)
    }

    /// Loads transactions, then tests. Records whose patient (or, for tests,
    /// transaction) cannot be resolved in the store are dropped and counted.
    /// Tests are only written under transactions inserted by this call; a
    /// transaction that was already present keeps the tests it has, so its
    /// amount stays the sum of its test prices.
    pub fn load_activity(
        &self,
        db: &mut Database,
        activity: &Activity,
        patients: &PatientIdMap,
    ) -> StoreResult<ActivityLoadStats> {
        let mut stats = ActivityLoadStats::default();

        let (resolved, unresolved): (Vec<(i64, &TransactionRecord)>, Vec<&TransactionRecord>) =
            activity
                .transactions
                .iter()
                .partition_map(|txn| match patients.resolve(&txn.patient_id) {
                    Some(id) => Either::Left((id, txn)),
                    None => Either::Right(txn),
                });
        if !unresolved.is_empty() {
            warn!(
                "Dropping {} transaction(s) whose patient is not in the store",
                unresolved.len()
            );
        }
        stats.dropped_unresolved += unresolved.len();

        let known = resolved
            .iter()
            .map(|(_, txn)| txn.reference.as_str())
            .collect::<HashSet<_>>();
        let mut fresh = HashMap::new();
        let total = resolved.len().div_ceil(self.batch_size);
        for (idx, batch) in resolved.chunks(self.batch_size).enumerate() {
            let inserted = db
                .insert_transactions(batch, self.tenancy)
                .map_err(|source| StoreError::BatchFailed {
                    batch: idx + 1,
                    committed: stats.transactions_inserted,
                    source,
                })?;
            stats.transactions_inserted += inserted.len();
            stats.transactions_existing += batch.len() - inserted.len();
            debug!(
                "Transaction batch {}/{}: {} inserted",
                idx + 1,
                total,
                inserted.len()
            );
            fresh.extend(inserted);
        }

        let mut resolved = Vec::new();
        let mut unresolved = 0;
        for test in &activity.tests {
            let patient = patients.resolve(&test.patient_id);
            match (patient, fresh.get(&test.transaction_reference)) {
                (Some(patient), Some(transaction)) => resolved.push((patient, *transaction, test)),
                (Some(_), None) if known.contains(test.transaction_reference.as_str()) => {
                    stats.tests_existing += 1;
                }
                _ => unresolved += 1,
            }
        }
        if unresolved > 0 {
            warn!("Dropping {unresolved} test(s) whose patient or transaction is not in the store");
        }
        stats.dropped_unresolved += unresolved;

        for (idx, batch) in resolved.chunks(self.batch_size).enumerate() {
            let inserted =
                db.insert_tests(batch, self.tenancy)
                    .map_err(|source| StoreError::BatchFailed {
                        batch: idx + 1,
                        committed: stats.tests_inserted,
                        source,
                    })?;
            stats.tests_inserted += inserted;
            stats.tests_existing += batch.len() - inserted;
        }
        info!(
            "Loaded {} transaction(s) and {} test(s); {} already present, {} dropped",
            stats.transactions_inserted,
            stats.tests_inserted,
            stats.transactions_existing + stats.tests_existing,
            stats.dropped_unresolved
        );
        Ok(stats)
    }
}

impl Default for Loader {
    fn default() -> Self {
        Self::new(DEFAULT_BATCH_SIZE, Tenancy::default())
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    use super::*;
    use crate::activity::{PaymentMethod, ResultStatus};
    use crate::normalize::{DEFAULT_CREATED_AT, DEFAULT_DATE_OF_BIRTH, Gender, Pathway};
    use crate::store::Table;

    fn patient(id: &str, first: &str, last: &str) -> PatientRecord {
        PatientRecord {
            patient_id: id.to_string(),
            first_name: first.to_string(),
            last_name: last.to_string(),
            full_name: format!("{first} {last}").trim().to_string(),
            phone: "08000000000".to_string(),
            gender: Gender::Male,
            date_of_birth: DEFAULT_DATE_OF_BIRTH,
            address: "Benin City, Edo State".to_string(),
            pathway: Pathway::SelfReferred,
            created_at: DEFAULT_CREATED_AT,
            updated_at: DEFAULT_CREATED_AT,
        }
    }

    fn roster(count: usize) -> Vec<PatientRecord> {
        (1..=count)
            .map(|i| patient(&format!("OMC-REAL-{i:05}"), "OSAS", "IGBINOBA"))
            .collect()
    }

    fn visit(patient_id: &str, visit: u32) -> (TransactionRecord, TestRecord) {
        let date = NaiveDate::from_ymd_opt(2024, 2, 10).unwrap();
        let reference = crate::activity::transaction_reference(patient_id, visit);
        (
            TransactionRecord {
                reference: reference.clone(),
                patient_id: patient_id.to_string(),
                amount: Decimal::from(1500),
                payment_method: PaymentMethod::Cash,
                payment_status: "completed".to_string(),
                transaction_date: date,
            },
            TestRecord {
                transaction_reference: reference,
                patient_id: patient_id.to_string(),
                test_name: "MALARIA PARASITE".to_string(),
                test_price: Decimal::from(1500),
                test_date: date,
                result_status: ResultStatus::Pending,
            },
        )
    }

    #[test]
    fn batches_split_records_and_second_load_is_a_no_op() {
        let mut db = Database::open_in_memory().unwrap();
        let loader = Loader::new(4, Tenancy::default());
        let records = roster(10);

        let first = loader.load_patients(&mut db, &records).unwrap();
        assert_eq!(
            first,
            PatientLoadStats {
                inserted: 10,
                existing: 0,
                batches: 3
            }
        );

        let second = loader.load_patients(&mut db, &records).unwrap();
        assert_eq!(second.inserted, 0);
        assert_eq!(second.existing, 10);
        assert_eq!(db.count(Table::Patients).unwrap(), 10);
    }

    #[test]
    fn failing_batch_keeps_earlier_commits() {
        let mut db = Database::open_in_memory().unwrap();
        let loader = Loader::new(2, Tenancy::default());
        let mut records = roster(4);
        // Violates the store's name check.
        records[2] = patient("OMC-REAL-00003", "", "");

        let err = loader.load_patients(&mut db, &records).unwrap_err();
        match err {
            StoreError::BatchFailed {
                batch, committed, ..
            } => {
                assert_eq!(batch, 2);
                assert_eq!(committed, 2);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(db.count(Table::Patients).unwrap(), 2);
    }

    #[test]
    fn zero_batch_size_is_raised_to_one() {
        assert_eq!(Loader::new(0, Tenancy::default()).batch_size(), 1);
    }

    #[test]
    fn activity_resolves_keys_and_drops_unknown_patients() {
        let mut db = Database::open_in_memory().unwrap();
        let loader = Loader::default();
        loader.load_patients(&mut db, &roster(2)).unwrap();
        let ids = PatientIdMap::load(&db).unwrap();
        assert!(ids.resolve("OMC-REAL-00002").is_some());
        assert!(ids.resolve("OMC-REAL-99999").is_none());

        let (t1, s1) = visit("OMC-REAL-00001", 1);
        let (t2, s2) = visit("OMC-REAL-00002", 1);
        let (ghost, ghost_test) = visit("OMC-REAL-99999", 1);
        let activity = Activity {
            transactions: vec![t1, t2, ghost],
            tests: vec![s1, s2, ghost_test],
        };

        let stats = loader.load_activity(&mut db, &activity, &ids).unwrap();
        assert_eq!(stats.transactions_inserted, 2);
        assert_eq!(stats.tests_inserted, 2);
        assert_eq!(stats.dropped_unresolved, 2);
        assert_eq!(db.orphan_count().unwrap(), 0);

        let rerun = loader.load_activity(&mut db, &activity, &ids).unwrap();
        assert_eq!(rerun.transactions_inserted, 0);
        assert_eq!(rerun.transactions_existing, 2);
        assert_eq!(rerun.tests_existing, 2);
        assert_eq!(db.count(Table::Transactions).unwrap(), 2);
        assert_eq!(db.count(Table::PatientTests).unwrap(), 2);
    }

    #[test]
    fn tests_for_an_existing_transaction_are_not_added() {
        let mut db = Database::open_in_memory().unwrap();
        let loader = Loader::default();
        loader.load_patients(&mut db, &roster(1)).unwrap();
        let ids = PatientIdMap::load(&db).unwrap();

        let (txn, test) = visit("OMC-REAL-00001", 1);
        let first = Activity {
            transactions: vec![txn.clone()],
            tests: vec![test.clone()],
        };
        loader.load_activity(&mut db, &first, &ids).unwrap();

        let other = TestRecord {
            test_name: "WIDAL TEST".to_string(),
            ..test
        };
        let second = Activity {
            transactions: vec![txn],
            tests: vec![other],
        };
        let stats = loader.load_activity(&mut db, &second, &ids).unwrap();
        assert_eq!(stats.transactions_existing, 1);
        assert_eq!(stats.tests_inserted, 0);
        assert_eq!(stats.tests_existing, 1);
        assert_eq!(stats.dropped_unresolved, 0);
        assert_eq!(db.count(Table::PatientTests).unwrap(), 1);
    }
}
