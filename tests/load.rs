mod common;

use std::collections::{HashMap, HashSet};
use std::str::FromStr;

use chrono::NaiveDate;
use common::TestWorkspace;
use patient_migrate::{
    activity::{ActivityOptions, generate_activity},
    loader::{Loader, PatientIdMap},
    normalize::{Gender, Pathway, PatientRecord},
    store::{Database, Table, Tenancy},
    verify::verify,
};
use rust_decimal::Decimal;

fn patient(id: &str, first: &str, last: &str) -> PatientRecord {
    let registered = NaiveDate::from_ymd_opt(2023, 6, 1).unwrap();
    PatientRecord {
        patient_id: id.to_string(),
        first_name: first.to_string(),
        last_name: last.to_string(),
        full_name: format!("{first} {last}"),
        phone: "08030000000".to_string(),
        gender: Gender::Female,
        date_of_birth: NaiveDate::from_ymd_opt(1979, 9, 9).unwrap(),
        address: "Uselu, Benin City".to_string(),
        pathway: Pathway::SelfReferred,
        created_at: registered,
        updated_at: registered,
    }
}

fn roster(prefix: &str, count: usize) -> Vec<PatientRecord> {
    (1..=count)
        .map(|i| {
            let last = if i % 5 == 0 { "OMOKARO" } else { "EGHAREVBA" };
            patient(&format!("{prefix}-{i:05}"), "EFOSA", last)
        })
        .collect()
}

#[test]
fn loading_the_same_records_twice_inserts_nothing_new() {
    let ws = TestWorkspace::new();
    let mut db = Database::open(ws.database()).unwrap();
    let loader = Loader::new(7, Tenancy::default());
    let records = roster("OMC-REAL", 20);

    let first = loader.load_patients(&mut db, &records).unwrap();
    assert_eq!(first.inserted, 20);
    assert_eq!(first.batches, 3);

    let second = loader.load_patients(&mut db, &records).unwrap();
    assert_eq!(second.inserted, 0);
    assert_eq!(second.existing, 20);
    assert_eq!(db.count(Table::Patients).unwrap(), 20);
}

#[test]
fn activity_references_only_existing_patients() {
    let mut db = Database::open_in_memory().unwrap();
    let loader = Loader::default();
    let records = roster("OMC-REAL", 30);
    loader.load_patients(&mut db, &records).unwrap();

    let ids = PatientIdMap::load(&db).unwrap();
    let activity = generate_activity(&records, &ActivityOptions::default()).unwrap();
    let stats = loader.load_activity(&mut db, &activity, &ids).unwrap();

    assert_eq!(stats.dropped_unresolved, 0);
    assert_eq!(stats.transactions_inserted, activity.transactions.len());
    assert_eq!(stats.tests_inserted, activity.tests.len());
    assert_eq!(db.orphan_count().unwrap(), 0);

    let today = NaiveDate::from_ymd_opt(2030, 1, 1).unwrap();
    let v = verify(&db, "omokaro", today).unwrap();
    assert_eq!(v.patients, 30);
    assert_eq!(v.surname_count, 6);
    assert_eq!(v.transactions as usize, activity.transactions.len());
    assert_eq!(v.total_revenue, activity.revenue());
}

#[test]
fn rerunning_activity_with_the_same_seed_adds_no_rows() {
    let mut db = Database::open_in_memory().unwrap();
    let loader = Loader::new(50, Tenancy::default());
    let records = roster("OMC-REAL", 12);
    loader.load_patients(&mut db, &records).unwrap();
    let ids = PatientIdMap::load(&db).unwrap();
    let options = ActivityOptions {
        seed: 99,
        ..ActivityOptions::default()
    };

    let activity = generate_activity(&records, &options).unwrap();
    loader.load_activity(&mut db, &activity, &ids).unwrap();
    let transactions = db.count(Table::Transactions).unwrap();
    let tests = db.count(Table::PatientTests).unwrap();

    let again = generate_activity(&records, &options).unwrap();
    let stats = loader.load_activity(&mut db, &again, &ids).unwrap();
    assert_eq!(stats.transactions_inserted, 0);
    assert_eq!(stats.tests_inserted, 0);
    assert_eq!(db.count(Table::Transactions).unwrap(), transactions);
    assert_eq!(db.count(Table::PatientTests).unwrap(), tests);
}

fn stored_amounts(db: &Database, sql: &str) -> Vec<(i64, Decimal)> {
    let mut stmt = db.conn().prepare(sql).unwrap();
    stmt.query_map([], |row| Ok((row.get(0)?, row.get::<_, String>(1)?)))
        .unwrap()
        .map(|row| {
            let (id, amount) = row.unwrap();
            (id, Decimal::from_str(&amount).unwrap())
        })
        .collect()
}

#[test]
fn reseeded_rerun_keeps_amounts_equal_to_test_totals() {
    let mut db = Database::open_in_memory().unwrap();
    let loader = Loader::default();
    let records = roster("OMC-REAL", 20);
    loader.load_patients(&mut db, &records).unwrap();
    let ids = PatientIdMap::load(&db).unwrap();
    let options = |seed| ActivityOptions {
        seed,
        active_ratio: 1.0,
        ..ActivityOptions::default()
    };

    let first = generate_activity(&records, &options(1)).unwrap();
    loader.load_activity(&mut db, &first, &ids).unwrap();

    let second = generate_activity(&records, &options(2)).unwrap();
    let stats = loader.load_activity(&mut db, &second, &ids).unwrap();
    let loaded = first
        .transactions
        .iter()
        .map(|t| t.reference.as_str())
        .collect::<HashSet<_>>();
    let new_tests = second
        .tests
        .iter()
        .filter(|t| !loaded.contains(t.transaction_reference.as_str()))
        .count();
    assert_eq!(stats.tests_inserted, new_tests);
    assert_eq!(stats.tests_existing, second.tests.len() - new_tests);

    let mut totals: HashMap<i64, Decimal> = HashMap::new();
    let prices = stored_amounts(&db, "SELECT transaction_id, test_price FROM patient_tests");
    for (transaction, price) in prices {
        *totals.entry(transaction).or_default() += price;
    }
    let transactions = stored_amounts(&db, "SELECT id, amount FROM transactions");
    assert!(!transactions.is_empty());
    for (id, amount) in transactions {
        assert_eq!(totals.get(&id), Some(&amount), "transaction {id}");
    }
    assert_eq!(db.orphan_count().unwrap(), 0);
}

#[test]
fn purge_keeps_patients_with_the_protected_prefix() {
    let mut db = Database::open_in_memory().unwrap();
    let loader = Loader::default();
    let protected = roster("OMC-2025", 3);
    let migrated = roster("OMC-REAL", 8);
    loader.load_patients(&mut db, &protected).unwrap();
    loader.load_patients(&mut db, &migrated).unwrap();

    let all = protected.iter().chain(&migrated).cloned().collect::<Vec<_>>();
    let ids = PatientIdMap::load(&db).unwrap();
    let options = ActivityOptions {
        active_ratio: 1.0,
        ..ActivityOptions::default()
    };
    let activity = generate_activity(&all, &options).unwrap();
    loader.load_activity(&mut db, &activity, &ids).unwrap();

    let counts = db.purge(Some("OMC-2025-")).unwrap();
    assert_eq!(counts.patients, 8);
    assert_eq!(db.count(Table::Patients).unwrap(), 3);
    assert!(db.get_patient("OMC-2025-00001").unwrap().is_some());
    assert!(db.get_patient("OMC-REAL-00001").unwrap().is_none());
    assert_eq!(db.orphan_count().unwrap(), 0);

    let protected_txns = activity
        .transactions
        .iter()
        .filter(|t| t.patient_id.starts_with("OMC-2025-"))
        .count();
    assert_eq!(
        db.count(Table::Transactions).unwrap() as usize,
        protected_txns
    );

    let counts = db.purge(None).unwrap();
    assert_eq!(counts.patients, 3);
    assert_eq!(db.count(Table::PatientTests).unwrap(), 0);
}

#[test]
fn tenancy_is_stamped_on_inserted_rows() {
    let mut db = Database::open_in_memory().unwrap();
    let tenancy = Tenancy {
        tenant_id: 4,
        branch_id: 2,
    };
    Loader::new(10, tenancy)
        .load_patients(&mut db, &roster("OMC-REAL", 2))
        .unwrap();
    let (tenant, branch): (i64, i64) = db
        .conn()
        .query_row(
            "SELECT MIN(tenant_id), MAX(branch_id) FROM patients",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .unwrap();
    assert_eq!((tenant, branch), (4, 2));
}
