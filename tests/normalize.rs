mod common;

use chrono::NaiveDate;
use common::{REGISTER_CSV, TestWorkspace};
use encoding_rs::UTF_8;
use patient_migrate::{
    data::RawValue,
    mapping::{CanonicalField, infer_mapping},
    normalize::{
        DEFAULT_ADDRESS, DEFAULT_CREATED_AT, DEFAULT_DATE_OF_BIRTH, DEFAULT_PHONE, Gender,
        NormalizeOptions, Normalized, Normalizer, Pathway,
    },
    source::{CsvSource, MemorySource, RawRecord, SourceTable, read_patient_table},
};

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

#[test]
fn felix_omokaro_row_normalizes_end_to_end() {
    let columns = ["Fname", "Lname", "Mobile", "Gender", "DOB"];
    let mapping = infer_mapping(&columns);
    assert_eq!(mapping.get(CanonicalField::FirstName), Some("Fname"));
    assert_eq!(mapping.get(CanonicalField::LastName), Some("Lname"));
    assert_eq!(mapping.get(CanonicalField::Phone), Some("Mobile"));
    let options = NormalizeOptions::default();
    let record = RawRecord::new(
        1,
        vec![
            ("Fname".into(), RawValue::Text("Felix".into())),
            ("Lname".into(), RawValue::Text("Omokaro".into())),
            ("Mobile".into(), RawValue::Text("08012345678".into())),
            ("Gender".into(), RawValue::Text("M".into())),
            ("DOB".into(), RawValue::Text("1985-06-15".into())),
        ],
    );
    let Normalized::Patient { record, fallbacks } =
        Normalizer::new(&mapping, &options).normalize(&record)
    else {
        panic!("expected a patient record");
    };
    assert_eq!(record.patient_id, "OMC-REAL-00001");
    assert_eq!(record.full_name, "FELIX OMOKARO");
    assert_eq!(record.phone, "08012345678");
    assert_eq!(record.gender, Gender::Male);
    assert_eq!(record.date_of_birth, date(1985, 6, 15));
    assert_eq!(record.address, DEFAULT_ADDRESS);
    assert_eq!(record.pathway, Pathway::SelfReferred);
    assert_eq!(record.created_at, DEFAULT_CREATED_AT);
    assert!(fallbacks.is_empty());
}

#[test]
fn sentinel_first_name_without_last_name_column_is_skipped() {
    let mapping = infer_mapping(&["First Name"]);
    let options = NormalizeOptions::default();
    let record = RawRecord::new(
        4,
        vec![("First Name".into(), RawValue::Text("nan".into()))],
    );
    assert_eq!(
        Normalizer::new(&mapping, &options).normalize(&record),
        Normalized::Skip
    );
}

#[test]
fn numeric_and_garbage_birth_dates_fall_back() {
    let mapping = infer_mapping(&["Surname", "Age"]);
    let options = NormalizeOptions::default();
    let normalizer = Normalizer::new(&mapping, &options);
    for value in [RawValue::Number(42.0), RawValue::Text("31/31/2020".into())] {
        let record = RawRecord::new(
            2,
            vec![
                ("Surname".into(), RawValue::Text("Idahosa".into())),
                ("Age".into(), value),
            ],
        );
        let Normalized::Patient { record, fallbacks } = normalizer.normalize(&record) else {
            panic!("expected a patient record");
        };
        assert_eq!(record.date_of_birth, DEFAULT_DATE_OF_BIRTH);
        assert_eq!(fallbacks.len(), 1);
        assert_eq!(fallbacks[0].field, CanonicalField::DateOfBirth);
    }
}

#[test]
fn register_export_normalizes_with_defaults_and_skips() {
    let ws = TestWorkspace::new();
    let path = ws.write("register.csv", REGISTER_CSV);
    let source = CsvSource::new(&path, None, UTF_8);
    let table = read_patient_table(&source, None).unwrap();
    assert_eq!(table.name, "register");

    let mapping = infer_mapping(&table.headers);
    assert_eq!(mapping.len(), 9);
    let options = NormalizeOptions::default();
    let out = Normalizer::new(&mapping, &options).normalize_table(&table);
    assert_eq!(out.rows_read, 4);
    assert_eq!(out.skipped, 1);
    assert_eq!(out.records.len(), 3);
    assert_eq!(out.fallbacks.len(), 1);

    let felix = &out.records[0];
    assert_eq!(felix.patient_id, "OMC-2024-0001");
    assert_eq!(felix.date_of_birth, date(1984, 5, 12));
    assert_eq!(felix.pathway, Pathway::Referral);
    assert_eq!(felix.created_at, date(2024, 3, 1));

    let joy = &out.records[1];
    assert_eq!(joy.patient_id, "OMC-REAL-00002");
    assert_eq!(joy.gender, Gender::Female);
    assert_eq!(joy.phone, DEFAULT_PHONE);
    assert_eq!(joy.date_of_birth, DEFAULT_DATE_OF_BIRTH);

    let osas = &out.records[2];
    assert_eq!(osas.created_at, date(2023, 2, 1));
    assert_eq!(osas.pathway, Pathway::SelfReferred);
}

#[test]
fn memory_source_feeds_the_same_selection() {
    let tables = vec![
        SourceTable::new("Lab", vec!["Code".into(), "Price".into()]),
        SourceTable::new(
            "Clients",
            vec!["Client".into(), "Contact".into(), "Last Visit".into()],
        )
        .with_rows(vec![vec![
            RawValue::Text("Ada".into()),
            RawValue::Text("0803".into()),
            RawValue::Null,
        ]]),
    ];
    let source = MemorySource::new(tables);
    let table = read_patient_table(&source, None).unwrap();
    assert_eq!(table.name, "Clients");
}
