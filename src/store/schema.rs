//! SQLite schema for the destination store.
//!
//! Money columns hold the decimal string form so amounts round-trip exactly.

/// Tables are created if missing; an existing store is reused as-is.
pub const SCHEMA: &str = r#"
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS patients (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    patient_id TEXT NOT NULL UNIQUE,
    first_name TEXT NOT NULL DEFAULT '',
    last_name TEXT NOT NULL DEFAULT '',
    full_name TEXT NOT NULL,
    phone TEXT NOT NULL,
    date_of_birth TEXT NOT NULL,
    gender TEXT NOT NULL CHECK (gender IN ('male', 'female')),
    address TEXT NOT NULL,
    pathway TEXT NOT NULL CHECK (pathway IN ('self', 'referral')),
    referral_provider_id INTEGER,
    tenant_id INTEGER NOT NULL DEFAULT 1,
    branch_id INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    CHECK (first_name <> '' OR last_name <> '')
);

CREATE INDEX IF NOT EXISTS idx_patients_last_name ON patients(last_name);

CREATE TABLE IF NOT EXISTS transactions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    reference TEXT NOT NULL UNIQUE,
    patient_id INTEGER NOT NULL REFERENCES patients(id),
    amount TEXT NOT NULL CHECK (CAST(amount AS REAL) > 0),
    payment_method TEXT NOT NULL CHECK (payment_method IN ('cash', 'card', 'transfer', 'insurance')),
    payment_status TEXT NOT NULL DEFAULT 'completed',
    transaction_date TEXT NOT NULL,
    tenant_id INTEGER NOT NULL DEFAULT 1,
    branch_id INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_transactions_patient ON transactions(patient_id);
CREATE INDEX IF NOT EXISTS idx_transactions_date ON transactions(transaction_date);

CREATE TABLE IF NOT EXISTS patient_tests (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    patient_id INTEGER NOT NULL REFERENCES patients(id),
    transaction_id INTEGER NOT NULL REFERENCES transactions(id),
    test_name TEXT NOT NULL,
    test_price TEXT NOT NULL,
    test_date TEXT NOT NULL,
    result_status TEXT NOT NULL CHECK (result_status IN ('pending', 'completed', 'reported')),
    tenant_id INTEGER NOT NULL DEFAULT 1,
    branch_id INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE (transaction_id, test_name)
);

CREATE INDEX IF NOT EXISTS idx_patient_tests_patient ON patient_tests(patient_id);
"#;
