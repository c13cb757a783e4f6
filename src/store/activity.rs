//! Transaction and test table operations.

use rusqlite::params;

use super::{Database, StoreResult, Tenancy};
use crate::activity::{TestRecord, TransactionRecord};

impl Database {
    /// Insert transactions already resolved to a store patient id. Rows whose
    /// `reference` exists are left untouched. Returns `(reference, store id)`
    /// for the rows this call inserted.
    pub fn insert_transactions(
        &mut self,
        batch: &[(i64, &TransactionRecord)],
        tenancy: Tenancy,
    ) -> rusqlite::Result<Vec<(String, i64)>> {
        let tx = self.conn.transaction()?;
        let mut inserted = Vec::new();
        {
            let mut stmt = tx.prepare_cached(
                r#"
                INSERT INTO transactions (
                    reference, patient_id, amount, payment_method, payment_status,
                    transaction_date, tenant_id, branch_id, created_at, updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?6, ?6)
                ON CONFLICT (reference) DO NOTHING
                "#,
            )?;
            for (patient_key, txn) in batch {
                let changed = stmt.execute(params![
                    txn.reference,
                    patient_key,
                    txn.amount.to_string(),
                    txn.payment_method.as_str(),
                    txn.payment_status,
                    txn.transaction_date,
                    tenancy.tenant_id,
                    tenancy.branch_id,
                ])?;
                if changed > 0 {
                    inserted.push((txn.reference.clone(), tx.last_insert_rowid()));
                }
            }
        }
        tx.commit()?;
        Ok(inserted)
    }

    /// Insert tests resolved to `(patient id, transaction id)`. A test name
    /// already recorded against the same transaction is skipped.
    pub fn insert_tests(
        &mut self,
        batch: &[(i64, i64, &TestRecord)],
        tenancy: Tenancy,
    ) -> rusqlite::Result<usize> {
        let tx = self.conn.transaction()?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare_cached(
                r#"
                INSERT INTO patient_tests (
                    patient_id, transaction_id, test_name, test_price, test_date,
                    result_status, tenant_id, branch_id, created_at, updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?5, ?5)
                ON CONFLICT (transaction_id, test_name) DO NOTHING
                "#,
            )?;
            for (patient_key, transaction_key, test) in batch {
                inserted += stmt.execute(params![
                    patient_key,
                    transaction_key,
                    test.test_name,
                    test.test_price.to_string(),
                    test.test_date,
                    test.result_status.as_str(),
                    tenancy.tenant_id,
                    tenancy.branch_id,
                ])?;
            }
        }
        tx.commit()?;
        Ok(inserted)
    }

    /// Transactions whose patient is missing, plus tests whose patient or
    /// transaction is missing. Zero on a consistent store.
    pub fn orphan_count(&self) -> StoreResult<u64> {
        let count: i64 = self.conn.query_row(
            r#"
            SELECT
                (SELECT COUNT(*) FROM transactions t
                 WHERE NOT EXISTS (SELECT 1 FROM patients p WHERE p.id = t.patient_id))
              + (SELECT COUNT(*) FROM patient_tests pt
                 WHERE NOT EXISTS (SELECT 1 FROM patients p WHERE p.id = pt.patient_id)
                    OR NOT EXISTS (SELECT 1 FROM transactions t WHERE t.id = pt.transaction_id))
            "#,
            [],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}
