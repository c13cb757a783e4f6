//! Patient table operations.

use rusqlite::{OptionalExtension, Row, params};

use super::{Database, StoreResult, Tenancy};
use crate::normalize::{Gender, Pathway, PatientRecord};

const PATIENT_COLUMNS: &str = "patient_id, first_name, last_name, full_name, phone, \
                               date_of_birth, gender, address, pathway, created_at, updated_at";

fn patient_from_row(row: &Row<'_>) -> rusqlite::Result<PatientRecord> {
    let gender: String = row.get(6)?;
    let pathway: String = row.get(8)?;
    Ok(PatientRecord {
        patient_id: row.get(0)?,
        first_name: row.get(1)?,
        last_name: row.get(2)?,
        full_name: row.get(3)?,
        phone: row.get(4)?,
        date_of_birth: row.get(5)?,
        gender: Gender::classify(Some(&gender)),
        address: row.get(7)?,
        pathway: Pathway::classify(Some(&pathway)),
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

impl Database {
    /// Insert one batch inside its own transaction, ignoring rows whose
    /// `patient_id` already exists. Returns the number of new rows.
    pub fn upsert_patients(
        &mut self,
        batch: &[PatientRecord],
        tenancy: Tenancy,
    ) -> rusqlite::Result<usize> {
        let tx = self.conn.transaction()?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare_cached(
                r#"
                INSERT INTO patients (
                    patient_id, first_name, last_name, full_name, phone, date_of_birth,
                    gender, address, pathway, referral_provider_id, tenant_id, branch_id,
                    created_at, updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, NULL, ?10, ?11, ?12, ?13)
                ON CONFLICT (patient_id) DO NOTHING
                "#,
            )?;
            for patient in batch {
                inserted += stmt.execute(params![
                    patient.patient_id,
                    patient.first_name,
                    patient.last_name,
                    patient.full_name,
                    patient.phone,
                    patient.date_of_birth,
                    patient.gender.as_str(),
                    patient.address,
                    patient.pathway.as_str(),
                    tenancy.tenant_id,
                    tenancy.branch_id,
                    patient.created_at,
                    patient.updated_at,
                ])?;
            }
        }
        tx.commit()?;
        Ok(inserted)
    }

    /// Every `(patient_id, store id)` pair.
    pub fn patient_keys(&self) -> StoreResult<Vec<(String, i64)>> {
        let mut stmt = self.conn.prepare("SELECT patient_id, id FROM patients")?;
        let keys = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(keys)
    }

    pub fn get_patient(&self, patient_id: &str) -> StoreResult<Option<PatientRecord>> {
        let sql = format!("SELECT {PATIENT_COLUMNS} FROM patients WHERE patient_id = ?1");
        self.conn
            .query_row(&sql, [patient_id], patient_from_row)
            .optional()
            .map_err(Into::into)
    }

    /// Most recently registered patients, newest first.
    pub fn recent_patients(&self, limit: usize) -> StoreResult<Vec<PatientRecord>> {
        let sql = format!(
            "SELECT {PATIENT_COLUMNS} FROM patients ORDER BY created_at DESC, id DESC LIMIT ?1"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let patients = stmt
            .query_map([limit as i64], patient_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(patients)
    }
}
