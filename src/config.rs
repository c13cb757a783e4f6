//! Run configuration.
//!
//! A YAML file supplies defaults for a site's exports; CLI flags override
//! individual values. Every key is optional.
//!
//! ```yaml
//! id_prefix: OMC-REAL
//! batch_size: 500
//! table: Patients
//! columns:
//!   last_name: Client
//! activity:
//!   enabled: true
//!   seed: 7
//! ```

use std::{collections::BTreeMap, fs, path::Path};

use anyhow::{Context, Result, bail};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{
    activity::{ActivityOptions, CatalogEntry},
    loader::DEFAULT_BATCH_SIZE,
    mapping::CanonicalField,
    normalize::{
        DEFAULT_ADDRESS, DEFAULT_CREATED_AT, DEFAULT_DATE_OF_BIRTH, DEFAULT_ID_PREFIX,
        DEFAULT_PHONE, NormalizeOptions,
    },
    store::Tenancy,
    verify::DEFAULT_SURNAME,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MigrationConfig {
    pub id_prefix: String,
    pub batch_size: usize,
    pub tenant_id: i64,
    pub branch_id: i64,
    pub table: Option<String>,
    pub surname: String,
    pub columns: BTreeMap<CanonicalField, String>,
    pub defaults: DefaultsConfig,
    pub activity: ActivityConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DefaultsConfig {
    pub phone: String,
    pub address: String,
    pub date_of_birth: NaiveDate,
    pub created_at: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ActivityConfig {
    pub enabled: bool,
    pub seed: u64,
    pub active_ratio: f64,
    pub max_visits: u32,
    pub max_tests_per_visit: usize,
    pub max_days_after_registration: u64,
    pub max_transactions: usize,
    pub catalog: Option<Vec<CatalogEntry>>,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            id_prefix: DEFAULT_ID_PREFIX.to_string(),
            batch_size: DEFAULT_BATCH_SIZE,
            tenant_id: 1,
            branch_id: 1,
            table: None,
            surname: DEFAULT_SURNAME.to_string(),
            columns: BTreeMap::new(),
            defaults: DefaultsConfig::default(),
            activity: ActivityConfig::default(),
        }
    }
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            phone: DEFAULT_PHONE.to_string(),
            address: DEFAULT_ADDRESS.to_string(),
            date_of_birth: DEFAULT_DATE_OF_BIRTH,
            created_at: DEFAULT_CREATED_AT,
        }
    }
}

impl Default for ActivityConfig {
    fn default() -> Self {
        let options = ActivityOptions::default();
        Self {
            enabled: false,
            seed: options.seed,
            active_ratio: options.active_ratio,
            max_visits: options.max_visits,
            max_tests_per_visit: options.max_tests_per_visit,
            max_days_after_registration: options.max_days_after_registration,
            max_transactions: options.max_transactions,
            catalog: None,
        }
    }
}

impl MigrationConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Opening config file {path:?}"))?;
        let config: MigrationConfig = serde_yaml::from_str(&raw)
            .with_context(|| format!("Parsing config file {path:?}"))?;
        config
            .validate()
            .with_context(|| format!("Validating config file {path:?}"))?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            bail!("batch_size must be at least 1");
        }
        if self.id_prefix.trim().is_empty() {
            bail!("id_prefix cannot be empty");
        }
        if self.surname.trim().is_empty() {
            bail!("surname cannot be empty");
        }
        let activity = &self.activity;
        if !(0.0..=1.0).contains(&activity.active_ratio) {
            bail!(
                "activity.active_ratio must be between 0 and 1 (got {})",
                activity.active_ratio
            );
        }
        if activity.max_visits == 0 || activity.max_tests_per_visit == 0 {
            bail!("activity.max_visits and activity.max_tests_per_visit must be at least 1");
        }
        if let Some(catalog) = &activity.catalog {
            if catalog.is_empty() {
                bail!("activity.catalog cannot be empty");
            }
            if let Some(entry) = catalog.iter().find(|e| e.price <= Decimal::ZERO) {
                bail!("Catalog entry '{}' must have a positive price", entry.name);
            }
        }
        Ok(())
    }

    pub fn tenancy(&self) -> Tenancy {
        Tenancy {
            tenant_id: self.tenant_id,
            branch_id: self.branch_id,
        }
    }

    pub fn normalize_options(&self) -> NormalizeOptions {
        NormalizeOptions {
            id_prefix: self.id_prefix.trim().to_string(),
            default_phone: self.defaults.phone.clone(),
            default_address: self.defaults.address.clone(),
            default_date_of_birth: self.defaults.date_of_birth,
            default_created_at: self.defaults.created_at,
        }
    }

    pub fn activity_options(&self) -> ActivityOptions {
        let activity = &self.activity;
        ActivityOptions {
            seed: activity.seed,
            active_ratio: activity.active_ratio,
            max_visits: activity.max_visits,
            max_tests_per_visit: activity.max_tests_per_visit,
            max_days_after_registration: activity.max_days_after_registration,
            max_transactions: activity.max_transactions,
            catalog: activity
                .catalog
                .clone()
                .unwrap_or_else(crate::activity::default_catalog),
        }
    }
}
