//! One migration run: source, mapping, normalization, load, verification.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Local};
use log::{info, warn};

use crate::{
    activity::generate_activity,
    cli::Cli,
    config::MigrationConfig,
    io_utils,
    loader::{Loader, PatientIdMap},
    mapping::{CanonicalField, FieldMapping},
    normalize::{Normalizer, PatientRecord},
    report::MigrationReport,
    source::{self, CsvSource},
    store::Database,
    table::TextTable,
    verify::verify,
};

pub fn execute(cli: &Cli) -> Result<()> {
    let mut report = MigrationReport::new(cli.source.display().to_string());
    let result = migrate(cli, &mut report);
    match &result {
        Ok(()) => report.succeed(cli.dry_run),
        Err(err) => report.fail(err),
    }
    if let Some(path) = &cli.report {
        match report.write(path) {
            Ok(()) => info!("Run report written to {path:?}"),
            Err(write_err) if result.is_ok() => return Err(write_err),
            Err(write_err) => warn!("Could not write run report: {write_err:#}"),
        }
    }
    result
}

fn resolve_config(cli: &Cli) -> Result<MigrationConfig> {
    let mut config = match &cli.config {
        Some(path) => MigrationConfig::load(path)?,
        None => MigrationConfig::default(),
    };
    if let Some(prefix) = &cli.id_prefix {
        config.id_prefix = prefix.clone();
    }
    if let Some(size) = cli.batch_size {
        config.batch_size = usize::try_from(size).context("Batch size is too large")?;
    }
    if let Some(table) = &cli.table {
        config.table = Some(table.clone());
    }
    if let Some(surname) = &cli.surname {
        config.surname = surname.clone();
    }
    if let Some(seed) = cli.seed {
        config.activity.seed = seed;
    }
    if cli.activity {
        config.activity.enabled = true;
    }
    for (field, column) in &cli.map {
        config.columns.insert(*field, column.clone());
    }
    config.validate()?;
    Ok(config)
}

fn destination(cli: &Cli) -> Result<Option<&PathBuf>> {
    match (&cli.database, cli.dry_run) {
        (_, true) => Ok(None),
        (Some(path), false) => Ok(Some(path)),
        (None, false) => Err(anyhow!(
            "No destination database; pass --database or set PATIENT_MIGRATE_DATABASE"
        )),
    }
}

fn migrate(cli: &Cli, report: &mut MigrationReport) -> Result<()> {
    let config = resolve_config(cli)?;
    let database = destination(cli)?;
    let encoding = io_utils::resolve_encoding(cli.input_encoding.as_deref())?;

    let adapter = CsvSource::new(&cli.source, cli.delimiter, encoding);
    let table = source::read_patient_table(&adapter, config.table.as_deref())
        .with_context(|| format!("Reading source {:?}", cli.source))?;
    info!(
        "Using table '{}' ({} row(s), {} column(s))",
        table.name,
        table.row_count(),
        table.headers.len()
    );
    report.source_table = Some(table.name.clone());

    let mapping = FieldMapping::with_overrides(&table.headers, &config.columns)
        .with_context(|| format!("Mapping columns of table '{}'", table.name))?;
    info!("Column mapping: {mapping}");
    if !mapping.contains(CanonicalField::FirstName) && !mapping.contains(CanonicalField::LastName)
    {
        warn!("No name column was recognized; every row will be skipped");
    }
    report.mapping = Some(mapping.clone());

    let options = config.normalize_options();
    let normalized = Normalizer::new(&mapping, &options).normalize_table(&table);
    let stats = &mut report.statistics;
    stats.rows_read = normalized.rows_read;
    stats.rows_skipped = normalized.skipped;
    stats.records_normalized = normalized.records.len();
    stats.field_fallbacks = normalized.fallbacks.len();
    for fallback in &normalized.fallbacks {
        report.warn(fallback.to_string());
    }

    let Some(database) = database else {
        print_preview(&normalized.records, cli.preview_rows);
        return Ok(());
    };
    report.database = Some(database.display().to_string());
    load(&config, cli, database, &normalized.records, report)
}

/// `erp.sqlite` becomes `erp.sqlite.20240501_093000.bak` next to it.
fn backup_path(database: &Path, now: DateTime<Local>) -> PathBuf {
    let mut name = database.as_os_str().to_os_string();
    name.push(format!(".{}.bak", now.format("%Y%m%d_%H%M%S")));
    PathBuf::from(name)
}

fn load(
    config: &MigrationConfig,
    cli: &Cli,
    database: &Path,
    records: &[PatientRecord],
    report: &mut MigrationReport,
) -> Result<()> {
    let mut db = Database::open(database)
        .with_context(|| format!("Opening destination database {database:?}"))?;

    if cli.replace {
        let backup = backup_path(database, Local::now());
        db.snapshot_to(&backup)
            .with_context(|| format!("Backing up {database:?} before replacing rows"))?;
        info!("Store snapshot written to {backup:?}");
        report.backup = Some(backup.display().to_string());

        let purged = db
            .purge(cli.keep_prefix.as_deref())
            .context("Purging previously migrated rows")?;
        info!(
            "Purged {} patient(s), {} transaction(s), {} test(s)",
            purged.patients, purged.transactions, purged.tests
        );
        report.statistics.record_purge(purged);
    }

    let loader = Loader::new(config.batch_size, config.tenancy());
    let loaded = loader
        .load_patients(&mut db, records)
        .context("Loading patients")?;
    report.statistics.record_patients(loaded);

    if config.activity.enabled {
        let ids = PatientIdMap::load(&db).context("Resolving patient ids")?;
        let activity = generate_activity(records, &config.activity_options())?;
        report.statistics.transactions_generated = activity.transactions.len();
        report.statistics.tests_generated = activity.tests.len();
        let loaded = loader
            .load_activity(&mut db, &activity, &ids)
            .context("Loading activity")?;
        report.statistics.record_activity(loaded);
    }

    let verification = verify(&db, &config.surname, Local::now().date_naive())
        .context("Verifying destination counts")?;
    if verification.orphaned_rows > 0 {
        warn!(
            "{} transaction/test row(s) reference missing parents",
            verification.orphaned_rows
        );
    }
    print!("{}", verification.render());
    report.verification = Some(verification);
    Ok(())
}

fn print_preview(records: &[PatientRecord], limit: usize) {
    let mut preview = TextTable::new([
        "patient_id",
        "full_name",
        "gender",
        "date_of_birth",
        "phone",
        "address",
        "pathway",
        "created_at",
    ]);
    for r in records.iter().take(limit) {
        preview.push_row([
            r.patient_id.clone(),
            r.full_name.clone(),
            r.gender.to_string(),
            r.date_of_birth.to_string(),
            r.phone.clone(),
            r.address.clone(),
            r.pathway.to_string(),
            r.created_at.to_string(),
        ]);
    }
    print!("{preview}");
    println!(
        "Dry run: {} record(s) ready, {} shown; nothing written",
        records.len(),
        preview.row_count()
    );
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn backup_sits_next_to_the_database() {
        let now = Local.with_ymd_and_hms(2024, 5, 1, 9, 30, 0).unwrap();
        assert_eq!(
            backup_path(Path::new("data/erp.sqlite"), now),
            PathBuf::from("data/erp.sqlite.20240501_093000.bak")
        );
    }
}
