//! Full-backup commands.

use super::open_store;
use liftlog_core::backup::{backup_filename, parse_backup, write_full_backup, BackupImportJob};
use liftlog_core::transfer::DuplicateStrategy;
use liftlog_core::Collection;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;

/// Writes a full backup of the store.
pub fn export(db_path: &Path, output: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_store(db_path, false)?;
    let output: PathBuf = match output {
        Some(path) => path.to_path_buf(),
        None => PathBuf::from(backup_filename(store.now())),
    };
    info!("Creating backup of {:?}", db_path);

    let mut out = BufWriter::new(fs::File::create(&output)?);
    write_full_backup(&store, &mut out)?;
    out.flush()?;
    store.close()?;

    println!("✓ Backup created successfully");
    println!("  Path: {:?}", output);
    println!("  Size: {} bytes", fs::metadata(&output)?.len());
    Ok(())
}

/// Checks a backup file.
pub fn validate(file: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let backup = parse_backup(&fs::read_to_string(file)?)?;

    println!("✓ Backup is valid");
    println!("  Version:    {}", backup.version);
    println!("  Exercises:  {}", backup.exercises.len());
    println!("  Plans:      {}", backup.plans.len());
    println!("  Sessions:   {}", backup.sessions.len());
    println!("  Sets:       {}", backup.logged_sets.len());
    println!("  Settings:   {}", backup.settings.len());
    Ok(())
}

/// Restores a backup into the store.
pub fn import(db_path: &Path, file: &Path, strategy: DuplicateStrategy) -> Result<(), Box<dyn std::error::Error>> {
    let backup = parse_backup(&fs::read_to_string(file)?)?;
    info!("Restoring {:?} from {:?}", db_path, file);

    let store = open_store(db_path, true)?;
    let mut job = BackupImportJob::start(&store, backup, strategy)?;
    for step in job.by_ref() {
        let progress = step?;
        println!("  {}: {}%", progress.collection, progress.percent());
    }
    let report = job.finish()?;
    store.close()?;

    println!("✓ Backup restored");
    for collection in Collection::ALL {
        println!(
            "  {:<12} {} written, {} skipped",
            collection.name(),
            report.written(collection),
            report.skipped(collection)
        );
    }
    if !report.session_remap.is_empty() {
        println!("  {} sessions imported under new ids", report.session_remap.len());
    }
    Ok(())
}
