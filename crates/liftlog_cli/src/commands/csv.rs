//! CSV export, import and undo commands.

use super::open_store;
use liftlog_core::clock::parse_timestamp;
use liftlog_core::transfer::{
    export_csv, export_filename, prepare_import, undo_last_import, DuplicateStrategy, ExportOptions,
    ImportJob, ImportRequest,
};
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

fn date_arg(raw: Option<&str>, flag: &str) -> Result<Option<i64>, Box<dyn std::error::Error>> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    match parse_timestamp(raw) {
        Some(millis) => Ok(Some(millis)),
        None => Err(format!("--{flag} is not a date: {raw:?}").into()),
    }
}

/// Writes sessions and sets to a CSV file.
pub fn export(
    db_path: &Path,
    output: Option<&Path>,
    from: Option<&str>,
    to: Option<&str>,
    include_alternatives: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let options = ExportOptions::default()
        .date_range(date_arg(from, "from")?, date_arg(to, "to")?)
        .include_alternatives(include_alternatives);

    let store = open_store(db_path, false)?;
    let output: PathBuf = match output {
        Some(path) => path.to_path_buf(),
        None => PathBuf::from(export_filename(store.now())),
    };
    info!("Exporting {:?} to {:?}", db_path, output);

    let mut out = BufWriter::new(fs::File::create(&output)?);
    let report = export_csv(&store, &options, &mut out, |rows| {
        if rows % 500 == 0 {
            debug!(rows, "rows written");
        }
    })?;
    out.flush()?;
    store.close()?;

    println!("✓ Export written");
    println!("  Path: {:?}", output);
    println!("  Rows: {}", report.rows);
    Ok(())
}

/// Imports a CSV file, printing progress per chunk.
pub fn import(
    db_path: &Path,
    file: &Path,
    strategy: DuplicateStrategy,
    dry_run: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let text = fs::read_to_string(file)?;
    let mut request = ImportRequest::from_csv(&text)?.strategy(strategy);
    if let Some(name) = file.file_name() {
        request = request.filename(name.to_string_lossy());
    }

    let store = open_store(db_path, true)?;
    let preview = prepare_import(&store, &request)?;
    println!("Rows:       {} valid, {} invalid", preview.valid_rows, preview.invalid_rows.len());
    println!(
        "Duplicates: {} by id, {} by name and date",
        preview.duplicates.id_matches(),
        preview.duplicates.name_date_matches()
    );
    println!("To import:  {} sessions, {} sets", preview.sessions, preview.logged_sets);
    for issue in &preview.invalid_rows {
        println!("  row {}: {}", issue.line, issue.issues.join("; "));
    }
    if dry_run {
        store.close()?;
        return Ok(());
    }

    let mut job = ImportJob::start(&store, request)?;
    for step in job.by_ref() {
        let progress = step?;
        println!(
            "  chunk {}/{}: {}%",
            progress.chunk,
            progress.chunks,
            progress.percent()
        );
    }
    let summary = job.finish()?;
    store.close()?;

    println!("✓ Import finished");
    println!("  Import ID: {}", summary.import_id);
    println!("  Sessions:  {}", summary.session_ids.len());
    println!("  Sets:      {}", summary.row_count);
    Ok(())
}

/// Removes what the last CSV import created.
pub fn undo(db_path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_store(db_path, false)?;
    let report = undo_last_import(&store)?;
    store.close()?;

    println!("✓ Import undone");
    println!("  Sessions removed: {}", report.sessions);
    println!("  Sets removed:     {}", report.logged_sets);
    Ok(())
}
