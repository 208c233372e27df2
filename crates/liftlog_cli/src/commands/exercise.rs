//! Exercise reference check and delete.

use super::open_store;
use liftlog_core::access::Repository;
use liftlog_core::model::Exercise;
use liftlog_core::reference::ReferenceReport;
use liftlog_core::CoreError;
use std::path::Path;

fn print_report(report: &ReferenceReport) {
    println!("Exercise {}", report.exercise_id);
    println!("  Plans:       {}", report.plan_count);
    for plan in &report.plans {
        println!("    {} ({})", plan.name, plan.id);
    }
    println!("  Logged sets: {} in {} sessions", report.logged_set_count, report.session_count);
    for session in &report.sessions {
        println!(
            "    {} {}",
            liftlog_core::clock::format_iso(session.date),
            session.name.as_deref().unwrap_or(&session.id)
        );
    }
}

/// Prints where an exercise is used.
pub fn references(db_path: &Path, exercise_id: &str) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_store(db_path, false)?;
    let report = Repository::<Exercise>::new(&store).references(exercise_id)?;
    store.close()?;
    print_report(&report);
    Ok(())
}

/// Deletes an exercise, refusing while anything references it.
pub fn delete(db_path: &Path, exercise_id: &str) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_store(db_path, false)?;
    let result = Repository::<Exercise>::new(&store).delete(exercise_id);
    store.close()?;
    match result {
        Ok(_) => {
            println!("✓ Exercise {exercise_id} deleted");
            Ok(())
        }
        Err(CoreError::ReferenceConflict(report)) => {
            print_report(&report);
            Err(format!("Exercise {exercise_id} is still in use").into())
        }
        Err(e) => Err(e.into()),
    }
}
