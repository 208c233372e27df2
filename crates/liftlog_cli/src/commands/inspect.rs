//! Inspect command implementation.

use super::open_store;
use serde::Serialize;
use std::path::Path;

/// Store inspection result.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InspectResult {
    /// Store path.
    pub path: String,
    /// Schema version.
    pub version: u32,
    /// Commit log size in bytes.
    pub log_bytes: u64,
    /// Per-collection statistics.
    pub collections: Vec<CollectionSummary>,
}

/// Statistics for a single collection.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionSummary {
    /// Collection name.
    pub name: String,
    /// Number of records.
    pub records: usize,
    /// Index names.
    pub indexes: Vec<String>,
}

/// Runs the inspect command.
pub fn run(path: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_store(path, false)?;
    let stats = store.stats()?;
    store.close()?;

    let result = InspectResult {
        path: path.display().to_string(),
        version: stats.version,
        log_bytes: stats.log_bytes,
        collections: stats
            .collections
            .into_iter()
            .map(|c| CollectionSummary {
                name: c.name,
                records: c.records,
                indexes: c.indexes,
            })
            .collect(),
    };

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            print_text_output(&result);
        }
    }

    Ok(())
}

fn print_text_output(result: &InspectResult) {
    println!("LiftLog Store Inspection");
    println!("========================");
    println!();
    println!("Path:           {}", result.path);
    println!("Schema version: {}", result.version);
    println!("Commit log:     {}", format_size(result.log_bytes));
    println!();
    println!("Collections:");
    for col in &result.collections {
        println!("  {:<12} {:>8} records", col.name, col.records);
        if !col.indexes.is_empty() {
            println!("  {:<12} indexes: {}", "", col.indexes.join(", "));
        }
    }
}

fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} bytes", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
