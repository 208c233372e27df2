//! LiftLog CLI
//!
//! Command-line tools for a LiftLog store directory.
//!
//! # Commands
//!
//! - `inspect` - Show schema version, collection counts and indexes
//! - `export-csv` / `import-csv` - Move sessions and sets through CSV
//! - `undo-import` - Remove what the last CSV import created
//! - `backup export|validate|import` - Whole-store JSON backups
//! - `references` / `delete-exercise` - Check and remove exercises

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// LiftLog store tools.
#[derive(Parser)]
#[command(name = "liftlog")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the store directory
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show schema version and collection statistics
    Inspect {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Export sessions and sets as CSV
    ExportCsv {
        /// Output file (defaults to a timestamped name in the current directory)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Earliest session date (ISO 8601 or epoch ms)
        #[arg(long)]
        from: Option<String>,

        /// Latest session date (ISO 8601 or epoch ms)
        #[arg(long)]
        to: Option<String>,

        /// Leave the alternative exercise columns empty
        #[arg(long)]
        no_alternatives: bool,
    },

    /// Import a CSV export
    ImportCsv {
        /// CSV file to import
        file: PathBuf,

        /// What to do with sessions already in the store (skip, create-new)
        #[arg(short, long, default_value = "skip")]
        duplicates: String,

        /// Only report what would be imported
        #[arg(long)]
        dry_run: bool,
    },

    /// Undo the most recent CSV import
    UndoImport,

    /// Whole-store JSON backups
    Backup {
        #[command(subcommand)]
        action: BackupAction,
    },

    /// List plans and sessions that use an exercise
    References {
        /// Exercise id
        exercise_id: String,
    },

    /// Delete an exercise nothing references
    DeleteExercise {
        /// Exercise id
        exercise_id: String,
    },

    /// Show version information
    Version,
}

#[derive(Subcommand)]
enum BackupAction {
    /// Write a full backup
    Export {
        /// Output file (defaults to a timestamped name in the current directory)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Check a backup file without importing it
    Validate {
        /// Backup file
        file: PathBuf,
    },

    /// Restore a backup into the store
    Import {
        /// Backup file
        file: PathBuf,

        /// What to do with records already in the store (skip, create-new)
        #[arg(short, long, default_value = "skip")]
        duplicates: String,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let store_path = |command: &str| {
        cli.path
            .clone()
            .ok_or_else(|| format!("Store path required for {command}"))
    };

    match &cli.command {
        Commands::Inspect { format } => {
            commands::inspect::run(&store_path("inspect")?, format)?;
        }
        Commands::ExportCsv {
            output,
            from,
            to,
            no_alternatives,
        } => {
            commands::csv::export(
                &store_path("export-csv")?,
                output.as_deref(),
                from.as_deref(),
                to.as_deref(),
                !no_alternatives,
            )?;
        }
        Commands::ImportCsv {
            file,
            duplicates,
            dry_run,
        } => {
            commands::csv::import(&store_path("import-csv")?, file, duplicates.parse()?, *dry_run)?;
        }
        Commands::UndoImport => {
            commands::csv::undo(&store_path("undo-import")?)?;
        }
        Commands::Backup { action } => match action {
            BackupAction::Export { output } => {
                commands::backup::export(&store_path("backup export")?, output.as_deref())?;
            }
            BackupAction::Validate { file } => {
                commands::backup::validate(file)?;
            }
            BackupAction::Import { file, duplicates } => {
                commands::backup::import(&store_path("backup import")?, file, duplicates.parse()?)?;
            }
        },
        Commands::References { exercise_id } => {
            commands::exercise::references(&store_path("references")?, exercise_id)?;
        }
        Commands::DeleteExercise { exercise_id } => {
            commands::exercise::delete(&store_path("delete-exercise")?, exercise_id)?;
        }
        Commands::Version => {
            println!("LiftLog CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("LiftLog Core v{}", liftlog_core::VERSION);
            println!("Schema version {}", liftlog_core::CURRENT_SCHEMA_VERSION);
        }
    }

    Ok(())
}
