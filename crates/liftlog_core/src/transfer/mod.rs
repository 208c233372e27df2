//! CSV export, row import with duplicate reconciliation, and undo.
//!
//! The export writes one row per logged set joined with its session, in the
//! column order of [`HEADERS`]. Import reads the same format back (or the
//! equivalent JSON rows), validates each row on its own, groups rows into
//! sessions and matches them against the store by id and by name + date.

mod columns;
mod export;
mod history;
mod import;
mod reconcile;
mod row;

pub use columns::{export_columns, required_headers, ExportRow, HEADERS};
pub use export::{export_csv, export_filename, ExportOptions, ExportReport, ExportRows};
pub use history::{
    import_history, last_export_at, last_import, undo_import, undo_last_import, LastImport, UndoReport,
    IMPORT_HISTORY_LIMIT,
};
pub use import::{
    import_payloads, prepare_import, ImportJob, ImportPreview, ImportProgress, ImportRequest, ImportSummary,
};
pub use reconcile::{
    build_session_groups, detect_duplicates, fresh_id, group_rows, normalize_name, DuplicateLookup,
    DuplicateReport, DuplicateStrategy, GroupKey, RowGroup, SessionPlan,
};
pub use row::{parse_row, parse_rows, rows_from_csv, rows_from_json, ImportRow, ParsedRows, RawRow, RowIssue};

pub(crate) use history::{mark_exported, set_last_import};
