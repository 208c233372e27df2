//! CSV export of sessions and their sets.

use super::columns::{export_columns, ExportRow};
use super::history::mark_exported;
use crate::access::Repository;
use crate::clock::format_file_stamp;
use crate::csv::CsvLines;
use crate::error::{CoreError, CoreResult};
use crate::index::IndexValue;
use crate::model::{LoggedSet, Record, Session};
use crate::store::{Store, Transaction};
use std::io::Write;
use std::ops::Bound;
use std::vec;
use tracing::info;

/// What to export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportOptions {
    /// Earliest session date, inclusive.
    pub from: Option<i64>,
    /// Latest session date, inclusive.
    pub to: Option<i64>,
    /// Whether to fill the alternative exercise columns.
    pub include_alternatives: bool,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            from: None,
            to: None,
            include_alternatives: true,
        }
    }
}

impl ExportOptions {
    /// Only sessions dated within the inclusive bounds.
    #[must_use]
    pub fn date_range(mut self, from: Option<i64>, to: Option<i64>) -> Self {
        self.from = from;
        self.to = to;
        self
    }

    /// Whether to fill the alternative exercise columns.
    #[must_use]
    pub fn include_alternatives(mut self, include: bool) -> Self {
        self.include_alternatives = include;
        self
    }
}

/// Result of a finished export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportReport {
    /// Data rows written.
    pub rows: usize,
    /// Suggested file name.
    pub filename: String,
}

/// Export rows in session-date order, one session's sets at a time.
///
/// Sets are only read when their session is reached. A read error ends
/// the iteration early; check [`take_error`](Self::take_error) afterwards.
pub struct ExportRows<'t, 's> {
    txn: &'t Transaction<'s>,
    sessions: vec::IntoIter<Session>,
    current: Option<(Session, vec::IntoIter<LoggedSet>)>,
    include_alternatives: bool,
    error: Option<CoreError>,
}

impl<'t, 's> ExportRows<'t, 's> {
    /// Rows of the sessions selected by `options`.
    pub fn new(txn: &'t Transaction<'s>, options: &ExportOptions) -> CoreResult<Self> {
        let lower = options.from.map(IndexValue::from);
        let upper = options.to.map(IndexValue::from);
        let sessions = txn
            .index_range(
                Session::COLLECTION,
                "date",
                lower.as_ref().map_or(Bound::Unbounded, Bound::Included),
                upper.as_ref().map_or(Bound::Unbounded, Bound::Included),
            )?
            .into_iter()
            .map(Session::from_value)
            .collect::<CoreResult<Vec<_>>>()?;
        Ok(Self {
            txn,
            sessions: sessions.into_iter(),
            current: None,
            include_alternatives: options.include_alternatives,
            error: None,
        })
    }

    /// The error that ended the iteration, if any.
    pub fn take_error(&mut self) -> Option<CoreError> {
        self.error.take()
    }

    fn sets_of(&self, session_id: &str) -> CoreResult<Vec<LoggedSet>> {
        let mut sets = self
            .txn
            .index_lookup(LoggedSet::COLLECTION, "sessionId", &IndexValue::from(session_id))?
            .into_iter()
            .map(LoggedSet::from_value)
            .collect::<CoreResult<Vec<_>>>()?;
        sets.sort_by_key(|s| (s.order_index.unwrap_or(i64::MAX), s.timestamp));
        Ok(sets)
    }
}

impl Iterator for ExportRows<'_, '_> {
    type Item = ExportRow;

    fn next(&mut self) -> Option<ExportRow> {
        loop {
            if let Some((session, sets)) = &mut self.current {
                if let Some(mut set) = sets.next() {
                    if !self.include_alternatives {
                        set.alternative = None;
                    }
                    return Some(ExportRow {
                        session: session.clone(),
                        set,
                    });
                }
            }
            if self.error.is_some() {
                return None;
            }
            let session = self.sessions.next()?;
            match self.sets_of(&session.id) {
                Ok(sets) => self.current = Some((session, sets.into_iter())),
                Err(e) => {
                    self.error = Some(e);
                    return None;
                }
            }
        }
    }
}

/// Suggested name for an export file written at `millis`.
#[must_use]
pub fn export_filename(millis: i64) -> String {
    format!("liftlog-export-{}.csv", format_file_stamp(millis))
}

/// Writes the CSV export to `out` and records the export time.
///
/// Rows are rendered and written one at a time; `on_row` receives the
/// running row count after each one.
pub fn export_csv<W, F>(store: &Store, options: &ExportOptions, out: &mut W, on_row: F) -> CoreResult<ExportReport>
where
    W: Write,
    F: FnMut(usize),
{
    let columns = export_columns();
    let rows = store.read(|txn| {
        let mut rows = ExportRows::new(txn, options)?;
        let written = CsvLines::new(&columns, rows.by_ref(), true).write_to_with(out, on_row)?;
        match rows.take_error() {
            Some(e) => Err(e),
            None => Ok(written),
        }
    })?;

    let now = store.now();
    store.write(|txn| mark_exported(&Repository::new(store), txn, now))?;
    info!(rows, "csv export finished");
    Ok(ExportReport {
        rows,
        filename: export_filename(now),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use crate::model::{SetAlternative, SETTING_LAST_EXPORT};
    use crate::schema::Collection;
    use liftlog_storage::InMemoryBackend;

    fn seeded() -> Store {
        let store = Store::open_in_memory(InMemoryBackend::new(), StoreConfig::default()).unwrap();
        let sessions = Repository::<Session>::new(&store);
        let sets = Repository::<LoggedSet>::new(&store);
        sessions.create(Session::new("S2", 2_000)).unwrap();
        sessions.create(Session::new("S1", 1_000)).unwrap();
        let mut with_alt = LoggedSet::new("L2", "S1", "E1", 80.0, 5.0, 1_100);
        with_alt.order_index = Some(1);
        with_alt.alternative = Some(SetAlternative {
            exercise_id: "E9".into(),
            name_snapshot: None,
            weight: None,
            reps: None,
        });
        sets.create(with_alt).unwrap();
        let mut first = LoggedSet::new("L1", "S1", "E1", 60.0, 5.0, 1_050);
        first.order_index = Some(0);
        sets.create(first).unwrap();
        sets.create(LoggedSet::new("L3", "S2", "E1", 90.0, 3.0, 2_050)).unwrap();
        store
    }

    #[test]
    fn rows_follow_session_date_then_set_order() {
        let store = seeded();
        let ids = store
            .read(|txn| {
                Ok(ExportRows::new(txn, &ExportOptions::default())?
                    .map(|r| r.set.id)
                    .collect::<Vec<_>>())
            })
            .unwrap();
        assert_eq!(ids, vec!["L1", "L2", "L3"]);
    }

    #[test]
    fn date_range_and_alternatives() {
        let store = seeded();
        let options = ExportOptions::default()
            .date_range(Some(1_000), Some(1_000))
            .include_alternatives(false);
        let rows = store
            .read(|txn| Ok(ExportRows::new(txn, &options)?.collect::<Vec<_>>()))
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.set.alternative.is_none()));
    }

    #[test]
    fn export_writes_lines_and_records_time() {
        let store = seeded();
        let mut out = Vec::new();
        let report = export_csv(&store, &ExportOptions::default(), &mut out, |_| {}).unwrap();
        assert_eq!(report.rows, 3);
        assert!(report.filename.starts_with("liftlog-export-"));

        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.matches("\r\n").count(), 4);
        assert!(text.starts_with("Session ID,Session name,Session date,"));

        let stamp = store
            .read(|txn| txn.get(Collection::Settings, SETTING_LAST_EXPORT))
            .unwrap();
        assert!(stamp.is_some());
    }

    #[test]
    fn export_reports_running_row_count() {
        let store = seeded();
        let mut seen = Vec::new();
        let report = export_csv(&store, &ExportOptions::default(), &mut std::io::sink(), |n| seen.push(n)).unwrap();
        assert_eq!(seen, (1..=3).collect::<Vec<_>>());
        assert_eq!(seen.last().copied(), Some(report.rows));
    }
}
