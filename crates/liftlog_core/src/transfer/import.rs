//! Chunked row import.
//!
//! An import runs in three steps. [`ImportJob::start`] validates the rows,
//! groups them into sessions and filters duplicates against the store. The
//! job is then an iterator: every call to `next` writes one chunk of session
//! groups in its own transaction and yields an [`ImportProgress`]. When the
//! groups run out the summary is recorded in the import history and
//! [`ImportJob::finish`] hands it back.
//!
//! Chunks are committed independently. If one fails, the earlier chunks
//! stay and [`ImportJob::summary`] lists exactly what they wrote, so the
//! partial import can still be undone.

use super::history::record_import;
use super::reconcile::{build_session_groups, fresh_id, DuplicateLookup, DuplicateReport, DuplicateStrategy, SessionPlan};
use super::row::{parse_rows, rows_from_csv, rows_from_json, RawRow, RowIssue};
use crate::access::Repository;
use crate::error::{CoreError, CoreResult};
use crate::model::{LoggedSet, Record, Session, SettingEntry};
use crate::store::Store;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashSet, VecDeque};
use tracing::{debug, info, warn};

/// Rows to import and how to treat duplicates.
#[derive(Debug, Clone, Default)]
pub struct ImportRequest {
    /// Untyped rows keyed by CSV header.
    pub rows: Vec<RawRow>,
    /// Duplicate handling.
    pub strategy: DuplicateStrategy,
    /// Name of the imported file, kept in the summary.
    pub filename: Option<String>,
    /// Existing sessions to match against. Built from the store when absent.
    pub lookup: Option<DuplicateLookup>,
}

impl ImportRequest {
    /// A request for `rows` with the default `Skip` strategy.
    #[must_use]
    pub fn new(rows: Vec<RawRow>) -> Self {
        Self {
            rows,
            ..Self::default()
        }
    }

    /// A request for the rows of a CSV export.
    pub fn from_csv(text: &str) -> CoreResult<Self> {
        Ok(Self::new(rows_from_csv(text)?))
    }

    /// A request for a JSON array of header-keyed objects.
    pub fn from_json(payload: &Value) -> CoreResult<Self> {
        Ok(Self::new(rows_from_json(payload)?))
    }

    /// Sets the duplicate strategy.
    #[must_use]
    pub fn strategy(mut self, strategy: DuplicateStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Sets the file name recorded in the summary.
    #[must_use]
    pub fn filename(mut self, name: impl Into<String>) -> Self {
        self.filename = Some(name.into());
        self
    }

    /// Matches against `lookup` instead of reading the store.
    #[must_use]
    pub fn lookup(mut self, lookup: DuplicateLookup) -> Self {
        self.lookup = Some(lookup);
        self
    }
}

/// What an import would do, computed without writing.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportPreview {
    /// Rows that passed validation.
    pub valid_rows: usize,
    /// Rows that did not.
    pub invalid_rows: Vec<RowIssue>,
    /// Session groups left after duplicate handling.
    pub sessions: usize,
    /// Sets in those groups.
    pub logged_sets: usize,
    /// Matches against existing sessions.
    pub duplicates: DuplicateReport,
}

/// Record of a finished row import.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    /// Unique id of this import.
    pub import_id: String,
    /// Sessions created, in write order.
    pub session_ids: Vec<String>,
    /// Logged sets created, in write order.
    pub logged_set_ids: Vec<String>,
    /// Number of sets written.
    pub row_count: usize,
    /// Name of the imported file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    /// Epoch ms the import finished.
    pub imported_at: i64,
    /// Duplicate handling used.
    #[serde(default)]
    pub strategy: DuplicateStrategy,
    /// Rows rejected by validation.
    #[serde(default)]
    pub invalid_rows: Vec<RowIssue>,
    /// Matches against existing sessions.
    #[serde(default)]
    pub duplicates: DuplicateReport,
}

/// Progress after one committed chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportProgress {
    /// Sets handled so far.
    pub processed_sets: usize,
    /// Sets in the whole import.
    pub total_sets: usize,
    /// 1-based number of the chunk just written.
    pub chunk: usize,
    /// Number of chunks.
    pub chunks: usize,
}

impl ImportProgress {
    /// Completion in whole percent.
    #[must_use]
    pub fn percent(&self) -> u8 {
        if self.total_sets == 0 {
            return 100;
        }
        let pct = self.processed_sets.min(self.total_sets) * 100 / self.total_sets;
        u8::try_from(pct).unwrap_or(100)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JobState {
    Running,
    Done,
    Failed,
}

struct ChunkWrite {
    session_ids: Vec<String>,
    logged_set_ids: Vec<String>,
    skipped_groups: usize,
}

/// A row import in progress. See the module docs.
pub struct ImportJob<'a> {
    store: &'a Store,
    pending: VecDeque<SessionPlan>,
    chunk_size: usize,
    chunk: usize,
    chunks: usize,
    processed_sets: usize,
    total_sets: usize,
    assigned_sessions: HashSet<String>,
    assigned_sets: HashSet<String>,
    summary: ImportSummary,
    state: JobState,
}

/// Validates and groups a request without writing anything.
pub fn prepare_import(store: &Store, request: &ImportRequest) -> CoreResult<ImportPreview> {
    let parsed = parse_rows(&request.rows);
    let lookup = match &request.lookup {
        Some(lookup) => lookup.clone(),
        None => store.read(|txn| DuplicateLookup::build(txn, store.config().cursor_page_size))?,
    };
    let valid_rows = parsed.valid.len();
    let (plans, duplicates) = build_session_groups(parsed.valid, &lookup, request.strategy);
    Ok(ImportPreview {
        valid_rows,
        invalid_rows: parsed.invalid,
        sessions: plans.len(),
        logged_sets: plans.iter().map(|p| p.sets.len()).sum(),
        duplicates,
    })
}

impl<'a> ImportJob<'a> {
    /// Validates, groups and filters the rows.
    ///
    /// # Errors
    ///
    /// `MalformedInput` when there are no rows or none pass validation;
    /// `NothingToImport` when every group was dropped as a duplicate.
    pub fn start(store: &'a Store, request: ImportRequest) -> CoreResult<Self> {
        let ImportRequest {
            rows,
            strategy,
            filename,
            lookup,
        } = request;
        if rows.is_empty() {
            return Err(CoreError::malformed("the import has no data rows"));
        }

        let parsed = parse_rows(&rows);
        if parsed.valid.is_empty() {
            return Err(CoreError::malformed(format!(
                "none of the {} row(s) passed validation",
                parsed.invalid.len()
            )));
        }
        if !parsed.invalid.is_empty() {
            warn!(invalid = parsed.invalid.len(), "skipping rows that failed validation");
        }

        let lookup = match lookup {
            Some(lookup) => lookup,
            None => store.read(|txn| DuplicateLookup::build(txn, store.config().cursor_page_size))?,
        };
        let (plans, duplicates) = build_session_groups(parsed.valid, &lookup, strategy);
        if plans.is_empty() {
            info!(
                by_id = duplicates.id_matches(),
                by_name_date = duplicates.name_date_matches(),
                "every session is already in the store"
            );
            return Err(CoreError::NothingToImport);
        }

        let chunk_size = store.config().import_chunk_size.max(1);
        let total_sets = plans.iter().map(|p| p.sets.len()).sum();
        let chunks = plans.len().div_ceil(chunk_size);
        debug!(sessions = plans.len(), sets = total_sets, chunks, "import prepared");

        Ok(Self {
            store,
            pending: plans.into(),
            chunk_size,
            chunk: 0,
            chunks,
            processed_sets: 0,
            total_sets,
            assigned_sessions: HashSet::new(),
            assigned_sets: HashSet::new(),
            summary: ImportSummary {
                import_id: fresh_id(),
                session_ids: Vec::new(),
                logged_set_ids: Vec::new(),
                row_count: 0,
                filename,
                imported_at: 0,
                strategy,
                invalid_rows: parsed.invalid,
                duplicates,
            },
            state: JobState::Running,
        })
    }

    /// What has been written so far.
    #[must_use]
    pub fn summary(&self) -> &ImportSummary {
        &self.summary
    }

    /// Writes every remaining chunk and returns the summary.
    ///
    /// # Errors
    ///
    /// The first chunk error, or `InvalidOperation` if the job already
    /// failed.
    pub fn finish(mut self) -> CoreResult<ImportSummary> {
        while let Some(step) = self.next() {
            step?;
        }
        match self.state {
            JobState::Done => Ok(self.summary),
            _ => Err(CoreError::invalid_operation("the import stopped after a failed chunk")),
        }
    }

    fn write_chunk(&mut self, plans: Vec<SessionPlan>) -> CoreResult<ChunkWrite> {
        let store = self.store;
        let strategy = self.summary.strategy;
        let assigned_sessions = &self.assigned_sessions;
        let assigned_sets = &self.assigned_sets;
        let sessions = Repository::<Session>::new(store);
        let sets = Repository::<LoggedSet>::new(store);
        let now = store.now();

        store.write(|txn| {
            let mut out = ChunkWrite {
                session_ids: Vec::new(),
                logged_set_ids: Vec::new(),
                skipped_groups: 0,
            };
            let mut chunk_sets: HashSet<String> = HashSet::new();

            for SessionPlan { mut session, sets: planned } in plans {
                let taken = assigned_sessions.contains(&session.id)
                    || out.session_ids.contains(&session.id)
                    || txn.contains(Session::COLLECTION, &session.id)?;
                if taken {
                    match strategy {
                        DuplicateStrategy::Skip => {
                            out.skipped_groups += 1;
                            continue;
                        }
                        DuplicateStrategy::CreateNew => session.id = fresh_id(),
                    }
                }
                if session.created_at == 0 {
                    session.created_at = now;
                }
                let session = sessions.put_in_txn(txn, session)?;

                for mut set in planned {
                    set.session_id.clone_from(&session.id);
                    if assigned_sets.contains(&set.id)
                        || chunk_sets.contains(&set.id)
                        || txn.contains(LoggedSet::COLLECTION, &set.id)?
                    {
                        set.id = fresh_id();
                    }
                    if set.created_at == 0 {
                        set.created_at = now;
                    }
                    let set = sets.put_in_txn(txn, set)?;
                    chunk_sets.insert(set.id.clone());
                    out.logged_set_ids.push(set.id);
                }
                out.session_ids.push(session.id);
            }
            Ok(out)
        })
    }

    fn complete(&mut self) -> CoreResult<()> {
        let store = self.store;
        let settings = Repository::<SettingEntry>::new(store);
        let now = store.now();
        self.summary.imported_at = now;
        let summary = &self.summary;
        store.write(|txn| record_import(&settings, txn, summary, now))?;
        info!(
            import = %self.summary.import_id,
            sessions = self.summary.session_ids.len(),
            rows = self.summary.row_count,
            "import finished"
        );
        Ok(())
    }
}

impl Iterator for ImportJob<'_> {
    type Item = CoreResult<ImportProgress>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.state != JobState::Running {
            return None;
        }

        if self.pending.is_empty() {
            return match self.complete() {
                Ok(()) => {
                    self.state = JobState::Done;
                    None
                }
                Err(e) => {
                    self.state = JobState::Failed;
                    Some(Err(e))
                }
            };
        }

        let take = self.chunk_size.min(self.pending.len());
        let plans: Vec<SessionPlan> = self.pending.drain(..take).collect();
        let planned_sets: usize = plans.iter().map(|p| p.sets.len()).sum();

        match self.write_chunk(plans) {
            Ok(written) => {
                self.chunk += 1;
                self.processed_sets += planned_sets;
                self.summary.row_count += written.logged_set_ids.len();
                self.summary.duplicates.skipped_groups += written.skipped_groups;
                self.assigned_sessions.extend(written.session_ids.iter().cloned());
                self.assigned_sets.extend(written.logged_set_ids.iter().cloned());
                self.summary.session_ids.extend(written.session_ids);
                self.summary.logged_set_ids.extend(written.logged_set_ids);
                debug!(chunk = self.chunk, chunks = self.chunks, sets = self.processed_sets, "import chunk written");
                Some(Ok(ImportProgress {
                    processed_sets: self.processed_sets,
                    total_sets: self.total_sets,
                    chunk: self.chunk,
                    chunks: self.chunks,
                }))
            }
            Err(e) => {
                warn!(
                    chunk = self.chunk + 1,
                    written_sessions = self.summary.session_ids.len(),
                    error = %e,
                    "import chunk failed"
                );
                self.state = JobState::Failed;
                Some(Err(e))
            }
        }
    }
}

/// Runs a whole import and returns its summary.
pub fn import_payloads(store: &Store, request: ImportRequest) -> CoreResult<ImportSummary> {
    ImportJob::start(store, request)?.finish()
}
