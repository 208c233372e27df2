//! Typed import rows: lenient field coercion and per-row validation.
//!
//! A bad cell never aborts the batch. Each row either becomes an
//! [`ImportRow`] or a [`RowIssue`] listing everything wrong with it.

use super::columns::*;
use crate::clock::parse_timestamp;
use crate::csv::CsvTable;
use crate::error::{CoreError, CoreResult};
use crate::model::{SessionStatus, SetAlternative};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// One untyped row: header → cell text.
pub type RawRow = BTreeMap<String, String>;

/// A validated row, ready for grouping.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportRow {
    /// 1-based position among the data rows.
    pub line: usize,
    /// Explicit session id, if given.
    pub session_id: Option<String>,
    /// Session name.
    pub session_name: Option<String>,
    /// Session date, epoch ms.
    pub session_date: i64,
    /// Session creation time.
    pub session_created: Option<i64>,
    /// Session modification time.
    pub session_updated: Option<i64>,
    /// Session status; imported history defaults to completed.
    pub session_status: SessionStatus,
    /// Session workout type.
    pub workout_type: Option<String>,
    /// Session exercise order.
    pub exercise_order: Vec<String>,
    /// Plan the session came from.
    pub source_plan_id: Option<String>,
    /// Set id.
    pub set_id: String,
    /// Exercise performed.
    pub exercise_id: String,
    /// Exercise name at logging time.
    pub exercise_name: Option<String>,
    /// Weight lifted.
    pub weight: f64,
    /// Weight unit.
    pub unit: Option<String>,
    /// Repetitions.
    pub reps: f64,
    /// Set type.
    pub set_type: Option<String>,
    /// When the set was logged; the session date if absent.
    pub set_timestamp: i64,
    /// Position within the session.
    pub order_index: Option<i64>,
    /// Set status.
    pub set_status: Option<String>,
    /// Position among the sets of the exercise.
    pub set_index: Option<i64>,
    /// Notes.
    pub notes: Option<String>,
    /// Alternative exercise performed instead.
    pub alternative: Option<SetAlternative>,
    /// Set creation time.
    pub set_created: Option<i64>,
    /// Set modification time.
    pub set_updated: Option<i64>,
}

/// Why a row was not imported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RowIssue {
    /// 1-based position among the data rows.
    pub line: usize,
    /// Human-readable problems, one per field.
    pub issues: Vec<String>,
}

/// Rows split into importable rows and rejected rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedRows {
    /// Rows that passed validation.
    pub valid: Vec<ImportRow>,
    /// Rows that did not, with their problems.
    pub invalid: Vec<RowIssue>,
}

/// Reads a CSV export, checking the required headers.
pub fn rows_from_csv(text: &str) -> CoreResult<Vec<RawRow>> {
    let table = CsvTable::parse(text, &required_headers())?;
    Ok(table.records().collect())
}

/// Reads a JSON array of objects keyed by the CSV headers.
///
/// String cells are taken as-is, numbers and booleans are rendered, null is
/// empty, and arrays are rendered as JSON (for `Exercise order`).
pub fn rows_from_json(payload: &Value) -> CoreResult<Vec<RawRow>> {
    let Some(items) = payload.as_array() else {
        return Err(CoreError::malformed("import payload must be a JSON array of rows"));
    };
    items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            let Some(object) = item.as_object() else {
                return Err(CoreError::malformed(format!("row {} is not a JSON object", i + 1)));
            };
            Ok(object
                .iter()
                .map(|(header, value)| {
                    let cell = match value {
                        Value::Null => String::new(),
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    };
                    (header.clone(), cell)
                })
                .collect())
        })
        .collect()
}

struct Cells<'r> {
    row: &'r RawRow,
    issues: Vec<String>,
}

impl<'r> Cells<'r> {
    fn text(&self, header: &str) -> Option<String> {
        self.row
            .get(header)
            .map(|cell| cell.trim())
            .filter(|cell| !cell.is_empty())
            .map(String::from)
    }

    fn number(&mut self, header: &str) -> Option<f64> {
        let raw = self.text(header)?;
        match raw.parse::<f64>() {
            Ok(n) if n.is_finite() => Some(n),
            _ => {
                self.issues.push(format!("{header} is not a number: {raw:?}"));
                None
            }
        }
    }

    fn integer(&mut self, header: &str) -> Option<i64> {
        let n = self.number(header)?;
        if n.fract() == 0.0 {
            Some(n as i64)
        } else {
            self.issues.push(format!("{header} is not a whole number: {n}"));
            None
        }
    }

    fn time(&mut self, header: &str) -> Option<i64> {
        let raw = self.text(header)?;
        let parsed = parse_timestamp(&raw);
        if parsed.is_none() {
            self.issues.push(format!("{header} is not a date: {raw:?}"));
        }
        parsed
    }

    fn required(&mut self, header: &str) -> Option<String> {
        let value = self.text(header);
        if value.is_none() {
            self.issues.push(format!("missing {header}"));
        }
        value
    }

    fn required_number(&mut self, header: &str) -> Option<f64> {
        if self.text(header).is_none() {
            self.issues.push(format!("missing {header}"));
            return None;
        }
        self.number(header)
    }
}

/// Coerces and validates one row.
pub fn parse_row(line: usize, row: &RawRow) -> Result<ImportRow, RowIssue> {
    let mut cells = Cells {
        row,
        issues: Vec::new(),
    };

    let set_id = cells.required(SET_ID);
    let exercise_id = cells.required(EXERCISE_ID);
    let weight = cells.required_number(WEIGHT);
    let reps = cells.required_number(REPS);
    let session_date = cells.time(SESSION_DATE);
    let set_timestamp = cells.time(SET_TIMESTAMP);
    let session_created = cells.time(SESSION_CREATED);
    let session_updated = cells.time(SESSION_UPDATED);
    let set_created = cells.time(SET_CREATED);
    let set_updated = cells.time(SET_UPDATED);
    let order_index = cells.integer(ORDER_INDEX);
    let set_index = cells.integer(SET_INDEX);
    let alternative_weight = cells.number(ALTERNATIVE_WEIGHT);
    let alternative_reps = cells.number(ALTERNATIVE_REPS);

    let session_status = match cells.text(SESSION_STATUS) {
        None => SessionStatus::Completed,
        Some(raw) => raw.parse::<SessionStatus>().unwrap_or_else(|e| {
            cells.issues.push(e);
            SessionStatus::Completed
        }),
    };

    let exercise_order = match cells.text(EXERCISE_ORDER) {
        None => Vec::new(),
        Some(raw) => serde_json::from_str::<Vec<String>>(&raw).unwrap_or_else(|_| {
            cells.issues.push(format!("{EXERCISE_ORDER} is not a JSON list: {raw:?}"));
            Vec::new()
        }),
    };

    let date = session_date.or(set_timestamp);
    if date.is_none() && cells.text(SESSION_DATE).is_none() && cells.text(SET_TIMESTAMP).is_none() {
        cells.issues.push(format!("missing {SESSION_DATE}"));
    }

    let (Some(set_id), Some(exercise_id), Some(weight), Some(reps), Some(date), true) =
        (set_id, exercise_id, weight, reps, date, cells.issues.is_empty())
    else {
        return Err(RowIssue {
            line,
            issues: cells.issues,
        });
    };

    let alternative = cells.text(ALTERNATIVE_EXERCISE_ID).map(|id| SetAlternative {
        exercise_id: id,
        name_snapshot: cells.text(ALTERNATIVE_NAME),
        weight: alternative_weight,
        reps: alternative_reps,
    });

    Ok(ImportRow {
        line,
        session_id: cells.text(SESSION_ID),
        session_name: cells.text(SESSION_NAME),
        session_date: date,
        session_created,
        session_updated,
        session_status,
        workout_type: cells.text(WORKOUT_TYPE),
        exercise_order,
        source_plan_id: cells.text(SOURCE_PLAN_ID),
        set_id,
        exercise_id,
        exercise_name: cells.text(EXERCISE_NAME),
        weight,
        unit: cells.text(UNIT),
        reps,
        set_type: cells.text(SET_TYPE),
        set_timestamp: set_timestamp.unwrap_or(date),
        order_index,
        set_status: cells.text(SET_STATUS),
        set_index,
        notes: row.get(NOTES).filter(|n| !n.trim().is_empty()).cloned(),
        alternative,
        set_created,
        set_updated,
    })
}

/// Validates every row independently.
pub fn parse_rows<'r>(rows: impl IntoIterator<Item = &'r RawRow>) -> ParsedRows {
    let mut parsed = ParsedRows::default();
    for (i, row) in rows.into_iter().enumerate() {
        match parse_row(i + 1, row) {
            Ok(row) => parsed.valid.push(row),
            Err(issue) => parsed.invalid.push(issue),
        }
    }
    parsed
}
