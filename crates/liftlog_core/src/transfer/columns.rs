//! The CSV export format: one row per logged set, joined with its session.

use crate::clock::format_iso;
use crate::csv::Column;
use crate::model::{LoggedSet, Session};

/// Column headers in export order.
pub const HEADERS: [&str; 27] = [
    SESSION_ID,
    SESSION_NAME,
    SESSION_DATE,
    SESSION_CREATED,
    SESSION_UPDATED,
    SESSION_STATUS,
    WORKOUT_TYPE,
    EXERCISE_ORDER,
    SOURCE_PLAN_ID,
    SET_ID,
    EXERCISE_ID,
    EXERCISE_NAME,
    WEIGHT,
    UNIT,
    REPS,
    SET_TYPE,
    SET_TIMESTAMP,
    ORDER_INDEX,
    SET_STATUS,
    SET_INDEX,
    NOTES,
    ALTERNATIVE_EXERCISE_ID,
    ALTERNATIVE_NAME,
    ALTERNATIVE_WEIGHT,
    ALTERNATIVE_REPS,
    SET_CREATED,
    SET_UPDATED,
];

/// Headers an import file must carry: every export header, matched
/// case-sensitively.
pub fn required_headers() -> Vec<&'static str> {
    HEADERS.to_vec()
}

pub(crate) const SESSION_ID: &str = "Session ID";
pub(crate) const SESSION_NAME: &str = "Session name";
pub(crate) const SESSION_DATE: &str = "Session date";
pub(crate) const SESSION_CREATED: &str = "Session created";
pub(crate) const SESSION_UPDATED: &str = "Session updated";
pub(crate) const SESSION_STATUS: &str = "Session status";
pub(crate) const WORKOUT_TYPE: &str = "Workout type";
pub(crate) const EXERCISE_ORDER: &str = "Exercise order";
pub(crate) const SOURCE_PLAN_ID: &str = "Source plan ID";
pub(crate) const SET_ID: &str = "Set ID";
pub(crate) const EXERCISE_ID: &str = "Exercise ID";
pub(crate) const EXERCISE_NAME: &str = "Exercise name";
pub(crate) const WEIGHT: &str = "Weight";
pub(crate) const UNIT: &str = "Unit";
pub(crate) const REPS: &str = "Reps";
pub(crate) const SET_TYPE: &str = "Set type";
pub(crate) const SET_TIMESTAMP: &str = "Set timestamp";
pub(crate) const ORDER_INDEX: &str = "Order index";
pub(crate) const SET_STATUS: &str = "Set status";
pub(crate) const SET_INDEX: &str = "Set index";
pub(crate) const NOTES: &str = "Notes";
pub(crate) const ALTERNATIVE_EXERCISE_ID: &str = "Alternative exercise ID";
pub(crate) const ALTERNATIVE_NAME: &str = "Alternative name";
pub(crate) const ALTERNATIVE_WEIGHT: &str = "Alternative weight";
pub(crate) const ALTERNATIVE_REPS: &str = "Alternative reps";
pub(crate) const SET_CREATED: &str = "Set created";
pub(crate) const SET_UPDATED: &str = "Set updated";

/// A logged set with its session, as exported.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportRow {
    /// The owning session.
    pub session: Session,
    /// The set.
    pub set: LoggedSet,
}

fn text(value: Option<&String>) -> String {
    value.cloned().unwrap_or_default()
}

fn number<N: ToString>(value: Option<N>) -> String {
    value.map(|n| n.to_string()).unwrap_or_default()
}

fn iso(value: Option<i64>) -> String {
    value.map(format_iso).unwrap_or_default()
}

/// The export columns, in [`HEADERS`] order.
#[must_use]
pub fn export_columns() -> Vec<Column<ExportRow>> {
    vec![
        Column::new(SESSION_ID, |r: &ExportRow| r.session.id.clone()),
        Column::new(SESSION_NAME, |r: &ExportRow| text(r.session.name.as_ref())),
        Column::new(SESSION_DATE, |r: &ExportRow| format_iso(r.session.date)),
        Column::new(SESSION_CREATED, |r: &ExportRow| format_iso(r.session.created_at)),
        Column::new(SESSION_UPDATED, |r: &ExportRow| iso(r.session.updated_at)),
        Column::new(SESSION_STATUS, |r: &ExportRow| r.session.status.to_string()),
        Column::new(WORKOUT_TYPE, |r: &ExportRow| text(r.session.workout_type.as_ref())),
        Column::new(EXERCISE_ORDER, |r: &ExportRow| {
            if r.session.exercise_order.is_empty() {
                String::new()
            } else {
                serde_json::to_string(&r.session.exercise_order).unwrap_or_default()
            }
        }),
        Column::new(SOURCE_PLAN_ID, |r: &ExportRow| text(r.session.source_plan_id.as_ref())),
        Column::new(SET_ID, |r: &ExportRow| r.set.id.clone()),
        Column::new(EXERCISE_ID, |r: &ExportRow| r.set.exercise_id.clone()),
        Column::new(EXERCISE_NAME, |r: &ExportRow| text(r.set.exercise_name_snapshot.as_ref())),
        Column::new(WEIGHT, |r: &ExportRow| r.set.weight.to_string()),
        Column::new(UNIT, |r: &ExportRow| text(r.set.weight_unit.as_ref())),
        Column::new(REPS, |r: &ExportRow| r.set.reps.to_string()),
        Column::new(SET_TYPE, |r: &ExportRow| r.set.set_type.clone()),
        Column::new(SET_TIMESTAMP, |r: &ExportRow| format_iso(r.set.timestamp)),
        Column::new(ORDER_INDEX, |r: &ExportRow| number(r.set.order_index)),
        Column::new(SET_STATUS, |r: &ExportRow| text(r.set.status.as_ref())),
        Column::new(SET_INDEX, |r: &ExportRow| number(r.set.set_index)),
        Column::new(NOTES, |r: &ExportRow| text(r.set.notes.as_ref())),
        Column::new(ALTERNATIVE_EXERCISE_ID, |r: &ExportRow| {
            text(r.set.alternative.as_ref().map(|a| &a.exercise_id))
        }),
        Column::new(ALTERNATIVE_NAME, |r: &ExportRow| {
            text(r.set.alternative.as_ref().and_then(|a| a.name_snapshot.as_ref()))
        }),
        Column::new(ALTERNATIVE_WEIGHT, |r: &ExportRow| {
            number(r.set.alternative.as_ref().and_then(|a| a.weight))
        }),
        Column::new(ALTERNATIVE_REPS, |r: &ExportRow| {
            number(r.set.alternative.as_ref().and_then(|a| a.reps))
        }),
        Column::new(SET_CREATED, |r: &ExportRow| format_iso(r.set.created_at)),
        Column::new(SET_UPDATED, |r: &ExportRow| iso(r.set.updated_at)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SetAlternative;

    #[test]
    fn columns_follow_header_order() {
        let headers: Vec<&str> = export_columns().iter().map(|c| c.header).collect();
        assert_eq!(headers, HEADERS);
        assert_eq!(required_headers().len(), HEADERS.len() - 2);
    }

    #[test]
    fn cells_render_optional_fields_empty() {
        let mut session = Session::new("S1", 1_704_067_200_000);
        session.exercise_order = vec!["E1".into(), "E2".into()];
        let mut set = LoggedSet::new("L1", "S1", "E1", 62.5, 8.0, 1_704_067_260_000);
        set.alternative = Some(SetAlternative {
            exercise_id: "E2".into(),
            name_snapshot: Some("Press, Bench".into()),
            weight: Some(40.0),
            reps: None,
        });
        let row = ExportRow { session, set };

        let cells: Vec<String> = export_columns().iter().map(|c| (c.format)(&row)).collect();
        assert_eq!(cells[2], "2024-01-01T00:00:00.000Z");
        assert_eq!(cells[4], "");
        assert_eq!(cells[7], r#"["E1","E2"]"#);
        assert_eq!(cells[12], "62.5");
        assert_eq!(cells[14], "8");
        assert_eq!(cells[22], "Press, Bench");
        assert_eq!(cells[23], "40");
        assert_eq!(cells[24], "");
    }
}
