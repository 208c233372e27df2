//! Index key values and their extraction from records.

use crate::schema::{IndexDef, KeyPath};
use serde_json::Value;
use std::cmp::Ordering;

/// A value an index can be keyed on.
///
/// Ordering: every number sorts before every string, every string before
/// every array; arrays compare element by element. Compound keys are arrays.
#[derive(Debug, Clone)]
pub enum IndexValue {
    /// A finite number.
    Number(f64),
    /// A string.
    Text(String),
    /// A sequence of keys.
    Array(Vec<IndexValue>),
}

impl IndexValue {
    /// Converts a JSON value to a key.
    ///
    /// Returns `None` for values that cannot be keyed on: null, booleans,
    /// objects, non-finite numbers and arrays containing any of those.
    #[must_use]
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_f64().filter(|f| f.is_finite()).map(Self::Number),
            Value::String(s) => Some(Self::Text(s.clone())),
            Value::Array(items) => items
                .iter()
                .map(Self::from_json)
                .collect::<Option<Vec<_>>>()
                .map(Self::Array),
            _ => None,
        }
    }

    /// A compound key from its parts.
    #[must_use]
    pub fn compound(parts: impl IntoIterator<Item = IndexValue>) -> Self {
        Self::Array(parts.into_iter().collect())
    }

    fn rank(&self) -> u8 {
        match self {
            Self::Number(_) => 0,
            Self::Text(_) => 1,
            Self::Array(_) => 2,
        }
    }
}

impl From<&str> for IndexValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for IndexValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<f64> for IndexValue {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<i64> for IndexValue {
    fn from(n: i64) -> Self {
        Self::Number(n as f64)
    }
}

impl PartialEq for IndexValue {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for IndexValue {}

impl PartialOrd for IndexValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for IndexValue {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Number(a), Self::Number(b)) => a.total_cmp(b),
            (Self::Text(a), Self::Text(b)) => a.cmp(b),
            (Self::Array(a), Self::Array(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

/// Computes the index entries a record contributes to `def`.
///
/// A record missing the key field, or holding a value that cannot be keyed
/// on, contributes nothing. A multi-valued index contributes one entry per
/// distinct keyable element.
#[must_use]
pub fn extract_keys(def: &IndexDef, record: &Value) -> Vec<IndexValue> {
    match &def.key_path {
        KeyPath::Field(field) => {
            let Some(value) = record.get(field) else {
                return Vec::new();
            };
            match value {
                Value::Array(items) if def.multi_entry => {
                    let mut keys: Vec<IndexValue> =
                        items.iter().filter_map(IndexValue::from_json).collect();
                    keys.sort();
                    keys.dedup();
                    keys
                }
                other => IndexValue::from_json(other).into_iter().collect(),
            }
        }
        KeyPath::Compound(fields) => fields
            .iter()
            .map(|f| record.get(f).and_then(IndexValue::from_json))
            .collect::<Option<Vec<_>>>()
            .map(IndexValue::Array)
            .into_iter()
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn numbers_before_text_before_arrays() {
        let mut keys = vec![
            IndexValue::compound([IndexValue::from(1.0)]),
            IndexValue::from("a"),
            IndexValue::from(10.0),
            IndexValue::from(-3.5),
        ];
        keys.sort();
        assert_eq!(
            keys,
            vec![
                IndexValue::from(-3.5),
                IndexValue::from(10.0),
                IndexValue::from("a"),
                IndexValue::compound([IndexValue::from(1.0)]),
            ]
        );
    }

    #[test]
    fn integer_and_float_json_compare_equal() {
        let a = IndexValue::from_json(&json!(100)).unwrap();
        let b = IndexValue::from_json(&json!(100.0)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn multi_entry_yields_distinct_elements() {
        let def = IndexDef::multi("exerciseIds");
        let keys = extract_keys(&def, &json!({"exerciseIds": ["b", "a", "b", null]}));
        assert_eq!(keys, vec![IndexValue::from("a"), IndexValue::from("b")]);
    }

    #[test]
    fn single_field_array_is_one_key() {
        let def = IndexDef::field("tags");
        let keys = extract_keys(&def, &json!({"tags": ["x", "y"]}));
        assert_eq!(keys.len(), 1);
    }

    #[test]
    fn compound_needs_every_part() {
        let def = IndexDef::compound(&["exerciseId", "weight"]);
        assert_eq!(
            extract_keys(&def, &json!({"exerciseId": "E1", "weight": 80})),
            vec![IndexValue::compound([IndexValue::from("E1"), IndexValue::from(80.0)])]
        );
        assert!(extract_keys(&def, &json!({"exerciseId": "E1"})).is_empty());
        assert!(extract_keys(&def, &json!({"exerciseId": "E1", "weight": null})).is_empty());
    }

    #[test]
    fn null_and_missing_are_not_indexed() {
        let def = IndexDef::field("sourcePlanId");
        assert!(extract_keys(&def, &json!({"sourcePlanId": null})).is_empty());
        assert!(extract_keys(&def, &json!({})).is_empty());
    }
}
