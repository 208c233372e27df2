//! Filtered, sorted and paged list queries.

use crate::error::CoreResult;
use crate::index::IndexValue;
use crate::schema::Collection;
use crate::store::Transaction;
use serde_json::Value;
use std::cmp::Ordering;
use std::ops::Bound;

/// Sort orders for list queries.
///
/// Name and weight sort ascending; the time fields sort newest first.
/// Sorting is stable, so equal keys keep primary-key order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    /// Case-insensitive name, ascending.
    Name,
    /// Creation time, descending.
    CreatedAt,
    /// Session date, descending.
    Date,
    /// Weight, ascending.
    Weight,
    /// Set timestamp, descending.
    Timestamp,
}

impl SortKey {
    fn field(self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::CreatedAt => "createdAt",
            Self::Date => "date",
            Self::Weight => "weight",
            Self::Timestamp => "timestamp",
        }
    }

    fn descending(self) -> bool {
        matches!(self, Self::CreatedAt | Self::Date | Self::Timestamp)
    }
}

/// Inclusive bounds on a numeric time field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeFilter {
    /// Field to test, such as `date` or `timestamp`.
    pub field: String,
    /// Lowest accepted value.
    pub from: Option<i64>,
    /// Highest accepted value.
    pub to: Option<i64>,
}

impl RangeFilter {
    fn accepts(&self, record: &Value) -> bool {
        let Some(value) = record.get(&self.field).and_then(Value::as_f64) else {
            return false;
        };
        self.from.map_or(true, |from| value >= from as f64) && self.to.map_or(true, |to| value <= to as f64)
    }
}

/// A page request; pages are numbered from zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    /// Page number.
    pub page: usize,
    /// Items per page.
    pub per_page: usize,
}

/// One page of results.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    /// Items on this page.
    pub items: Vec<T>,
    /// Matches across all pages.
    pub total: usize,
}

/// A list query over one collection.
///
/// # Example
///
/// ```rust
/// use liftlog_core::access::{ListQuery, SortKey};
///
/// let query = ListQuery::new()
///     .range("date", Some(1_704_067_200_000), None)
///     .name_contains("leg")
///     .sort(SortKey::Date)
///     .page(0, 20);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListQuery {
    index: Option<(String, IndexValue)>,
    range: Option<RangeFilter>,
    name_contains: Option<String>,
    sort: Option<SortKey>,
    page: Option<PageRequest>,
}

impl ListQuery {
    /// A query matching every record.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Only records whose `index` key equals `value`.
    #[must_use]
    pub fn filter(mut self, index: &str, value: impl Into<IndexValue>) -> Self {
        self.index = Some((index.to_string(), value.into()));
        self
    }

    /// Only records with `field` within the inclusive bounds.
    #[must_use]
    pub fn range(mut self, field: &str, from: Option<i64>, to: Option<i64>) -> Self {
        self.range = Some(RangeFilter {
            field: field.to_string(),
            from,
            to,
        });
        self
    }

    /// Only records whose name contains `needle`, ignoring case.
    #[must_use]
    pub fn name_contains(mut self, needle: &str) -> Self {
        self.name_contains = Some(needle.to_lowercase());
        self
    }

    /// Sort order.
    #[must_use]
    pub fn sort(mut self, key: SortKey) -> Self {
        self.sort = Some(key);
        self
    }

    /// Returns only page `page` of `per_page` items.
    #[must_use]
    pub fn page(mut self, page: usize, per_page: usize) -> Self {
        self.page = Some(PageRequest {
            page,
            per_page: per_page.max(1),
        });
        self
    }

    /// Runs the query and returns the matching records of the requested
    /// page, in stored form.
    pub(crate) fn execute(&self, txn: &Transaction<'_>, collection: Collection) -> CoreResult<Page<Value>> {
        let mut records = self.candidates(txn, collection)?;

        if let Some(range) = &self.range {
            records.retain(|r| range.accepts(r));
        }
        if let Some(needle) = &self.name_contains {
            records.retain(|r| {
                r.get("name")
                    .and_then(Value::as_str)
                    .is_some_and(|name| name.to_lowercase().contains(needle.as_str()))
            });
        }
        if let Some(key) = self.sort {
            records.sort_by(|a, b| compare(a, b, key));
        }

        let total = records.len();
        let items = match self.page {
            Some(PageRequest { page, per_page }) => records
                .into_iter()
                .skip(page.saturating_mul(per_page))
                .take(per_page)
                .collect(),
            None => records,
        };
        Ok(Page { items, total })
    }

    /// Narrows the scan through an index where one applies.
    fn candidates(&self, txn: &Transaction<'_>, collection: Collection) -> CoreResult<Vec<Value>> {
        if let Some((index, value)) = &self.index {
            return txn.index_lookup(collection, index, value);
        }
        if let Some(range) = &self.range {
            if txn.has_index(collection, &range.field) {
                let from = range.from.map(IndexValue::from);
                let to = range.to.map(IndexValue::from);
                let mut hits = txn.index_range(
                    collection,
                    &range.field,
                    from.as_ref().map_or(Bound::Unbounded, Bound::Included),
                    to.as_ref().map_or(Bound::Unbounded, Bound::Included),
                )?;
                // Index order is by field; restore key order so unsorted
                // results match a plain scan.
                hits.sort_by(|a, b| key_of(a, collection).cmp(key_of(b, collection)));
                return Ok(hits);
            }
        }
        txn.get_all(collection)
    }
}

fn key_of(record: &Value, collection: Collection) -> &str {
    record
        .get(collection.key_field())
        .and_then(Value::as_str)
        .unwrap_or_default()
}

fn compare(a: &Value, b: &Value, key: SortKey) -> Ordering {
    let field = key.field();
    let ordering = if key == SortKey::Name {
        let name = |v: &Value| v.get(field).and_then(Value::as_str).map(str::to_lowercase);
        name(a).cmp(&name(b))
    } else {
        let number = |v: &Value| v.get(field).and_then(Value::as_f64);
        match (number(a), number(b)) {
            (Some(x), Some(y)) => x.total_cmp(&y),
            (x, y) => x.is_some().cmp(&y.is_some()),
        }
    };
    if key.descending() {
        ordering.reverse()
    } else {
        ordering
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn time_sorts_descending_and_stable() {
        let mut records = vec![
            json!({"id": "a", "date": 1}),
            json!({"id": "b", "date": 3}),
            json!({"id": "c", "date": 1}),
        ];
        records.sort_by(|x, y| compare(x, y, SortKey::Date));
        let ids: Vec<_> = records.iter().map(|r| r["id"].as_str().unwrap()).collect();
        assert_eq!(ids, vec!["b", "a", "c"]);
    }

    #[test]
    fn name_sort_ignores_case() {
        let mut records = vec![json!({"name": "squat"}), json!({"name": "Bench"}), json!({})];
        records.sort_by(|x, y| compare(x, y, SortKey::Name));
        assert_eq!(records[0], json!({}));
        assert_eq!(records[1]["name"], "Bench");
    }

    #[test]
    fn range_is_inclusive() {
        let range = RangeFilter {
            field: "timestamp".into(),
            from: Some(10),
            to: Some(20),
        };
        assert!(range.accepts(&json!({"timestamp": 10})));
        assert!(range.accepts(&json!({"timestamp": 20})));
        assert!(!range.accepts(&json!({"timestamp": 21})));
        assert!(!range.accepts(&json!({})));
    }
}
