//! Paged scans.

use crate::error::CoreResult;
use crate::schema::Collection;
use crate::store::transaction::Transaction;
use serde_json::Value;

/// Lazily walks a collection in key order, one page at a time.
///
/// At most one page of records is held in memory.
pub struct Cursor<'t, 's> {
    txn: &'t Transaction<'s>,
    collection: Collection,
    page_size: usize,
    after: Option<String>,
    page: std::vec::IntoIter<(String, Value)>,
    exhausted: bool,
}

impl<'t, 's> Cursor<'t, 's> {
    pub(crate) fn new(txn: &'t Transaction<'s>, collection: Collection, page_size: usize) -> Self {
        Self {
            txn,
            collection,
            page_size: page_size.max(1),
            after: None,
            page: Vec::new().into_iter(),
            exhausted: false,
        }
    }
}

impl Iterator for Cursor<'_, '_> {
    type Item = CoreResult<(String, Value)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some((key, value)) = self.page.next() {
                self.after = Some(key.clone());
                return Some(Ok((key, value)));
            }
            if self.exhausted {
                return None;
            }
            match self
                .txn
                .scan_page(self.collection, self.after.as_deref(), self.page_size)
            {
                Ok(page) => {
                    self.exhausted = page.len() < self.page_size;
                    if page.is_empty() {
                        return None;
                    }
                    self.page = page.into_iter();
                }
                Err(e) => {
                    self.exhausted = true;
                    return Some(Err(e));
                }
            }
        }
    }
}
