//! CSV parsing.

use crate::error::{CoreError, CoreResult};
use std::collections::BTreeMap;
use std::iter::Peekable;
use std::str::Chars;

/// Splits CSV text into records, one at a time.
///
/// Handles quoted fields holding delimiters and line breaks, doubled-quote
/// escapes, and CRLF, LF or bare CR line endings. Line breaks inside quotes
/// are kept as written. A leading byte-order mark is skipped. A quote opened
/// and never closed is `MalformedInput`.
///
/// A quote appearing inside an unquoted field is kept as a literal
/// character.
#[derive(Debug)]
pub struct CsvRecords<'a> {
    chars: Peekable<Chars<'a>>,
    line: usize,
    done: bool,
}

impl<'a> CsvRecords<'a> {
    /// Records of `text`.
    #[must_use]
    pub fn new(text: &'a str) -> Self {
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);
        Self {
            chars: text.chars().peekable(),
            line: 1,
            done: false,
        }
    }

    fn end_of_line(&mut self, c: char) {
        if c == '\r' && self.chars.peek() == Some(&'\n') {
            self.chars.next();
        }
        self.line += 1;
    }
}

impl Iterator for CsvRecords<'_> {
    type Item = CoreResult<Vec<String>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let mut record = Vec::new();
        let mut field = String::new();
        let mut in_quotes = false;
        let mut quote_line = self.line;
        let mut started = false;

        while let Some(c) = self.chars.next() {
            started = true;
            if in_quotes {
                match c {
                    '"' if self.chars.peek() == Some(&'"') => {
                        self.chars.next();
                        field.push('"');
                    }
                    '"' => in_quotes = false,
                    '\n' => {
                        self.line += 1;
                        field.push(c);
                    }
                    '\r' => {
                        if self.chars.peek() != Some(&'\n') {
                            self.line += 1;
                        }
                        field.push(c);
                    }
                    _ => field.push(c),
                }
                continue;
            }
            match c {
                '"' if field.is_empty() => {
                    in_quotes = true;
                    quote_line = self.line;
                }
                ',' => record.push(std::mem::take(&mut field)),
                '\r' | '\n' => {
                    self.end_of_line(c);
                    record.push(field);
                    return Some(Ok(record));
                }
                _ => field.push(c),
            }
        }

        self.done = true;
        if in_quotes {
            return Some(Err(CoreError::malformed(format!(
                "unterminated quoted field starting on line {quote_line}"
            ))));
        }
        if !started {
            return None;
        }
        record.push(field);
        Some(Ok(record))
    }
}

/// Whether every cell is empty after trimming.
#[must_use]
pub fn is_blank(record: &[String]) -> bool {
    record.iter().all(|cell| cell.trim().is_empty())
}

/// A parsed CSV file: the header row and the non-blank data rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvTable {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl CsvTable {
    /// Parses `text`, checking that every header in `required` is present.
    ///
    /// Header matching is exact and case-sensitive. Blank rows are dropped.
    ///
    /// # Errors
    ///
    /// `MalformedInput` for unterminated quotes, an empty file, or missing
    /// headers; the message names every missing header.
    pub fn parse(text: &str, required: &[&str]) -> CoreResult<Self> {
        let mut records = CsvRecords::new(text);
        let headers: Vec<String> = loop {
            match records.next() {
                Some(record) => {
                    let record = record?;
                    if !is_blank(&record) {
                        break record.into_iter().map(|h| h.trim().to_string()).collect();
                    }
                }
                None => return Err(CoreError::malformed("CSV file has no header row")),
            }
        };

        let missing: Vec<&str> = required
            .iter()
            .copied()
            .filter(|r| !headers.iter().any(|h| h == r))
            .collect();
        if !missing.is_empty() {
            return Err(CoreError::malformed(format!(
                "Missing required CSV headers: {}",
                missing.join(", ")
            )));
        }

        let mut rows = Vec::new();
        for record in records {
            let record = record?;
            if !is_blank(&record) {
                rows.push(record);
            }
        }
        Ok(Self { headers, rows })
    }

    /// Header names in file order.
    #[must_use]
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Number of data rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether there are no data rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Data rows as header → cell maps. Short rows leave the trailing
    /// headers out; cells past the last header are ignored.
    pub fn records(&self) -> impl Iterator<Item = BTreeMap<String, String>> + '_ {
        self.rows.iter().map(|row| {
            self.headers
                .iter()
                .zip(row.iter())
                .map(|(h, cell)| (h.clone(), cell.clone()))
                .collect()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::csv::writer::format_line;
    use proptest::prelude::*;

    fn parse_all(text: &str) -> Vec<Vec<String>> {
        CsvRecords::new(text).collect::<CoreResult<_>>().unwrap()
    }

    #[test]
    fn quoted_comma_stays_in_cell() {
        assert_eq!(parse_all("\"Press, Bench\",5"), vec![vec!["Press, Bench", "5"]]);
    }

    #[test]
    fn line_endings_are_normalized() {
        let expected = vec![vec!["a", "b"], vec!["c", "d"], vec!["e", "f"]];
        assert_eq!(parse_all("a,b\r\nc,d\ne,f\r\n"), expected);
        assert_eq!(parse_all("a,b\rc,d\re,f"), expected);
    }

    #[test]
    fn quoted_newlines_and_doubled_quotes() {
        let rows = parse_all("\"say \"\"hi\"\"\",\"two\r\nlines\"\r\nx,\"\"");
        assert_eq!(rows[0], vec!["say \"hi\"", "two\r\nlines"]);
        assert_eq!(rows[1], vec!["x", ""]);
    }

    #[test]
    fn bom_is_skipped() {
        assert_eq!(parse_all("\u{feff}A,B\n1,2"), vec![vec!["A", "B"], vec!["1", "2"]]);
    }

    #[test]
    fn unterminated_quote_is_malformed() {
        let err = CsvRecords::new("a,b\n\"open,c\n")
            .collect::<CoreResult<Vec<_>>>()
            .unwrap_err();
        assert!(matches!(err, CoreError::MalformedInput { .. }));
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn table_names_missing_headers() {
        let err = CsvTable::parse("A,c\n1,2", &["A", "B", "C"]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "malformed input: Missing required CSV headers: B, C"
        );
    }

    #[test]
    fn table_drops_blank_rows() {
        let table = CsvTable::parse("A,B\r\n1,2\r\n , \r\n\r\n3,\r\n", &["A", "B"]).unwrap();
        assert_eq!(table.len(), 2);
        let records: Vec<_> = table.records().collect();
        assert_eq!(records[0]["A"], "1");
        assert_eq!(records[1]["B"], "");
    }

    #[test]
    fn empty_file_has_no_header() {
        assert!(CsvTable::parse("", &[]).is_err());
    }

    proptest! {
        #[test]
        fn escaped_cells_parse_back(cells in proptest::collection::vec("(?s).*", 1..6)) {
            // A record of one empty cell is indistinguishable from a blank line.
            prop_assume!(!(cells.len() == 1 && cells[0].is_empty()));
            prop_assume!(!cells[0].starts_with('\u{feff}'));
            let line = format_line(&cells);
            prop_assert_eq!(parse_all(&line), vec![cells]);
        }
    }
}
