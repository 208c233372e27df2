//! Lazy CSV output.

use std::io::Write;

/// Line terminator of every emitted line.
pub const LINE_END: &str = "\r\n";

/// One output column: a header and how to render a row's cell.
pub struct Column<R> {
    /// Header text.
    pub header: &'static str,
    /// Renders the cell; an empty string is an empty cell.
    pub format: fn(&R) -> String,
}

impl<R> Column<R> {
    /// A column rendering cells with `format`.
    pub const fn new(header: &'static str, format: fn(&R) -> String) -> Self {
        Self { header, format }
    }
}

impl<R> Clone for Column<R> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<R> Copy for Column<R> {}

impl<R> std::fmt::Debug for Column<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Column").field(&self.header).finish()
    }
}

/// Quotes a field if it holds a comma, quote, CR or LF; embedded quotes
/// are doubled.
#[must_use]
pub fn escape_field(value: &str) -> String {
    if value.contains([',', '"', '\r', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Joins escaped cells into one CRLF-terminated line.
#[must_use]
pub fn format_line<S: AsRef<str>>(cells: &[S]) -> String {
    let mut line = cells
        .iter()
        .map(|c| escape_field(c.as_ref()))
        .collect::<Vec<_>>()
        .join(",");
    line.push_str(LINE_END);
    line
}

/// Renders rows to CSV lines on demand.
///
/// Rows are pulled from the source only as lines are requested, so the
/// whole output never has to exist at once. [`rows_written`] is the
/// running row count for progress display.
///
/// [`rows_written`]: CsvLines::rows_written
///
/// # Example
///
/// ```rust
/// use liftlog_core::csv::{Column, CsvLines};
///
/// let columns = [
///     Column::new("Name", |r: &(String, u32)| r.0.clone()),
///     Column::new("Reps", |r: &(String, u32)| r.1.to_string()),
/// ];
/// let rows = vec![("Press, Bench".to_string(), 5)];
/// let text: String = CsvLines::new(&columns, rows.into_iter(), true).collect();
/// assert_eq!(text, "Name,Reps\r\n\"Press, Bench\",5\r\n");
/// ```
pub struct CsvLines<'c, R, I> {
    columns: &'c [Column<R>],
    rows: I,
    header_pending: bool,
    rows_written: usize,
}

impl<'c, R, I> CsvLines<'c, R, I>
where
    I: Iterator<Item = R>,
{
    /// Lines for `rows`, preceded by a header line if `include_header`.
    pub fn new(columns: &'c [Column<R>], rows: I, include_header: bool) -> Self {
        Self {
            columns,
            rows,
            header_pending: include_header,
            rows_written: 0,
        }
    }

    /// Data rows emitted so far.
    #[must_use]
    pub fn rows_written(&self) -> usize {
        self.rows_written
    }

    /// Writes every remaining line to `out` and returns the data row count.
    pub fn write_to<W: Write>(self, out: &mut W) -> std::io::Result<usize> {
        self.write_to_with(out, |_| {})
    }

    /// Like [`write_to`](Self::write_to), calling `on_row` with the running
    /// data row count after each data line is written.
    pub fn write_to_with<W, F>(mut self, out: &mut W, mut on_row: F) -> std::io::Result<usize>
    where
        W: Write,
        F: FnMut(usize),
    {
        let mut reported = self.rows_written;
        while let Some(line) = self.next() {
            out.write_all(line.as_bytes())?;
            if self.rows_written > reported {
                reported = self.rows_written;
                on_row(reported);
            }
        }
        out.flush()?;
        Ok(self.rows_written)
    }
}

impl<R, I> Iterator for CsvLines<'_, R, I>
where
    I: Iterator<Item = R>,
{
    type Item = String;

    fn next(&mut self) -> Option<String> {
        if self.header_pending {
            self.header_pending = false;
            let headers: Vec<&str> = self.columns.iter().map(|c| c.header).collect();
            return Some(format_line(&headers));
        }
        let row = self.rows.next()?;
        self.rows_written += 1;
        let cells: Vec<String> = self.columns.iter().map(|c| (c.format)(&row)).collect();
        Some(format_line(&cells))
    }
}
