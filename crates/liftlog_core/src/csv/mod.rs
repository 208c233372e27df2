//! Streaming CSV codec.
//!
//! [`CsvLines`] renders rows lazily against a fixed column list; [`CsvRecords`]
//! splits text into records one at a time and [`CsvTable`] adds header
//! validation on top. Delimiter `,`, line terminator CRLF, RFC 4180 quoting.

mod reader;
mod writer;

pub use reader::{is_blank, CsvRecords, CsvTable};
pub use writer::{escape_field, format_line, Column, CsvLines, LINE_END};
