pub mod errors;
pub mod fields;
pub mod header;
pub mod line_count;
pub mod record;

pub use errors::{ParserError, RowIssue};
pub use fields::{needs_quoting, split_fields, write_field, write_row, DELIMITER};
pub use header::{normalize_header, Header, RESPONSE_COLUMN, SYNTHETIC_TIMESTAMP_COLUMN};
pub use line_count::count_rows;
pub use record::{RawRecord, RecordAssembler};

#[cfg(test)]
mod tests;
