use std::fmt;

use thiserror::Error;

/// Why a single data record was rejected. Row issues never abort a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowIssue {
    FieldCount { expected: usize, found: usize },
    Encoding,
}

impl fmt::Display for RowIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowIssue::FieldCount { expected, found } => {
                write!(f, "expected {expected} fields, found {found}")
            }
            RowIssue::Encoding => f.write_str("record is not valid UTF-8"),
        }
    }
}

#[derive(Debug, Error)]
pub enum ParserError {
    #[error("input did not contain a header line")]
    MissingHeader,

    #[error("header on line {line} is not valid UTF-8")]
    HeaderEncoding { line: u64 },

    #[error("failed to read input: {0}")]
    Io(#[from] std::io::Error),
}
