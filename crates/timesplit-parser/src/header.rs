use crate::errors::ParserError;
use crate::fields::split_fields;
use crate::record::RawRecord;

/// Column whose value drives the pass-rate statistic.
pub const RESPONSE_COLUMN: &str = "response";

/// Column appended to every augmented row.
pub const SYNTHETIC_TIMESTAMP_COLUMN: &str = "synthetic_timestamp";

/// Byte order marks, non-breaking and zero-width spaces that spreadsheet
/// exports leave behind in header cells.
const INVISIBLE: &[char] = &[
    '\u{feff}', '\u{00a0}', '\u{202f}', '\u{200b}', '\u{200c}', '\u{200d}', '\u{2060}',
];

/// Maps a raw header cell to the key used for column lookups.
pub fn normalize_header(raw: &str) -> String {
    raw.chars()
        .filter(|c| !INVISIBLE.contains(c))
        .collect::<String>()
        .trim()
        .to_lowercase()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    names: Vec<String>,
    keys: Vec<String>,
    response_index: Option<usize>,
}

impl Header {
    pub fn new(names: Vec<String>) -> Self {
        let keys: Vec<String> = names.iter().map(|name| normalize_header(name)).collect();
        let response_index = keys.iter().position(|key| key == RESPONSE_COLUMN);
        Self {
            names,
            keys,
            response_index,
        }
    }

    /// Parses the header record. A blank record counts as a missing header.
    pub fn parse(record: &RawRecord) -> Result<Self, ParserError> {
        if record.is_blank() {
            return Err(ParserError::MissingHeader);
        }
        let text = std::str::from_utf8(&record.bytes)
            .map_err(|_| ParserError::HeaderEncoding { line: record.line })?;
        let names = split_fields(text)
            .into_iter()
            .map(|field| field.into_owned())
            .collect();
        Ok(Self::new(names))
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn response_index(&self) -> Option<usize> {
        self.response_index
    }

    /// Index of the first column whose normalized name equals `key`.
    pub fn position(&self, key: &str) -> Option<usize> {
        let wanted = normalize_header(key);
        self.keys.iter().position(|candidate| *candidate == wanted)
    }
}
