use memchr::memchr;

use crate::fields::{DELIMITER, QUOTE};

/// One logical CSV record, possibly spanning several physical lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    /// 1-based physical line on which the record starts.
    pub line: u64,
    pub bytes: Vec<u8>,
}

impl RawRecord {
    pub fn is_blank(&self) -> bool {
        self.bytes.iter().all(u8::is_ascii_whitespace)
    }
}

/// Where the scanner stands inside the current field.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
enum QuoteState {
    #[default]
    FieldStart,
    Unquoted,
    Quoted,
    /// A quote seen inside a quoted field: either half of `""` or the close.
    QuoteInQuoted,
}

/// Joins physical lines into logical records.
///
/// A line break only ends a record outside a quoted field. Quoting follows
/// RFC 4180: a quote opens a quoted field only as the first byte of the
/// field, so a stray quote mid-field (`5"`) is data and never swallows the
/// following lines.
#[derive(Debug, Default)]
pub struct RecordAssembler {
    pending: Vec<u8>,
    state: QuoteState,
    next_line: u64,
    start_line: u64,
}

impl RecordAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one physical line (with or without its trailing `\n`).
    pub fn push_line(&mut self, line: &[u8]) -> Option<RawRecord> {
        self.next_line += 1;
        if self.pending.is_empty() {
            self.start_line = self.next_line;
        }

        self.pending.extend_from_slice(line);
        self.scan(line.strip_suffix(b"\n").unwrap_or(line));

        if self.state == QuoteState::Quoted {
            None
        } else {
            self.state = QuoteState::FieldStart;
            Some(self.take())
        }
    }

    /// Flushes whatever is buffered at end of input, including an unterminated
    /// quoted field.
    pub fn finish(&mut self) -> Option<RawRecord> {
        self.state = QuoteState::FieldStart;
        if self.pending.is_empty() {
            None
        } else {
            Some(self.take())
        }
    }

    fn scan(&mut self, bytes: &[u8]) {
        let mut i = 0;
        while i < bytes.len() {
            match self.state {
                QuoteState::FieldStart | QuoteState::QuoteInQuoted => {
                    self.state = match (self.state, bytes[i]) {
                        (QuoteState::FieldStart, QUOTE) => QuoteState::Quoted,
                        (QuoteState::QuoteInQuoted, QUOTE) => QuoteState::Quoted,
                        (_, DELIMITER) => QuoteState::FieldStart,
                        _ => QuoteState::Unquoted,
                    };
                    i += 1;
                }
                QuoteState::Unquoted => match memchr(DELIMITER, &bytes[i..]) {
                    Some(pos) => {
                        i += pos + 1;
                        self.state = QuoteState::FieldStart;
                    }
                    None => i = bytes.len(),
                },
                QuoteState::Quoted => match memchr(QUOTE, &bytes[i..]) {
                    Some(pos) => {
                        i += pos + 1;
                        self.state = QuoteState::QuoteInQuoted;
                    }
                    None => i = bytes.len(),
                },
            }
        }
    }

    fn take(&mut self) -> RawRecord {
        let mut bytes = std::mem::take(&mut self.pending);
        trim_line_ending(&mut bytes);
        RawRecord {
            line: self.start_line,
            bytes,
        }
    }
}

fn trim_line_ending(bytes: &mut Vec<u8>) {
    if bytes.last() == Some(&b'\n') {
        bytes.pop();
        if bytes.last() == Some(&b'\r') {
            bytes.pop();
        }
    }
}
