//! RFC 4180 field splitting and quoting for comma-separated records.

use std::borrow::Cow;

use memchr::{memchr, memchr3};

pub const DELIMITER: u8 = b',';
pub(crate) const QUOTE: u8 = b'"';

/// Splits one logical record into fields.
///
/// A quote opens a quoted field only as the first byte of a field. Inside a
/// quoted field a doubled quote is a literal quote, delimiters and line breaks
/// are data, and a lone quote closes the quoting; whatever follows up to the
/// next delimiter is kept verbatim. Quotes anywhere else are ordinary bytes.
/// Unquoted fields are borrowed from `record`.
pub fn split_fields(record: &str) -> Vec<Cow<'_, str>> {
    let bytes = record.as_bytes();
    let mut fields = Vec::new();
    let mut start = 0;

    loop {
        if bytes.get(start) == Some(&QUOTE) {
            let (field, next) = split_quoted_field(record, start);
            fields.push(Cow::Owned(field));
            match next {
                Some(next) => start = next,
                None => return fields,
            }
            continue;
        }

        match memchr(DELIMITER, &bytes[start..]) {
            Some(pos) => {
                fields.push(Cow::Borrowed(&record[start..start + pos]));
                start += pos + 1;
            }
            None => {
                fields.push(Cow::Borrowed(&record[start..]));
                return fields;
            }
        }
    }
}

/// Slow path for a field opened by the quote at `start`. Returns the
/// unescaped field and the offset just past its delimiter, if any.
fn split_quoted_field(record: &str, start: usize) -> (String, Option<usize>) {
    let bytes = record.as_bytes();
    let mut field = String::new();
    let mut i = start + 1;

    loop {
        let Some(pos) = memchr(QUOTE, &bytes[i..]) else {
            field.push_str(&record[i..]);
            return (field, None);
        };
        let quote = i + pos;
        field.push_str(&record[i..quote]);
        if bytes.get(quote + 1) == Some(&QUOTE) {
            field.push('"');
            i = quote + 2;
        } else {
            i = quote + 1;
            break;
        }
    }

    match memchr(DELIMITER, &bytes[i..]) {
        Some(pos) => {
            field.push_str(&record[i..i + pos]);
            (field, Some(i + pos + 1))
        }
        None => {
            field.push_str(&record[i..]);
            (field, None)
        }
    }
}

/// True when the field must be quoted to survive a round trip.
#[inline]
pub fn needs_quoting(field: &[u8]) -> bool {
    memchr3(DELIMITER, QUOTE, b'\n', field).is_some() || memchr(b'\r', field).is_some()
}

/// Appends `field` to `out`, quoting and doubling quotes only when needed.
pub fn write_field(out: &mut Vec<u8>, field: &str) {
    let bytes = field.as_bytes();
    if !needs_quoting(bytes) {
        out.extend_from_slice(bytes);
        return;
    }

    out.push(QUOTE);
    let mut start = 0;
    while let Some(pos) = memchr(QUOTE, &bytes[start..]) {
        let i = start + pos;
        out.extend_from_slice(&bytes[start..=i]);
        out.push(QUOTE);
        start = i + 1;
    }
    out.extend_from_slice(&bytes[start..]);
    out.push(QUOTE);
}

/// Appends a full row (fields plus an optional trailing field) and a `\n`.
pub fn write_row<S: AsRef<str>>(out: &mut Vec<u8>, fields: &[S], trailing: Option<&str>) {
    for (idx, field) in fields.iter().enumerate() {
        if idx > 0 {
            out.push(DELIMITER);
        }
        write_field(out, field.as_ref());
    }
    if let Some(extra) = trailing {
        if !fields.is_empty() {
            out.push(DELIMITER);
        }
        write_field(out, extra);
    }
    out.push(b'\n');
}
