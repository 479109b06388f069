//! Fast pre-pass that counts data rows without parsing them.

use std::io::{ErrorKind, Read};

use memchr::memchr_iter;

const SCAN_BUFFER: usize = 1024 * 1024;

/// Counts data rows in `reader`: physical lines minus the header line.
///
/// A final line without a trailing newline is counted. Newlines inside quoted
/// fields are counted as line breaks, so the result is an upper bound for files
/// with multi-line records. Empty input yields 0.
pub fn count_rows<R: Read>(mut reader: R) -> std::io::Result<u64> {
    let mut buffer = vec![0u8; SCAN_BUFFER];
    let mut newlines: u64 = 0;
    let mut last_byte: Option<u8> = None;

    loop {
        let read = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        };
        let chunk = &buffer[..read];
        newlines += memchr_iter(b'\n', chunk).count() as u64;
        last_byte = chunk.last().copied();
    }

    let lines = match last_byte {
        None => 0,
        Some(b'\n') => newlines,
        Some(_) => newlines + 1,
    };

    Ok(lines.saturating_sub(1))
}
