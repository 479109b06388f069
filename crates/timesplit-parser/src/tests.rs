use std::io::Cursor;

use csv::ReaderBuilder;

use crate::errors::{ParserError, RowIssue};
use crate::fields::{needs_quoting, split_fields, write_field, write_row};
use crate::header::{normalize_header, Header};
use crate::line_count::count_rows;
use crate::record::{RawRecord, RecordAssembler};

fn assemble(content: &str) -> Vec<RawRecord> {
    let mut assembler = RecordAssembler::new();
    let mut records = Vec::new();
    for line in content.split_inclusive('\n') {
        if let Some(record) = assembler.push_line(line.as_bytes()) {
            records.push(record);
        }
    }
    records.extend(assembler.finish());
    records
}

fn owned(fields: Vec<std::borrow::Cow<'_, str>>) -> Vec<String> {
    fields.into_iter().map(|f| f.into_owned()).collect()
}

#[test]
fn counts_rows_with_trailing_newline() {
    let rows = count_rows(Cursor::new("id,response\n1,0\n2,1\n")).expect("count rows");
    assert_eq!(rows, 2);
}

#[test]
fn counts_final_unterminated_row() {
    let rows = count_rows(Cursor::new("id,response\n1,0\n2,1")).expect("count rows");
    assert_eq!(rows, 2);
}

#[test]
fn empty_and_header_only_inputs_count_zero() {
    assert_eq!(count_rows(Cursor::new("")).expect("empty"), 0);
    assert_eq!(count_rows(Cursor::new("id,response")).expect("no newline"), 0);
    assert_eq!(count_rows(Cursor::new("id,response\n")).expect("header only"), 0);
}

#[test]
fn counts_crlf_lines_once() {
    let rows = count_rows(Cursor::new("a,b\r\n1,2\r\n3,4\r\n")).expect("count rows");
    assert_eq!(rows, 2);
}

#[test]
fn splits_plain_fields() {
    let fields = owned(split_fields("1,abc,,2.5,"));
    assert_eq!(fields, vec!["1", "abc", "", "2.5", ""]);
}

#[test]
fn splits_quoted_fields_with_delimiters_and_quotes() {
    let fields = owned(split_fields(r#"1,"a,b","say ""hi""",x"#));
    assert_eq!(fields, vec!["1", "a,b", r#"say "hi""#, "x"]);
}

#[test]
fn quoted_field_may_end_the_record() {
    let fields = owned(split_fields(r#"a,"b,c""#));
    assert_eq!(fields, vec!["a", "b,c"]);
}

#[test]
fn assembler_joins_lines_inside_quotes() {
    let records = assemble("h1,h2\n1,\"line one\nline two\"\n2,plain\n");
    assert_eq!(records.len(), 3);
    assert_eq!(records[1].line, 2);
    assert_eq!(records[2].line, 4);

    let text = std::str::from_utf8(&records[1].bytes).expect("utf8");
    let fields = owned(split_fields(text));
    assert_eq!(fields, vec!["1", "line one\nline two"]);
}

#[test]
fn assembler_strips_crlf_and_flushes_tail() {
    let records = assemble("a,b\r\n1,2\r\n3,4");
    let bodies: Vec<&[u8]> = records.iter().map(|r| r.bytes.as_slice()).collect();
    assert_eq!(bodies, vec![&b"a,b"[..], &b"1,2"[..], &b"3,4"[..]]);
}

#[test]
fn blank_records_are_detected() {
    let records = assemble("a,b\n\n   \n1,2\n");
    let blank: Vec<bool> = records.iter().map(RawRecord::is_blank).collect();
    assert_eq!(blank, vec![false, true, true, false]);
}

#[test]
fn quoting_only_when_needed() {
    assert!(!needs_quoting(b"plain value"));
    assert!(needs_quoting(b"a,b"));
    assert!(needs_quoting(b"say \"x\""));
    assert!(needs_quoting(b"two\nlines"));
    assert!(needs_quoting(b"carriage\rreturn"));

    let mut out = Vec::new();
    write_field(&mut out, "");
    assert!(out.is_empty());
}

#[test]
fn field_with_comma_quote_and_newline_round_trips() {
    let original = "a,\"b\"\nc";
    let mut out = Vec::new();
    write_field(&mut out, original);
    assert_eq!(out, b"\"a,\"\"b\"\"\nc\"");

    let records = assemble(std::str::from_utf8(&out).expect("utf8"));
    assert_eq!(records.len(), 1);
    let text = std::str::from_utf8(&records[0].bytes).expect("utf8");
    let fields = owned(split_fields(text));
    assert_eq!(fields, vec![original.to_string()]);
}

#[test]
fn written_rows_are_readable_by_csv_crate() {
    let mut out = Vec::new();
    write_row(&mut out, &["id", "note"], Some("synthetic_timestamp"));
    write_row(&mut out, &["1", "x, \"y\"\nz"], Some("2021-01-01 00:00:00"));

    let mut reader = ReaderBuilder::new().from_reader(out.as_slice());
    let headers = reader.headers().expect("headers").clone();
    assert_eq!(headers.len(), 3);
    let row = reader
        .records()
        .next()
        .expect("one row")
        .expect("valid row");
    assert_eq!(row.get(1), Some("x, \"y\"\nz"));
    assert_eq!(row.get(2), Some("2021-01-01 00:00:00"));
}

#[test]
fn normalizes_invisible_characters_in_headers() {
    assert_eq!(normalize_header("\u{feff}Response"), "response");
    assert_eq!(normalize_header(" Response\u{00a0}"), "response");
    assert_eq!(normalize_header("\u{200b}RESPONSE\u{202f} "), "response");
}

#[test]
fn header_locates_response_column() {
    let records = assemble("\u{feff}Id, Response ,Feature\n");
    let header = Header::parse(&records[0]).expect("header");
    assert_eq!(header.len(), 3);
    assert_eq!(header.response_index(), Some(1));
    assert_eq!(header.position("FEATURE"), Some(2));
}

#[test]
fn header_without_response_is_accepted() {
    let records = assemble("a,b,c\n");
    let header = Header::parse(&records[0]).expect("header");
    assert_eq!(header.response_index(), None);
}

#[test]
fn blank_header_is_missing() {
    let records = assemble("  \n");
    let err = Header::parse(&records[0]).expect_err("blank header must fail");
    assert!(matches!(err, ParserError::MissingHeader));
}

#[test]
fn row_issue_messages_are_readable() {
    let issue = RowIssue::FieldCount {
        expected: 3,
        found: 2,
    };
    assert_eq!(issue.to_string(), "expected 3 fields, found 2");
}

#[test]
fn stray_quote_inside_a_field_does_not_join_lines() {
    let records = assemble("id,size,response\n1,5\",1\n2,3,1\n3,12\" x 4\",0\n");
    assert_eq!(records.len(), 4);
    assert_eq!(records[2].line, 3);
    assert_eq!(records[3].line, 4);

    let text = std::str::from_utf8(&records[1].bytes).expect("utf8");
    assert_eq!(owned(split_fields(text)), vec!["1", "5\"", "1"]);
    let text = std::str::from_utf8(&records[3].bytes).expect("utf8");
    assert_eq!(owned(split_fields(text)), vec!["3", "12\" x 4\"", "0"]);
}

#[test]
fn quote_handling_matches_csv_crate() {
    let lines = [
        r#"1,5",1"#,
        r#""a"b"c,d"#,
        r#"x"y"z,"q""#,
        r#"a,"b""c",d"#,
        r#","",,"#,
        r#""open "" still",5""#,
    ];
    for line in lines {
        let mut reader = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(line.as_bytes());
        let expected: Vec<String> = reader
            .records()
            .next()
            .expect("one record")
            .expect("valid record")
            .iter()
            .map(str::to_string)
            .collect();
        assert_eq!(owned(split_fields(line)), expected, "line {line}");

        let records = assemble(&format!("{line}\nnext,row\n"));
        assert_eq!(records.len(), 2, "line {line}");
    }
}

#[test]
fn quoted_field_spanning_lines_may_hold_stray_quotes() {
    let records = assemble("1,\"he said \"\"hi\"\"\nthen 5\"\"\",2\n3,4\n");
    assert_eq!(records.len(), 2);
    let text = std::str::from_utf8(&records[0].bytes).expect("utf8");
    assert_eq!(
        owned(split_fields(text)),
        vec!["1", "he said \"hi\"\nthen 5\"", "2"]
    );
}
