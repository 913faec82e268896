//! CSV writer.
//!
//! Every field is wrapped in double quotes, embedded quotes are doubled, and
//! each record ends with CRLF. Quoting unconditionally keeps the output
//! stable across values that do or do not contain separators.

use crate::CsvRow;

pub(crate) fn quote_field(value: &str) -> String {
  let mut out = String::with_capacity(value.len() + 2);
  out.push('"');
  for ch in value.chars() {
    if ch == '"' {
      out.push('"');
    }
    out.push(ch);
  }
  out.push('"');
  out
}

pub(crate) fn write_record<S: AsRef<str>>(out: &mut String, fields: &[S]) {
  let line = fields
    .iter()
    .map(|f| quote_field(f.as_ref()))
    .collect::<Vec<_>>()
    .join(",");
  out.push_str(&line);
  out.push_str("\r\n");
}

pub(crate) fn serialize<R: CsvRow>(rows: &[R]) -> String {
  let mut out = String::new();
  write_record(&mut out, R::HEADER);
  for row in rows {
    write_record(&mut out, &row.fields());
  }
  out
}
