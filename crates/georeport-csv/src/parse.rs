//! RFC 4180 reader.
//!
//! Accepts quoted and unquoted fields, doubled quotes inside quoted fields,
//! separators and line breaks inside quoted fields, and either CRLF or bare
//! LF record terminators. A final terminator is optional.

use crate::error::{Error, Result};

#[derive(Clone, Copy, PartialEq, Eq)]
enum State {
  /// At the start of a field.
  FieldStart,
  Unquoted,
  Quoted,
  /// Just saw a quote inside a quoted field: either the closing quote or the
  /// first half of an escaped one.
  QuoteInQuoted,
}

/// Every record in `input`, each with the line it starts on.
pub(crate) fn parse_records(input: &str) -> Result<Vec<(usize, Vec<String>)>> {
  let mut records = Vec::new();
  let mut record: Vec<String> = Vec::new();
  let mut field = String::new();
  let mut state = State::FieldStart;
  let mut line = 1usize;
  let mut quote_line = 1usize;
  let mut record_line = 1usize;

  let mut chars = input.chars().peekable();
  while let Some(ch) = chars.next() {
    match (state, ch) {
      (State::Quoted, '"') => state = State::QuoteInQuoted,
      (State::Quoted, c) => {
        if c == '\n' {
          line += 1;
        }
        field.push(c);
      }
      (State::QuoteInQuoted, '"') => {
        field.push('"');
        state = State::Quoted;
      }
      (State::FieldStart, '"') => {
        quote_line = line;
        state = State::Quoted;
      }
      (State::Unquoted, '"') => return Err(Error::StrayQuote { line }),
      (_, ',') => {
        record.push(std::mem::take(&mut field));
        state = State::FieldStart;
      }
      (_, '\r') if chars.peek() == Some(&'\n') => {}
      (_, '\n') => {
        record.push(std::mem::take(&mut field));
        records.push((record_line, std::mem::take(&mut record)));
        state = State::FieldStart;
        line += 1;
        record_line = line;
      }
      (State::QuoteInQuoted, _) => return Err(Error::StrayQuote { line }),
      (_, c) => {
        field.push(c);
        state = State::Unquoted;
      }
    }
  }

  match state {
    State::Quoted => return Err(Error::UnterminatedQuote { line: quote_line }),
    // Input ended right after a terminator.
    State::FieldStart if record.is_empty() && field.is_empty() => {}
    _ => {
      record.push(field);
      records.push((record_line, record));
    }
  }
  Ok(records)
}
