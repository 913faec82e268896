//! Error types for the georeport-csv codec.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
  #[error("unterminated quoted field starting on line {line}")]
  UnterminatedQuote { line: usize },

  /// A quote appeared inside an unquoted field, or text followed a closing
  /// quote.
  #[error("stray quote on line {line}")]
  StrayQuote { line: usize },

  #[error("record on line {line} has {found} fields; the header has {expected}")]
  RaggedRecord {
    line:     usize,
    expected: usize,
    found:    usize,
  },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
