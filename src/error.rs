//! Shared error utilities used across the compilation pipeline.
//!
//! Diagnostics are fatal at the first error and kept lightweight on purpose –
//! each one renders the offending source line and points at the offending
//! byte with a caret.

use snafu::Snafu;

pub type CompileResult<T> = Result<T, CompileError>;

#[derive(Debug, Snafu)]
pub enum CompileError {
  #[snafu(display("{message}\n{source_line}\n{marker}"))]
  WithLocation {
    message: String,
    source_line: String,
    marker: String,
  },
}

impl CompileError {
  /// Construct an error anchored at a specific byte offset in the source.
  pub fn at(source: &str, loc: usize, message: impl Into<String>) -> Self {
    let loc = loc.min(source.len());
    let line_start = source[..loc].rfind('\n').map_or(0, |i| i + 1);
    let line_end = source[loc..].find('\n').map_or(source.len(), |i| loc + i);
    let source_line = source[line_start..line_end].to_string();
    let column = source[line_start..loc].chars().count();
    let marker = format!("{}^", " ".repeat(column));
    Self::WithLocation {
      message: message.into(),
      source_line,
      marker,
    }
  }
}
