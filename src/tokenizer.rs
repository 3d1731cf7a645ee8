//! Lexical analysis: turns the raw input string into a vector of tokens.
//!
//! The tokenizer is intentionally tiny – it knows nothing about semantics
//! beyond recognising delimiters, operators, keywords and numeric literals.
//! A leading `+` or `-` belongs to a literal only when the next character is
//! a digit or a dot; operator positions and literal positions are
//! syntactically distinct in prefix form, so that is enough to disambiguate.
//! Semicolons start a comment running to end of line.

use crate::error::{CompileError, CompileResult};

/// Kinds of tokens recognised by the front-end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
  Int,
  Float,
  Op,
  Ident,
  Define,
  Loop,
  If,
  Cond,
  LParen,
  RParen,
  LBrack,
  RBrack,
  Eof,
}

/// Thin wrapper for lexical information needed by later stages.
#[derive(Debug, Clone, Copy)]
pub struct Token {
  pub kind: TokenKind,
  pub loc: usize,
  pub len: usize,
}

impl Token {
  /// Convenience constructor to keep the `tokenize` loop readable.
  pub fn new(kind: TokenKind, loc: usize, len: usize) -> Self {
    Self { kind, loc, len }
  }
}

fn is_operator(c: u8) -> bool {
  matches!(c, b'+' | b'-' | b'*' | b'/' | b'<' | b'>' | b'=')
}

fn keyword_kind(id: &str) -> TokenKind {
  match id {
    "define" => TokenKind::Define,
    "loop" => TokenKind::Loop,
    "if" => TokenKind::If,
    "cond" => TokenKind::Cond,
    _ => TokenKind::Ident,
  }
}

/// Lex the input into a flat vector of tokens terminated by an `Eof` marker.
pub fn tokenize(input: &str) -> CompileResult<Vec<Token>> {
  let mut tokens = Vec::new();
  let bytes = input.as_bytes();
  let mut i = 0;

  while i < bytes.len() {
    let c = bytes[i];
    if c.is_ascii_whitespace() {
      i += 1;
      continue;
    }

    if c == b';' {
      while i < bytes.len() && bytes[i] != b'\n' {
        i += 1;
      }
      continue;
    }

    let delimiter = match c {
      b'(' => Some(TokenKind::LParen),
      b')' => Some(TokenKind::RParen),
      b'[' => Some(TokenKind::LBrack),
      b']' => Some(TokenKind::RBrack),
      _ => None,
    };
    if let Some(kind) = delimiter {
      tokens.push(Token::new(kind, i, 1));
      i += 1;
      continue;
    }

    let signed_number = matches!(c, b'+' | b'-')
      && bytes
        .get(i + 1)
        .is_some_and(|&next| next.is_ascii_digit() || next == b'.');

    if c.is_ascii_digit() || c == b'.' || signed_number {
      let token = scan_number(input, bytes, i)?;
      i += token.len;
      tokens.push(token);
      continue;
    }

    if is_operator(c) {
      tokens.push(Token::new(TokenKind::Op, i, 1));
      i += 1;
      continue;
    }

    if c.is_ascii_alphabetic() || c == b'_' {
      let start = i;
      while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
        i += 1;
      }
      tokens.push(Token::new(keyword_kind(&input[start..i]), start, i - start));
      continue;
    }

    let invalid = input[i..].chars().next().unwrap_or('\0');
    return Err(CompileError::at(
      input,
      i,
      format!("invalid token: '{invalid}'"),
    ));
  }

  tokens.push(Token::new(TokenKind::Eof, input.len(), 0));
  Ok(tokens)
}

/// Scan one numeric literal: an optional sign, digits, at most one dot.
/// The dot selects the Float kind.
fn scan_number(input: &str, bytes: &[u8], start: usize) -> CompileResult<Token> {
  let mut i = start;
  if matches!(bytes[i], b'+' | b'-') {
    i += 1;
  }

  let mut saw_dot = false;
  let mut saw_digit = false;
  while i < bytes.len() {
    match bytes[i] {
      b'0'..=b'9' => saw_digit = true,
      b'.' if !saw_dot => saw_dot = true,
      b'.' => {
        return Err(CompileError::at(
          input,
          i,
          "malformed number: second decimal point",
        ));
      }
      _ => break,
    }
    i += 1;
  }

  if !saw_digit {
    return Err(CompileError::at(input, start, "malformed number: no digits"));
  }

  let kind = if saw_dot {
    TokenKind::Float
  } else {
    TokenKind::Int
  };
  Ok(Token::new(kind, start, i - start))
}

/// Return the slice from the source that produced this token.
pub fn token_text<'a>(token: &Token, source: &'a str) -> &'a str {
  &source[token.loc..token.loc + token.len]
}

/// Human-friendly description used in diagnostics.
pub fn describe_token(token: &Token, source: &str) -> String {
  match token.kind {
    TokenKind::Eof => "EOF".to_string(),
    _ => token_text(token, source).to_string(),
  }
}
