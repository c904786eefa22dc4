//! Tokenizer for typed Lua.
//!
//! Produces just enough structure for the stripper: names (keywords
//! included), numbers, strings and symbols, each with its byte span and
//! 1-based line/column. Comments and whitespace are skipped. `<<` and
//! `>>` are emitted as two single-character symbols so that nested
//! generic argument lists close naturally.

use crate::error::{Location, NormalizeError, NormalizeErrorKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TokenKind {
    Name,
    Number,
    Str,
    Symbol,
    Eof,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Token {
    pub kind: TokenKind,
    pub start: usize,
    pub end: usize,
    pub location: Location,
}

/// Multi-character symbols, longest first.
const LONG_SYMBOLS: &[&str] = &["...", "..", "::", "//", "==", "~=", "<=", ">="];
const SHORT_SYMBOLS: &[u8] = b"+-*/%^#&~|<>=(){}[];:,.?";

pub(crate) struct Lexer<'a> {
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
    line: u32,
    line_start: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(src: &'a str) -> Self {
        Self {
            src,
            bytes: src.as_bytes(),
            pos: 0,
            line: 1,
            line_start: 0,
        }
    }

    /// Tokenizes the whole input. The last token is always `Eof`.
    pub fn tokenize(mut self) -> Result<Vec<Token>, NormalizeError> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token()?;
            tokens.push(token);
            if token.kind == TokenKind::Eof {
                return Ok(tokens);
            }
        }
    }

    fn location_at(&self, pos: usize) -> Location {
        let column = self.src[self.line_start..pos].chars().count() + 1;
        Location::new(self.line, u32::try_from(column).unwrap_or(u32::MAX))
    }

    fn error(&self, message: impl Into<String>, location: Location) -> NormalizeError {
        NormalizeError::new(NormalizeErrorKind::Lexical, message, location)
    }

    fn peek(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.pos + offset).copied()
    }

    fn newline(&mut self) {
        // `pos` points at the '\n'
        self.line += 1;
        self.line_start = self.pos + 1;
    }

    fn next_token(&mut self) -> Result<Token, NormalizeError> {
        self.skip_trivia()?;
        let start = self.pos;
        let location = self.location_at(start);
        let token = |kind, end| Token {
            kind,
            start,
            end,
            location,
        };

        let Some(c) = self.peek(0) else {
            return Ok(token(TokenKind::Eof, start));
        };

        if c.is_ascii_alphabetic() || c == b'_' {
            while self
                .peek(0)
                .is_some_and(|c| c.is_ascii_alphanumeric() || c == b'_')
            {
                self.pos += 1;
            }
            return Ok(token(TokenKind::Name, self.pos));
        }

        if c.is_ascii_digit() || (c == b'.' && self.peek(1).is_some_and(|d| d.is_ascii_digit())) {
            self.number();
            return Ok(token(TokenKind::Number, self.pos));
        }

        if c == b'"' || c == b'\'' {
            self.quoted(c, location)?;
            return Ok(token(TokenKind::Str, self.pos));
        }

        if c == b'[' {
            if let Some(level) = self.long_bracket_level() {
                self.long_bracket(level, location, "string")?;
                return Ok(token(TokenKind::Str, self.pos));
            }
        }

        for sym in LONG_SYMBOLS {
            if self.src[self.pos..].starts_with(sym) {
                self.pos += sym.len();
                return Ok(token(TokenKind::Symbol, self.pos));
            }
        }
        if SHORT_SYMBOLS.contains(&c) {
            self.pos += 1;
            return Ok(token(TokenKind::Symbol, self.pos));
        }

        let ch = self.src[self.pos..].chars().next().unwrap_or('?');
        Err(self.error(format!("unexpected character '{ch}'"), location))
    }

    fn skip_trivia(&mut self) -> Result<(), NormalizeError> {
        while let Some(c) = self.peek(0) {
            match c {
                b'\n' => {
                    self.newline();
                    self.pos += 1;
                }
                b' ' | b'\t' | b'\r' | 0x0b | 0x0c => self.pos += 1,
                b'-' if self.peek(1) == Some(b'-') => {
                    let location = self.location_at(self.pos);
                    self.pos += 2;
                    if self.peek(0) == Some(b'[') {
                        if let Some(level) = self.long_bracket_level() {
                            self.long_bracket(level, location, "comment")?;
                            continue;
                        }
                    }
                    while self.peek(0).is_some_and(|c| c != b'\n') {
                        self.pos += 1;
                    }
                }
                _ => break,
            }
        }
        Ok(())
    }

    fn number(&mut self) {
        let hex = self.peek(0) == Some(b'0') && matches!(self.peek(1), Some(b'x' | b'X'));
        if hex {
            self.pos += 2;
        }
        while let Some(c) = self.peek(0) {
            let exponent = if hex {
                matches!(c, b'p' | b'P')
            } else {
                matches!(c, b'e' | b'E')
            };
            if exponent && matches!(self.peek(1), Some(b'+' | b'-')) {
                self.pos += 2;
            } else if c.is_ascii_alphanumeric() || c == b'.' || c == b'_' {
                self.pos += 1;
            } else {
                break;
            }
        }
    }

    fn quoted(&mut self, quote: u8, location: Location) -> Result<(), NormalizeError> {
        self.pos += 1;
        loop {
            match self.peek(0) {
                None | Some(b'\n') => return Err(self.error("unterminated string", location)),
                Some(b'\\') => {
                    if self.peek(1) == Some(b'\n') {
                        self.pos += 1;
                        self.newline();
                        self.pos += 1;
                    } else if self.peek(1) == Some(b'z') {
                        self.pos += 2;
                        while let Some(c) = self.peek(0) {
                            if c == b'\n' {
                                self.newline();
                            } else if !c.is_ascii_whitespace() {
                                break;
                            }
                            self.pos += 1;
                        }
                    } else {
                        self.pos += 2;
                    }
                }
                Some(c) if c == quote => {
                    self.pos += 1;
                    return Ok(());
                }
                Some(_) => self.pos += 1,
            }
        }
    }

    /// Level of a long bracket opening at `pos` (`[[` is 0, `[==[` is 2).
    fn long_bracket_level(&self) -> Option<usize> {
        let mut level = 0;
        while self.peek(1 + level) == Some(b'=') {
            level += 1;
        }
        (self.peek(1 + level) == Some(b'[')).then_some(level)
    }

    fn long_bracket(&mut self, level: usize, location: Location, what: &str) -> Result<(), NormalizeError> {
        self.pos += level + 2;
        let close = format!("]{}]", "=".repeat(level));
        loop {
            match self.peek(0) {
                None => return Err(self.error(format!("unterminated long {what}"), location)),
                Some(b'\n') => {
                    self.newline();
                    self.pos += 1;
                }
                Some(b']') if self.src[self.pos..].starts_with(&close) => {
                    self.pos += close.len();
                    return Ok(());
                }
                Some(_) => self.pos += 1,
            }
        }
    }
}
