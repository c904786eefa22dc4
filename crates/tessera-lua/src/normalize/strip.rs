//! Removal of type-only syntax.
//!
//! The stripper walks the token stream and records byte ranges to blank.
//! It understands just enough of the typed dialect to find where each
//! annotation ends; everything it does not recognise is left for Lua's
//! own parser to judge.

use super::lexer::{Token, TokenKind};
use crate::error::{NormalizeError, NormalizeErrorKind};

const KEYWORDS: &[&str] = &[
    "and", "break", "do", "else", "elseif", "end", "false", "for", "function", "goto", "if", "in",
    "local", "nil", "not", "or", "repeat", "return", "then", "true", "until", "while",
];

/// Keywords after which a name is still part of an expression or a
/// binding, never the start of a declaration.
const CONTINUING_KEYWORDS: &[&str] = &[
    "return", "not", "and", "or", "in", "if", "elseif", "while", "until", "local", "function",
    "goto", "for",
];

/// Byte ranges to blank plus the number of constructs removed.
pub(crate) struct Stripped {
    pub ranges: Vec<(usize, usize)>,
    pub constructs: usize,
}

pub(crate) struct Stripper<'a> {
    src: &'a str,
    tokens: Vec<Token>,
    ranges: Vec<(usize, usize)>,
    constructs: usize,
}

type Step = Result<usize, NormalizeError>;

impl<'a> Stripper<'a> {
    /// `tokens` must end with an `Eof` token.
    pub fn new(src: &'a str, tokens: Vec<Token>) -> Self {
        Self {
            src,
            tokens,
            ranges: Vec::new(),
            constructs: 0,
        }
    }

    pub fn run(mut self) -> Result<Stripped, NormalizeError> {
        let mut i = 0;
        let mut prev: Option<usize> = None;
        while self.tok(i).kind != TokenKind::Eof {
            match self.statement(i, prev)? {
                Some(next) if next > i => {
                    prev = Some(next - 1);
                    i = next;
                }
                _ => {
                    prev = Some(i);
                    i += 1;
                }
            }
        }
        Ok(Stripped {
            ranges: self.ranges,
            constructs: self.constructs,
        })
    }

    // ---- token helpers ----

    fn tok(&self, i: usize) -> Token {
        let last = self.tokens.len().saturating_sub(1);
        self.tokens[i.min(last)]
    }

    fn text(&self, i: usize) -> &'a str {
        let t = self.tok(i);
        &self.src[t.start..t.end]
    }

    /// Name or symbol with exactly this text.
    fn is(&self, i: usize, s: &str) -> bool {
        matches!(self.tok(i).kind, TokenKind::Name | TokenKind::Symbol) && self.text(i) == s
    }

    /// A name that is not a Lua keyword.
    fn is_name(&self, i: usize) -> bool {
        self.tok(i).kind == TokenKind::Name && !KEYWORDS.contains(&self.text(i))
    }

    fn blank(&mut self, from: usize, to: usize) {
        if to > from {
            self.ranges.push((self.tok(from).start, self.tok(to - 1).end));
            self.constructs += 1;
        }
    }

    fn malformed(&self, i: usize, expected: &str) -> NormalizeError {
        let found = match self.tok(i).kind {
            TokenKind::Eof => "end of input".to_string(),
            _ => format!("'{}'", self.text(i)),
        };
        NormalizeError::new(
            NormalizeErrorKind::MalformedType,
            format!("expected {expected}, found {found}"),
            self.tok(i).location,
        )
    }

    fn expect(&self, i: usize, s: &str) -> Step {
        if self.is(i, s) {
            Ok(i + 1)
        } else {
            Err(self.malformed(i, &format!("'{s}'")))
        }
    }

    fn ends_expression(&self, i: usize) -> bool {
        match self.tok(i).kind {
            TokenKind::Number | TokenKind::Str => true,
            TokenKind::Name => {
                self.is_name(i) || matches!(self.text(i), "nil" | "true" | "false")
            }
            TokenKind::Symbol => matches!(self.text(i), ")" | "]" | "}" | "..."),
            TokenKind::Eof => false,
        }
    }

    /// Whether a name at the next position would still belong to the
    /// expression or binding that `prev` is part of.
    fn continues_expression(&self, prev: Option<usize>) -> bool {
        let Some(p) = prev else {
            return false;
        };
        match self.tok(p).kind {
            TokenKind::Symbol => !matches!(self.text(p), ")" | "]" | "}" | ";" | "..." | "::"),
            TokenKind::Name => CONTINUING_KEYWORDS.contains(&self.text(p)),
            _ => false,
        }
    }

    fn starts_type(&self, i: usize) -> bool {
        match self.tok(i).kind {
            TokenKind::Str => true,
            TokenKind::Name => self.is_name(i) || matches!(self.text(i), "nil" | "function"),
            TokenKind::Symbol => matches!(self.text(i), "{" | "("),
            _ => false,
        }
    }

    // ---- statements ----

    /// Handles a construct starting at `i`; returns the index to resume at.
    fn statement(&mut self, i: usize, prev: Option<usize>) -> Result<Option<usize>, NormalizeError> {
        if self.tok(i).kind != TokenKind::Name {
            return Ok(None);
        }
        match self.text(i) {
            "local" => self.local(i).map(Some),
            "function" => self.function(i).map(Some),
            "global" if !self.continues_expression(prev) => self.global(i),
            "type" | "record" | "interface" | "enum" if !self.continues_expression(prev) => {
                match self.declaration(i)? {
                    Some(end) => {
                        self.blank(i, end);
                        Ok(Some(end))
                    }
                    None => Ok(None),
                }
            }
            "as" => self.cast(i, prev),
            _ => Ok(None),
        }
    }

    fn local(&mut self, i: usize) -> Step {
        let j = i + 1;
        if self.is(j, "function") {
            return self.function(j);
        }
        if let Some(end) = self.declaration(j)? {
            self.blank(i, end);
            return Ok(end);
        }
        let (end, annotations) = self.variables(j)?;
        for (from, to) in annotations {
            self.blank(from, to);
        }
        Ok(end)
    }

    /// `global` is a modifier only when a declaration follows it.
    fn global(&mut self, i: usize) -> Result<Option<usize>, NormalizeError> {
        let j = i + 1;
        if self.is(j, "function") {
            self.blank(i, j);
            return self.function(j).map(Some);
        }
        if let Some(end) = self.declaration(j)? {
            self.blank(i, end);
            return Ok(Some(end));
        }
        let declares = self.is_name(j)
            && [":", ",", "=", "<"].iter().any(|s| self.is(j + 1, s));
        if !declares {
            return Ok(None);
        }
        let (end, annotations) = self.variables(j)?;
        if self.is(end, "=") {
            self.blank(i, j);
            for (from, to) in annotations {
                self.blank(from, to);
            }
        } else {
            self.blank(i, end);
        }
        Ok(Some(end))
    }

    /// `name [<attrib>] [: T], ...`; returns the end index and the
    /// annotation token ranges.
    fn variables(&mut self, mut j: usize) -> Result<(usize, Vec<(usize, usize)>), NormalizeError> {
        let mut annotations = Vec::new();
        while self.is_name(j) {
            j += 1;
            j = self.attribute(j);
            if self.is(j, ":") {
                let end = self.parse_type(j + 1)?;
                annotations.push((j, end));
                j = end;
            }
            j = self.attribute(j);
            if !self.is(j, ",") {
                break;
            }
            j += 1;
        }
        Ok((j, annotations))
    }

    /// Skips a Lua 5.4 `<const>` / `<close>` attribute.
    fn attribute(&self, j: usize) -> usize {
        if self.is(j, "<") && self.is_name(j + 1) && self.is(j + 2, ">") {
            j + 3
        } else {
            j
        }
    }

    /// `type Name [<...>] = T` or `record|interface|enum Name ... end`
    /// at `j`; returns the end index when one is present.
    fn declaration(&self, j: usize) -> Result<Option<usize>, NormalizeError> {
        if self.tok(j).kind != TokenKind::Name || !self.is_name(j + 1) {
            return Ok(None);
        }
        match self.text(j) {
            "type" if self.is(j + 2, "=") || self.is(j + 2, "<") => {
                let mut k = j + 2;
                if self.is(k, "<") {
                    k = self.parse_type_args(k)?;
                }
                k = self.expect(k, "=")?;
                self.parse_type(k).map(Some)
            }
            "record" | "interface" | "enum" => self.skip_block(j).map(Some),
            _ => Ok(None),
        }
    }

    /// Function signature starting at the `function` keyword; returns the
    /// index of the first body token.
    fn function(&mut self, i: usize) -> Step {
        let mut j = i + 1;
        if self.is_name(j) {
            j += 1;
            while (self.is(j, ".") || self.is(j, ":")) && self.is_name(j + 1) {
                j += 2;
            }
        }
        if self.is(j, "<") {
            let end = self.parse_type_args(j)?;
            self.blank(j, end);
            j = end;
        }
        if !self.is(j, "(") {
            return Ok(j);
        }
        j += 1;
        loop {
            if self.is(j, ")") {
                j += 1;
                break;
            }
            if self.is(j, "...") {
                j += 1;
            } else if self.is_name(j) {
                j += 1;
                if self.is(j, "?") {
                    self.blank(j, j + 1);
                    j += 1;
                }
            } else {
                return Ok(j);
            }
            if self.is(j, ":") {
                let end = self.parse_type(j + 1)?;
                self.blank(j, end);
                j = end;
            }
            if self.is(j, ",") {
                j += 1;
                continue;
            }
            if self.is(j, ")") {
                j += 1;
                break;
            }
            return Ok(j);
        }
        if self.is(j, ":") {
            let end = self.parse_return_list(j + 1)?;
            self.blank(j, end);
            j = end;
        }
        Ok(j)
    }

    /// `expr as T`, recognised only directly after an expression on the
    /// same line.
    fn cast(&mut self, i: usize, prev: Option<usize>) -> Result<Option<usize>, NormalizeError> {
        let Some(p) = prev else {
            return Ok(None);
        };
        let same_line = self.tok(p).location.line == self.tok(i).location.line;
        if !same_line || !self.ends_expression(p) || !self.starts_type(i + 1) {
            return Ok(None);
        }
        let end = self.parse_type(i + 1)?;
        self.blank(i, end);
        Ok(Some(end))
    }

    // ---- types ----

    fn parse_type(&self, i: usize) -> Step {
        let mut j = self.parse_primary(i)?;
        while self.is(j, "|") {
            j = self.parse_primary(j + 1)?;
        }
        Ok(j)
    }

    fn parse_primary(&self, i: usize) -> Step {
        let token = self.tok(i);
        match token.kind {
            TokenKind::Str => Ok(i + 1),
            TokenKind::Name => match self.text(i) {
                "function" => self.function_type(i + 1),
                "record" | "interface" | "enum" => self.skip_block(i),
                "nil" => Ok(i + 1),
                _ if !self.is_name(i) => Err(self.malformed(i, "type")),
                _ => {
                    let mut j = i + 1;
                    while self.is(j, ".") && self.is_name(j + 1) {
                        j += 2;
                    }
                    if self.is(j, "<") {
                        j = self.parse_type_args(j)?;
                    }
                    Ok(j)
                }
            },
            TokenKind::Symbol if self.is(i, "{") => {
                let mut j = self.parse_type(i + 1)?;
                if self.is(j, ":") {
                    j = self.parse_type(j + 1)?;
                } else {
                    while self.is(j, ",") {
                        j = self.parse_type(j + 1)?;
                    }
                }
                self.expect(j, "}")
            }
            TokenKind::Symbol if self.is(i, "(") => {
                let j = self.parse_type_list(i + 1)?;
                self.expect(j, ")")
            }
            _ => Err(self.malformed(i, "type")),
        }
    }

    /// `T [...] {, T [...]}`
    fn parse_type_list(&self, i: usize) -> Step {
        let mut j = self.parse_type(i)?;
        if self.is(j, "...") {
            j += 1;
        }
        while self.is(j, ",") {
            j = self.parse_type(j + 1)?;
            if self.is(j, "...") {
                j += 1;
            }
        }
        Ok(j)
    }

    /// Return list of a function declaration.
    fn parse_return_list(&self, i: usize) -> Step {
        self.parse_type_list(i)
    }

    /// `<T, U>` starting at the `<`.
    fn parse_type_args(&self, i: usize) -> Step {
        let mut j = self.parse_type(i + 1)?;
        while self.is(j, ",") {
            j = self.parse_type(j + 1)?;
        }
        self.expect(j, ">")
    }

    /// `function [<...>] (params) [: T]` in type position, after the keyword.
    fn function_type(&self, mut j: usize) -> Step {
        if self.is(j, "<") {
            j = self.parse_type_args(j)?;
        }
        if !self.is(j, "(") {
            return Ok(j);
        }
        j += 1;
        if !self.is(j, ")") {
            loop {
                if self.is(j, "...") {
                    j += 1;
                    if self.is(j, ":") {
                        j = self.parse_type(j + 1)?;
                    }
                } else if self.is_name(j) && self.is(j + 1, ":") {
                    j = self.parse_type(j + 2)?;
                } else if self.is_name(j) && self.is(j + 1, "?") && self.is(j + 2, ":") {
                    j = self.parse_type(j + 3)?;
                } else {
                    j = self.parse_type(j)?;
                }
                if !self.is(j, ",") {
                    break;
                }
                j += 1;
            }
        }
        j = self.expect(j, ")")?;
        if self.is(j, ":") {
            j = self.parse_type(j + 1)?;
            if self.is(j, "...") {
                j += 1;
            }
        }
        Ok(j)
    }

    /// Skips a `record`/`interface`/`enum` block including nested ones.
    fn skip_block(&self, i: usize) -> Step {
        let mut depth = 0usize;
        let mut j = i;
        loop {
            let token = self.tok(j);
            if token.kind == TokenKind::Eof {
                return Err(NormalizeError::new(
                    NormalizeErrorKind::MalformedType,
                    format!("unterminated '{}' declaration", self.text(i)),
                    self.tok(i).location,
                ));
            }
            if token.kind == TokenKind::Name {
                match self.text(j) {
                    "record" | "interface" | "enum" if !self.is(j + 1, ":") => depth += 1,
                    "end" => {
                        depth = depth.saturating_sub(1);
                        if depth == 0 {
                            return Ok(j + 1);
                        }
                    }
                    _ => {}
                }
            }
            j += 1;
        }
    }
}
