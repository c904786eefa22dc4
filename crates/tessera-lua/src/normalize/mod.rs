//! Source normalizer for typed Lua.
//!
//! Typed Lua is plain Lua 5.4 plus type-only syntax: annotations on
//! locals, parameters and returns, generic parameter lists, `type`
//! aliases, `record`/`interface`/`enum` declarations, `as` casts and the
//! `global` modifier. Normalizing removes that syntax and nothing else.
//!
//! ```text
//! source ──lex──► tokens ──balance──► strip ──blank──► code ──compile──► NormalizedSource
//! ```
//!
//! Removed text is overwritten with spaces (newlines are kept), so every
//! remaining token stays at its original line and column and runtime
//! error positions still point into the user's source. No type checking
//! is performed.

mod lexer;
mod strip;

use crate::error::{Location, NormalizeError, NormalizeErrorKind};
use lexer::{Lexer, Token, TokenKind};
use mlua::{Lua, LuaOptions, StdLib};
use serde::Serialize;
use strip::Stripper;
use tracing::debug;

/// Options for [`normalize`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizeOptions {
    /// Compile the stripped code to catch syntax errors.
    pub compile_check: bool,
    /// Chunk name used when compiling.
    pub chunk_name: String,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            compile_check: true,
            chunk_name: "input".to_string(),
        }
    }
}

/// Plain Lua produced from typed Lua.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedSource {
    /// The stripped code.
    pub code: String,
    /// Number of constructs removed.
    pub stripped: usize,
}

/// Strips type-only syntax from `source`.
///
/// # Errors
///
/// Returns a located [`NormalizeError`] for lexical errors, unbalanced
/// brackets, malformed type expressions and, when
/// [`NormalizeOptions::compile_check`] is set, Lua syntax errors.
pub fn normalize(source: &str, options: &NormalizeOptions) -> Result<NormalizedSource, NormalizeError> {
    let tokens = Lexer::new(source).tokenize()?;
    check_balance(source, &tokens)?;
    let stripped = Stripper::new(source, tokens).run()?;
    let code = apply_blanks(source, &stripped.ranges);
    if options.compile_check {
        compile(&code, &options.chunk_name)?;
    }
    debug!(stripped = stripped.constructs, "normalized typed lua");
    Ok(NormalizedSource {
        code,
        stripped: stripped.constructs,
    })
}

/// Transport shape of a normalization result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizeOutcome {
    /// Whether normalization succeeded.
    pub success: bool,
    /// Stripped code on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Error message on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Error position on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
}

impl From<Result<NormalizedSource, NormalizeError>> for NormalizeOutcome {
    fn from(result: Result<NormalizedSource, NormalizeError>) -> Self {
        match result {
            Ok(normalized) => Self {
                success: true,
                code: Some(normalized.code),
                error: None,
                location: None,
            },
            Err(e) => Self {
                success: false,
                code: None,
                error: Some(e.message),
                location: Some(e.location),
            },
        }
    }
}

fn check_balance(source: &str, tokens: &[Token]) -> Result<(), NormalizeError> {
    let mut open: Vec<(char, Location)> = Vec::new();
    for token in tokens.iter().filter(|t| t.kind == TokenKind::Symbol) {
        let text = &source[token.start..token.end];
        match text {
            "(" | "[" | "{" => open.push((text.chars().next().unwrap_or('('), token.location)),
            ")" | "]" | "}" => {
                let expected = match text {
                    ")" => '(',
                    "]" => '[',
                    _ => '{',
                };
                match open.pop() {
                    Some((opener, _)) if opener == expected => {}
                    Some((opener, at)) => {
                        return Err(NormalizeError::new(
                            NormalizeErrorKind::Unbalanced,
                            format!("'{text}' does not match '{opener}' opened at {at}"),
                            token.location,
                        ))
                    }
                    None => {
                        return Err(NormalizeError::new(
                            NormalizeErrorKind::Unbalanced,
                            format!("unexpected '{text}'"),
                            token.location,
                        ))
                    }
                }
            }
            _ => {}
        }
    }
    match open.pop() {
        Some((opener, at)) => Err(NormalizeError::new(
            NormalizeErrorKind::Unbalanced,
            format!("unclosed '{opener}'"),
            at,
        )),
        None => Ok(()),
    }
}

/// Replaces every character inside `ranges` with a space, keeping line
/// breaks.
fn apply_blanks(source: &str, ranges: &[(usize, usize)]) -> String {
    let mut sorted = ranges.to_vec();
    sorted.sort_unstable();
    let mut out = String::with_capacity(source.len());
    let mut next = sorted.iter().peekable();
    let mut current: Option<(usize, usize)> = None;
    for (pos, ch) in source.char_indices() {
        while current.map_or(true, |(_, end)| pos >= end) {
            match next.peek() {
                Some(&&(start, end)) if start <= pos => {
                    current = Some((start, end));
                    next.next();
                }
                _ => break,
            }
        }
        let blanked = current.is_some_and(|(start, end)| pos >= start && pos < end);
        if blanked && ch != '\n' && ch != '\r' {
            out.push(' ');
        } else {
            out.push(ch);
        }
    }
    out
}

fn compile(code: &str, chunk_name: &str) -> Result<(), NormalizeError> {
    let lua = Lua::new_with(StdLib::NONE, LuaOptions::default()).map_err(|e| {
        NormalizeError::new(NormalizeErrorKind::Syntax, e.to_string(), Location::new(1, 1))
    })?;
    match lua.load(code).set_name(format!("={chunk_name}")).into_function() {
        Ok(_) => Ok(()),
        Err(mlua::Error::SyntaxError { message, .. }) => Err(syntax_error(code, chunk_name, &message)),
        Err(other) => Err(NormalizeError::new(
            NormalizeErrorKind::Syntax,
            other.to_string(),
            Location::new(1, 1),
        )),
    }
}

/// Maps `name:LINE: message` to a location at the first non-blank
/// column of that line.
fn syntax_error(code: &str, chunk_name: &str, message: &str) -> NormalizeError {
    let parsed = message
        .strip_prefix(chunk_name)
        .and_then(|rest| rest.strip_prefix(':'))
        .and_then(|rest| rest.split_once(':'))
        .and_then(|(line, text)| Some((line.parse::<u32>().ok()?, text.trim())));
    let (line, text) = parsed.unwrap_or((1, message));
    let column = code
        .lines()
        .nth(line.saturating_sub(1) as usize)
        .map_or(1, |l| l.chars().take_while(|c| c.is_whitespace()).count() + 1);
    NormalizeError::new(
        NormalizeErrorKind::Syntax,
        text,
        Location::new(line, u32::try_from(column).unwrap_or(1)),
    )
}
