//! Error types for the Lua host and the normalizer.

use serde::Serialize;
use std::fmt;
use tessera_types::ErrorCode;
use thiserror::Error;

/// Errors raised while preparing or finishing a Lua evaluation.
///
/// Guest faults are not errors at this level; they are reported as
/// [`EvalOutcome::Fault`](tessera_runtime::EvalOutcome::Fault).
#[derive(Debug, Error)]
pub enum LuaHostError {
    /// The Lua state could not be created or configured.
    #[error("lua state error: {0}")]
    State(#[from] mlua::Error),

    /// A value crossing the Lua boundary has no JSON representation.
    #[error("conversion error: {0}")]
    Conversion(String),
}

impl ErrorCode for LuaHostError {
    fn code(&self) -> &'static str {
        match self {
            Self::State(_) => "LUA_HOST_STATE",
            Self::Conversion(_) => "LUA_HOST_CONVERSION",
        }
    }

    fn is_recoverable(&self) -> bool {
        false
    }
}

/// A 1-based position in the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Location {
    /// Line number.
    pub line: u32,
    /// Column number, counted in characters.
    pub column: u32,
}

impl Location {
    /// Creates a location.
    #[must_use]
    pub const fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Which normalizer stage rejected the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NormalizeErrorKind {
    /// Unterminated string or comment, stray character, bad number.
    Lexical,
    /// Brackets do not pair up.
    Unbalanced,
    /// A type annotation or declaration could not be parsed.
    MalformedType,
    /// The stripped source does not compile.
    Syntax,
}

/// A located normalizer failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{location}: {message}")]
pub struct NormalizeError {
    /// Failing stage.
    pub kind: NormalizeErrorKind,
    /// Human-readable description.
    pub message: String,
    /// Where the problem was found.
    pub location: Location,
}

impl NormalizeError {
    pub(crate) fn new(kind: NormalizeErrorKind, message: impl Into<String>, location: Location) -> Self {
        Self {
            kind,
            message: message.into(),
            location,
        }
    }
}

impl ErrorCode for NormalizeError {
    fn code(&self) -> &'static str {
        match self.kind {
            NormalizeErrorKind::Lexical => "NORMALIZE_LEXICAL",
            NormalizeErrorKind::Unbalanced => "NORMALIZE_UNBALANCED",
            NormalizeErrorKind::MalformedType => "NORMALIZE_TYPE",
            NormalizeErrorKind::Syntax => "NORMALIZE_SYNTAX",
        }
    }

    fn is_recoverable(&self) -> bool {
        false
    }
}
