//! Error types for preprocessing and parsing.

use thiserror::Error;

/// Fatal preprocessor failures (spec §7). Non-fatal conditions (lex
/// recovery, `#warning`) go through a `DiagnosticBag` instead.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PreprocessError {
    #[error("{file}: #error {message}")]
    UserError { file: String, message: String },

    #[error("{file}: '{name}' file not found")]
    IncludeNotFound { file: String, name: String },

    #[error("circular include detected: {stack:?}")]
    CircularInclude { stack: Vec<String> },

    #[error("include nesting exceeds maximum depth of {max}")]
    ExcessiveIncludeDepth { max: u32 },

    #[error("unbalanced #if/#endif in {file}")]
    UnbalancedConditional { file: String },

    #[error("#else without matching #if in {file}")]
    StrayElse { file: String },

    #[error("#elif after #else in {file}")]
    ElifAfterElse { file: String },

    #[error("unterminated string literal in {file} at line {line}")]
    UnterminatedString { file: String, line: u32 },

    #[error("unterminated character constant in {file} at line {line}")]
    UnterminatedChar { file: String, line: u32 },

    #[error("wrong number of arguments to macro '{name}': expected {expected}, got {got}")]
    WrongMacroArgCount {
        name: String,
        expected: usize,
        got: usize,
    },

    #[error("unterminated argument list for macro '{name}'")]
    UnterminatedMacroArgs { name: String },

    #[error("'##' cannot appear at the start or end of a macro replacement list: '{name}'")]
    DanglingPaste { name: String },

    #[error("unknown directive '#{directive}' in {file}")]
    UnknownDirective { file: String, directive: String },

    #[error("malformed #if/#elif expression: {reason}")]
    MalformedExpression { reason: String },
}

/// A single parse error with location text baked in (the parser reports
/// through a `DiagnosticBag`; this type backs each entry).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct ParseError(pub String);
