//! Lowering error types for SimplExpr, SimplLocals, and Cminor generation.

use thiserror::Error;

/// Errors raised while lowering one stage of the IR pipeline into the next.
/// Every variant names the offending source construct, since these surface
/// as internal-compiler-error diagnostics rather than user-facing ones
/// (malformed input should have already been rejected by the parser).
#[derive(Debug, Error, Clone, PartialEq)]
pub enum LoweringError {
    #[error("unresolved identifier '{name}'")]
    UnresolvedIdentifier { name: String },

    #[error("unknown type '{ty}'")]
    UnknownType { ty: String },

    #[error("'{construct}' is not supported by this lowering stage")]
    UnsupportedConstruct { construct: String },

    #[error("break outside of a loop or switch")]
    BreakOutsideLoop,

    #[error("continue outside of a loop")]
    ContinueOutsideLoop,

    #[error("goto to undefined label '{label}'")]
    UndefinedLabel { label: String },

    #[error("call to undeclared function '{name}'")]
    UndeclaredFunction { name: String },

    #[error("wrong number of arguments calling '{name}': expected {expected}, found {found}")]
    ArgumentCountMismatch { name: String, expected: usize, found: usize },
}
