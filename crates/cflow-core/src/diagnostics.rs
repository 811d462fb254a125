//! Diagnostic accumulation shared by the preprocessor and parser.
//!
//! Both stages synchronize past an error and keep going (spec: "accumulate,
//! then gate the next stage"), so neither can simply return on the first
//! `Err`. A [`DiagnosticBag`] collects every diagnostic produced during a
//! stage; the driver checks `is_empty()` once, at the stage boundary.

use serde::{Deserialize, Serialize};

use crate::loc::SourceLoc;

/// Severity of a reported diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    /// `#warning`, recoverable lex errors: printed, compilation continues.
    Warning,
    /// Parse errors, `#error`, unresolvable lowering constructs: printed,
    /// the enclosing stage (and therefore the whole unit) fails.
    Error,
}

/// A single diagnostic message, optionally tied to a source location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    pub loc: Option<SourceLoc>,
}

impl Diagnostic {
    pub fn error(message: impl Into<String>, loc: Option<SourceLoc>) -> Self {
        Diagnostic {
            severity: Severity::Error,
            message: message.into(),
            loc,
        }
    }

    pub fn warning(message: impl Into<String>, loc: Option<SourceLoc>) -> Self {
        Diagnostic {
            severity: Severity::Warning,
            message: message.into(),
            loc,
        }
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.loc {
            Some(loc) => write!(f, "{}: {}", loc, self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

/// An accumulator for diagnostics raised during a single pipeline stage.
///
/// An empty bag on stage completion means the stage succeeded; the driver
/// checks this once before handing the stage's output to the next stage.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiagnosticBag {
    diagnostics: Vec<Diagnostic>,
}

impl DiagnosticBag {
    pub fn new() -> Self {
        DiagnosticBag::default()
    }

    pub fn push(&mut self, diag: Diagnostic) {
        self.diagnostics.push(diag);
    }

    pub fn error(&mut self, message: impl Into<String>, loc: Option<SourceLoc>) {
        self.push(Diagnostic::error(message, loc));
    }

    pub fn warning(&mut self, message: impl Into<String>, loc: Option<SourceLoc>) {
        self.push(Diagnostic::warning(message, loc));
    }

    /// `true` iff no diagnostic of [`Severity::Error`] was recorded. Warnings
    /// alone do not fail a stage.
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| matches!(d.severity, Severity::Error))
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }

    pub fn len(&self) -> usize {
        self.diagnostics.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter()
    }

    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.diagnostics
    }

    pub fn extend(&mut self, other: DiagnosticBag) {
        self.diagnostics.extend(other.diagnostics);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_bag_has_no_errors() {
        let bag = DiagnosticBag::new();
        assert!(bag.is_empty());
        assert!(!bag.has_errors());
    }

    #[test]
    fn warning_only_bag_has_no_errors() {
        let mut bag = DiagnosticBag::new();
        bag.warning("unused variable", None);
        assert!(!bag.is_empty());
        assert!(!bag.has_errors());
    }

    #[test]
    fn error_bag_has_errors() {
        let mut bag = DiagnosticBag::new();
        bag.warning("unused variable", None);
        bag.error("unexpected token", Some(SourceLoc::new("a.c", 1, 1)));
        assert!(bag.has_errors());
        assert_eq!(bag.len(), 2);
    }

    #[test]
    fn display_with_and_without_location() {
        let with_loc = Diagnostic::error("bad", Some(SourceLoc::new("a.c", 2, 3)));
        assert_eq!(format!("{}", with_loc), "a.c:2:3: bad");

        let without_loc = Diagnostic::error("bad", None);
        assert_eq!(format!("{}", without_loc), "bad");
    }

    #[test]
    fn extend_merges_bags() {
        let mut a = DiagnosticBag::new();
        a.error("first", None);
        let mut b = DiagnosticBag::new();
        b.error("second", None);
        a.extend(b);
        assert_eq!(a.len(), 2);
    }
}
