//! Source locations threaded through every IR node.
//!
//! Every Cabs, Clight, and Cminor node carries a [`SourceLoc`] so that
//! internal-compiler-error diagnostics further down the pipeline can point
//! at real source text instead of just naming the offending construct.

use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

/// A location in a source file, after preprocessing.
///
/// `file` is interned behind an `Rc<str>` so that cloning a location (which
/// happens constantly while threading it through tree nodes) does not repeat
/// the file name allocation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceLoc {
    pub file: Rc<str>,
    pub line: u32,
    pub col: u32,
}

impl SourceLoc {
    pub fn new(file: impl Into<Rc<str>>, line: u32, col: u32) -> Self {
        SourceLoc {
            file: file.into(),
            line,
            col,
        }
    }

    /// A placeholder location for synthesized nodes (e.g. compiler-inserted
    /// temporaries) that have no direct source counterpart.
    pub fn synthetic() -> Self {
        SourceLoc {
            file: Rc::from("<synthetic>"),
            line: 0,
            col: 0,
        }
    }
}

impl fmt::Display for SourceLoc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.col)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_format() {
        let loc = SourceLoc::new("main.c", 10, 5);
        assert_eq!(format!("{}", loc), "main.c:10:5");
    }

    #[test]
    fn synthetic_is_recognizable() {
        let loc = SourceLoc::synthetic();
        assert_eq!(&*loc.file, "<synthetic>");
    }
}
