pub mod cabs;
pub mod diagnostics;
pub mod error;
pub mod loc;
pub mod type_id;
pub mod types;

pub use diagnostics::{Diagnostic, DiagnosticBag, Severity};
pub use error::CoreError;
pub use loc::SourceLoc;
pub use type_id::{TypeId, TypeRegistry};
pub use types::{CType, FloatSize, IntSize};
