//! Core error types shared by every stage of the pipeline.
//!
//! Uses `thiserror` for structured, matchable error variants, following the
//! same shape as the per-crate error enums further down the pipeline
//! (`PreprocessError`, `LoweringError`, `SelectError`, `RtlGenError`).

use thiserror::Error;

use crate::type_id::TypeId;

/// Errors produced by the type registry and other shared core machinery.
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum CoreError {
    /// Attempting to register a tag name (struct/union/enum) that already
    /// exists in the registry.
    #[error("duplicate tag name: '{name}'")]
    DuplicateTagName { name: String },

    /// A `TypeId` was not found in the type registry.
    #[error("type not found: {0}")]
    TypeNotFound(TypeId),

    /// A named tag (struct/union/enum) was referenced but never defined.
    #[error("undefined tag: '{name}'")]
    UndefinedTag { name: String },
}
