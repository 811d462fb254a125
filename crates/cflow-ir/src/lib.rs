//! Clight construction and the Cminor generation pipeline (spec §4.3-§4.5).
//!
//! Lowering runs as three stages over one translation unit:
//! [`simpl_expr`] extracts side effects from Cabs into Clight statements,
//! [`simpl_locals`] promotes address-untaken scalar locals to temporaries in
//! place, and `cminor_gen` (pending) erases types into explicit memory
//! chunks and operators, producing [`cminor::Program`].

pub mod clight;
pub mod cminor;
pub mod cminor_gen;
pub mod error;
pub mod simpl_expr;
pub mod simpl_locals;
pub mod type_resolve;

pub use error::LoweringError;
pub use simpl_expr::lower_program;

/// Runs the full Clight pipeline over a Cabs translation unit: SimplExpr,
/// SimplLocals in place, then Cminor generation.
pub fn lower_to_cminor(
    tu: &cflow_core::cabs::TranslationUnit,
    registry: &mut cflow_core::TypeRegistry,
) -> (cminor::Program, Vec<LoweringError>) {
    let (mut clight_program, errors) = simpl_expr::lower_program(tu, registry);
    simpl_locals::run(&mut clight_program);
    let cminor_program = cminor_gen::lower_program(&clight_program, registry);
    (cminor_program, errors)
}
