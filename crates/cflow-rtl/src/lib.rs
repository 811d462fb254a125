//! RTLgen: CminorSel to RTL (spec §4.7), plus the RTL data model and the
//! textual printers used for debugging dumps and snapshot tests.

pub mod error;
pub mod printer;
pub mod rtl;
pub mod rtlgen;

pub use error::RtlGenError;
pub use rtlgen::gen_program;
