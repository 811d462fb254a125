use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum RtlGenError {
    #[error("{function}: goto references label `{label}` that is never defined")]
    UndefinedLabel { function: String, label: String },

    #[error("{function}: node {node} references successor {succ} which is missing from the function's code map")]
    DanglingSuccessor { function: String, node: u32, succ: u32 },
}
