use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SelectError {
    #[error("{function}: unsupported construct reached instruction selection: {construct}")]
    UnsupportedConstruct { function: String, construct: String },

    #[error("{function}: goto targets undefined label `{label}`")]
    UndefinedLabel { function: String, label: String },
}
