use thiserror::Error;

/// Errors raised while parsing shared rigscan types.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("Unknown vendor family: {0}")]
    UnknownFamily(String),

    #[error("Unknown adapter kind: {0}")]
    UnknownAdapter(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;
