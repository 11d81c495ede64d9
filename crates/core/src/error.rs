use thiserror::Error;

#[derive(Error, Debug)]
pub enum WjglmError {
    #[error("Data error: {0}")]
    Data(String),

    #[error("Column '{0}' not found in input table")]
    ColumnNotFound(String),

    #[error("Dimension mismatch: expected {expected}, got {got} in {context}")]
    DimensionMismatch {
        expected: usize,
        got: usize,
        context: String,
    },

    #[error("Degenerate group {group}: {reason}")]
    DegenerateGroup { group: usize, reason: String },

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

pub type Result<T> = std::result::Result<T, WjglmError>;
