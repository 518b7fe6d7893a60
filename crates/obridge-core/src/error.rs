use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum DriverError {
    #[error("{0}")]
    Connect(String),
    #[error("{0}")]
    Execution(String),
    #[error("column {ordinal}: expected {expected}, driver returned {found}")]
    TypeMismatch {
        ordinal: usize,
        expected: &'static str,
        found: &'static str,
    },
    #[error("no such column: {0}")]
    ColumnOutOfRange(usize),
    #[error("no such parameter: {0}")]
    UnknownParameter(String),
    #[error("connection closed")]
    Closed,
}

impl DriverError {
    pub fn connect(message: impl Into<String>) -> Self {
        Self::Connect(message.into())
    }

    pub fn execution(message: impl Into<String>) -> Self {
        Self::Execution(message.into())
    }
}
