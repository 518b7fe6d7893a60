use obridge_core::TypeTag;
use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WireError {
    #[error("stream ended before the field was complete")]
    TruncatedStream,
    #[error("variable length integer is longer than 5 bytes")]
    VarIntTooLong,
    #[error("string length ({length}) exceeds max string bytes {max}")]
    StringTooLarge { length: usize, max: usize },
    #[error("another read is already in progress")]
    ConcurrentReadViolation,
    #[error("invalid utf-8 in string field")]
    InvalidUtf8,
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("invalid decimal number: {0:?}")]
    InvalidNumber(String),
    #[error("decimal scale {0} cannot be encoded")]
    NumberOutOfRange(i64),
    #[error("{0} is out of the encodable range")]
    ValueOutOfRange(String),
    #[error("unknown type tag {0:#04x}")]
    UnknownTypeTag(u8),
    #[error("{tag:?} column cannot encode a {found} value")]
    UnexpectedValue { tag: TypeTag, found: &'static str },
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl WireError {
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }

    /// Whether the error leaves the connection in an unknown framing state.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            WireError::InvalidNumber(_)
                | WireError::NumberOutOfRange(_)
                | WireError::ValueOutOfRange(_)
                | WireError::UnexpectedValue { .. }
        )
    }
}
