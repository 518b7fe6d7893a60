use crate::column::ColumnInfo;
use crate::error::WireError;
use obridge_core::{BoundParameter, FieldValue, ParameterDirection, TypeTag};
use std::fmt;

pub const PROTOCOL_VERSION: u8 = 1;
pub const HANDSHAKE_MAGIC: [u8; 4] = *b"OCON";
pub const HANDSHAKE_LEN: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseType {
    ConnectionSuccess,
    TableHeader,
    RowDataBatch,
    EndOfRowStream,
    Error,
    OracleQueryError,
}

impl ResponseType {
    pub fn wire_byte(self) -> u8 {
        match self {
            ResponseType::ConnectionSuccess => 0x00,
            ResponseType::TableHeader => 0x01,
            ResponseType::RowDataBatch => 0x02,
            ResponseType::EndOfRowStream => 0x03,
            ResponseType::Error => 0x10,
            ResponseType::OracleQueryError => 0x11,
        }
    }

    pub fn from_wire(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(ResponseType::ConnectionSuccess),
            0x01 => Some(ResponseType::TableHeader),
            0x02 => Some(ResponseType::RowDataBatch),
            0x03 => Some(ResponseType::EndOfRowStream),
            0x10 => Some(ResponseType::Error),
            0x11 => Some(ResponseType::OracleQueryError),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    ConnectionModeDisabled,
    ConnectionFailed,
    QueryCancelledByClient,
    QueryExecutionFailed,
}

impl ErrorCode {
    pub fn wire_byte(self) -> u8 {
        match self {
            ErrorCode::ConnectionModeDisabled => 0x01,
            ErrorCode::ConnectionFailed => 0x02,
            ErrorCode::QueryCancelledByClient => 0x20,
            ErrorCode::QueryExecutionFailed => 0x30,
        }
    }

    pub fn from_wire(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(ErrorCode::ConnectionModeDisabled),
            0x02 => Some(ErrorCode::ConnectionFailed),
            0x20 => Some(ErrorCode::QueryCancelledByClient),
            0x30 => Some(ErrorCode::QueryExecutionFailed),
            _ => None,
        }
    }
}

/// Command bytes accepted in the session command loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    SubmitQuery,
    SubmitParameterizedQuery,
    StopQuery,
}

impl Command {
    pub fn wire_byte(self) -> u8 {
        match self {
            Command::SubmitQuery => 0x20,
            Command::SubmitParameterizedQuery => 0x21,
            Command::StopQuery => 0x30,
        }
    }

    pub fn from_wire(byte: u8) -> Option<Self> {
        match byte {
            0x20 => Some(Command::SubmitQuery),
            0x21 => Some(Command::SubmitParameterizedQuery),
            0x30 => Some(Command::StopQuery),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Handshake {
    pub compression_requested: bool,
}

impl Handshake {
    pub fn parse(bytes: &[u8]) -> Result<Self, WireError> {
        if bytes.len() != HANDSHAKE_LEN {
            return Err(WireError::protocol("wrong header length"));
        }
        if bytes[..4] != HANDSHAKE_MAGIC {
            return Err(WireError::protocol("wrong header"));
        }
        Ok(Self {
            compression_requested: bytes[5] != 0,
        })
    }

    pub fn encode(&self) -> [u8; HANDSHAKE_LEN] {
        let mut bytes = [0u8; HANDSHAKE_LEN];
        bytes[..4].copy_from_slice(&HANDSHAKE_MAGIC);
        bytes[5] = u8::from(self.compression_requested);
        bytes
    }
}

pub const CREDENTIALS_PROXY: u8 = 2;
pub const CREDENTIALS_FULL_PROXY: u8 = 3;

/// Credentials presented by the client right after the handshake. They are
/// consumed once to open the upstream connection.
#[derive(Clone, PartialEq, Eq)]
pub enum ConnectionCredentials {
    Proxy {
        server: String,
        login: String,
        password: String,
    },
    External {
        connection_string: String,
    },
}

impl fmt::Debug for ConnectionCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionCredentials::Proxy { server, login, .. } => f
                .debug_struct("Proxy")
                .field("server", server)
                .field("login", login)
                .field("password", &"<redacted>")
                .finish(),
            ConnectionCredentials::External { .. } => f
                .debug_struct("External")
                .field("connection_string", &"<redacted>")
                .finish(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryRequest {
    pub sql: String,
    pub parameters: Vec<BoundParameter>,
}

impl QueryRequest {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            parameters: Vec::new(),
        }
    }
}

/// Parameter value read back after execution and returned with the end of
/// the row stream.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputParameter {
    pub name: String,
    pub type_tag: TypeTag,
    pub direction: ParameterDirection,
    pub precision: u8,
    pub value: FieldValue,
}

/// Messages the gateway composes outside of row streaming.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendMessage {
    ConnectionSuccess { compression: bool },
    Error { code: ErrorCode, message: String },
    OracleQueryError { message: String },
    EndOfRowStream {
        records_affected: u64,
        output: Vec<OutputParameter>,
    },
}

impl BackendMessage {
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        BackendMessage::Error {
            code,
            message: message.into(),
        }
    }
}

/// A decoded server message, as seen by a client.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    ConnectionSuccess {
        compression: bool,
        protocol_version: u8,
    },
    TableHeader(Vec<ColumnInfo>),
    Row(Vec<FieldValue>),
    EndOfRowStream {
        records_affected: u32,
        output: Vec<OutputParameter>,
    },
    Error {
        code: ErrorCode,
        message: String,
    },
    OracleQueryError {
        message: String,
    },
}
