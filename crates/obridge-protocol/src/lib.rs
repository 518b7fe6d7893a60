pub mod backend;
pub mod bits;
pub mod codec;
pub mod column;
pub mod error;
pub mod frontend;
pub mod messages;
pub mod response;
pub mod row;
pub mod values;

pub use codec::WireReader;
pub use column::{ColumnDescriptor, ColumnInfo};
pub use error::WireError;
pub use messages::{
    BackendMessage, Command, ConnectionCredentials, ErrorCode, Handshake, OutputParameter,
    QueryRequest, ResponseType, ServerMessage,
};
pub use response::Response;
pub use values::ValueCodec;

#[cfg(test)]
mod tests;
