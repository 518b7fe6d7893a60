//! Server to client messages: encoding for the gateway, decoding for clients.

use crate::codec::{get_bool, get_string, get_u8, get_var_uint, put_bool, put_string, put_var_uint};
use crate::column::{decode_table_header, ColumnInfo};
use crate::error::WireError;
use crate::messages::{
    BackendMessage, ErrorCode, OutputParameter, ResponseType, ServerMessage, PROTOCOL_VERSION,
};
use crate::response::Response;
use crate::row::decode_row;
use crate::values::ValueCodec;
use bytes::{Buf, BufMut};
use obridge_core::{FieldValue, ParameterDirection, TypeTag};

const MAX_MESSAGE_TEXT: usize = 1024 * 1024;
const MAX_PARAMETER_NAME: usize = 1024;

pub fn encode(msg: &BackendMessage) -> Result<Response, WireError> {
    let response = match msg {
        BackendMessage::ConnectionSuccess { compression } => {
            let mut r = Response::new(ResponseType::ConnectionSuccess);
            r.write_bool(*compression);
            r.write_u8(PROTOCOL_VERSION);
            r
        }
        BackendMessage::Error { code, message } => {
            let mut r = Response::new(ResponseType::Error);
            r.write_u8(code.wire_byte());
            r.write_string(message);
            r
        }
        BackendMessage::OracleQueryError { message } => {
            let mut r = Response::new(ResponseType::OracleQueryError);
            r.write_string(message);
            r
        }
        BackendMessage::EndOfRowStream {
            records_affected,
            output,
        } => {
            let mut r = Response::new(ResponseType::EndOfRowStream);
            r.write_var_uint(u32::try_from(*records_affected).unwrap_or(u32::MAX));
            write_output_parameters(output, r.payload_mut())?;
            r
        }
    };
    Ok(response)
}

/// Output parameter block of `EndOfRowStream`. Values are encoded into a
/// scratch buffer first so a conversion failure writes nothing.
pub fn write_output_parameters<B: BufMut>(
    params: &[OutputParameter],
    out: &mut B,
) -> Result<(), WireError> {
    let mut block = Vec::new();
    put_var_uint(&mut block, params.len() as u32);
    for param in params {
        put_string(&mut block, &param.name);
        block.put_u8(param.type_tag.wire_byte());
        if param.type_tag.uses_precision() {
            block.put_u8(param.precision);
        }
        block.put_u8(param.direction.wire_byte());
        put_bool(&mut block, param.value.is_null());
        if !param.value.is_null() {
            ValueCodec::new(param.type_tag, param.precision).encode_framed(&param.value, &mut block)?;
        }
    }
    out.put_slice(&block);
    Ok(())
}

fn read_output_parameters<B: Buf>(buf: &mut B) -> Result<Vec<OutputParameter>, WireError> {
    let count = get_var_uint(buf)? as usize;
    let mut params = Vec::with_capacity(count.min(256));
    for _ in 0..count {
        let name = get_string(buf, MAX_PARAMETER_NAME)?;
        let tag_byte = get_u8(buf)?;
        let type_tag = TypeTag::from_wire(tag_byte).ok_or(WireError::UnknownTypeTag(tag_byte))?;
        let precision = if type_tag.uses_precision() { get_u8(buf)? } else { 0 };
        let direction_byte = get_u8(buf)?;
        let direction = ParameterDirection::from_wire(direction_byte).ok_or_else(|| {
            WireError::protocol(format!("unknown parameter direction {direction_byte}"))
        })?;
        let value = if get_bool(buf)? {
            FieldValue::Null
        } else {
            ValueCodec::new(type_tag, precision).decode(buf)?
        };
        params.push(OutputParameter {
            name,
            type_tag,
            direction,
            precision,
            value,
        });
    }
    Ok(params)
}

/// Decode one message. Row payloads need the columns of the preceding
/// `TableHeader`.
pub fn decode_message<B: Buf>(buf: &mut B, columns: &[ColumnInfo]) -> Result<ServerMessage, WireError> {
    let tag = get_u8(buf)?;
    let kind = ResponseType::from_wire(tag)
        .ok_or_else(|| WireError::protocol(format!("unknown response type {tag:#04x}")))?;
    let msg = match kind {
        ResponseType::ConnectionSuccess => ServerMessage::ConnectionSuccess {
            compression: get_bool(buf)?,
            protocol_version: get_u8(buf)?,
        },
        ResponseType::TableHeader => ServerMessage::TableHeader(decode_table_header(buf)?),
        ResponseType::RowDataBatch => ServerMessage::Row(decode_row(buf, columns)?),
        ResponseType::EndOfRowStream => ServerMessage::EndOfRowStream {
            records_affected: get_var_uint(buf)?,
            output: read_output_parameters(buf)?,
        },
        ResponseType::Error => {
            let byte = get_u8(buf)?;
            let code = ErrorCode::from_wire(byte)
                .ok_or_else(|| WireError::protocol(format!("unknown error code {byte:#04x}")))?;
            ServerMessage::Error {
                code,
                message: get_string(buf, MAX_MESSAGE_TEXT)?,
            }
        }
        ResponseType::OracleQueryError => ServerMessage::OracleQueryError {
            message: get_string(buf, MAX_MESSAGE_TEXT)?,
        },
    };
    Ok(msg)
}

/// Decode every message in `buf`, tracking the active column set across
/// headers.
pub fn decode_all<B: Buf>(buf: &mut B) -> Result<Vec<ServerMessage>, WireError> {
    let mut columns = Vec::new();
    let mut messages = Vec::new();
    while buf.has_remaining() {
        let msg = decode_message(buf, &columns)?;
        if let ServerMessage::TableHeader(header) = &msg {
            columns = header.clone();
        }
        messages.push(msg);
    }
    Ok(messages)
}
