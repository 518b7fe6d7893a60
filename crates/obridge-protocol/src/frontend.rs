//! Client to server messages. The `read_*` functions run on the gateway side
//! of the socket; the `encode_*` functions build the same bytes for clients.

use crate::codec::{put_string, put_var_uint, WireReader, MAX_CONNECTION_STRING_BYTES, MAX_LOGIN_FIELD_BYTES, MAX_SQL_BYTES};
use crate::error::WireError;
use crate::messages::{
    Command, ConnectionCredentials, Handshake, QueryRequest, CREDENTIALS_FULL_PROXY,
    CREDENTIALS_PROXY, HANDSHAKE_LEN,
};
use crate::values::ValueCodec;
use bytes::{BufMut, BytesMut};
use obridge_core::{BoundParameter, FieldValue, ParameterDirection, TypeTag};
use tokio::io::AsyncRead;

pub const MAX_PARAMETER_VALUE_BYTES: usize = 1024 * 1024;

pub async fn read_handshake<R: AsyncRead + Unpin>(reader: &WireReader<R>) -> Result<Handshake, WireError> {
    let bytes = reader.read_bytes(HANDSHAKE_LEN).await?;
    Handshake::parse(&bytes)
}

pub async fn read_credentials<R: AsyncRead + Unpin>(
    reader: &WireReader<R>,
) -> Result<ConnectionCredentials, WireError> {
    match reader.read_u8().await? {
        CREDENTIALS_PROXY => {
            let server = reader.read_string(MAX_LOGIN_FIELD_BYTES).await?;
            let login = reader.read_string(MAX_LOGIN_FIELD_BYTES).await?;
            let password = reader.read_string(MAX_LOGIN_FIELD_BYTES).await?;
            Ok(ConnectionCredentials::Proxy {
                server,
                login,
                password,
            })
        }
        CREDENTIALS_FULL_PROXY => Ok(ConnectionCredentials::External {
            connection_string: reader.read_string(MAX_CONNECTION_STRING_BYTES).await?,
        }),
        other => Err(WireError::protocol(format!("unknown credentials type {other}"))),
    }
}

/// Read the payload following a submit command byte. The whole payload is
/// consumed before any parameter value is decoded, so a value that fails to
/// convert leaves the stream at the next command.
pub async fn read_query_request<R: AsyncRead + Unpin>(
    reader: &WireReader<R>,
    command: Command,
) -> Result<QueryRequest, WireError> {
    let sql = reader.read_string(MAX_SQL_BYTES).await?;
    let mut request = QueryRequest::new(sql);
    if command != Command::SubmitParameterizedQuery {
        return Ok(request);
    }
    let count = reader.read_var_uint().await?;
    let mut raw = Vec::with_capacity((count as usize).min(256));
    for _ in 0..count {
        raw.push(read_parameter(reader).await?);
    }
    for (mut param, blob) in raw {
        if let Some(blob) = blob {
            let mut slice = &blob[..];
            param.value = ValueCodec::new(param.type_tag, param.precision).decode(&mut slice)?;
        }
        request.parameters.push(param);
    }
    Ok(request)
}

/// One parameter entry with its still-encoded value.
async fn read_parameter<R: AsyncRead + Unpin>(
    reader: &WireReader<R>,
) -> Result<(BoundParameter, Option<Vec<u8>>), WireError> {
    let name = reader.read_string(MAX_LOGIN_FIELD_BYTES).await?;
    let tag_byte = reader.read_u8().await?;
    let type_tag = TypeTag::from_wire(tag_byte).ok_or(WireError::UnknownTypeTag(tag_byte))?;
    let precision = if type_tag.uses_precision() {
        reader.read_u8().await?
    } else {
        0
    };
    let direction_byte = reader.read_u8().await?;
    let direction = ParameterDirection::from_wire(direction_byte).ok_or_else(|| {
        WireError::protocol(format!("unknown parameter direction {direction_byte}"))
    })?;

    let mut blob = None;
    if direction.carries_input() && reader.read_bool().await? {
        blob = Some(reader.read_blob(MAX_PARAMETER_VALUE_BYTES).await?);
    }
    let param = BoundParameter {
        name,
        type_tag,
        direction,
        precision,
        value: FieldValue::Null,
    };
    Ok((param, blob))
}

pub fn encode_credentials(credentials: &ConnectionCredentials) -> BytesMut {
    let mut buf = BytesMut::new();
    match credentials {
        ConnectionCredentials::Proxy {
            server,
            login,
            password,
        } => {
            buf.put_u8(CREDENTIALS_PROXY);
            put_string(&mut buf, server);
            put_string(&mut buf, login);
            put_string(&mut buf, password);
        }
        ConnectionCredentials::External { connection_string } => {
            buf.put_u8(CREDENTIALS_FULL_PROXY);
            put_string(&mut buf, connection_string);
        }
    }
    buf
}

/// Command byte plus payload. Requests without parameters use the plain
/// submit command.
pub fn encode_query(request: &QueryRequest) -> Result<BytesMut, WireError> {
    let mut buf = BytesMut::new();
    if request.parameters.is_empty() {
        buf.put_u8(Command::SubmitQuery.wire_byte());
        put_string(&mut buf, &request.sql);
        return Ok(buf);
    }
    buf.put_u8(Command::SubmitParameterizedQuery.wire_byte());
    put_string(&mut buf, &request.sql);
    put_var_uint(&mut buf, request.parameters.len() as u32);
    for param in &request.parameters {
        put_string(&mut buf, &param.name);
        buf.put_u8(param.type_tag.wire_byte());
        if param.type_tag.uses_precision() {
            buf.put_u8(param.precision);
        }
        buf.put_u8(param.direction.wire_byte());
        if !param.direction.carries_input() {
            continue;
        }
        if param.value.is_null() {
            buf.put_u8(0);
            continue;
        }
        let mut value = Vec::new();
        ValueCodec::new(param.type_tag, param.precision).encode_framed(&param.value, &mut value)?;
        buf.put_u8(1);
        put_var_uint(&mut buf, value.len() as u32);
        buf.put_slice(&value);
    }
    Ok(buf)
}

pub fn encode_stop() -> [u8; 1] {
    [Command::StopQuery.wire_byte()]
}
