use crate::codec::{put_bool, put_string, put_var_uint};
use crate::messages::ResponseType;
use bytes::{BufMut, BytesMut};
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// One outbound protocol message: a type byte followed by its fields,
/// composed in memory and written to the peer in a single call.
#[derive(Debug, Clone)]
pub struct Response {
    buf: BytesMut,
}

impl Response {
    pub fn new(kind: ResponseType) -> Self {
        let mut buf = BytesMut::with_capacity(64);
        buf.put_u8(kind.wire_byte());
        Self { buf }
    }

    pub fn write_u8(&mut self, value: u8) {
        self.buf.put_u8(value);
    }

    pub fn write_bool(&mut self, value: bool) {
        put_bool(&mut self.buf, value);
    }

    pub fn write_var_uint(&mut self, value: u32) {
        put_var_uint(&mut self.buf, value);
    }

    pub fn write_string(&mut self, value: &str) {
        put_string(&mut self.buf, value);
    }

    /// Raw access for codecs that write through [`BufMut`].
    pub fn payload_mut(&mut self) -> &mut BytesMut {
        &mut self.buf
    }

    /// The full message including the leading type byte.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub async fn send<S: AsyncWrite + Unpin + ?Sized>(&self, stream: &mut S) -> std::io::Result<()> {
        stream.write_all(&self.buf).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_starts_with_type_byte() {
        let mut response = Response::new(ResponseType::Error);
        response.write_u8(0x02);
        response.write_string("boom");
        response.write_bool(true);
        response.write_var_uint(300);
        assert_eq!(
            response.as_bytes(),
            &[0x10, 0x02, 0x04, b'b', b'o', b'o', b'm', 0x01, 0xAC, 0x02]
        );
    }
}
