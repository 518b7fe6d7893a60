//! Byte stream plumbing shared by a session and its running query.

use async_compression::tokio::bufread::ZstdDecoder;
use async_compression::tokio::write::ZstdEncoder;
use obridge_protocol::Response;
use std::io;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;

pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

pub fn split<S>(stream: S) -> (BoxedReader, BoxedWriter)
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (reader, writer) = tokio::io::split(stream);
    (Box::new(reader), Box::new(writer))
}

pub fn decompressing(reader: BoxedReader) -> BoxedReader {
    Box::new(ZstdDecoder::new(BufReader::new(reader)))
}

pub fn compressing(writer: BoxedWriter) -> BoxedWriter {
    Box::new(ZstdEncoder::new(writer))
}

/// The write half of a connection. Every message is written while holding
/// the lock, so messages from the session loop and a running query never
/// interleave.
#[derive(Clone)]
pub struct Outbound {
    inner: Arc<Mutex<BoxedWriter>>,
}

impl Outbound {
    pub fn new(writer: BoxedWriter) -> Self {
        Self {
            inner: Arc::new(Mutex::new(writer)),
        }
    }

    pub async fn send(&self, response: &Response) -> io::Result<()> {
        let mut writer = self.inner.lock().await;
        response.send(&mut *writer).await
    }

    pub async fn send_and_flush(&self, response: &Response) -> io::Result<()> {
        let mut writer = self.inner.lock().await;
        response.send(&mut *writer).await?;
        writer.flush().await
    }

    pub async fn flush(&self) -> io::Result<()> {
        self.inner.lock().await.flush().await
    }

    /// Swap the underlying writer, e.g. to start compressing.
    pub async fn wrap(&self, wrap: impl FnOnce(BoxedWriter) -> BoxedWriter) {
        let mut writer = self.inner.lock().await;
        let current = std::mem::replace(&mut *writer, Box::new(tokio::io::sink()));
        *writer = wrap(current);
    }

    /// Flush pending bytes, finish any compression frame and close the write side.
    pub async fn shutdown(&self) -> io::Result<()> {
        self.inner.lock().await.shutdown().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use obridge_protocol::ResponseType;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn compressed_messages_roundtrip() {
        let (client, server) = tokio::io::duplex(1024);
        let outbound = Outbound::new(Box::new(server));
        outbound.wrap(compressing).await;

        let mut response = Response::new(ResponseType::OracleQueryError);
        response.write_string(&"ORA-00942 ".repeat(20));
        outbound.send_and_flush(&response).await.expect("send");
        outbound.shutdown().await.expect("shutdown");
        drop(outbound);

        let mut reader = decompressing(Box::new(client));
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes).await.expect("read");
        assert_eq!(bytes, response.as_bytes());
    }
}
