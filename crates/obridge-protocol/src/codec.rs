//! Primitive field codecs: little-endian fixed-width numbers, 7-bit varints,
//! length-prefixed UTF-8 strings and raw byte runs.
//!
//! Reading comes in two flavours: [`WireReader`] pulls fields from a socket,
//! the `get_*` functions decode from an in-memory [`Buf`].

use crate::error::WireError;
use bytes::{Buf, BufMut};
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::{Mutex, MutexGuard};

pub const MAX_VAR_UINT_BYTES: usize = 5;
pub const MAX_LOGIN_FIELD_BYTES: usize = 1024;
pub const MAX_CONNECTION_STRING_BYTES: usize = 4 * 1024;
pub const MAX_SQL_BYTES: usize = 1024 * 1024;

/// Accumulates 7-bit groups, least significant first.
#[derive(Debug, Default)]
struct VarUIntAccumulator {
    value: u64,
    shift: u32,
}

impl VarUIntAccumulator {
    fn push(&mut self, byte: u8) -> Result<Option<u32>, WireError> {
        self.value |= u64::from(byte & 0x7F) << self.shift;
        if byte & 0x80 == 0 {
            return u32::try_from(self.value)
                .map(Some)
                .map_err(|_| WireError::VarIntTooLong);
        }
        self.shift += 7;
        if self.shift >= 7 * MAX_VAR_UINT_BYTES as u32 {
            return Err(WireError::VarIntTooLong);
        }
        Ok(None)
    }
}

/// Reads protocol fields from a byte stream. Only one logical read may be
/// pending at a time; overlapping reads fail with
/// [`WireError::ConcurrentReadViolation`] instead of interleaving bytes.
pub struct WireReader<R> {
    inner: Mutex<R>,
}

impl<R: AsyncRead + Unpin> WireReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner: Mutex::new(inner),
        }
    }

    pub fn into_inner(self) -> R {
        self.inner.into_inner()
    }

    fn begin(&self) -> Result<MutexGuard<'_, R>, WireError> {
        self.inner
            .try_lock()
            .map_err(|_| WireError::ConcurrentReadViolation)
    }

    pub async fn read_u8(&self) -> Result<u8, WireError> {
        let mut stream = self.begin()?;
        let [byte] = read_array::<_, 1>(&mut *stream).await?;
        Ok(byte)
    }

    pub async fn read_bool(&self) -> Result<bool, WireError> {
        Ok(self.read_u8().await? != 0)
    }

    pub async fn read_i16(&self) -> Result<i16, WireError> {
        let mut stream = self.begin()?;
        Ok(i16::from_le_bytes(read_array(&mut *stream).await?))
    }

    pub async fn read_u16(&self) -> Result<u16, WireError> {
        let mut stream = self.begin()?;
        Ok(u16::from_le_bytes(read_array(&mut *stream).await?))
    }

    pub async fn read_i32(&self) -> Result<i32, WireError> {
        let mut stream = self.begin()?;
        Ok(i32::from_le_bytes(read_array(&mut *stream).await?))
    }

    pub async fn read_u32(&self) -> Result<u32, WireError> {
        let mut stream = self.begin()?;
        Ok(u32::from_le_bytes(read_array(&mut *stream).await?))
    }

    pub async fn read_i64(&self) -> Result<i64, WireError> {
        let mut stream = self.begin()?;
        Ok(i64::from_le_bytes(read_array(&mut *stream).await?))
    }

    pub async fn read_f32(&self) -> Result<f32, WireError> {
        let mut stream = self.begin()?;
        Ok(f32::from_le_bytes(read_array(&mut *stream).await?))
    }

    pub async fn read_f64(&self) -> Result<f64, WireError> {
        let mut stream = self.begin()?;
        Ok(f64::from_le_bytes(read_array(&mut *stream).await?))
    }

    pub async fn read_var_uint(&self) -> Result<u32, WireError> {
        let mut stream = self.begin()?;
        read_var_uint_from(&mut *stream).await
    }

    /// Read a length-prefixed UTF-8 string of at most `max` bytes.
    pub async fn read_string(&self, max: usize) -> Result<String, WireError> {
        let mut stream = self.begin()?;
        let length = read_var_uint_from(&mut *stream).await? as usize;
        if length == 0 {
            return Ok(String::new());
        }
        if length > max {
            return Err(WireError::StringTooLarge { length, max });
        }
        let mut buf = vec![0u8; length];
        read_exact(&mut *stream, &mut buf).await?;
        String::from_utf8(buf).map_err(|_| WireError::InvalidUtf8)
    }

    pub async fn read_bytes(&self, count: usize) -> Result<Vec<u8>, WireError> {
        let mut stream = self.begin()?;
        let mut buf = vec![0u8; count];
        read_exact(&mut *stream, &mut buf).await?;
        Ok(buf)
    }

    /// Read a varint length prefix followed by that many bytes.
    pub async fn read_blob(&self, max: usize) -> Result<Vec<u8>, WireError> {
        let mut stream = self.begin()?;
        let length = read_var_uint_from(&mut *stream).await? as usize;
        if length > max {
            return Err(WireError::StringTooLarge { length, max });
        }
        let mut buf = vec![0u8; length];
        read_exact(&mut *stream, &mut buf).await?;
        Ok(buf)
    }
}

async fn read_exact<R: AsyncRead + Unpin>(stream: &mut R, buf: &mut [u8]) -> Result<(), WireError> {
    match stream.read_exact(buf).await {
        Ok(_) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => Err(WireError::TruncatedStream),
        Err(err) => Err(WireError::Io(err)),
    }
}

async fn read_array<R: AsyncRead + Unpin, const N: usize>(stream: &mut R) -> Result<[u8; N], WireError> {
    let mut buf = [0u8; N];
    read_exact(stream, &mut buf).await?;
    Ok(buf)
}

async fn read_var_uint_from<R: AsyncRead + Unpin>(stream: &mut R) -> Result<u32, WireError> {
    let mut acc = VarUIntAccumulator::default();
    loop {
        let [byte] = read_array::<_, 1>(stream).await?;
        if let Some(value) = acc.push(byte)? {
            return Ok(value);
        }
    }
}

pub fn put_var_uint<B: BufMut>(buf: &mut B, value: u32) {
    let mut v = value;
    while v >= 0x80 {
        buf.put_u8((v as u8) | 0x80);
        v >>= 7;
    }
    buf.put_u8(v as u8);
}

pub fn put_string<B: BufMut>(buf: &mut B, value: &str) {
    put_var_uint(buf, value.len() as u32);
    buf.put_slice(value.as_bytes());
}

pub fn put_bool<B: BufMut>(buf: &mut B, value: bool) {
    buf.put_u8(u8::from(value));
}

fn ensure<B: Buf>(buf: &B, needed: usize) -> Result<(), WireError> {
    if buf.remaining() < needed {
        return Err(WireError::TruncatedStream);
    }
    Ok(())
}

pub fn get_u8<B: Buf>(buf: &mut B) -> Result<u8, WireError> {
    ensure(buf, 1)?;
    Ok(buf.get_u8())
}

pub fn get_bool<B: Buf>(buf: &mut B) -> Result<bool, WireError> {
    Ok(get_u8(buf)? != 0)
}

pub fn get_i16<B: Buf>(buf: &mut B) -> Result<i16, WireError> {
    ensure(buf, 2)?;
    Ok(buf.get_i16_le())
}

pub fn get_u32<B: Buf>(buf: &mut B) -> Result<u32, WireError> {
    ensure(buf, 4)?;
    Ok(buf.get_u32_le())
}

pub fn get_f32<B: Buf>(buf: &mut B) -> Result<f32, WireError> {
    ensure(buf, 4)?;
    Ok(buf.get_f32_le())
}

pub fn get_f64<B: Buf>(buf: &mut B) -> Result<f64, WireError> {
    ensure(buf, 8)?;
    Ok(buf.get_f64_le())
}

pub fn get_var_uint<B: Buf>(buf: &mut B) -> Result<u32, WireError> {
    let mut acc = VarUIntAccumulator::default();
    loop {
        if let Some(value) = acc.push(get_u8(buf)?)? {
            return Ok(value);
        }
    }
}

pub fn get_string<B: Buf>(buf: &mut B, max: usize) -> Result<String, WireError> {
    let length = get_var_uint(buf)? as usize;
    if length == 0 {
        return Ok(String::new());
    }
    if length > max {
        return Err(WireError::StringTooLarge { length, max });
    }
    let bytes = get_bytes(buf, length)?;
    String::from_utf8(bytes).map_err(|_| WireError::InvalidUtf8)
}

pub fn get_bytes<B: Buf>(buf: &mut B, count: usize) -> Result<Vec<u8>, WireError> {
    ensure(buf, count)?;
    let mut out = vec![0u8; count];
    buf.copy_to_slice(&mut out);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    fn encode(value: u32) -> Vec<u8> {
        let mut buf = BytesMut::new();
        put_var_uint(&mut buf, value);
        buf.to_vec()
    }

    #[test]
    fn var_uint_boundaries() {
        for value in [0u32, 1, 0x7F, 0x80, 0x3FFF, 0x4000, 0x1F_FFFF, 0x0FFF_FFFF, u32::MAX] {
            let bytes = encode(value);
            assert!(bytes.len() <= MAX_VAR_UINT_BYTES);
            assert_eq!(get_var_uint(&mut bytes.as_slice()).expect("decode"), value);
        }
        assert_eq!(encode(0x80), vec![0x80, 0x01]);
        assert_eq!(encode(u32::MAX).len(), 5);
    }

    #[test]
    fn var_uint_rejects_sixth_byte() {
        let bytes = [0x80u8, 0x80, 0x80, 0x80, 0x80, 0x01];
        assert!(matches!(
            get_var_uint(&mut &bytes[..]),
            Err(WireError::VarIntTooLong)
        ));
    }

    #[test]
    fn empty_string_is_single_zero_byte() {
        let mut buf = BytesMut::new();
        put_string(&mut buf, "");
        assert_eq!(buf.to_vec(), vec![0x00]);
        assert_eq!(get_string(&mut &buf[..], 0).expect("decode"), "");
    }

    #[test]
    fn string_over_limit_is_rejected() {
        let mut buf = BytesMut::new();
        put_string(&mut buf, "héllo");
        let err = get_string(&mut &buf[..], 5).expect_err("too large");
        assert!(matches!(err, WireError::StringTooLarge { length: 6, max: 5 }));
    }

    #[test]
    fn truncated_fields_fail() {
        assert!(matches!(get_f64(&mut &[0u8; 7][..]), Err(WireError::TruncatedStream)));
        assert!(matches!(get_var_uint(&mut &[0x80u8][..]), Err(WireError::TruncatedStream)));
    }

    #[tokio::test]
    async fn reader_reads_little_endian_fields() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&(-2i16).to_le_bytes());
        bytes.extend_from_slice(&0xDEAD_BEEFu32.to_le_bytes());
        bytes.extend_from_slice(&1.5f64.to_le_bytes());
        bytes.extend_from_slice(&encode(300));
        bytes.push(3);
        bytes.extend_from_slice(b"abc");
        let reader = WireReader::new(&bytes[..]);
        assert_eq!(reader.read_i16().await.expect("i16"), -2);
        assert_eq!(reader.read_u32().await.expect("u32"), 0xDEAD_BEEF);
        assert_eq!(reader.read_f64().await.expect("f64"), 1.5);
        assert_eq!(reader.read_var_uint().await.expect("varint"), 300);
        assert_eq!(reader.read_string(16).await.expect("string"), "abc");
        assert!(matches!(reader.read_u8().await, Err(WireError::TruncatedStream)));
    }

    #[tokio::test]
    async fn overlapping_reads_are_rejected() {
        let (_client, server) = tokio::io::duplex(16);
        let reader = WireReader::new(server);
        let pending = reader.read_u8();
        tokio::pin!(pending);
        // Poll once so the first read holds the stream.
        assert!(futures_poll_once(pending.as_mut()).await.is_none());
        assert!(matches!(
            reader.read_u8().await,
            Err(WireError::ConcurrentReadViolation)
        ));
    }

    async fn futures_poll_once<F: std::future::Future + Unpin>(fut: F) -> Option<F::Output> {
        tokio::select! {
            biased;
            out = fut => Some(out),
            _ = tokio::task::yield_now() => None,
        }
    }
}
