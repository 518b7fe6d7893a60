//! Sub-byte packing, most significant bit first within each byte.

use crate::error::WireError;

#[derive(Debug, Default)]
pub struct BitWriter {
    buffer: Vec<u8>,
    current: u8,
    // 0 = MSB
    position: u32,
}

impl BitWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_bit(&mut self, value: bool) {
        self.push_bits(u64::from(value), 1);
    }

    /// Append the low `count` bits of `value`, high bit first.
    pub fn push_bits(&mut self, value: u64, count: u32) {
        let mut remaining = count;
        while remaining > 0 {
            let available = 8 - self.position;
            let take = remaining.min(available);
            let shift = remaining - take;
            let mask = (1u64 << take) - 1;
            let bits = ((value >> shift) & mask) as u8;
            self.current |= bits << (available - take);
            self.position += take;
            remaining -= take;
            if self.position == 8 {
                self.flush_current();
            }
        }
    }

    /// Pad the partial byte with zeros and return the packed bytes.
    pub fn finish(mut self) -> Vec<u8> {
        if self.position > 0 {
            self.flush_current();
        }
        self.buffer
    }

    fn flush_current(&mut self) {
        self.buffer.push(self.current);
        self.current = 0;
        self.position = 0;
    }
}

#[derive(Debug)]
pub struct BitReader<'a> {
    bytes: &'a [u8],
    bit: usize,
}

impl<'a> BitReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, bit: 0 }
    }

    pub fn read_bit(&mut self) -> Result<bool, WireError> {
        Ok(self.read_bits(1)? == 1)
    }

    pub fn read_bits(&mut self, count: u32) -> Result<u64, WireError> {
        let mut value = 0u64;
        for _ in 0..count {
            let byte = *self
                .bytes
                .get(self.bit / 8)
                .ok_or(WireError::TruncatedStream)?;
            let bit = (byte >> (7 - (self.bit % 8))) & 1;
            value = (value << 1) | u64::from(bit);
            self.bit += 1;
        }
        Ok(value)
    }
}
