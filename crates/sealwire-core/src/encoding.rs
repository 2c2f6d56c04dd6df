//! Integer codec used for chunk length prefixes and chunk counters.
//!
//! ```text
//! varint   unsigned LEB128, 1..=10 bytes
//! fixed1   1 byte
//! fixed2   2 bytes, big-endian
//! fixed4   4 bytes, big-endian
//! fixed8   8 bytes, big-endian
//! ```

use std::io::{self, Read};

use serde::{Deserialize, Serialize};

use crate::error::{SealError, SealResult};

/// Longest LEB128 encoding of a `u64`.
pub const MAX_VARINT_LEN: usize = 10;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IntEncoding {
    #[default]
    Varint,
    Fixed1,
    Fixed2,
    Fixed4,
    Fixed8,
}

impl IntEncoding {
    /// Encoded length of `value`, or `None` if it does not fit a fixed width.
    pub fn size(self, value: u64) -> Option<usize> {
        match self {
            IntEncoding::Varint => {
                let bits = 64 - value.leading_zeros() as usize;
                Some(bits.max(1).div_ceil(7))
            }
            IntEncoding::Fixed1 => (value <= u8::MAX as u64).then_some(1),
            IntEncoding::Fixed2 => (value <= u16::MAX as u64).then_some(2),
            IntEncoding::Fixed4 => (value <= u32::MAX as u64).then_some(4),
            IntEncoding::Fixed8 => Some(8),
        }
    }

    /// Longest encoding this scheme can produce.
    pub fn max_size(self) -> usize {
        match self {
            IntEncoding::Varint => MAX_VARINT_LEN,
            IntEncoding::Fixed1 => 1,
            IntEncoding::Fixed2 => 2,
            IntEncoding::Fixed4 => 4,
            IntEncoding::Fixed8 => 8,
        }
    }

    /// Append the encoding of `value` to `out`, returning the bytes written.
    pub fn encode(self, value: u64, out: &mut Vec<u8>) -> SealResult<usize> {
        let size = self.size(value).ok_or(SealError::IntTooWide {
            value,
            encoding: self,
        })?;
        match self {
            IntEncoding::Varint => {
                let mut v = value;
                while v >= 0x80 {
                    out.push((v as u8) | 0x80);
                    v >>= 7;
                }
                out.push(v as u8);
            }
            IntEncoding::Fixed1 => out.push(value as u8),
            IntEncoding::Fixed2 => out.extend_from_slice(&(value as u16).to_be_bytes()),
            IntEncoding::Fixed4 => out.extend_from_slice(&(value as u32).to_be_bytes()),
            IntEncoding::Fixed8 => out.extend_from_slice(&value.to_be_bytes()),
        }
        Ok(size)
    }

    /// Decode a value from the front of `data`, returning it with the number of
    /// bytes consumed. Short or malformed input is `CiphertextInvalid`.
    pub fn decode(self, data: &[u8]) -> SealResult<(u64, usize)> {
        match self {
            IntEncoding::Varint => {
                let mut acc = VarintAccumulator::default();
                for (i, &byte) in data.iter().enumerate() {
                    if acc.push(byte)? {
                        return Ok((acc.value, i + 1));
                    }
                }
                Err(SealError::CiphertextInvalid)
            }
            fixed => {
                let width = fixed.max_size();
                let bytes = data.get(..width).ok_or(SealError::CiphertextInvalid)?;
                Ok((be_to_u64(bytes), width))
            }
        }
    }

    /// Read one value from `source`.
    ///
    /// Returns `Ok(None)` when the source is already at its end, so callers can
    /// tell a clean chunk boundary from a value cut in half (`StreamTruncated`).
    pub fn read_from<R: Read + ?Sized>(self, source: &mut R) -> SealResult<Option<u64>> {
        match self {
            IntEncoding::Varint => {
                let mut acc = VarintAccumulator::default();
                let mut first = true;
                loop {
                    let Some(byte) = read_byte(source)? else {
                        return if first {
                            Ok(None)
                        } else {
                            Err(SealError::StreamTruncated)
                        };
                    };
                    first = false;
                    if acc.push(byte)? {
                        return Ok(Some(acc.value));
                    }
                }
            }
            fixed => {
                let width = fixed.max_size();
                let mut buf = [0u8; 8];
                let got = read_up_to(source, &mut buf[..width])?;
                match got {
                    0 => Ok(None),
                    n if n == width => Ok(Some(be_to_u64(&buf[..width]))),
                    _ => Err(SealError::StreamTruncated),
                }
            }
        }
    }
}

#[derive(Default)]
struct VarintAccumulator {
    value: u64,
    shift: u32,
    len: usize,
}

impl VarintAccumulator {
    /// Feed one byte; `Ok(true)` once the value is complete.
    fn push(&mut self, byte: u8) -> SealResult<bool> {
        self.len += 1;
        if self.len > MAX_VARINT_LEN || (self.len == MAX_VARINT_LEN && byte > 1) {
            return Err(SealError::CiphertextInvalid);
        }
        self.value |= u64::from(byte & 0x7f) << self.shift;
        self.shift += 7;
        Ok(byte & 0x80 == 0)
    }
}

fn be_to_u64(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0u64, |acc, &b| (acc << 8) | u64::from(b))
}

fn read_byte<R: Read + ?Sized>(source: &mut R) -> SealResult<Option<u8>> {
    let mut byte = [0u8; 1];
    Ok((read_up_to(source, &mut byte)? == 1).then_some(byte[0]))
}

/// Fill `buf` as far as the source allows, stopping only at end of input.
pub fn read_up_to<R: Read + ?Sized>(source: &mut R, buf: &mut [u8]) -> SealResult<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match source.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(filled)
}
