//! Bit-level reader with bounded operations.

use std::borrow::Cow;

use crate::error::{BitError, BitResult};

/// Maximum number of bytes in a 64-bit varint.
const MAX_VARINT64_BYTES: usize = 10;

/// A bit-level reader for decoding packed capture data.
///
/// Bits are consumed least-significant first within each byte, and multi-bit
/// values are assembled little-endian. All read operations are bounds-checked
/// and return errors on failure; the reader never panics on malformed input.
///
/// Construction is free, so callers create one per schema or update blob.
#[derive(Debug, Clone)]
pub struct BitReader<'a> {
    data: &'a [u8],
    bit_pos: usize,
}

impl<'a> BitReader<'a> {
    /// Creates a new `BitReader` from a byte slice.
    #[must_use]
    pub const fn new(data: &'a [u8]) -> Self {
        Self { data, bit_pos: 0 }
    }

    /// Returns the number of bits remaining to read.
    #[must_use]
    pub const fn bits_remaining(&self) -> usize {
        self.data
            .len()
            .saturating_mul(8)
            .saturating_sub(self.bit_pos)
    }

    /// Returns the number of whole bytes remaining to read.
    #[must_use]
    pub const fn bytes_remaining(&self) -> usize {
        self.bits_remaining() / 8
    }

    /// Returns `true` if there are no more bits to read.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.bits_remaining() == 0
    }

    /// Returns the current bit position.
    #[must_use]
    pub const fn bit_position(&self) -> usize {
        self.bit_pos
    }

    /// Returns `true` if the cursor sits on a byte boundary.
    #[must_use]
    pub const fn is_byte_aligned(&self) -> bool {
        self.bit_pos % 8 == 0
    }

    /// Reads a single bit as a boolean.
    pub fn read_bool(&mut self) -> BitResult<bool> {
        self.ensure_bits(1)?;
        let bit = (self.data[self.bit_pos / 8] >> (self.bit_pos % 8)) & 1;
        self.bit_pos += 1;
        Ok(bit == 1)
    }

    /// Reads up to 64 bits as an unsigned integer.
    pub fn read_bits(&mut self, bits: u8) -> BitResult<u64> {
        if bits > 64 {
            return Err(BitError::InvalidBitCount {
                bits: bits as usize,
                max_bits: 64,
            });
        }
        if bits == 0 {
            return Ok(0);
        }
        self.ensure_bits(bits as usize)?;

        let mut value = 0u64;
        let mut filled = 0u32;
        let mut remaining = u32::from(bits);
        while remaining > 0 {
            let byte = self.data[self.bit_pos / 8];
            let offset = (self.bit_pos % 8) as u32;
            let take = remaining.min(8 - offset);
            let chunk = (u64::from(byte) >> offset) & ((1u64 << take) - 1);
            value |= chunk << filled;
            filled += take;
            remaining -= take;
            self.bit_pos += take as usize;
        }
        Ok(value)
    }

    /// Reads up to 32 bits as a `u32`.
    pub fn read_u32(&mut self, bits: u8) -> BitResult<u32> {
        if bits > 32 {
            return Err(BitError::InvalidBitCount {
                bits: bits as usize,
                max_bits: 32,
            });
        }
        Ok(self.read_bits(bits)? as u32)
    }

    /// Reads `bits` bits as a two's-complement signed integer.
    pub fn read_signed_bits(&mut self, bits: u8) -> BitResult<i64> {
        let raw = self.read_bits(bits)?;
        if bits == 0 || bits == 64 {
            return Ok(raw as i64);
        }
        let shift = 64 - u32::from(bits);
        Ok(((raw << shift) as i64) >> shift)
    }

    /// Advances the cursor by `bits` without decoding.
    pub fn skip_bits(&mut self, bits: usize) -> BitResult<()> {
        self.ensure_bits(bits)?;
        self.bit_pos += bits;
        Ok(())
    }

    /// Reads eight bits as a byte.
    pub fn read_byte(&mut self) -> BitResult<u8> {
        if self.is_byte_aligned() {
            self.ensure_bits(8)?;
            let value = self.data[self.bit_pos / 8];
            self.bit_pos += 8;
            return Ok(value);
        }
        Ok(self.read_bits(8)? as u8)
    }

    /// Reads `len` bytes.
    ///
    /// Borrows from the underlying buffer when the cursor is byte aligned.
    pub fn read_bytes(&mut self, len: usize) -> BitResult<Cow<'a, [u8]>> {
        self.ensure_bits(len.saturating_mul(8))?;
        if self.is_byte_aligned() {
            let start = self.bit_pos / 8;
            self.bit_pos += len * 8;
            return Ok(Cow::Borrowed(&self.data[start..start + len]));
        }
        let mut out = Vec::with_capacity(len);
        for _ in 0..len {
            out.push(self.read_byte()?);
        }
        Ok(Cow::Owned(out))
    }

    /// Reads a little-endian `u32`.
    pub fn read_u32_le(&mut self) -> BitResult<u32> {
        Ok(self.read_bits(32)? as u32)
    }

    /// Reads a little-endian `u64`.
    pub fn read_u64_le(&mut self) -> BitResult<u64> {
        self.read_bits(64)
    }

    /// Reads an IEEE-754 single precision float.
    pub fn read_f32(&mut self) -> BitResult<f32> {
        Ok(f32::from_bits(self.read_u32_le()?))
    }

    /// Reads a varint `u32` (7 payload bits per byte, at most five bytes).
    ///
    /// Payload bits beyond the 32nd are dropped.
    pub fn read_varu32(&mut self) -> BitResult<u32> {
        let mut result = 0u32;
        for shift in (0..35).step_by(7) {
            let byte = self.read_byte()?;
            result |= u32::from(byte & 0x7F) << shift;
            if byte & 0x80 == 0 {
                break;
            }
        }
        Ok(result)
    }

    /// Reads a zigzag varint `i32`.
    pub fn read_vars32(&mut self) -> BitResult<i32> {
        let value = self.read_varu32()?;
        let half = (value >> 1) as i32;
        Ok(if value & 1 == 0 { half } else { !half })
    }

    /// Reads a varint `u64`.
    pub fn read_varu64(&mut self) -> BitResult<u64> {
        let mut result = 0u64;
        let mut shift = 0u32;
        for index in 0..MAX_VARINT64_BYTES {
            let byte = self.read_byte()?;
            if byte < 0x80 {
                if index == MAX_VARINT64_BYTES - 1 && byte > 1 {
                    return Err(BitError::InvalidVarint { bytes: index + 1 });
                }
                return Ok(result | (u64::from(byte) << shift));
            }
            result |= u64::from(byte & 0x7F) << shift;
            shift += 7;
        }
        Err(BitError::InvalidVarint {
            bytes: MAX_VARINT64_BYTES,
        })
    }

    /// Reads a zigzag varint `i64`.
    pub fn read_vars64(&mut self) -> BitResult<i64> {
        let value = self.read_varu64()?;
        let half = (value >> 1) as i64;
        Ok(if value & 1 == 0 { half } else { !half })
    }

    /// Reads the 6-bit-prefixed variable length integer used for entity
    /// index deltas and type selectors.
    pub fn read_ubitvar(&mut self) -> BitResult<u32> {
        let head = self.read_u32(6)?;
        let value = match head & 0x30 {
            0x10 => (head & 0x0F) | (self.read_u32(4)? << 4),
            0x20 => (head & 0x0F) | (self.read_u32(8)? << 4),
            0x30 => (head & 0x0F) | (self.read_u32(28)? << 4),
            _ => head,
        };
        Ok(value)
    }

    /// Reads the prefix-coded integer used inside field-path operations.
    pub fn read_ubitvar_fp(&mut self) -> BitResult<u32> {
        for bits in [2, 4, 10, 17] {
            if self.read_bool()? {
                return self.read_u32(bits);
            }
        }
        self.read_u32(31)
    }

    /// Reads a null-terminated string.
    ///
    /// Invalid UTF-8 is replaced rather than rejected.
    pub fn read_cstring(&mut self) -> BitResult<String> {
        self.read_cstring_limited(usize::MAX)
    }

    /// Reads a null-terminated string of at most `limit` bytes.
    ///
    /// Stops without consuming a terminator when the limit is reached.
    pub fn read_cstring_limited(&mut self, limit: usize) -> BitResult<String> {
        let mut buf = Vec::new();
        while buf.len() < limit {
            let byte = self.read_byte()?;
            if byte == 0 {
                break;
            }
            buf.push(byte);
        }
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }

    /// Reads exactly `len` bytes and returns the text before the first NUL.
    pub fn read_fixed_string(&mut self, len: usize) -> BitResult<String> {
        let bytes = self.read_bytes(len)?;
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        Ok(String::from_utf8_lossy(&bytes[..end]).into_owned())
    }

    fn ensure_bits(&self, bits: usize) -> BitResult<()> {
        let available = self.bits_remaining();
        if bits > available {
            return Err(BitError::UnexpectedEndOfBuffer {
                requested: bits,
                available,
            });
        }
        Ok(())
    }
}
