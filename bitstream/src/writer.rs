//! Bit-level writer producing LSB-first packed data.

use crate::error::{BitError, BitResult};

/// A bit-level writer, the exact inverse of [`BitReader`](crate::BitReader).
///
/// Writes are accumulated in an internal buffer. Call [`finish`](Self::finish)
/// to get the final byte buffer.
#[derive(Debug, Default)]
pub struct BitWriter {
    /// The accumulated bytes.
    bytes: Vec<u8>,
    /// Current byte being written (not yet pushed to bytes).
    current_byte: u8,
    /// Number of bits written to `current_byte` (0-7).
    bit_count: u8,
}

impl BitWriter {
    /// Creates a new empty `BitWriter`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new `BitWriter` with pre-allocated capacity.
    #[must_use]
    pub fn with_capacity(bytes: usize) -> Self {
        Self {
            bytes: Vec::with_capacity(bytes),
            current_byte: 0,
            bit_count: 0,
        }
    }

    /// Returns the number of bits written so far.
    #[must_use]
    pub fn bits_written(&self) -> usize {
        self.bytes.len() * 8 + self.bit_count as usize
    }

    /// Writes a single bit.
    pub fn write_bool(&mut self, value: bool) {
        self.current_byte |= u8::from(value) << self.bit_count;
        self.bit_count += 1;
        if self.bit_count == 8 {
            self.bytes.push(self.current_byte);
            self.current_byte = 0;
            self.bit_count = 0;
        }
    }

    /// Writes the low `bits` bits of `value`, least significant first.
    ///
    /// # Errors
    ///
    /// Returns [`BitError::InvalidBitCount`] if `bits > 64`.
    /// Returns [`BitError::ValueOutOfRange`] if `value` doesn't fit in `bits`.
    pub fn write_bits(&mut self, value: u64, bits: usize) -> BitResult<()> {
        if bits > 64 {
            return Err(BitError::InvalidBitCount { bits, max_bits: 64 });
        }
        if bits < 64 && value >= (1u64 << bits) {
            return Err(BitError::ValueOutOfRange { value, bits });
        }
        self.push_bits(value, bits);
        Ok(())
    }

    /// Writes `value` as a two's-complement integer of `bits` bits.
    pub fn write_signed_bits(&mut self, value: i64, bits: usize) -> BitResult<()> {
        if bits > 64 {
            return Err(BitError::InvalidBitCount { bits, max_bits: 64 });
        }
        if bits == 0 {
            return Ok(());
        }
        if bits < 64 {
            let min = -(1i64 << (bits - 1));
            let max = (1i64 << (bits - 1)) - 1;
            if value < min || value > max {
                return Err(BitError::ValueOutOfRange {
                    value: value as u64,
                    bits,
                });
            }
        }
        let mask = if bits == 64 { u64::MAX } else { (1u64 << bits) - 1 };
        self.push_bits(value as u64 & mask, bits);
        Ok(())
    }

    /// Writes a full byte.
    pub fn write_byte(&mut self, value: u8) {
        self.push_bits(u64::from(value), 8);
    }

    /// Writes a byte slice.
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.write_byte(byte);
        }
    }

    /// Writes a little-endian `u32`.
    pub fn write_u32_le(&mut self, value: u32) {
        self.push_bits(u64::from(value), 32);
    }

    /// Writes a little-endian `u64`.
    pub fn write_u64_le(&mut self, value: u64) {
        self.push_bits(value, 64);
    }

    /// Writes an IEEE-754 single precision float.
    pub fn write_f32(&mut self, value: f32) {
        self.write_u32_le(value.to_bits());
    }

    /// Writes a varint `u32`.
    pub fn write_varu32(&mut self, value: u32) {
        self.write_varu64(u64::from(value));
    }

    /// Writes a zigzag varint `i32`.
    pub fn write_vars32(&mut self, value: i32) {
        let zigzag = ((value << 1) ^ (value >> 31)) as u32;
        self.write_varu32(zigzag);
    }

    /// Writes a varint `u64`.
    pub fn write_varu64(&mut self, mut value: u64) {
        while value >= 0x80 {
            self.write_byte((value as u8 & 0x7F) | 0x80);
            value >>= 7;
        }
        self.write_byte(value as u8);
    }

    /// Writes a zigzag varint `i64`.
    pub fn write_vars64(&mut self, value: i64) {
        let zigzag = ((value << 1) ^ (value >> 63)) as u64;
        self.write_varu64(zigzag);
    }

    /// Writes a null-terminated string.
    pub fn write_cstring(&mut self, value: &str) {
        self.write_bytes(value.as_bytes());
        self.write_byte(0);
    }

    /// Writes the 6-bit-prefixed variable length integer.
    pub fn write_ubitvar(&mut self, value: u32) {
        let low = u64::from(value & 0x0F);
        let high = u64::from(value >> 4);
        if value < 16 {
            self.push_bits(u64::from(value), 6);
        } else if value < 256 {
            self.push_bits(low | 0x10, 6);
            self.push_bits(high, 4);
        } else if value < 4096 {
            self.push_bits(low | 0x20, 6);
            self.push_bits(high, 8);
        } else {
            self.push_bits(low | 0x30, 6);
            self.push_bits(high, 28);
        }
    }

    /// Writes the prefix-coded field-path integer.
    ///
    /// # Errors
    ///
    /// Returns [`BitError::ValueOutOfRange`] for values that need more than 31 bits.
    pub fn write_ubitvar_fp(&mut self, value: u32) -> BitResult<()> {
        const FORMS: [usize; 4] = [2, 4, 10, 17];
        for bits in FORMS {
            if value < (1u32 << bits) {
                self.write_bool(true);
                self.push_bits(u64::from(value), bits);
                return Ok(());
            }
            self.write_bool(false);
        }
        self.write_bits(u64::from(value), 31)
    }

    /// Finishes writing and returns the byte buffer.
    ///
    /// If the last byte is incomplete, its unused high bits are zero.
    #[must_use]
    pub fn finish(mut self) -> Vec<u8> {
        self.flush_partial();
        self.bytes
    }

    /// Finishes writing and appends the bytes to `out`.
    pub fn finish_into(mut self, out: &mut Vec<u8>) {
        self.flush_partial();
        out.extend_from_slice(&self.bytes);
    }

    fn flush_partial(&mut self) {
        if self.bit_count > 0 {
            self.bytes.push(self.current_byte);
            self.current_byte = 0;
            self.bit_count = 0;
        }
    }

    fn push_bits(&mut self, value: u64, bits: usize) {
        for i in 0..bits {
            self.write_bool((value >> i) & 1 == 1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_writer_is_empty() {
        let writer = BitWriter::new();
        assert_eq!(writer.bits_written(), 0);
        assert!(writer.finish().is_empty());
    }

    #[test]
    fn bits_fill_from_lsb() {
        let mut writer = BitWriter::new();
        writer.write_bool(true);
        writer.write_bool(false);
        writer.write_bool(true);
        assert_eq!(writer.finish(), vec![0b0000_0101]);
    }

    #[test]
    fn write_bits_little_endian() {
        let mut writer = BitWriter::new();
        writer.write_bits(0x1234, 16).unwrap();
        assert_eq!(writer.finish(), vec![0x34, 0x12]);
    }

    #[test]
    fn write_bits_rejects_out_of_range() {
        let mut writer = BitWriter::new();
        assert!(matches!(
            writer.write_bits(256, 8),
            Err(BitError::ValueOutOfRange { value: 256, bits: 8 })
        ));
        assert!(matches!(
            writer.write_bits(0, 65),
            Err(BitError::InvalidBitCount { bits: 65, .. })
        ));
    }

    #[test]
    fn signed_bits_range_checked() {
        let mut writer = BitWriter::new();
        writer.write_signed_bits(-16, 5).unwrap();
        assert!(writer.write_signed_bits(16, 5).is_err());
        assert_eq!(writer.finish(), vec![0b0001_0000]);
    }

    #[test]
    fn varint_matches_known_encoding() {
        let mut writer = BitWriter::new();
        writer.write_varu32(300);
        writer.write_vars32(-1);
        assert_eq!(writer.finish(), vec![0xAC, 0x02, 0x01]);
    }

    #[test]
    fn ubitvar_fp_too_large() {
        let mut writer = BitWriter::new();
        assert!(writer.write_ubitvar_fp(u32::MAX).is_err());
    }

    #[test]
    fn finish_into_appends() {
        let mut out = vec![0xAA];
        let mut writer = BitWriter::with_capacity(4);
        writer.write_byte(0x55);
        writer.finish_into(&mut out);
        assert_eq!(out, vec![0xAA, 0x55]);
    }
}
