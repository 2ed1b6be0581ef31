//! Quantized float codec.
//!
//! A quantized float is a fixed-point value in `[low, high]` stored in
//! `bit_count` bits, with optional one-bit shortcuts for the bounds and for
//! zero. All parameters are resolved once when the field is compiled; the
//! per-value decode is a handful of multiplications.

use bitstream::{BitReader, BitResult};

/// Round values below the range down to `low`; a one-bit shortcut encodes `low`.
pub const ROUND_DOWN: u32 = 1 << 0;
/// Round values above the range up to `high`; a one-bit shortcut encodes `high`.
pub const ROUND_UP: u32 = 1 << 1;
/// A one-bit shortcut encodes exactly zero.
pub const ENCODE_ZERO: u32 = 1 << 2;
/// The value is an integer; the bit count is widened to cover the range.
pub const ENCODE_INTEGERS: u32 = 1 << 3;

const PRECISION_MULTIPLIERS: [f32; 5] = [0.9999, 0.99, 0.9, 0.8, 0.7];

/// Reasons quantized float parameters can be rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum QuantizedFloatError {
    /// Round-down and round-up were both requested.
    #[error("round-down and round-up are mutually exclusive")]
    ConflictingRounding,
    /// The high/low multiplier collapsed to zero.
    #[error("high/low multiplier is zero")]
    ZeroMultiplier,
    /// Integer encoding needs more than 32 bits for the range.
    #[error("integer range needs {bits} bits")]
    RangeTooWide {
        /// Bits required.
        bits: u32,
    },
    /// A value outside `[low, high]` was quantized without a rounding flag.
    #[error("value is outside the quantized range")]
    OutOfRange,
}

/// Precomputed quantized float decoder.
#[derive(Debug, Clone, PartialEq)]
pub struct QuantizedFloat {
    low: f32,
    high: f32,
    high_low_mul: f32,
    dec_mul: f32,
    offset: f32,
    bit_count: u32,
    flags: u32,
    no_scale: bool,
}

impl QuantizedFloat {
    /// Resolves decoder parameters.
    ///
    /// A bit count of zero, a negative one, or one of 32 and above decodes
    /// as a plain IEEE-754 float. Missing bounds default to `[0, 1]`.
    pub fn new(
        bit_count: i32,
        flags: Option<i32>,
        low: Option<f32>,
        high: Option<f32>,
    ) -> Result<Self, QuantizedFloatError> {
        if bit_count <= 0 || bit_count >= 32 {
            return Ok(Self {
                low: 0.0,
                high: 0.0,
                high_low_mul: 0.0,
                dec_mul: 0.0,
                offset: 0.0,
                bit_count: 32,
                flags: 0,
                no_scale: true,
            });
        }

        let mut qf = Self {
            low: low.unwrap_or(0.0),
            high: high.unwrap_or(1.0),
            high_low_mul: 0.0,
            dec_mul: 0.0,
            offset: 0.0,
            bit_count: bit_count as u32,
            flags: flags.unwrap_or(0) as u32,
            no_scale: false,
        };

        qf.validate_flags()?;

        let mut steps = 1u64 << qf.bit_count;

        if qf.flags & ROUND_DOWN != 0 {
            let range = qf.high - qf.low;
            qf.offset = range / steps as f32;
            qf.high -= qf.offset;
        } else if qf.flags & ROUND_UP != 0 {
            let range = qf.high - qf.low;
            qf.offset = range / steps as f32;
            qf.low += qf.offset;
        }

        if qf.flags & ENCODE_INTEGERS != 0 {
            let delta = (qf.high - qf.low).max(1.0);
            let delta_log2 = f64::from(delta).log2().ceil() as u32;
            if delta_log2 > 32 {
                return Err(QuantizedFloatError::RangeTooWide { bits: delta_log2 + 1 });
            }
            let range2 = 1u64 << delta_log2;

            let mut bc = qf.bit_count;
            while (1u64 << bc) <= range2 {
                bc += 1;
            }
            if bc > 32 {
                return Err(QuantizedFloatError::RangeTooWide { bits: bc });
            }
            if bc > qf.bit_count {
                qf.bit_count = bc;
                steps = 1u64 << qf.bit_count;
            }

            qf.offset = range2 as f32 / steps as f32;
            qf.high = qf.low + range2 as f32 - qf.offset;
        }

        qf.assign_multipliers(steps)?;

        if qf.flags & ROUND_DOWN != 0 && qf.quantize(qf.low) == Ok(qf.low) {
            qf.flags &= !ROUND_DOWN;
        }
        if qf.flags & ROUND_UP != 0 && qf.quantize(qf.high) == Ok(qf.high) {
            qf.flags &= !ROUND_UP;
        }
        if qf.flags & ENCODE_ZERO != 0 && qf.quantize(0.0) == Ok(0.0) {
            qf.flags &= !ENCODE_ZERO;
        }

        Ok(qf)
    }

    fn validate_flags(&mut self) -> Result<(), QuantizedFloatError> {
        if self.flags == 0 {
            return Ok(());
        }

        if (self.low == 0.0 && self.flags & ROUND_DOWN != 0)
            || (self.high == 0.0 && self.flags & ROUND_UP != 0)
        {
            self.flags &= !ENCODE_ZERO;
        }

        if self.low == 0.0 && self.flags & ENCODE_ZERO != 0 {
            self.flags |= ROUND_DOWN;
            self.flags &= !ENCODE_ZERO;
        }

        if self.high == 0.0 && self.flags & ENCODE_ZERO != 0 {
            self.flags |= ROUND_UP;
            self.flags &= !ENCODE_ZERO;
        }

        if self.low > 0.0 || self.high < 0.0 {
            self.flags &= !ENCODE_ZERO;
        }

        if self.flags & ENCODE_INTEGERS != 0 {
            self.flags &= !(ROUND_UP | ROUND_DOWN | ENCODE_ZERO);
        }

        if self.flags & (ROUND_DOWN | ROUND_UP) == (ROUND_DOWN | ROUND_UP) {
            return Err(QuantizedFloatError::ConflictingRounding);
        }
        Ok(())
    }

    fn assign_multipliers(&mut self, steps: u64) -> Result<(), QuantizedFloatError> {
        let range = self.high - self.low;
        let high: u32 = if self.bit_count == 32 {
            0xFFFF_FFFE
        } else {
            ((1u64 << self.bit_count) - 1) as u32
        };

        let overshoots = |mul: f32| {
            let scaled = mul * range;
            scaled > high as f32 || f64::from(scaled) > f64::from(high)
        };

        let mut high_mul = if range.abs() <= 0.0 {
            high as f32
        } else {
            high as f32 / range
        };

        if overshoots(high_mul) {
            for mult in PRECISION_MULTIPLIERS {
                high_mul = high as f32 / range * mult;
                if !overshoots(high_mul) {
                    break;
                }
            }
        }

        self.high_low_mul = high_mul;
        self.dec_mul = 1.0 / (steps - 1) as f32;

        if self.high_low_mul == 0.0 {
            return Err(QuantizedFloatError::ZeroMultiplier);
        }
        Ok(())
    }

    /// Quantizes `value` the way an encoder would, returning the value a
    /// decoder would reconstruct.
    pub fn quantize(&self, value: f32) -> Result<f32, QuantizedFloatError> {
        if value < self.low {
            if self.flags & ROUND_UP == 0 {
                return Err(QuantizedFloatError::OutOfRange);
            }
            return Ok(self.low);
        } else if value > self.high {
            if self.flags & ROUND_DOWN == 0 {
                return Err(QuantizedFloatError::OutOfRange);
            }
            return Ok(self.high);
        }

        let steps = ((value - self.low) * self.high_low_mul) as u32;
        Ok(self.low + (self.high - self.low) * (steps as f32 * self.dec_mul))
    }

    /// Decodes one value.
    pub fn decode(&self, reader: &mut BitReader<'_>) -> BitResult<f32> {
        if self.no_scale {
            return reader.read_f32();
        }
        if self.flags & ROUND_DOWN != 0 && reader.read_bool()? {
            return Ok(self.low);
        }
        if self.flags & ROUND_UP != 0 && reader.read_bool()? {
            return Ok(self.high);
        }
        if self.flags & ENCODE_ZERO != 0 && reader.read_bool()? {
            return Ok(0.0);
        }

        let raw = reader.read_u32(self.bit_count as u8)?;
        Ok(self.low + (self.high - self.low) * raw as f32 * self.dec_mul)
    }

    /// Lower bound after rounding adjustments.
    #[must_use]
    pub const fn low(&self) -> f32 {
        self.low
    }

    /// Upper bound after rounding adjustments.
    #[must_use]
    pub const fn high(&self) -> f32 {
        self.high
    }

    /// Number of payload bits.
    #[must_use]
    pub const fn bit_count(&self) -> u32 {
        self.bit_count
    }

    /// Effective flags after validation.
    #[must_use]
    pub const fn flags(&self) -> u32 {
        self.flags
    }

    /// Whether values are read as plain floats.
    #[must_use]
    pub const fn is_no_scale(&self) -> bool {
        self.no_scale
    }
}
