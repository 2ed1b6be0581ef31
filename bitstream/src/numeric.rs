//! Specialized numeric encodings built on top of [`BitReader`].

use crate::error::BitResult;
use crate::reader::BitReader;

/// Integer bits of a coordinate.
pub const COORD_INTEGER_BITS: u8 = 14;
/// Fractional bits of a coordinate.
pub const COORD_FRACTIONAL_BITS: u8 = 5;
/// Value of one fractional step of a coordinate.
pub const COORD_RESOLUTION: f32 = 1.0 / (1 << COORD_FRACTIONAL_BITS) as f32;
/// Fractional bits of a packed normal component.
pub const NORMAL_FRACTIONAL_BITS: u8 = 11;

impl BitReader<'_> {
    /// Reads a coordinate: presence bits for the integer and fractional parts,
    /// a sign bit, then the parts themselves.
    pub fn read_coord(&mut self) -> BitResult<f32> {
        let has_int = self.read_bool()?;
        let has_fract = self.read_bool()?;
        if !has_int && !has_fract {
            return Ok(0.0);
        }

        let negative = self.read_bool()?;
        let int_part = if has_int {
            self.read_u32(COORD_INTEGER_BITS)? + 1
        } else {
            0
        };
        let fract_part = if has_fract {
            self.read_u32(COORD_FRACTIONAL_BITS)?
        } else {
            0
        };

        let value = int_part as f32 + fract_part as f32 * COORD_RESOLUTION;
        Ok(if negative { -value } else { value })
    }

    /// Reads an angle in degrees quantized to `bits` bits.
    pub fn read_angle(&mut self, bits: u8) -> BitResult<f32> {
        let raw = self.read_bits(bits)?;
        Ok(raw as f32 * 360.0 / 2f32.powi(i32::from(bits)))
    }

    /// Reads a sign bit and an 11-bit fraction in `[-1, 1]`.
    pub fn read_normal(&mut self) -> BitResult<f32> {
        let negative = self.read_bool()?;
        let len = self.read_u32(NORMAL_FRACTIONAL_BITS)?;
        let value = len as f32 * (1.0 / ((1u32 << NORMAL_FRACTIONAL_BITS) - 1) as f32);
        Ok(if negative { -value } else { value })
    }

    /// Reads a unit vector stored as optional X/Y normals and a Z sign bit.
    pub fn read_3bit_normal(&mut self) -> BitResult<[f32; 3]> {
        let has_x = self.read_bool()?;
        let has_y = self.read_bool()?;

        let mut out = [0.0f32; 3];
        if has_x {
            out[0] = self.read_normal()?;
        }
        if has_y {
            out[1] = self.read_normal()?;
        }

        let negative_z = self.read_bool()?;
        let sum = out[0] * out[0] + out[1] * out[1];
        if sum < 1.0 {
            out[2] = (1.0 - sum).sqrt();
        }
        if negative_z {
            out[2] = -out[2];
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use crate::{BitReader, BitWriter};

    fn approx(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-4
    }

    #[test]
    fn coord_zero_consumes_two_bits() {
        let mut reader = BitReader::new(&[0]);
        assert!(approx(reader.read_coord().unwrap(), 0.0));
        assert_eq!(reader.bit_position(), 2);
    }

    #[test]
    fn coord_negative_with_fraction() {
        let mut writer = BitWriter::new();
        writer.write_bool(true);
        writer.write_bool(true);
        writer.write_bool(true);
        writer.write_bits(9, 14).unwrap(); // int part 10
        writer.write_bits(16, 5).unwrap(); // .5
        let bytes = writer.finish();

        let mut reader = BitReader::new(&bytes);
        assert!(approx(reader.read_coord().unwrap(), -10.5));
    }

    #[test]
    fn angle_quarter_turn() {
        let mut writer = BitWriter::new();
        writer.write_bits(1 << 18, 20).unwrap();
        let bytes = writer.finish();

        let mut reader = BitReader::new(&bytes);
        assert!(approx(reader.read_angle(20).unwrap(), 90.0));
    }

    #[test]
    fn normal_full_scale() {
        let mut writer = BitWriter::new();
        writer.write_bool(true);
        writer.write_bits(2047, 11).unwrap();
        let bytes = writer.finish();

        let mut reader = BitReader::new(&bytes);
        assert!(approx(reader.read_normal().unwrap(), -1.0));
    }

    #[test]
    fn three_bit_normal_reconstructs_z() {
        let mut writer = BitWriter::new();
        writer.write_bool(false);
        writer.write_bool(false);
        writer.write_bool(true);
        let bytes = writer.finish();

        let mut reader = BitReader::new(&bytes);
        let v = reader.read_3bit_normal().unwrap();
        assert!(approx(v[0], 0.0));
        assert!(approx(v[1], 0.0));
        assert!(approx(v[2], -1.0));
    }
}
