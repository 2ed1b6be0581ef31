//! Decoding of flattened legacy properties.

use bitstream::{BitReader, BitResult};

use super::descriptor::{PropFlags, PropType};
use super::flatten::FlatProp;
use crate::error::{SchemaError, SchemaResult};
use crate::value::PropertyValue;

const COORD_INTEGER_BITS: u8 = 14;
const COORD_INTEGER_BITS_MP: u8 = 11;
const COORD_FRACTIONAL_BITS: u8 = 5;
const COORD_FRACTIONAL_BITS_LOW_PRECISION: u8 = 3;
const COORD_RESOLUTION: f32 = 1.0 / (1 << COORD_FRACTIONAL_BITS) as f32;
const COORD_RESOLUTION_LOW_PRECISION: f32 =
    1.0 / (1 << COORD_FRACTIONAL_BITS_LOW_PRECISION) as f32;

const NORMAL_FRACTIONAL_BITS: u8 = 11;
const NORMAL_RESOLUTION: f32 = 1.0 / (1 << (NORMAL_FRACTIONAL_BITS - 1)) as f32;

/// Bit width of a string length prefix.
pub const MAX_STRING_BITS: u8 = 9;

fn width(prop: &FlatProp) -> SchemaResult<u8> {
    u8::try_from(prop.prop.num_bits)
        .ok()
        .filter(|&bits| bits <= 64)
        .ok_or_else(|| SchemaError::InvalidBitCount {
            field: prop.name.clone(),
            bits: prop.prop.num_bits,
        })
}

/// Decodes one property value.
pub fn decode_prop(prop: &FlatProp, reader: &mut BitReader<'_>) -> SchemaResult<PropertyValue> {
    Ok(match prop.kind {
        PropType::Int => decode_int(prop, reader)?,
        PropType::Int64 => decode_int64(prop, reader)?,
        PropType::Float => PropertyValue::Float(decode_float(prop, reader)?),
        PropType::Vector => PropertyValue::Vector3(decode_vector(prop, reader)?),
        PropType::VectorXY => PropertyValue::Vector2([
            decode_float(prop, reader)?,
            decode_float(prop, reader)?,
        ]),
        PropType::String => {
            let len = reader.read_bits(MAX_STRING_BITS)? as usize;
            PropertyValue::String(reader.read_fixed_string(len)?)
        }
        PropType::Array => PropertyValue::Array(decode_array(prop, reader)?),
        PropType::DataTable => {
            return Err(SchemaError::UnknownPropType {
                prop: prop.name.clone(),
                type_id: prop.prop.prop_type,
            })
        }
    })
}

fn decode_int(prop: &FlatProp, reader: &mut BitReader<'_>) -> SchemaResult<PropertyValue> {
    let unsigned = prop.prop.has(PropFlags::UNSIGNED);
    if prop.prop.has(PropFlags::VAR_INT) {
        return Ok(if unsigned {
            PropertyValue::Unsigned(u64::from(reader.read_varu32()?))
        } else {
            PropertyValue::Signed(i64::from(reader.read_vars32()?))
        });
    }
    let bits = width(prop)?;
    Ok(if unsigned {
        PropertyValue::Unsigned(reader.read_bits(bits)?)
    } else {
        PropertyValue::Signed(reader.read_signed_bits(bits)?)
    })
}

fn decode_int64(prop: &FlatProp, reader: &mut BitReader<'_>) -> SchemaResult<PropertyValue> {
    let unsigned = prop.prop.has(PropFlags::UNSIGNED);
    if prop.prop.has(PropFlags::VAR_INT) {
        return Ok(if unsigned {
            PropertyValue::Unsigned(reader.read_varu64()?)
        } else {
            PropertyValue::Signed(reader.read_vars64()?)
        });
    }
    let bits = width(prop)?;
    if unsigned {
        let low = reader.read_bits(32)?;
        let high = reader.read_bits(bits.saturating_sub(32))?;
        return Ok(PropertyValue::Unsigned(high << 32 | low));
    }
    let negative = reader.read_bool()?;
    let low = reader.read_bits(32)?;
    let high = reader.read_bits(bits.saturating_sub(33))?;
    let magnitude = (high << 32 | low) as i64;
    Ok(PropertyValue::Signed(if negative {
        magnitude.wrapping_neg()
    } else {
        magnitude
    }))
}

fn decode_float(prop: &FlatProp, reader: &mut BitReader<'_>) -> SchemaResult<f32> {
    let flags = prop.prop.flags;
    if flags.intersects(PropFlags::SPECIAL_FLOAT) {
        return decode_special_float(prop, reader);
    }

    let bits = width(prop)?;
    let raw = reader.read_bits(bits)?;
    let (low, high) = (prop.prop.low_value, prop.prop.high_value);
    if bits == 0 {
        return Ok(low);
    }
    let steps = ((1u128 << bits) - 1) as f32;
    Ok(low + (high - low) * (raw as f32 / steps))
}

fn decode_special_float(prop: &FlatProp, reader: &mut BitReader<'_>) -> SchemaResult<f32> {
    let flags = prop.prop.flags;
    let value = if flags.contains(PropFlags::COORD) {
        reader.read_coord()?
    } else if flags.contains(PropFlags::COORD_MP) {
        read_coord_mp(reader, false, false)?
    } else if flags.contains(PropFlags::COORD_MP_LOW_PRECISION) {
        read_coord_mp(reader, false, true)?
    } else if flags.contains(PropFlags::COORD_MP_INTEGRAL) {
        read_coord_mp(reader, true, false)?
    } else if flags.contains(PropFlags::NO_SCALE) {
        reader.read_f32()?
    } else if flags.contains(PropFlags::NORMAL) {
        read_normal(reader)?
    } else if flags.contains(PropFlags::CELL_COORD) {
        read_cell_coord(reader, width(prop)?, false, false)?
    } else if flags.contains(PropFlags::CELL_COORD_LOW_PRECISION) {
        // The capture format reads the low-precision flag as a bare integer
        // and the integral flag as integer plus 3-bit fraction.
        read_cell_coord(reader, width(prop)?, true, false)?
    } else if flags.contains(PropFlags::CELL_COORD_INTEGRAL) {
        read_cell_coord(reader, width(prop)?, false, true)?
    } else {
        return Err(SchemaError::UnsupportedFloatFlags {
            prop: prop.name.clone(),
            flags: flags.bits(),
        });
    };
    Ok(value)
}

fn read_coord_mp(reader: &mut BitReader<'_>, integral: bool, low_precision: bool) -> BitResult<f32> {
    let in_bounds = reader.read_bool()?;
    let int_bits = if in_bounds {
        COORD_INTEGER_BITS_MP
    } else {
        COORD_INTEGER_BITS
    };

    let mut negative = false;
    let mut value = 0.0;
    if integral {
        if reader.read_bool()? {
            negative = reader.read_bool()?;
            value = (reader.read_u32(int_bits)? + 1) as f32;
        }
    } else {
        let has_int = reader.read_bool()?;
        negative = reader.read_bool()?;
        let int_part = if has_int {
            reader.read_u32(int_bits)? + 1
        } else {
            0
        };
        let fract = if low_precision {
            reader.read_u32(COORD_FRACTIONAL_BITS_LOW_PRECISION)? as f32
                * COORD_RESOLUTION_LOW_PRECISION
        } else {
            reader.read_u32(COORD_FRACTIONAL_BITS)? as f32 * COORD_RESOLUTION
        };
        value = int_part as f32 + fract;
    }
    Ok(if negative { -value } else { value })
}

fn read_normal(reader: &mut BitReader<'_>) -> BitResult<f32> {
    let negative = reader.read_bool()?;
    let value = reader.read_u32(NORMAL_FRACTIONAL_BITS)? as f32 * NORMAL_RESOLUTION;
    Ok(if negative { -value } else { value })
}

fn read_cell_coord(
    reader: &mut BitReader<'_>,
    bits: u8,
    integral: bool,
    low_precision: bool,
) -> BitResult<f32> {
    let int_part = reader.read_bits(bits)? as f32;
    if integral {
        return Ok(int_part);
    }
    let fract = if low_precision {
        reader.read_u32(COORD_FRACTIONAL_BITS_LOW_PRECISION)? as f32 * COORD_RESOLUTION_LOW_PRECISION
    } else {
        reader.read_u32(COORD_FRACTIONAL_BITS)? as f32 * COORD_RESOLUTION
    };
    Ok(int_part + fract)
}

fn decode_vector(prop: &FlatProp, reader: &mut BitReader<'_>) -> SchemaResult<[f32; 3]> {
    let x = decode_float(prop, reader)?;
    let y = decode_float(prop, reader)?;
    if !prop.prop.has(PropFlags::NORMAL) {
        return Ok([x, y, decode_float(prop, reader)?]);
    }

    let sum = x * x + y * y;
    let mut z = if sum < 1.0 { (1.0 - sum).sqrt() } else { 0.0 };
    if reader.read_bool()? {
        z = -z;
    }
    Ok([x, y, z])
}

/// Width of an array length prefix for `num_elements` slots.
#[must_use]
pub fn array_length_bits(num_elements: i32) -> u8 {
    let mut bits = 1;
    let mut max = num_elements >> 1;
    while max != 0 {
        bits += 1;
        max >>= 1;
    }
    bits
}

fn decode_array(prop: &FlatProp, reader: &mut BitReader<'_>) -> SchemaResult<Vec<PropertyValue>> {
    let element = prop
        .element
        .as_deref()
        .ok_or_else(|| SchemaError::MissingArrayElement {
            prop: prop.name.clone(),
            table: String::new(),
        })?;
    let count = reader.read_bits(array_length_bits(prop.prop.num_elements))? as usize;
    let mut items = Vec::with_capacity(count);
    for _ in 0..count {
        items.push(decode_prop(element, reader)?);
    }
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::legacy::descriptor::SendProp;
    use bitstream::BitWriter;

    fn flat(prop: SendProp) -> FlatProp {
        FlatProp {
            name: prop.var_name.clone(),
            kind: prop.kind().unwrap(),
            prop,
            element: None,
        }
    }

    fn approx(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-4
    }

    #[test]
    fn ints_fixed_and_varint() {
        let mut writer = BitWriter::new();
        writer.write_bits(200, 8).unwrap();
        writer.write_signed_bits(-3, 5).unwrap();
        writer.write_varu32(70000);
        writer.write_vars32(-9);
        let bytes = writer.finish();
        let mut reader = BitReader::new(&bytes);

        let u8_prop = flat(SendProp::new("u", PropType::Int).bits(8).flags(PropFlags::UNSIGNED));
        let s5_prop = flat(SendProp::new("s", PropType::Int).bits(5));
        let var_u = flat(
            SendProp::new("vu", PropType::Int).flags(PropFlags::VAR_INT | PropFlags::UNSIGNED),
        );
        let var_s = flat(SendProp::new("vs", PropType::Int).flags(PropFlags::VAR_INT));

        assert_eq!(decode_prop(&u8_prop, &mut reader).unwrap(), PropertyValue::Unsigned(200));
        assert_eq!(decode_prop(&s5_prop, &mut reader).unwrap(), PropertyValue::Signed(-3));
        assert_eq!(decode_prop(&var_u, &mut reader).unwrap(), PropertyValue::Unsigned(70000));
        assert_eq!(decode_prop(&var_s, &mut reader).unwrap(), PropertyValue::Signed(-9));
    }

    #[test]
    fn int64_split_words() {
        let expected: u64 = 76_561_198_000_697_560;
        let mut writer = BitWriter::new();
        writer.write_u64_le(expected);
        writer.write_bool(true);
        writer.write_bits(5, 32).unwrap();
        writer.write_bits(1, 31).unwrap();
        let bytes = writer.finish();
        let mut reader = BitReader::new(&bytes);

        let unsigned =
            flat(SendProp::new("id", PropType::Int64).bits(64).flags(PropFlags::UNSIGNED));
        let signed = flat(SendProp::new("s", PropType::Int64).bits(64));
        assert_eq!(
            decode_prop(&unsigned, &mut reader).unwrap(),
            PropertyValue::Unsigned(expected)
        );
        assert_eq!(
            decode_prop(&signed, &mut reader).unwrap(),
            PropertyValue::Signed(-((1i64 << 32) | 5))
        );
    }

    #[test]
    fn linear_float_spans_range() {
        let prop = flat(SendProp::new("f", PropType::Float).bits(4).range(-1.0, 2.0));
        let mut writer = BitWriter::new();
        writer.write_bits(0, 4).unwrap();
        writer.write_bits(15, 4).unwrap();
        let bytes = writer.finish();
        let mut reader = BitReader::new(&bytes);
        assert!(approx(decode_float(&prop, &mut reader).unwrap(), -1.0));
        assert!(approx(decode_float(&prop, &mut reader).unwrap(), 2.0));
    }

    #[test]
    fn coord_mp_low_precision() {
        let prop = flat(SendProp::new("c", PropType::Float).flags(PropFlags::COORD_MP_LOW_PRECISION));
        let mut writer = BitWriter::new();
        writer.write_bool(true); // in bounds
        writer.write_bool(true); // has int
        writer.write_bool(true); // negative
        writer.write_bits(4, 11).unwrap(); // 5
        writer.write_bits(4, 3).unwrap(); // .5
        let bytes = writer.finish();
        assert!(approx(
            decode_float(&prop, &mut BitReader::new(&bytes)).unwrap(),
            -5.5
        ));
    }

    #[test]
    fn coord_mp_integral_zero_when_absent() {
        let prop = flat(SendProp::new("c", PropType::Float).flags(PropFlags::COORD_MP_INTEGRAL));
        let mut reader = BitReader::new(&[0b00]);
        assert!(approx(decode_float(&prop, &mut reader).unwrap(), 0.0));
        assert_eq!(reader.bit_position(), 2);
    }

    #[test]
    fn cell_coord_with_fraction() {
        let prop = flat(SendProp::new("c", PropType::Float).bits(10).flags(PropFlags::CELL_COORD));
        let mut writer = BitWriter::new();
        writer.write_bits(300, 10).unwrap();
        writer.write_bits(8, 5).unwrap();
        let bytes = writer.finish();
        assert!(approx(
            decode_float(&prop, &mut BitReader::new(&bytes)).unwrap(),
            300.25
        ));
    }

    #[test]
    fn cell_coord_flags_consume_their_own_widths() {
        let mut writer = BitWriter::new();
        writer.write_bits(5, 10).unwrap();
        writer.write_bits(0b111, 3).unwrap();
        let bytes = writer.finish();

        let cases = [
            (PropFlags::CELL_COORD, 5.0 + 7.0 / 32.0, 15),
            (PropFlags::CELL_COORD_LOW_PRECISION, 5.0, 10),
            (PropFlags::CELL_COORD_INTEGRAL, 5.875, 13),
        ];
        for (flags, expected, consumed) in cases {
            let prop = flat(SendProp::new("c", PropType::Float).bits(10).flags(flags));
            let mut reader = BitReader::new(&bytes);
            let value = decode_prop(&prop, &mut reader).unwrap();
            assert_eq!(value, PropertyValue::Float(expected), "{flags:?}");
            assert_eq!(reader.bit_position(), consumed, "{flags:?}");
        }
    }

    #[test]
    fn special_float_without_known_flag_is_rejected() {
        let prop = flat(SendProp::new("m_flOdd", PropType::Float).bits(10).flags(PropFlags::UNSIGNED));
        let err = decode_special_float(&prop, &mut BitReader::new(&[0; 4])).unwrap_err();
        assert!(matches!(err, SchemaError::UnsupportedFloatFlags { ref prop, .. } if prop == "m_flOdd"));
    }

    #[test]
    fn normal_vector_reconstructs_z() {
        let prop = flat(SendProp::new("n", PropType::Vector).flags(PropFlags::NORMAL));
        let mut writer = BitWriter::new();
        for _ in 0..2 {
            writer.write_bool(false);
            writer.write_bits(0, 11).unwrap();
        }
        writer.write_bool(true);
        let bytes = writer.finish();
        let v = decode_prop(&prop, &mut BitReader::new(&bytes)).unwrap();
        assert_eq!(v, PropertyValue::Vector3([0.0, 0.0, -1.0]));
    }

    #[test]
    fn string_is_length_prefixed() {
        let prop = flat(SendProp::new("name", PropType::String));
        let mut writer = BitWriter::new();
        writer.write_bits(4, 9).unwrap();
        writer.write_bytes(b"de_d");
        let bytes = writer.finish();
        assert_eq!(
            decode_prop(&prop, &mut BitReader::new(&bytes)).unwrap(),
            PropertyValue::from("de_d")
        );
    }

    #[test]
    fn array_uses_element_prop() {
        assert_eq!(array_length_bits(1), 1);
        assert_eq!(array_length_bits(32), 6);
        assert_eq!(array_length_bits(64), 7);

        let mut prop = flat(SendProp::new("ammo", PropType::Array).elements(4));
        prop.element = Some(Box::new(flat(
            SendProp::new("000", PropType::Int).bits(6).flags(PropFlags::UNSIGNED),
        )));
        let mut writer = BitWriter::new();
        writer.write_bits(2, 3).unwrap();
        writer.write_bits(30, 6).unwrap();
        writer.write_bits(7, 6).unwrap();
        let bytes = writer.finish();
        assert_eq!(
            decode_prop(&prop, &mut BitReader::new(&bytes)).unwrap(),
            PropertyValue::Array(vec![PropertyValue::Unsigned(30), PropertyValue::Unsigned(7)])
        );
    }

    #[test]
    fn truncated_prop_is_unexpected_end() {
        let prop = flat(SendProp::new("u", PropType::Int).bits(16));
        let err = decode_prop(&prop, &mut BitReader::new(&[0xff])).unwrap_err();
        assert!(err.is_unexpected_end());
    }
}
