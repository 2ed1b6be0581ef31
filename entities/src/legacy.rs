//! Property-index updates of send-table entities.

use bitstream::{BitReader, BitResult, BitWriter};
use schema::legacy::{decode_prop, LegacyClass};
use schema::PropertyValue;

use crate::error::{EntityError, EntityResult, LimitKind};

/// Index value that terminates a property-index list.
pub const END_OF_INDICES: u32 = 0xFFF;

/// Reads one property index relative to `last`.
///
/// Returns `None` at the end of the list.
pub fn read_field_index(reader: &mut BitReader<'_>, last: i64, new_way: bool) -> BitResult<Option<i64>> {
    if new_way && reader.read_bool()? {
        return Ok(Some(last + 1));
    }

    let value = if new_way && reader.read_bool()? {
        reader.read_u32(3)?
    } else {
        let mut value = reader.read_u32(7)?;
        let extra = match value & 0x60 {
            0x20 => 2,
            0x40 => 4,
            0x60 => 7,
            _ => 0,
        };
        if extra > 0 {
            value = (value & !0x60) | (reader.read_u32(extra)? << 5);
        }
        value
    };

    if value == END_OF_INDICES {
        return Ok(None);
    }
    Ok(Some(last + 1 + i64::from(value)))
}

/// Reads the whole property-index list of one update into `out`.
pub fn read_field_indices(reader: &mut BitReader<'_>, out: &mut Vec<usize>, limit: usize) -> EntityResult<()> {
    out.clear();
    let new_way = reader.read_bool()?;
    let mut last = -1i64;
    while let Some(index) = read_field_index(reader, last, new_way)? {
        if out.len() >= limit {
            return Err(EntityError::LimitExceeded {
                kind: LimitKind::LegacyFieldIndices,
                limit,
                actual: out.len() + 1,
            });
        }
        // Indices only grow, so a value past usize is past every class too.
        out.push(usize::try_from(index).unwrap_or(usize::MAX));
        last = index;
    }
    Ok(())
}

/// Reads an index list then decodes each listed property into `slots`.
///
/// `indices` holds the decoded slot list afterwards.
pub fn apply_update(
    class: &LegacyClass,
    slots: &mut [Option<PropertyValue>],
    reader: &mut BitReader<'_>,
    indices: &mut Vec<usize>,
    limit: usize,
) -> EntityResult<()> {
    read_field_indices(reader, indices, limit)?;
    for &index in indices.iter() {
        let (Some(prop), Some(slot)) = (class.props.get(index), slots.get_mut(index)) else {
            return Err(EntityError::PropIndexOutOfRange {
                index,
                len: class.props.len(),
            });
        };
        *slot = Some(decode_prop(prop, reader)?);
    }
    Ok(())
}

/// Writes a property-index list in the packed 7-bit form.
///
/// The encoder used to build baselines and test captures; `indices` must be
/// strictly increasing.
pub fn write_field_indices(writer: &mut BitWriter, indices: &[usize]) -> BitResult<()> {
    writer.write_bool(false);
    let mut last = -1i64;
    for &index in indices {
        let index = i64::try_from(index).unwrap_or(i64::MAX);
        let delta = index - last - 1;
        let delta = u32::try_from(delta)
            .ok()
            .filter(|&d| d < END_OF_INDICES)
            .ok_or(bitstream::BitError::ValueOutOfRange {
                value: delta as u64,
                bits: 12,
            })?;
        write_packed_index(writer, delta)?;
        last = index;
    }
    write_packed_index(writer, END_OF_INDICES)
}

fn write_packed_index(writer: &mut BitWriter, value: u32) -> BitResult<()> {
    let (tag, extra) = match value >> 5 {
        0 => (0x00, 0),
        1..=3 => (0x20, 2),
        4..=15 => (0x40, 4),
        _ => (0x60, 7),
    };
    writer.write_bits(u64::from((value & 0x1F) | tag), 7)?;
    if extra > 0 {
        writer.write_bits(u64::from(value >> 5), extra)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use schema::legacy::{PropType, SendProp, SendTable, ServerClassInfo};
    use schema::SchemaRegistry;

    fn widget() -> LegacyClass {
        let mut registry = SchemaRegistry::legacy();
        registry
            .compile_send_tables(
                &[SendTable::new("DT_Widget")
                    .prop(SendProp::new("a", PropType::Int).bits(8))
                    .prop(SendProp::new("b", PropType::Int).bits(8))
                    .prop(SendProp::new("c", PropType::Int).bits(8))],
                &[ServerClassInfo::new(0, "CWidget", "DT_Widget")],
            )
            .unwrap();
        registry.legacy_class(0).unwrap().clone()
    }

    #[test]
    fn packed_indices_cover_every_width() {
        let indices = [0, 1, 40, 41, 200, 700, 2000];
        let mut writer = BitWriter::new();
        write_field_indices(&mut writer, &indices).unwrap();
        let bytes = writer.finish();

        let mut out = Vec::new();
        read_field_indices(&mut BitReader::new(&bytes), &mut out, 64).unwrap();
        assert_eq!(out, indices);
    }

    #[test]
    fn new_way_increment_and_short_forms() {
        let mut writer = BitWriter::new();
        writer.write_bool(true);
        writer.write_bool(true); // index 0
        writer.write_bool(false);
        writer.write_bool(true);
        writer.write_bits(2, 3).unwrap(); // 0 + 1 + 2 = 3
        writer.write_bool(false);
        writer.write_bool(false);
        writer.write_bits(u64::from(END_OF_INDICES & 0x1F | 0x60), 7).unwrap();
        writer.write_bits(u64::from(END_OF_INDICES >> 5), 7).unwrap();
        let bytes = writer.finish();

        let mut out = Vec::new();
        read_field_indices(&mut BitReader::new(&bytes), &mut out, 8).unwrap();
        assert_eq!(out, [0, 3]);
    }

    #[test]
    fn index_limit_is_enforced() {
        let mut writer = BitWriter::new();
        write_field_indices(&mut writer, &[0, 1, 2]).unwrap();
        let bytes = writer.finish();
        let err = read_field_indices(&mut BitReader::new(&bytes), &mut Vec::new(), 2).unwrap_err();
        assert!(matches!(
            err,
            EntityError::LimitExceeded {
                kind: LimitKind::LegacyFieldIndices,
                limit: 2,
                actual: 3
            }
        ));
    }

    #[test]
    fn update_decodes_listed_slots_only() {
        let class = widget();
        let mut writer = BitWriter::new();
        write_field_indices(&mut writer, &[0, 2]).unwrap();
        writer.write_bits(5, 8).unwrap();
        writer.write_bits(0xFE, 8).unwrap();
        let bytes = writer.finish();

        let mut slots = vec![None, Some(PropertyValue::Signed(1)), None];
        let mut indices = Vec::new();
        apply_update(&class, &mut slots, &mut BitReader::new(&bytes), &mut indices, 16).unwrap();
        assert_eq!(indices, [0, 2]);
        assert_eq!(
            slots,
            [
                Some(PropertyValue::Signed(5)),
                Some(PropertyValue::Signed(1)),
                Some(PropertyValue::Signed(-2)),
            ]
        );
    }

    #[test]
    fn out_of_range_slot_is_rejected() {
        let class = widget();
        let mut writer = BitWriter::new();
        write_field_indices(&mut writer, &[3]).unwrap();
        let bytes = writer.finish();
        let err = apply_update(
            &class,
            &mut [None, None, None],
            &mut BitReader::new(&bytes),
            &mut Vec::new(),
            16,
        )
        .unwrap_err();
        assert!(matches!(err, EntityError::PropIndexOutOfRange { index: 3, len: 3 }));
    }

    #[test]
    fn truncated_list_is_unexpected_end() {
        let err = read_field_indices(&mut BitReader::new(&[0b0000_0010]), &mut Vec::new(), 8).unwrap_err();
        assert!(err.is_unexpected_end());
    }
}
