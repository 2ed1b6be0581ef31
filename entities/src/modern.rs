//! Field-path updates of serializer-backed entities.

use bitstream::BitReader;
use schema::modern::{PathDecoder, SerializerId, SerializerSet};
use schema::{FieldPath, FieldState, PropertyValue, SchemaError};

use crate::error::EntityResult;
use crate::huffman::read_field_paths;

/// Reads one update's field paths, then decodes a value for each.
///
/// Every path is read before any value; `paths` holds them afterwards.
pub fn read_fields(
    set: &SerializerSet,
    root: SerializerId,
    state: &mut FieldState,
    reader: &mut BitReader<'_>,
    paths: &mut Vec<FieldPath>,
    limit: usize,
) -> EntityResult<()> {
    read_field_paths(reader, paths, limit)?;
    for path in paths.iter() {
        let resolved = set.resolve(root, path, state)?;
        apply_value(resolved.decoder, path, state, reader)?;
    }
    Ok(())
}

fn apply_value(
    decoder: PathDecoder<'_>,
    path: &FieldPath,
    state: &mut FieldState,
    reader: &mut BitReader<'_>,
) -> EntityResult<()> {
    match decoder {
        PathDecoder::Value(decoder) => {
            let value = decoder.decode(reader)?;
            state.set(path, value).map_err(SchemaError::from)?;
        }
        PathDecoder::Length => {
            let len = reader.read_varu32()? as usize;
            state.resize(path, len).map_err(SchemaError::from)?;
        }
        PathDecoder::Presence => {
            let present = reader.read_bool()?;
            state.set(path, PropertyValue::Bool(present)).map_err(SchemaError::from)?;
        }
        PathDecoder::Polymorphic => {
            let present = reader.read_bool()?;
            let variant = reader.read_ubitvar()?;
            state.set(path, PropertyValue::Bool(present)).map_err(SchemaError::from)?;
            if variant != 0 {
                state.set_variant(path, variant).map_err(SchemaError::from)?;
            }
        }
    }
    Ok(())
}
