//! Flattened-serializer schemas.
//!
//! A serializer message carries a symbol table, a shared pool of field
//! descriptors, and serializers listing pool indices. Compilation turns it
//! into a [`SerializerSet`]: every field gets a [`FieldModel`] that decides
//! how many field-path levels it spans, and a decoder for its values.
//! Entities address fields by [`FieldPath`](crate::FieldPath), resolved
//! against the set with [`SerializerSet::resolve`].

mod descriptor;
mod field;
mod field_type;
mod patch;
mod serializer;

pub use descriptor::{
    ClassInfoEntry, FieldDescriptor, FieldSpec, FlattenedSerializerMsg, PolymorphicType, SerializerDescriptor,
};
pub use field::{Field, FieldId, FieldModel, SerializerId};
pub use field_type::{FieldType, UNKNOWN_ARRAY_COUNT};
pub use serializer::{PathDecoder, Resolved, Serializer, SerializerSet};

/// Width of class ids in entity messages: `floor(log2(max_classes)) + 1`.
#[must_use]
pub const fn class_id_bits(max_classes: u32) -> u8 {
    (u32::BITS - max_classes.leading_zeros()) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn class_id_bits_matches_log2() {
        assert_eq!(class_id_bits(0), 0);
        assert_eq!(class_id_bits(1), 1);
        assert_eq!(class_id_bits(2), 2);
        assert_eq!(class_id_bits(255), 8);
        assert_eq!(class_id_bits(256), 9);
        assert_eq!(class_id_bits(1024), 11);
    }
}
