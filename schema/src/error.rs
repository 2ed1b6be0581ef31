//! Schema compilation and property decoding errors.

use bitstream::BitError;

use crate::path::FieldPathError;
use crate::quantized::QuantizedFloatError;

/// Result type for schema operations.
pub type SchemaResult<T> = Result<T, SchemaError>;

/// Errors that can occur when compiling a schema or decoding a property.
///
/// Every fatal variant names the table, serializer, field, or class being
/// processed so that a corrupt capture can be diagnosed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    /// The underlying bit reader failed.
    #[error(transparent)]
    Bit(#[from] BitError),

    /// A field path could not be applied to a field state.
    #[error(transparent)]
    FieldPath(#[from] FieldPathError),

    /// A send table names a sub-table or exclude target that was never sent.
    #[error("send table {table:?} referenced by {referenced_by:?} is not defined")]
    UnknownTable {
        /// The missing table.
        table: String,
        /// The table or class holding the reference.
        referenced_by: String,
    },

    /// Send tables nest deeper than any real capture, usually a reference cycle.
    #[error("send table {table:?} nests deeper than {max} levels")]
    TableTooDeep {
        /// Table being entered.
        table: String,
        /// Depth limit.
        max: usize,
    },

    /// A server class names a data table that was never sent.
    #[error("class {class:?} uses undefined data table {table:?}")]
    UnknownClassTable {
        /// The class name.
        class: String,
        /// The missing table.
        table: String,
    },

    /// A server-class id in the class list exceeds the class count.
    #[error("class id {id} exceeds class count {count}")]
    InvalidClassIndex {
        /// The offending id.
        id: u32,
        /// Declared number of classes.
        count: u32,
    },

    /// A send prop carries a type tag this engine does not know.
    #[error("property {prop:?} has unknown wire type {type_id}")]
    UnknownPropType {
        /// Flattened property name.
        prop: String,
        /// Raw type tag.
        type_id: i32,
    },

    /// An array send prop is the first prop of its table, so it has no element prop.
    #[error("array property {prop:?} in table {table:?} has no element property")]
    MissingArrayElement {
        /// Array property name.
        prop: String,
        /// Owning table.
        table: String,
    },

    /// A field references a serializer that was not defined before it.
    #[error("serializer {name}({version}) referenced by field {field:?} is not defined")]
    UnknownSerializer {
        /// Serializer name.
        name: String,
        /// Serializer version.
        version: i32,
        /// Field holding the reference.
        field: String,
    },

    /// A field type string could not be parsed.
    #[error("field {field:?} has unparseable type {type_name:?}")]
    BadFieldType {
        /// Field name.
        field: String,
        /// The raw type string.
        type_name: String,
    },

    /// A dynamic container field has no element type.
    #[error("variable array field {field:?} has no element type")]
    MissingGenericType {
        /// Field name.
        field: String,
    },

    /// Symbol index outside the symbol table of a serializer packet.
    #[error("symbol index {index} is out of range ({len} symbols)")]
    UnknownSymbol {
        /// Requested symbol.
        index: i32,
        /// Number of symbols.
        len: usize,
    },

    /// A serializer lists a field descriptor index outside the field pool.
    #[error("serializer {serializer:?} lists field {index} but the pool has {len} fields")]
    UnknownFieldDescriptor {
        /// Serializer name.
        serializer: String,
        /// Requested descriptor index.
        index: i32,
        /// Pool size.
        len: usize,
    },

    /// A quantized float field has parameters that cannot be decoded.
    #[error("quantized float field {field:?}: {reason}")]
    InvalidQuantizedFloat {
        /// Field name.
        field: String,
        /// What went wrong.
        reason: QuantizedFloatError,
    },

    /// A field declares a bit count no decoder can read.
    #[error("field {field:?} declares invalid bit count {bits}")]
    InvalidBitCount {
        /// Field name.
        field: String,
        /// Declared bit count.
        bits: i32,
    },

    /// A class id was not bound to any schema class.
    #[error("class id {class_id} is not defined")]
    UnknownClass {
        /// The class id read from the stream.
        class_id: u32,
    },

    /// A class binding names a serializer that was not compiled.
    #[error("class {class:?} (id {class_id}) has no compiled serializer")]
    UnboundClass {
        /// Network class name.
        class: String,
        /// Class id.
        class_id: u32,
    },

    /// A field path addresses a field index past the end of a serializer.
    #[error("field path {path} has no field {index} in {owner:?} ({len} fields)")]
    FieldIndexOutOfRange {
        /// The path being resolved.
        path: String,
        /// Serializer or class name.
        owner: String,
        /// The offending index.
        index: i32,
        /// Number of fields.
        len: usize,
    },

    /// A polymorphic table selected a type index it does not declare.
    #[error("field {field:?} has no polymorphic type {index}")]
    UnknownPolymorphicType {
        /// Field name.
        field: String,
        /// Type index read from the stream.
        index: u32,
    },

    /// A float property carries no float encoding this decoder knows.
    #[error("property {prop:?} has unsupported float flags {flags:#x}")]
    UnsupportedFloatFlags {
        /// Flattened property name.
        prop: String,
        /// Raw property flags.
        flags: u32,
    },
}

impl SchemaError {
    /// Returns `true` when the error is a truncated buffer.
    ///
    /// Callers may keep state decoded before this error.
    #[must_use]
    pub const fn is_unexpected_end(&self) -> bool {
        matches!(self, Self::Bit(err) if err.is_unexpected_end())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_table_names_both_sides() {
        let err = SchemaError::UnknownTable {
            table: "DT_Missing".to_owned(),
            referenced_by: "DT_Widget".to_owned(),
        };
        let msg = err.to_string();
        assert!(msg.contains("DT_Missing"));
        assert!(msg.contains("DT_Widget"));
    }

    #[test]
    fn bit_error_is_unexpected_end() {
        let err: SchemaError = BitError::UnexpectedEndOfBuffer {
            requested: 8,
            available: 0,
        }
        .into();
        assert!(err.is_unexpected_end());
        assert!(!SchemaError::UnknownClass { class_id: 3 }.is_unexpected_end());
    }

    #[test]
    fn quantized_error_names_field() {
        let err = SchemaError::InvalidQuantizedFloat {
            field: "m_flSpeed".to_owned(),
            reason: QuantizedFloatError::ConflictingRounding,
        };
        assert!(err.to_string().contains("m_flSpeed"));
    }
}
