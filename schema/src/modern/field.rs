//! Compiled serializer fields.

use std::fmt;

use crate::decoder::{find_child_decoder, find_decoder, FieldDecoder, FieldEncoding};
use crate::error::{SchemaError, SchemaResult};

use super::field_type::FieldType;

/// Component types that are always embedded as fixed tables.
const POINTER_TYPES: [&str; 10] = [
    "CBodyComponentDCGBaseAnimating",
    "CBodyComponentBaseAnimating",
    "CBodyComponentBaseAnimatingOverlay",
    "CBodyComponentBaseModelEntity",
    "CBodyComponent",
    "CBodyComponentSkeletonInstance",
    "CBodyComponentPoint",
    "CLightComponent",
    "CRenderComponent",
    "CPhysicsComponent",
];

/// A serializer within a [`SerializerSet`](super::SerializerSet).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SerializerId(u32);

impl SerializerId {
    pub(crate) const fn new(index: usize) -> Self {
        Self(index as u32)
    }

    /// Position in the serializer arena.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// A field within a [`SerializerSet`](super::SerializerSet).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FieldId(u32);

impl FieldId {
    pub(crate) const fn new(index: usize) -> Self {
        Self(index as u32)
    }

    /// Position in the field arena.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// How a field maps onto field-path levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldModel {
    /// A single value.
    Simple,
    /// A fixed number of values, one level deeper.
    FixedArray,
    /// An embedded serializer behind a presence bit.
    FixedTable,
    /// A growable list of values behind a length prefix.
    VariableArray,
    /// A growable list of embedded serializers behind a length prefix.
    VariableTable,
    /// A fixed table whose serializer is chosen per entity.
    Polymorphic,
}

impl FieldModel {
    /// Returns `true` for the models that embed a serializer directly.
    #[must_use]
    pub const fn is_fixed_table(self) -> bool {
        matches!(self, Self::FixedTable | Self::Polymorphic)
    }
}

impl fmt::Display for FieldModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Simple => "simple",
            Self::FixedArray => "fixed-array",
            Self::FixedTable => "fixed-table",
            Self::VariableArray => "variable-array",
            Self::VariableTable => "variable-table",
            Self::Polymorphic => "polymorphic",
        })
    }
}

/// A compiled field.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    /// Name of the serializer that first listed the field.
    pub parent: String,
    pub var_name: String,
    pub var_type: String,
    pub send_node: String,
    pub field_type: FieldType,
    pub encoding: FieldEncoding,
    pub model: FieldModel,
    /// Embedded serializer of table models.
    pub serializer: Option<SerializerId>,
    /// Polymorphic variants keyed by their 1-based wire index.
    pub polymorphic: Vec<(u32, SerializerId)>,
    /// Value decoder; the element decoder for variable arrays.
    pub decoder: FieldDecoder,
}

impl Field {
    #[cfg(test)]
    pub(crate) fn placeholder(name: &str, var_type: &str) -> Self {
        let field_type = FieldType::parse(var_type).unwrap_or(FieldType {
            base: var_type.to_owned(),
            generic: None,
            pointer: false,
            count: 0,
        });
        Self::new(String::new(), name.to_owned(), var_type.to_owned(), field_type)
    }

    pub(crate) fn new(parent: String, var_name: String, var_type: String, field_type: FieldType) -> Self {
        Self {
            parent,
            var_name,
            var_type,
            send_node: String::new(),
            field_type,
            encoding: FieldEncoding::default(),
            model: FieldModel::Simple,
            serializer: None,
            polymorphic: Vec::new(),
            decoder: FieldDecoder::Unsigned,
        }
    }

    /// Chooses the model and resolves the decoder.
    pub(crate) fn classify(&mut self) -> SchemaResult<()> {
        let ty = &self.field_type;
        self.model = if self.serializer.is_some() {
            if !(ty.pointer || POINTER_TYPES.contains(&ty.base.as_str())) {
                FieldModel::VariableTable
            } else if self.polymorphic.is_empty() {
                FieldModel::FixedTable
            } else {
                FieldModel::Polymorphic
            }
        } else if ty.count > 0 && ty.base != "char" {
            FieldModel::FixedArray
        } else if ty.base == "CUtlVector" || ty.base == "CNetworkUtlVectorBase" {
            FieldModel::VariableArray
        } else {
            FieldModel::Simple
        };

        self.decoder = match self.model {
            FieldModel::Simple | FieldModel::FixedArray => {
                find_decoder(&self.var_name, &ty.base, &self.encoding)?
            }
            FieldModel::VariableArray => {
                let element = ty.generic_base().ok_or_else(|| SchemaError::MissingGenericType {
                    field: self.var_name.clone(),
                })?;
                find_child_decoder(&self.var_name, element, &self.encoding)?
            }
            FieldModel::FixedTable | FieldModel::Polymorphic => FieldDecoder::Bool,
            FieldModel::VariableTable => FieldDecoder::Unsigned,
        };
        Ok(())
    }

    /// Serializer of polymorphic variant `index`.
    #[must_use]
    pub fn polymorphic_serializer(&self, index: u32) -> Option<SerializerId> {
        self.polymorphic
            .iter()
            .find(|(i, _)| *i == index)
            .map(|&(_, id)| id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::FloatDecoder;

    fn classified(name: &str, var_type: &str, serializer: bool) -> SchemaResult<Field> {
        let mut field = Field::placeholder(name, var_type);
        if serializer {
            field.serializer = Some(SerializerId::new(0));
        }
        field.classify()?;
        Ok(field)
    }

    #[test]
    fn models_follow_type_shape() {
        assert_eq!(classified("a", "int32", false).unwrap().model, FieldModel::Simple);
        assert_eq!(classified("a", "char[32]", false).unwrap().model, FieldModel::Simple);
        assert_eq!(classified("a", "float32[3]", false).unwrap().model, FieldModel::FixedArray);
        assert_eq!(
            classified("a", "CUtlVector< uint32 >", false).unwrap().model,
            FieldModel::VariableArray
        );
        assert_eq!(
            classified("a", "CBodyComponent", true).unwrap().model,
            FieldModel::FixedTable
        );
        assert_eq!(classified("a", "CFoo*", true).unwrap().model, FieldModel::FixedTable);
        assert_eq!(
            classified("a", "CUtlVectorEmbeddedNetworkVar< CFoo >", true).unwrap().model,
            FieldModel::VariableTable
        );
    }

    #[test]
    fn decoders_follow_model() {
        let array = classified("m_flValues", "float32[4]", false).unwrap();
        assert_eq!(array.decoder, FieldDecoder::Float(FloatDecoder::NoScale));

        let list = classified("m_hItems", "CNetworkUtlVectorBase< CHandle< CBaseEntity > >", false)
            .unwrap();
        assert_eq!(list.decoder, FieldDecoder::Unsigned);

        let list = classified("m_nFlags", "CUtlVector< int32 >", false).unwrap();
        assert_eq!(list.decoder, FieldDecoder::Signed);

        let table = classified("m_pBody", "CBodyComponent", true).unwrap();
        assert_eq!(table.decoder, FieldDecoder::Bool);
    }

    #[test]
    fn variable_array_needs_element_type() {
        assert_eq!(
            classified("m_list", "CUtlVector", false),
            Err(SchemaError::MissingGenericType {
                field: "m_list".to_owned()
            })
        );
    }

    #[test]
    fn polymorphic_tables() {
        let mut field = Field::placeholder("m_pEffect", "CEffect*");
        field.serializer = Some(SerializerId::new(0));
        field.polymorphic = vec![(1, SerializerId::new(1)), (2, SerializerId::new(2))];
        field.classify().unwrap();
        assert_eq!(field.model, FieldModel::Polymorphic);
        assert!(field.model.is_fixed_table());
        assert_eq!(field.polymorphic_serializer(2), Some(SerializerId::new(2)));
        assert_eq!(field.polymorphic_serializer(0), None);
    }
}
