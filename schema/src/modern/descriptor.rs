//! Flattened-serializer descriptors as they arrive on the wire.
//!
//! Strings are referenced through a shared symbol table, exactly as in the
//! serializer message.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{SchemaError, SchemaResult};

/// A polymorphic variant of a table field.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PolymorphicType {
    pub serializer_name_sym: Option<i32>,
    pub serializer_version: Option<i32>,
}

/// One entry of the shared field pool.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FieldDescriptor {
    pub var_type_sym: Option<i32>,
    pub var_name_sym: Option<i32>,
    pub var_encoder_sym: Option<i32>,
    pub field_serializer_name_sym: Option<i32>,
    pub field_serializer_version: Option<i32>,
    pub send_node_sym: Option<i32>,
    pub bit_count: Option<i32>,
    pub low_value: Option<f32>,
    pub high_value: Option<f32>,
    pub encode_flags: Option<i32>,
    pub polymorphic_types: Vec<PolymorphicType>,
}

/// A named, versioned list of field pool indices.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SerializerDescriptor {
    pub name_sym: i32,
    pub version: i32,
    pub fields_index: Vec<i32>,
}

/// A complete flattened-serializer message.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FlattenedSerializerMsg {
    pub symbols: Vec<String>,
    pub fields: Vec<FieldDescriptor>,
    pub serializers: Vec<SerializerDescriptor>,
}

/// A class-id to network-name binding.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ClassInfoEntry {
    pub class_id: u32,
    pub network_name: String,
}

impl ClassInfoEntry {
    /// Creates a new binding.
    #[must_use]
    pub fn new(class_id: u32, network_name: impl Into<String>) -> Self {
        Self {
            class_id,
            network_name: network_name.into(),
        }
    }
}

/// Human-readable field description used to build messages.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FieldSpec {
    pub name: String,
    pub var_type: String,
    pub encoder: Option<String>,
    pub serializer: Option<(String, i32)>,
    pub send_node: Option<String>,
    pub bit_count: Option<i32>,
    pub low_value: Option<f32>,
    pub high_value: Option<f32>,
    pub encode_flags: Option<i32>,
    pub polymorphic: Vec<(String, i32)>,
}

impl FieldSpec {
    /// Creates a new field of the given type.
    #[must_use]
    pub fn new(name: impl Into<String>, var_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            var_type: var_type.into(),
            ..Self::default()
        }
    }

    /// Sets the named encoder.
    #[must_use]
    pub fn encoder(mut self, encoder: impl Into<String>) -> Self {
        self.encoder = Some(encoder.into());
        self
    }

    /// Sets the bit count.
    #[must_use]
    pub const fn bits(mut self, bits: i32) -> Self {
        self.bit_count = Some(bits);
        self
    }

    /// Sets the quantization range.
    #[must_use]
    pub const fn range(mut self, low: f32, high: f32) -> Self {
        self.low_value = Some(low);
        self.high_value = Some(high);
        self
    }

    /// Sets the quantization flags.
    #[must_use]
    pub const fn flags(mut self, flags: i32) -> Self {
        self.encode_flags = Some(flags);
        self
    }

    /// References a nested serializer.
    #[must_use]
    pub fn serializer(mut self, name: impl Into<String>, version: i32) -> Self {
        self.serializer = Some((name.into(), version));
        self
    }

    /// Adds a polymorphic variant.
    #[must_use]
    pub fn polymorphic(mut self, name: impl Into<String>, version: i32) -> Self {
        self.polymorphic.push((name.into(), version));
        self
    }
}

impl FlattenedSerializerMsg {
    /// Creates an empty message.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the symbol index of `text`, appending it if needed.
    pub fn intern(&mut self, text: &str) -> i32 {
        if let Some(i) = self.symbols.iter().position(|s| s == text) {
            return i as i32;
        }
        self.symbols.push(text.to_owned());
        (self.symbols.len() - 1) as i32
    }

    /// Appends a field to the pool and returns its index.
    pub fn add_field(&mut self, spec: &FieldSpec) -> i32 {
        let var_name_sym = Some(self.intern(&spec.name));
        let var_type_sym = Some(self.intern(&spec.var_type));
        let var_encoder_sym = spec.encoder.as_deref().map(|e| self.intern(e));
        let send_node_sym = spec.send_node.as_deref().map(|n| self.intern(n));
        let (field_serializer_name_sym, field_serializer_version) = match &spec.serializer {
            Some((name, version)) => (Some(self.intern(name)), Some(*version)),
            None => (None, None),
        };
        let polymorphic_types = spec
            .polymorphic
            .iter()
            .map(|(name, version)| PolymorphicType {
                serializer_name_sym: Some(self.intern(name)),
                serializer_version: Some(*version),
            })
            .collect();

        self.fields.push(FieldDescriptor {
            var_type_sym,
            var_name_sym,
            var_encoder_sym,
            field_serializer_name_sym,
            field_serializer_version,
            send_node_sym,
            bit_count: spec.bit_count,
            low_value: spec.low_value,
            high_value: spec.high_value,
            encode_flags: spec.encode_flags,
            polymorphic_types,
        });
        (self.fields.len() - 1) as i32
    }

    /// Appends a serializer made of new fields.
    pub fn add_serializer(&mut self, name: &str, version: i32, fields: &[FieldSpec]) {
        let fields_index = fields.iter().map(|f| self.add_field(f)).collect();
        let name_sym = self.intern(name);
        self.serializers.push(SerializerDescriptor {
            name_sym,
            version,
            fields_index,
        });
    }

    /// Resolves an optional symbol; absent symbols are empty strings.
    pub fn symbol(&self, index: Option<i32>) -> SchemaResult<&str> {
        let Some(index) = index else {
            return Ok("");
        };
        usize::try_from(index)
            .ok()
            .and_then(|i| self.symbols.get(i))
            .map(String::as_str)
            .ok_or(SchemaError::UnknownSymbol {
                index,
                len: self.symbols.len(),
            })
    }
}
