//! The serializer arena and field-path resolution.

use std::collections::HashMap;

use tracing::{debug, trace};

use crate::decoder::{FieldDecoder, FieldEncoding};
use crate::error::{SchemaError, SchemaResult};
use crate::path::FieldPath;
use crate::state::{FieldNode, FieldState};

use super::descriptor::{FieldDescriptor, FlattenedSerializerMsg};
use super::field::{Field, FieldId, FieldModel, SerializerId};
use super::field_type::FieldType;
use super::patch::apply_patches;

/// A named, versioned list of fields.
#[derive(Debug, Clone, PartialEq)]
pub struct Serializer {
    pub name: String,
    pub version: i32,
    fields: Vec<FieldId>,
    index_by_name: HashMap<String, usize>,
}

impl Serializer {
    /// Field ids in wire order.
    #[must_use]
    pub fn fields(&self) -> &[FieldId] {
        &self.fields
    }

    /// Number of fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns `true` if the serializer has no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Index of the field named `name`.
    #[must_use]
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.index_by_name.get(name).copied()
    }
}

/// How the value at a field path is read from the stream.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PathDecoder<'a> {
    /// A leaf value.
    Value(&'a FieldDecoder),
    /// A var-int element count that resizes the container at the path.
    Length,
    /// A presence bit of a fixed table.
    Presence,
    /// A presence bit followed by a variant index.
    Polymorphic,
}

/// The field owning a path together with its decoder.
#[derive(Debug, Clone, Copy)]
pub struct Resolved<'a> {
    pub field: &'a Field,
    pub decoder: PathDecoder<'a>,
}

/// All serializers compiled from flattened-serializer messages.
///
/// Fields and serializers live in flat arenas and reference each other by
/// id. Serializers are keyed by name and version; lookups by name alone
/// return the most recently compiled version.
#[derive(Debug, Clone, Default)]
pub struct SerializerSet {
    serializers: Vec<Serializer>,
    fields: Vec<Field>,
    by_key: HashMap<(String, i32), SerializerId>,
    latest: HashMap<String, SerializerId>,
}

fn symbol_string(msg: &FlattenedSerializerMsg, index: Option<i32>) -> SchemaResult<String> {
    msg.symbol(index).map(str::to_owned)
}

impl SerializerSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of compiled serializers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.serializers.len()
    }

    /// Returns `true` if nothing has been compiled.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.serializers.is_empty()
    }

    /// The serializer behind `id`.
    #[must_use]
    pub fn serializer(&self, id: SerializerId) -> &Serializer {
        &self.serializers[id.index()]
    }

    /// The field behind `id`.
    #[must_use]
    pub fn field(&self, id: FieldId) -> &Field {
        &self.fields[id.index()]
    }

    /// Looks up an exact name and version.
    #[must_use]
    pub fn find(&self, name: &str, version: i32) -> Option<SerializerId> {
        self.by_key.get(&(name.to_owned(), version)).copied()
    }

    /// Looks up the most recently compiled version of `name`.
    #[must_use]
    pub fn latest(&self, name: &str) -> Option<SerializerId> {
        self.latest.get(name).copied()
    }

    fn lookup(&self, name: &str, version: i32, field: &str) -> SchemaResult<SerializerId> {
        self.find(name, version)
            .or_else(|| self.latest(name))
            .ok_or_else(|| SchemaError::UnknownSerializer {
                name: name.to_owned(),
                version,
                field: field.to_owned(),
            })
    }

    /// Compiles every serializer of `msg`, returning how many were added.
    ///
    /// Serializers must appear after the serializers their fields embed.
    /// Field-pool entries shared by several serializers compile once.
    pub fn compile(&mut self, msg: &FlattenedSerializerMsg, game_build: Option<u32>) -> SchemaResult<usize> {
        let mut compiled: HashMap<i32, FieldId> = HashMap::new();

        for desc in &msg.serializers {
            let name = symbol_string(msg, Some(desc.name_sym))?;
            let mut fields = Vec::with_capacity(desc.fields_index.len());

            for &index in &desc.fields_index {
                if let Some(&id) = compiled.get(&index) {
                    fields.push(id);
                    continue;
                }
                let descriptor = usize::try_from(index)
                    .ok()
                    .and_then(|i| msg.fields.get(i))
                    .ok_or_else(|| SchemaError::UnknownFieldDescriptor {
                        serializer: name.clone(),
                        index,
                        len: msg.fields.len(),
                    })?;
                let field = self.build_field(msg, descriptor, &name, game_build)?;
                let id = FieldId::new(self.fields.len());
                self.fields.push(field);
                compiled.insert(index, id);
                fields.push(id);
            }

            let index_by_name = fields
                .iter()
                .enumerate()
                .map(|(i, id)| (self.fields[id.index()].var_name.clone(), i))
                .collect();

            let id = SerializerId::new(self.serializers.len());
            debug!(
                serializer = %name,
                version = desc.version,
                fields = fields.len(),
                "compiled serializer"
            );
            self.by_key.insert((name.clone(), desc.version), id);
            self.latest.insert(name.clone(), id);
            self.serializers.push(Serializer {
                name,
                version: desc.version,
                fields,
                index_by_name,
            });
        }
        Ok(msg.serializers.len())
    }

    fn build_field(
        &self,
        msg: &FlattenedSerializerMsg,
        desc: &FieldDescriptor,
        parent: &str,
        game_build: Option<u32>,
    ) -> SchemaResult<Field> {
        let var_name = symbol_string(msg, desc.var_name_sym)?;
        let var_type = symbol_string(msg, desc.var_type_sym)?;
        let field_type = FieldType::parse(&var_type).ok_or_else(|| SchemaError::BadFieldType {
            field: var_name.clone(),
            type_name: var_type.clone(),
        })?;

        let mut field = Field::new(parent.to_owned(), var_name, var_type, field_type);

        let send_node = msg.symbol(desc.send_node_sym)?;
        if send_node != "(root)" {
            field.send_node = send_node.to_owned();
        }

        let encoder = msg.symbol(desc.var_encoder_sym)?;
        field.encoding = FieldEncoding {
            encoder: (!encoder.is_empty()).then(|| encoder.to_owned()),
            bit_count: desc.bit_count,
            encode_flags: desc.encode_flags,
            low_value: desc.low_value,
            high_value: desc.high_value,
        };

        let serializer_name = msg.symbol(desc.field_serializer_name_sym)?;
        if !serializer_name.is_empty() {
            let version = desc.field_serializer_version.unwrap_or(0);
            field.serializer = Some(self.lookup(serializer_name, version, &field.var_name)?);
        }

        for (i, poly) in desc.polymorphic_types.iter().enumerate() {
            let name = msg.symbol(poly.serializer_name_sym)?;
            let version = poly.serializer_version.unwrap_or(0);
            let id = self.lookup(name, version, &field.var_name)?;
            field.polymorphic.push((i as u32 + 1, id));
        }

        apply_patches(&mut field, game_build);
        field.classify()?;
        trace!(
            field = %field.var_name,
            ty = %field.var_type,
            model = %field.model,
            "compiled field"
        );
        Ok(field)
    }

    fn field_at(&self, ser: SerializerId, path: &FieldPath, pos: usize) -> SchemaResult<&Field> {
        let serializer = self.serializer(ser);
        let index = path.get(pos).unwrap_or(-1);
        usize::try_from(index)
            .ok()
            .and_then(|i| serializer.fields.get(i))
            .map(|&id| self.field(id))
            .ok_or_else(|| SchemaError::FieldIndexOutOfRange {
                path: path.to_string(),
                owner: serializer.name.clone(),
                index,
                len: serializer.fields.len(),
            })
    }

    /// Serializer embedded by a table field whose own path is `prefix`.
    fn table_serializer(&self, field: &Field, prefix: &[i32], state: &FieldState) -> SchemaResult<SerializerId> {
        if field.model == FieldModel::Polymorphic {
            if let Some(variant) = state.variant_at(prefix) {
                return field.polymorphic_serializer(variant).ok_or_else(|| {
                    SchemaError::UnknownPolymorphicType {
                        field: field.var_name.clone(),
                        index: variant,
                    }
                });
            }
        }
        field.serializer.ok_or_else(|| SchemaError::UnknownSerializer {
            name: field.field_type.base.clone(),
            version: 0,
            field: field.var_name.clone(),
        })
    }

    /// Resolves the field and decoder addressed by `path` under `root`.
    ///
    /// `state` is the entity's field state; polymorphic tables read their
    /// variant from it.
    pub fn resolve<'a>(
        &'a self,
        root: SerializerId,
        path: &FieldPath,
        state: &FieldState,
    ) -> SchemaResult<Resolved<'a>> {
        let mut ser = root;
        let mut pos = 0;
        loop {
            let field = self.field_at(ser, path, pos)?;
            pos += 1;
            let last = path.last();
            let decoder = match field.model {
                FieldModel::Simple | FieldModel::FixedArray => PathDecoder::Value(&field.decoder),
                FieldModel::FixedTable | FieldModel::Polymorphic if last + 1 == pos => {
                    if field.model == FieldModel::Polymorphic {
                        PathDecoder::Polymorphic
                    } else {
                        PathDecoder::Presence
                    }
                }
                FieldModel::FixedTable | FieldModel::Polymorphic => {
                    ser = self.table_serializer(field, &path.as_slice()[..pos], state)?;
                    continue;
                }
                FieldModel::VariableArray if last == pos => PathDecoder::Value(&field.decoder),
                FieldModel::VariableArray => PathDecoder::Length,
                FieldModel::VariableTable if last > pos => {
                    ser = self.table_serializer(field, &path.as_slice()[..pos], state)?;
                    pos += 1;
                    continue;
                }
                FieldModel::VariableTable => PathDecoder::Length,
            };
            return Ok(Resolved { field, decoder });
        }
    }

    /// Dotted property name of `path`, e.g. `m_Items.0002.m_iCount`.
    pub fn name_for_path(&self, root: SerializerId, path: &FieldPath, state: &FieldState) -> SchemaResult<String> {
        let mut parts = Vec::new();
        let mut ser = root;
        let mut pos = 0;
        let last = path.last();
        loop {
            let field = self.field_at(ser, path, pos)?;
            pos += 1;
            parts.push(field.var_name.clone());
            match field.model {
                FieldModel::FixedArray | FieldModel::VariableArray if last == pos => {
                    parts.push(format!("{:04}", path.get(pos).unwrap_or(0)));
                }
                FieldModel::FixedTable | FieldModel::Polymorphic if last >= pos => {
                    ser = self.table_serializer(field, &path.as_slice()[..pos], state)?;
                    continue;
                }
                FieldModel::VariableTable if last >= pos => {
                    parts.push(format!("{:04}", path.get(pos).unwrap_or(0)));
                    if last != pos {
                        ser = self.table_serializer(field, &path.as_slice()[..pos], state)?;
                        pos += 1;
                        continue;
                    }
                }
                _ => {}
            }
            return Ok(parts.join("."));
        }
    }

    /// Field path addressed by a dotted property name.
    ///
    /// Returns `None` when no field matches.
    pub fn path_for_name(&self, root: SerializerId, name: &str, state: &FieldState) -> SchemaResult<Option<FieldPath>> {
        let mut path = FieldPath::new();
        let mut ser = root;
        let mut rest = name;
        loop {
            let serializer = self.serializer(ser);
            if let Some(index) = serializer.field_index(rest) {
                path.set_last(index as i32);
                return Ok(Some(path));
            }
            let Some((head, tail)) = rest.split_once('.') else {
                return Ok(None);
            };
            let Some(index) = serializer.field_index(head) else {
                return Ok(None);
            };
            path.set_last(index as i32);
            let field = self.field(serializer.fields[index]);
            path.push(0)?;

            match field.model {
                FieldModel::FixedArray | FieldModel::VariableArray => {
                    return Ok(parse_slot(tail).map(|slot| {
                        path.set_last(slot);
                        path
                    }));
                }
                FieldModel::FixedTable | FieldModel::Polymorphic => {
                    let prefix = &path.as_slice()[..path.last()];
                    ser = self.table_serializer(field, prefix, state)?;
                    rest = tail;
                }
                FieldModel::VariableTable => {
                    let Some((slot, inner)) = tail.split_once('.') else {
                        return Ok(None);
                    };
                    let Some(slot) = parse_slot(slot) else {
                        return Ok(None);
                    };
                    let prefix = &path.as_slice()[..path.last()];
                    ser = self.table_serializer(field, prefix, state)?;
                    path.set_last(slot);
                    path.push(0)?;
                    rest = inner;
                }
                FieldModel::Simple => return Ok(None),
            }
        }
    }

    /// Every path under `root` that holds a decoded value, in schema order.
    pub fn field_paths(&self, root: SerializerId, state: &FieldState) -> SchemaResult<Vec<FieldPath>> {
        let mut out = Vec::new();
        let mut path = FieldPath::new();
        self.collect_paths(root, &mut path, state, &mut out)?;
        Ok(out)
    }

    fn collect_paths(
        &self,
        ser: SerializerId,
        path: &mut FieldPath,
        state: &FieldState,
        out: &mut Vec<FieldPath>,
    ) -> SchemaResult<()> {
        for (i, &id) in self.serializer(ser).fields.iter().enumerate() {
            path.set_last(i as i32);
            let field = self.field(id);
            match field.model {
                FieldModel::Simple => {
                    if matches!(state.get(path), Some(FieldNode::Value(_))) {
                        out.push(*path);
                    }
                }
                FieldModel::FixedArray | FieldModel::VariableArray => {
                    let Some(items) = state.get_nested_at(path.as_slice()) else {
                        continue;
                    };
                    path.push(0)?;
                    for (slot, node) in items.iter() {
                        if node.value().is_some() {
                            path.set_last(slot as i32);
                            out.push(*path);
                        }
                    }
                    path.pop(1)?;
                }
                FieldModel::FixedTable | FieldModel::Polymorphic => {
                    if state.get_nested_at(path.as_slice()).is_none() {
                        continue;
                    }
                    let table = self.table_serializer(field, path.as_slice(), state)?;
                    path.push(0)?;
                    self.collect_paths(table, path, state, out)?;
                    path.pop(1)?;
                }
                FieldModel::VariableTable => {
                    let Some(items) = state.get_nested_at(path.as_slice()) else {
                        continue;
                    };
                    let table = self.table_serializer(field, path.as_slice(), state)?;
                    for (slot, node) in items.iter() {
                        if node.nested().is_none() {
                            continue;
                        }
                        path.push(slot as i32)?;
                        path.push(0)?;
                        self.collect_paths(table, path, state, out)?;
                        path.pop(2)?;
                    }
                }
            }
        }
        Ok(())
    }
}

fn parse_slot(text: &str) -> Option<i32> {
    if text.len() != 4 {
        return None;
    }
    text.parse().ok()
}
