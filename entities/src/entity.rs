//! Entities and read-only entity views.

use std::fmt;
use std::ops::Deref;

use schema::legacy::LegacyClass;
use schema::modern::SerializerId;
use schema::{FieldNode, FieldPath, FieldState, PropertyValue, SchemaClass, SchemaRegistry};

use crate::error::EntityResult;
use crate::types::EntityHandle;

/// Offset subtracted from cell coordinates.
pub const MAX_COORD_INT: i64 = 16384;

/// Cell width exponent of modern body components.
pub const MODERN_CELL_BITS: u32 = 9;

const MODERN_CELLS: [&str; 3] = ["CBodyComponent.m_cellX", "CBodyComponent.m_cellY", "CBodyComponent.m_cellZ"];
const MODERN_OFFSETS: [&str; 3] = ["CBodyComponent.m_vecX", "CBodyComponent.m_vecY", "CBodyComponent.m_vecZ"];
const LEGACY_CELLS: [&str; 3] = ["m_cellX", "m_cellY", "m_cellZ"];
const LEGACY_CELL_BITS: &str = "m_cellbits";
const LEGACY_ORIGIN: &str = "m_vecOrigin";

/// Decoded values of one entity.
#[derive(Debug, Clone, PartialEq)]
pub enum EntityFields {
    /// Flattened property slots of a legacy class.
    Legacy(Vec<Option<PropertyValue>>),
    /// Nested field state rooted at a serializer.
    Modern {
        serializer: SerializerId,
        state: FieldState,
    },
}

/// A field touched by an update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FieldKey {
    Slot(usize),
    Path(FieldPath),
}

/// One networked entity.
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    index: u32,
    serial: u32,
    class_id: u32,
    class_name: String,
    active: bool,
    fields: EntityFields,
}

impl Entity {
    pub(crate) fn legacy(index: u32, serial: u32, class: &LegacyClass, slots: Vec<Option<PropertyValue>>) -> Self {
        Self {
            index,
            serial,
            class_id: class.class_id,
            class_name: class.name.clone(),
            active: true,
            fields: EntityFields::Legacy(slots),
        }
    }

    pub(crate) fn modern(
        index: u32,
        serial: u32,
        class_id: u32,
        class_name: &str,
        serializer: SerializerId,
        state: FieldState,
    ) -> Self {
        Self {
            index,
            serial,
            class_id,
            class_name: class_name.to_owned(),
            active: true,
            fields: EntityFields::Modern { serializer, state },
        }
    }

    #[must_use]
    pub const fn index(&self) -> u32 {
        self.index
    }

    #[must_use]
    pub const fn serial(&self) -> u32 {
        self.serial
    }

    /// The `(index, serial)` handle of this entity.
    #[must_use]
    pub const fn handle(&self) -> EntityHandle {
        EntityHandle::new(self.index, self.serial)
    }

    #[must_use]
    pub const fn class_id(&self) -> u32 {
        self.class_id
    }

    #[must_use]
    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    /// Returns `false` while the entity is outside the visible set.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.active
    }

    #[must_use]
    pub const fn fields(&self) -> &EntityFields {
        &self.fields
    }

    /// Legacy property slots, if this is a legacy entity.
    #[must_use]
    pub fn legacy_values(&self) -> Option<&[Option<PropertyValue>]> {
        match &self.fields {
            EntityFields::Legacy(values) => Some(values),
            EntityFields::Modern { .. } => None,
        }
    }

    /// Field state, if this is a modern entity.
    #[must_use]
    pub const fn field_state(&self) -> Option<&FieldState> {
        match &self.fields {
            EntityFields::Modern { state, .. } => Some(state),
            EntityFields::Legacy(_) => None,
        }
    }

    pub(crate) fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    pub(crate) fn parts_mut(&mut self) -> (&str, &mut EntityFields) {
        (&self.class_name, &mut self.fields)
    }
}

/// An entity together with the schema it was decoded with.
///
/// Every lookup collaborators perform goes through this view.
#[derive(Clone, Copy)]
pub struct EntityRef<'a> {
    entity: &'a Entity,
    schema: &'a SchemaRegistry,
}

impl<'a> EntityRef<'a> {
    pub(crate) const fn new(entity: &'a Entity, schema: &'a SchemaRegistry) -> Self {
        Self { entity, schema }
    }

    /// The underlying entity.
    #[must_use]
    pub const fn entity(&self) -> &'a Entity {
        self.entity
    }

    /// The compiled class of the entity.
    #[must_use]
    pub fn class(&self) -> Option<SchemaClass<'a>> {
        self.schema.class(self.entity.class_id)
    }

    fn legacy_class(&self) -> Option<&'a LegacyClass> {
        self.schema.legacy_class(self.entity.class_id)
    }

    /// Current value of a property, or `None` if the class has no such
    /// property or it was never set.
    #[must_use]
    pub fn property(&self, name: &str) -> Option<PropertyValue> {
        match &self.entity.fields {
            EntityFields::Legacy(values) => {
                let slot = self.legacy_class()?.prop_index(name)?;
                values.get(slot)?.clone()
            }
            EntityFields::Modern { serializer, state } => {
                let set = self.schema.serializers();
                let path = set.path_for_name(*serializer, name, state).ok()??;
                state.get(&path).map(FieldNode::to_property)
            }
        }
    }

    /// Current value of a property known to exist.
    ///
    /// # Panics
    ///
    /// Panics if the property is missing; call only where its presence has
    /// already been established.
    #[must_use]
    pub fn property_or_panic(&self, name: &str) -> PropertyValue {
        match self.property(name) {
            Some(value) => value,
            None => panic!(
                "property {name:?} not found on entity {} ({})",
                self.entity.index, self.entity.class_name
            ),
        }
    }

    /// Every set property in schema order.
    pub fn properties(&self) -> EntityResult<Vec<(String, PropertyValue)>> {
        match &self.entity.fields {
            EntityFields::Legacy(values) => {
                let Some(class) = self.legacy_class() else {
                    return Ok(Vec::new());
                };
                Ok(class
                    .props
                    .iter()
                    .zip(values)
                    .filter_map(|(prop, value)| Some((prop.name.clone(), value.clone()?)))
                    .collect())
            }
            EntityFields::Modern { serializer, state } => {
                let set = self.schema.serializers();
                let mut out = Vec::new();
                for path in set.field_paths(*serializer, state)? {
                    let Some(node) = state.get(&path) else {
                        continue;
                    };
                    out.push((set.name_for_path(*serializer, &path, state)?, node.to_property()));
                }
                Ok(out)
            }
        }
    }

    /// Dotted name of a touched field.
    pub(crate) fn field_name(&self, key: &FieldKey) -> Option<String> {
        match (key, &self.entity.fields) {
            (FieldKey::Slot(slot), EntityFields::Legacy(_)) => {
                Some(self.legacy_class()?.prop(*slot)?.name.clone())
            }
            (FieldKey::Path(path), EntityFields::Modern { serializer, state }) => {
                self.schema.serializers().name_for_path(*serializer, path, state).ok()
            }
            _ => None,
        }
    }

    /// World position derived from the cell and offset properties.
    ///
    /// `None` until every underlying property has been set.
    #[must_use]
    pub fn position(&self) -> Option<[f32; 3]> {
        match self.entity.fields {
            EntityFields::Legacy(_) => {
                let cell_bits = integer(&self.property(LEGACY_CELL_BITS)?)?;
                let width = 1i64.checked_shl(u32::try_from(cell_bits).ok()?)?;
                let offset = match self.property(LEGACY_ORIGIN)? {
                    PropertyValue::Vector3(v) => v,
                    PropertyValue::Vector2([x, y]) => [x, y, 0.0],
                    _ => return None,
                };
                let mut out = [0.0; 3];
                for (axis, name) in LEGACY_CELLS.iter().enumerate() {
                    let cell = integer(&self.property(name)?)?;
                    out[axis] = coord_from_cell(cell, width, offset[axis]);
                }
                Some(out)
            }
            EntityFields::Modern { .. } => {
                let width = 1i64 << MODERN_CELL_BITS;
                let mut out = [0.0; 3];
                for axis in 0..3 {
                    let cell = integer(&self.property(MODERN_CELLS[axis])?)?;
                    let offset = self.property(MODERN_OFFSETS[axis])?.as_f32()?;
                    out[axis] = coord_from_cell(cell, width, offset);
                }
                Some(out)
            }
        }
    }
}

impl<'a> Deref for EntityRef<'a> {
    type Target = Entity;

    fn deref(&self) -> &Entity {
        self.entity
    }
}

impl fmt::Debug for EntityRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityRef")
            .field("index", &self.entity.index)
            .field("serial", &self.entity.serial)
            .field("class", &self.entity.class_name)
            .field("active", &self.entity.active)
            .finish_non_exhaustive()
    }
}

fn integer(value: &PropertyValue) -> Option<i64> {
    match value {
        PropertyValue::Signed(v) => Some(*v),
        PropertyValue::Unsigned(v) => i64::try_from(*v).ok(),
        _ => None,
    }
}

#[allow(clippy::cast_precision_loss)]
fn coord_from_cell(cell: i64, width: i64, offset: f32) -> f32 {
    cell.saturating_mul(width).saturating_sub(MAX_COORD_INT) as f32 + offset
}
