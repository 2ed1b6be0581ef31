//! The entity store and its packet-entities update engine.

use std::collections::HashSet;

use bitstream::BitReader;
use schema::legacy::{SendTable, ServerClassInfo};
use schema::modern::{ClassInfoEntry, FlattenedSerializerMsg};
use schema::{DecodingStrategy, FieldState, PropertyValue, SchemaError, SchemaRegistry, SchemaResult};
use tracing::{debug, trace, warn};

use crate::baseline::{BaselineCache, BaselineValues};
use crate::entity::{Entity, EntityFields, EntityRef, FieldKey};
use crate::error::{EntityError, EntityResult, HandlerError, LimitKind};
use crate::handlers::{HandlerScope, Handlers};
use crate::legacy::apply_update;
use crate::limits::EngineLimits;
use crate::modern::read_fields;
use crate::scratch::UpdateScratch;
use crate::types::{EntityChange, EntityHandle, EntityOp, LEGACY_SERIAL_BITS, MODERN_SERIAL_BITS};

/// One packet-entities message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketEntities<'a> {
    /// Bit-packed entity updates.
    pub data: &'a [u8],
    /// Number of updates in `data`.
    pub updated_entries: u32,
    /// `false` for a full snapshot.
    pub is_delta: bool,
    /// Updates of existing entities carry two visibility bits.
    pub has_pvs_vis_bits: bool,
}

impl<'a> PacketEntities<'a> {
    /// Creates a delta message.
    #[must_use]
    pub const fn new(data: &'a [u8], updated_entries: u32) -> Self {
        Self {
            data,
            updated_entries,
            is_delta: true,
            has_pvs_vis_bits: false,
        }
    }

    /// Marks the message as a full snapshot.
    #[must_use]
    pub const fn full(mut self) -> Self {
        self.is_delta = false;
        self
    }

    #[must_use]
    pub const fn with_pvs_vis_bits(mut self) -> Self {
        self.has_pvs_vis_bits = true;
        self
    }
}

/// Live entities of one capture together with the schema that decodes them.
///
/// Batches are applied with [`EntityStore::apply_packet_entities`]; handlers
/// run after the whole batch has been applied, so they observe the final
/// state of every entity touched by it.
#[derive(Debug)]
pub struct EntityStore {
    schema: SchemaRegistry,
    limits: EngineLimits,
    entities: Vec<Option<Entity>>,
    baselines: BaselineCache,
    scratch: UpdateScratch,
    handlers: Handlers,
    full_snapshots: u32,
    changes: Vec<EntityChange>,
    touched: Vec<(usize, FieldKey)>,
    removed: Vec<Entity>,
}

impl EntityStore {
    /// Creates a store with default limits.
    #[must_use]
    pub fn new(schema: SchemaRegistry) -> Self {
        Self::with_limits(schema, EngineLimits::default())
    }

    #[must_use]
    pub fn with_limits(schema: SchemaRegistry, limits: EngineLimits) -> Self {
        Self {
            schema,
            limits,
            entities: Vec::new(),
            baselines: BaselineCache::new(),
            scratch: UpdateScratch::new(),
            handlers: Handlers::default(),
            full_snapshots: 0,
            changes: Vec::new(),
            touched: Vec::new(),
            removed: Vec::new(),
        }
    }

    #[must_use]
    pub const fn schema(&self) -> &SchemaRegistry {
        &self.schema
    }

    #[must_use]
    pub const fn limits(&self) -> &EngineLimits {
        &self.limits
    }

    /// Compiles legacy send tables, replacing previously compiled classes.
    pub fn compile_send_tables(&mut self, tables: &[SendTable], classes: &[ServerClassInfo]) -> SchemaResult<usize> {
        self.baselines.clear();
        self.schema.compile_send_tables(tables, classes)
    }

    /// Compiles legacy send tables followed by a bit-packed class list.
    pub fn compile_send_table_packet(&mut self, tables: &[SendTable], class_list: &[u8]) -> SchemaResult<usize> {
        self.baselines.clear();
        self.schema.compile_send_table_packet(tables, class_list)
    }

    pub fn compile_serializers(&mut self, msg: &FlattenedSerializerMsg) -> SchemaResult<usize> {
        self.schema.compile_serializers(msg)
    }

    pub fn bind_classes(&mut self, entries: &[ClassInfoEntry]) {
        self.schema.bind_classes(entries);
    }

    pub fn set_max_classes(&mut self, max_classes: u32) {
        self.schema.set_max_classes(max_classes);
    }

    /// Stores the raw instance baseline of a class.
    ///
    /// Entities created afterwards start from the new baseline.
    pub fn set_baseline(&mut self, class_id: u32, data: impl Into<Vec<u8>>) {
        self.baselines.invalidate(class_id);
        self.schema.set_baseline(class_id, data);
    }

    /// Number of entities, active or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.iter().flatten().count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.iter().all(Option::is_none)
    }

    /// The entity at `index`.
    #[must_use]
    pub fn entity(&self, index: u32) -> Option<EntityRef<'_>> {
        let entity = self.entities.get(index as usize)?.as_ref()?;
        Some(EntityRef::new(entity, &self.schema))
    }

    /// The entity a handle refers to, if its serial still matches.
    #[must_use]
    pub fn entity_by_handle(&self, handle: EntityHandle) -> Option<EntityRef<'_>> {
        self.entity(handle.index())
            .filter(|entity| entity.serial() == handle.serial())
    }

    /// Resolves a packed handle word as found in handle-typed properties.
    #[must_use]
    pub fn entity_by_raw_handle(&self, raw: u64) -> Option<EntityRef<'_>> {
        self.entity_by_handle(EntityHandle::from_raw(raw))
    }

    /// Iterates over all entities in index order.
    pub fn iter(&self) -> impl Iterator<Item = EntityRef<'_>> {
        self.entities
            .iter()
            .flatten()
            .map(|entity| EntityRef::new(entity, &self.schema))
    }

    /// Entities accepted by `predicate`, in index order.
    pub fn filter<P>(&self, mut predicate: P) -> Vec<EntityRef<'_>>
    where
        P: FnMut(&EntityRef<'_>) -> bool,
    {
        self.iter().filter(|entity| predicate(entity)).collect()
    }

    /// Current value of a property of the entity behind `handle`.
    #[must_use]
    pub fn property(&self, handle: EntityHandle, name: &str) -> Option<PropertyValue> {
        self.entity_by_handle(handle)?.property(name)
    }

    /// Registers a handler called once per entity change, after each batch.
    ///
    /// An error aborts the remaining notifications of the batch and is
    /// returned from [`EntityStore::apply_packet_entities`].
    pub fn on_entity<F>(&mut self, handler: F)
    where
        F: FnMut(EntityRef<'_>, EntityOp) -> Result<(), HandlerError> + 'static,
    {
        self.handlers.add_entity(Box::new(handler));
    }

    /// Registers a handler for one property of the entities in `scope`.
    ///
    /// Fires immediately for matching entities that already hold a value,
    /// then after each batch that changes the property.
    pub fn on_field<F>(&mut self, scope: HandlerScope, field: impl Into<String>, handler: F)
    where
        F: FnMut(EntityRef<'_>, &PropertyValue) + 'static,
    {
        let existing = self
            .entities
            .iter()
            .flatten()
            .map(|entity| EntityRef::new(entity, &self.schema));
        self.handlers
            .add_field(scope, field.into(), Box::new(handler), existing);
    }

    /// Registers a handler for the world position of the entities in
    /// `scope`.
    ///
    /// Fires immediately for matching entities with a known position, then
    /// at most once per batch when the position actually changed.
    pub fn on_position<F>(&mut self, scope: HandlerScope, handler: F)
    where
        F: FnMut(EntityRef<'_>, [f32; 3]) + 'static,
    {
        let existing = self
            .entities
            .iter()
            .flatten()
            .map(|entity| EntityRef::new(entity, &self.schema));
        self.handlers.add_position(scope, Box::new(handler), existing);
    }

    /// Applies one packet-entities message and notifies handlers.
    ///
    /// Returns the changes of the batch in stream order. On error, updates
    /// applied before the failing one are kept and no handler runs.
    pub fn apply_packet_entities(&mut self, msg: &PacketEntities<'_>) -> EntityResult<&[EntityChange]> {
        self.changes.clear();
        self.touched.clear();
        self.removed.clear();

        let updates = msg.updated_entries as usize;
        if updates > self.limits.max_updates_per_batch {
            return Err(EntityError::LimitExceeded {
                kind: LimitKind::UpdatesPerBatch,
                limit: self.limits.max_updates_per_batch,
                actual: updates,
            });
        }

        let strategy = self.schema.strategy();
        if strategy == DecodingStrategy::FieldPath && !msg.is_delta {
            if self.full_snapshots > 0 {
                warn!(updates, "ignoring repeated full snapshot");
                return Ok(&[]);
            }
            self.full_snapshots += 1;
        }

        let mut reader = BitReader::new(msg.data);
        match strategy {
            DecodingStrategy::Legacy => self.read_legacy_batch(&mut reader, msg.updated_entries)?,
            DecodingStrategy::FieldPath => self.read_modern_batch(&mut reader, msg)?,
        }
        if reader.bits_remaining() >= 8 {
            warn!(bits = reader.bits_remaining(), "unread data after packet entities");
        }
        trace!(
            updates,
            changes = self.changes.len(),
            delta = msg.is_delta,
            "applied packet entities"
        );

        self.dispatch()?;
        self.removed.clear();
        Ok(&self.changes)
    }

    fn read_legacy_batch(&mut self, reader: &mut BitReader<'_>, updates: u32) -> EntityResult<()> {
        let mut cursor = -1i64;
        for _ in 0..updates {
            let index = next_index(reader, &mut cursor, self.limits.max_entities)?;
            if reader.read_bool()? {
                let delete = reader.read_bool()?;
                if !self.leave(index, delete) {
                    trace!(index, "leave for unknown entity");
                }
            } else if reader.read_bool()? {
                self.enter_legacy(index, reader)?;
            } else {
                self.update(index, reader)?;
            }
        }
        Ok(())
    }

    fn read_modern_batch(&mut self, reader: &mut BitReader<'_>, msg: &PacketEntities<'_>) -> EntityResult<()> {
        let mut cursor = -1i64;
        for _ in 0..msg.updated_entries {
            let index = next_index(reader, &mut cursor, self.limits.max_entities)?;
            let cmd = reader.read_bits(2)?;
            if cmd & 1 == 0 {
                if cmd & 2 != 0 {
                    self.create_modern(index, reader)?;
                } else {
                    if msg.has_pvs_vis_bits && reader.read_bits(2)? & 1 != 0 {
                        continue;
                    }
                    self.update(index, reader)?;
                }
            } else if !self.leave(index, cmd & 2 != 0) {
                warn!(index, "leave for unknown entity");
            }
        }
        Ok(())
    }

    fn slot_mut(&mut self, index: u32) -> &mut Option<Entity> {
        let slot = index as usize;
        if slot >= self.entities.len() {
            self.entities.resize_with(slot + 1, || None);
        }
        &mut self.entities[slot]
    }

    /// Moves the entity at `index` out of the store, recording `op`.
    fn remove(&mut self, index: u32, op: EntityOp) {
        if let Some(entity) = self.entities.get_mut(index as usize).and_then(Option::take) {
            debug!(index, class = entity.class_name(), "deleted entity");
            self.changes.push(EntityChange::new(entity.handle(), op));
            self.removed.push(entity);
        }
    }

    fn insert(&mut self, entity: Entity) {
        let index = entity.index();
        let handle = entity.handle();
        self.remove(index, EntityOp::DELETED);
        debug!(index, serial = handle.serial(), class = entity.class_name(), "created entity");
        *self.slot_mut(index) = Some(entity);
        self.changes.push(EntityChange::new(handle, EntityOp::CREATED | EntityOp::ENTERED));
    }

    /// Handles a leave command; returns `false` if no entity exists.
    fn leave(&mut self, index: u32, delete: bool) -> bool {
        let Some(entity) = self.entities.get_mut(index as usize).and_then(Option::as_mut) else {
            return false;
        };
        let active = entity.is_active();
        if delete {
            let op = if active {
                EntityOp::LEFT | EntityOp::DELETED
            } else {
                EntityOp::DELETED
            };
            self.remove(index, op);
        } else if active {
            entity.set_active(false);
            let handle = entity.handle();
            self.changes.push(EntityChange::new(handle, EntityOp::LEFT));
        }
        true
    }

    fn enter_legacy(&mut self, index: u32, reader: &mut BitReader<'_>) -> EntityResult<()> {
        let class_id = reader.read_u32(self.schema.class_id_bits())?;
        let serial = reader.read_u32(LEGACY_SERIAL_BITS)?;

        let same_serial = self
            .entities
            .get(index as usize)
            .and_then(Option::as_ref)
            .is_some_and(|entity| entity.serial() == serial);
        if same_serial {
            return self.update(index, reader);
        }

        let class = self
            .schema
            .legacy_class(class_id)
            .ok_or(SchemaError::UnknownClass { class_id })?;
        let limit = self.limits.max_legacy_field_indices;
        let indices = self.scratch.indices_mut();
        let mut slots = vec![None; class.props.len()];

        if let Some(values) = self.baselines.get(class_id) {
            BaselineCache::apply(values, &mut slots);
        } else {
            let decoded: BaselineValues = match self.schema.baseline(class_id) {
                Some(blob) => {
                    apply_update(class, &mut slots, &mut BitReader::new(blob), indices, limit)
                        .map_err(|err| err.in_entity(index, &class.name))?;
                    indices
                        .iter()
                        .filter_map(|&slot| Some((slot, slots.get(slot)?.clone()?)))
                        .collect()
                }
                None => {
                    warn!(index, class = %class.name, "no instance baseline for class");
                    Vec::new()
                }
            };
            self.baselines.insert(class_id, decoded);
        }

        apply_update(class, &mut slots, reader, indices, limit)
            .map_err(|err| err.in_entity(index, &class.name))?;
        let entity = Entity::legacy(index, serial, class, slots);
        self.insert(entity);
        Ok(())
    }

    fn create_modern(&mut self, index: u32, reader: &mut BitReader<'_>) -> EntityResult<()> {
        let class_id = reader.read_u32(self.schema.class_id_bits())?;
        let serial = reader.read_u32(MODERN_SERIAL_BITS)?;
        reader.read_varu32()?;

        let class = self
            .schema
            .modern_class(class_id)
            .ok_or(SchemaError::UnknownClass { class_id })?;
        let root = self.schema.class_serializer(class_id)?;
        let set = self.schema.serializers();
        let limit = self.limits.max_field_paths_per_update;
        let paths = self.scratch.paths_mut();
        let mut state = FieldState::new();

        match self.schema.baseline(class_id) {
            Some(blob) => read_fields(set, root, &mut state, &mut BitReader::new(blob), paths, limit)
                .map_err(|err| err.in_entity(index, &class.name))?,
            None => warn!(index, class = %class.name, "no instance baseline for class"),
        }
        read_fields(set, root, &mut state, reader, paths, limit)
            .map_err(|err| err.in_entity(index, &class.name))?;

        let entity = Entity::modern(index, serial, class_id, &class.name, root, state);
        self.insert(entity);
        Ok(())
    }

    /// Applies a delta to an existing entity.
    fn update(&mut self, index: u32, reader: &mut BitReader<'_>) -> EntityResult<()> {
        let Some(entity) = self.entities.get_mut(index as usize).and_then(Option::as_mut) else {
            return Err(EntityError::MissingEntity { index });
        };
        let mut op = EntityOp::UPDATED;
        if !entity.is_active() {
            entity.set_active(true);
            op |= EntityOp::ENTERED;
        }
        let handle = entity.handle();
        let class_id = entity.class_id();
        let change = self.changes.len();
        let record = self.handlers.wants_fields();
        let (class_name, fields) = entity.parts_mut();

        match fields {
            EntityFields::Legacy(slots) => {
                let class = self
                    .schema
                    .legacy_class(class_id)
                    .ok_or(SchemaError::UnknownClass { class_id })?;
                let indices = self.scratch.indices_mut();
                apply_update(class, slots, reader, indices, self.limits.max_legacy_field_indices)
                    .map_err(|err| err.in_entity(index, class_name))?;
                if record {
                    self.touched
                        .extend(indices.iter().map(|&slot| (change, FieldKey::Slot(slot))));
                }
            }
            EntityFields::Modern { serializer, state } => {
                let paths = self.scratch.paths_mut();
                read_fields(
                    self.schema.serializers(),
                    *serializer,
                    state,
                    reader,
                    paths,
                    self.limits.max_field_paths_per_update,
                )
                .map_err(|err| err.in_entity(index, class_name))?;
                if record {
                    self.touched
                        .extend(paths.iter().map(|&path| (change, FieldKey::Path(path))));
                }
            }
        }

        self.changes.push(EntityChange::new(handle, op));
        Ok(())
    }

    fn dispatch(&mut self) -> EntityResult<()> {
        let Self {
            schema,
            entities,
            handlers,
            changes,
            touched,
            removed,
            ..
        } = self;
        if handlers.is_empty() {
            return Ok(());
        }

        let mut fired = HashSet::new();
        let mut cursor = 0;
        for (i, change) in changes.iter().enumerate() {
            let start = cursor;
            while touched.get(cursor).is_some_and(|(owner, _)| *owner == i) {
                cursor += 1;
            }
            let Some(entity) = find_touched(entities, removed, *change) else {
                continue;
            };
            let view = EntityRef::new(entity, schema);
            handlers.notify(view, change.op, &touched[start..cursor], &mut fired)?;
        }
        Ok(())
    }
}

/// Advances the running entity index by one encoded delta.
fn next_index(reader: &mut BitReader<'_>, cursor: &mut i64, max_entities: usize) -> EntityResult<u32> {
    *cursor += i64::from(reader.read_ubitvar()?) + 1;
    let actual = usize::try_from(*cursor).unwrap_or(usize::MAX);
    if actual >= max_entities {
        return Err(EntityError::LimitExceeded {
            kind: LimitKind::Entities,
            limit: max_entities,
            actual,
        });
    }
    u32::try_from(actual).map_err(|_| EntityError::LimitExceeded {
        kind: LimitKind::Entities,
        limit: max_entities,
        actual,
    })
}

/// Resolves the entity a change refers to, including entities deleted
/// during the batch.
fn find_touched<'a>(entities: &'a [Option<Entity>], removed: &'a [Entity], change: EntityChange) -> Option<&'a Entity> {
    let handle = change.handle;
    let live = || {
        entities
            .get(handle.index() as usize)
            .and_then(Option::as_ref)
            .filter(|entity| entity.handle() == handle)
    };
    let gone = || removed.iter().rev().find(|entity| entity.handle() == handle);
    if change.op.contains(EntityOp::DELETED) {
        gone().or_else(live)
    } else {
        live().or_else(gone)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitstream::BitWriter;

    fn write_header(writer: &mut BitWriter, delta: u32) {
        writer.write_ubitvar(delta);
    }

    #[test]
    fn next_index_accumulates_deltas() {
        let mut writer = BitWriter::new();
        write_header(&mut writer, 0);
        write_header(&mut writer, 4);
        let bytes = writer.finish();
        let mut reader = BitReader::new(&bytes);
        let mut cursor = -1;
        assert_eq!(next_index(&mut reader, &mut cursor, 64).unwrap(), 0);
        assert_eq!(next_index(&mut reader, &mut cursor, 64).unwrap(), 5);
    }

    #[test]
    fn next_index_enforces_entity_limit() {
        let mut writer = BitWriter::new();
        write_header(&mut writer, 70);
        let bytes = writer.finish();
        let err = next_index(&mut BitReader::new(&bytes), &mut -1, 64).unwrap_err();
        assert!(matches!(
            err,
            EntityError::LimitExceeded {
                kind: LimitKind::Entities,
                limit: 64,
                actual: 70
            }
        ));
    }

    #[test]
    fn update_limit_is_checked_before_decoding() {
        let mut store = EntityStore::with_limits(SchemaRegistry::legacy(), EngineLimits::for_testing());
        let err = store
            .apply_packet_entities(&PacketEntities::new(&[], 33))
            .unwrap_err();
        assert!(matches!(
            err,
            EntityError::LimitExceeded {
                kind: LimitKind::UpdatesPerBatch,
                ..
            }
        ));
    }

    #[test]
    fn packet_builder_flags() {
        let msg = PacketEntities::new(&[1, 2], 2).full().with_pvs_vis_bits();
        assert!(!msg.is_delta);
        assert!(msg.has_pvs_vis_bits);
        assert_eq!(msg.updated_entries, 2);
    }

    #[test]
    fn empty_batch_has_no_changes() {
        let mut store = EntityStore::new(SchemaRegistry::legacy());
        assert!(store.apply_packet_entities(&PacketEntities::new(&[], 0)).unwrap().is_empty());
        assert!(store.is_empty());
        assert_eq!(store.len(), 0);
    }
}
