//! Collaborator callbacks dispatched after each batch.

use std::collections::{HashMap, HashSet};
use std::fmt;

use schema::PropertyValue;

use crate::entity::{Entity, EntityRef, FieldKey};
use crate::error::{EntityError, EntityResult, HandlerError};
use crate::types::{EntityHandle, EntityOp};

/// Called once per entity change.
pub type EntityHandler = Box<dyn FnMut(EntityRef<'_>, EntityOp) -> Result<(), HandlerError>>;

/// Called with the new value of a watched property.
pub type FieldHandler = Box<dyn FnMut(EntityRef<'_>, &PropertyValue)>;

/// Called with the new world position of an entity.
pub type PositionHandler = Box<dyn FnMut(EntityRef<'_>, [f32; 3])>;

/// Entities a field or position handler observes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HandlerScope {
    /// Every entity of the named class.
    Class(String),
    /// One entity, for as long as its handle resolves.
    Entity(EntityHandle),
}

impl HandlerScope {
    /// Creates a class scope.
    #[must_use]
    pub fn class(name: impl Into<String>) -> Self {
        Self::Class(name.into())
    }

    /// Creates a single-entity scope.
    #[must_use]
    pub const fn entity(handle: EntityHandle) -> Self {
        Self::Entity(handle)
    }

    /// Returns `true` if `entity` is observed by this scope.
    #[must_use]
    pub fn matches(&self, entity: &Entity) -> bool {
        match self {
            Self::Class(name) => entity.class_name() == name,
            Self::Entity(handle) => entity.handle() == *handle,
        }
    }
}

struct FieldSubscription {
    scope: HandlerScope,
    field: String,
    handler: FieldHandler,
}

struct PositionSubscription {
    scope: HandlerScope,
    last: HashMap<u32, [f32; 3]>,
    handler: PositionHandler,
}

/// Registered handlers and the per-entity state they need.
#[derive(Default)]
pub(crate) struct Handlers {
    entity: Vec<EntityHandler>,
    fields: Vec<FieldSubscription>,
    positions: Vec<PositionSubscription>,
}

impl fmt::Debug for Handlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handlers")
            .field("entity", &self.entity.len())
            .field("fields", &self.fields.len())
            .field("positions", &self.positions.len())
            .finish()
    }
}

impl Handlers {
    pub(crate) fn is_empty(&self) -> bool {
        self.entity.is_empty() && self.fields.is_empty() && self.positions.is_empty()
    }

    /// Touched fields only need recording while field handlers exist.
    pub(crate) fn wants_fields(&self) -> bool {
        !self.fields.is_empty()
    }

    pub(crate) fn add_entity(&mut self, handler: EntityHandler) {
        self.entity.push(handler);
    }

    /// Registers a field handler, first firing it for every matching entity
    /// that already has a value.
    pub(crate) fn add_field<'a>(
        &mut self,
        scope: HandlerScope,
        field: String,
        mut handler: FieldHandler,
        existing: impl Iterator<Item = EntityRef<'a>>,
    ) {
        for view in existing.filter(|view| scope.matches(view)) {
            if let Some(value) = view.property(&field) {
                handler(view, &value);
            }
        }
        self.fields.push(FieldSubscription { scope, field, handler });
    }

    /// Registers a position handler, first firing it for every matching
    /// entity whose position is already known.
    pub(crate) fn add_position<'a>(
        &mut self,
        scope: HandlerScope,
        mut handler: PositionHandler,
        existing: impl Iterator<Item = EntityRef<'a>>,
    ) {
        let mut last = HashMap::new();
        for view in existing.filter(|view| scope.matches(view)) {
            if let Some(position) = view.position() {
                last.insert(view.index(), position);
                handler(view, position);
            }
        }
        self.positions.push(PositionSubscription { scope, last, handler });
    }

    /// Notifies every handler of one change.
    ///
    /// `fired` collects `(index, field)` pairs already reported this batch.
    pub(crate) fn notify(
        &mut self,
        view: EntityRef<'_>,
        op: EntityOp,
        touched: &[(usize, FieldKey)],
        fired: &mut HashSet<(u32, String)>,
    ) -> EntityResult<()> {
        for handler in &mut self.entity {
            handler(view, op).map_err(|source| EntityError::Handler {
                index: view.index(),
                source,
            })?;
        }

        if !op.contains(EntityOp::DELETED) {
            self.notify_fields(view, op, touched, fired);
        }
        self.notify_positions(view, op);
        Ok(())
    }

    fn notify_fields(
        &mut self,
        view: EntityRef<'_>,
        op: EntityOp,
        touched: &[(usize, FieldKey)],
        fired: &mut HashSet<(u32, String)>,
    ) {
        if self.fields.is_empty() {
            return;
        }
        let index = view.index();

        if op.contains(EntityOp::CREATED) {
            for sub in self.fields.iter_mut().filter(|sub| sub.scope.matches(&view)) {
                if let Some(value) = view.property(&sub.field) {
                    fired.insert((index, sub.field.clone()));
                    (sub.handler)(view, &value);
                }
            }
            return;
        }

        for (_, key) in touched {
            let Some(name) = view.field_name(key) else {
                continue;
            };
            if fired.contains(&(index, name.clone())) {
                continue;
            }
            let mut subs = self
                .fields
                .iter_mut()
                .filter(|sub| sub.field == name && sub.scope.matches(&view))
                .peekable();
            if subs.peek().is_none() {
                continue;
            }
            let Some(value) = view.property(&name) else {
                continue;
            };
            for sub in subs {
                (sub.handler)(view, &value);
            }
            fired.insert((index, name));
        }
    }

    fn notify_positions(&mut self, view: EntityRef<'_>, op: EntityOp) {
        let index = view.index();
        for sub in self.positions.iter_mut().filter(|sub| sub.scope.matches(&view)) {
            if op.contains(EntityOp::DELETED) {
                sub.last.remove(&index);
                continue;
            }
            let Some(position) = view.position() else {
                continue;
            };
            if sub.last.get(&index) != Some(&position) {
                sub.last.insert(index, position);
                (sub.handler)(view, position);
            }
        }
    }
}
