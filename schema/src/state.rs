//! Sparse nested field state addressed by field paths.

use crate::path::{FieldPath, FieldPathError};
use crate::value::PropertyValue;

/// Upper bound on the slot count of one field state level.
pub const MAX_STATE_SLOTS: usize = 1 << 16;

/// One slot of a [`FieldState`].
#[derive(Debug, Clone, PartialEq)]
pub enum FieldNode {
    /// A decoded leaf value.
    Value(PropertyValue),
    /// A nested table or array.
    Nested(FieldState),
}

impl FieldNode {
    /// The leaf value, if any.
    #[must_use]
    pub const fn value(&self) -> Option<&PropertyValue> {
        match self {
            Self::Value(v) => Some(v),
            Self::Nested(_) => None,
        }
    }

    /// The nested state, if any.
    #[must_use]
    pub const fn nested(&self) -> Option<&FieldState> {
        match self {
            Self::Nested(s) => Some(s),
            Self::Value(_) => None,
        }
    }

    /// The value as seen by property consumers: containers report their length.
    #[must_use]
    pub fn to_property(&self) -> PropertyValue {
        match self {
            Self::Value(v) => v.clone(),
            Self::Nested(s) => PropertyValue::SubState { len: s.len() },
        }
    }
}

/// Recursive sparse array of decoded values.
///
/// Levels grow on write and keep their capacity when a container shrinks.
/// A polymorphic table records the serializer variant it was instantiated
/// with.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldState {
    slots: Vec<Option<FieldNode>>,
    variant: Option<u32>,
}

fn slot_index(index: i32, level: usize) -> Result<usize, FieldPathError> {
    let slot = usize::try_from(index).map_err(|_| FieldPathError::NegativeIndex {
        level,
        value: index,
    })?;
    if slot >= MAX_STATE_SLOTS {
        return Err(FieldPathError::SlotOutOfRange {
            index: slot,
            max: MAX_STATE_SLOTS,
        });
    }
    Ok(slot)
}

impl FieldState {
    /// Creates an empty state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of slots, set or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns `true` if there are no slots.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Allocated slot capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots.capacity()
    }

    /// Raw slots.
    #[must_use]
    pub fn slots(&self) -> &[Option<FieldNode>] {
        &self.slots
    }

    /// The polymorphic variant this level was instantiated with.
    #[must_use]
    pub const fn variant(&self) -> Option<u32> {
        self.variant
    }

    /// Looks up the node at `indices`.
    #[must_use]
    pub fn get_at(&self, indices: &[i32]) -> Option<&FieldNode> {
        let (&last, parents) = indices.split_last()?;
        let mut level = self;
        for &index in parents {
            let slot = usize::try_from(index).ok()?;
            level = level.slots.get(slot)?.as_ref()?.nested()?;
        }
        let slot = usize::try_from(last).ok()?;
        level.slots.get(slot)?.as_ref()
    }

    /// Looks up the node addressed by `path`.
    #[must_use]
    pub fn get(&self, path: &FieldPath) -> Option<&FieldNode> {
        self.get_at(path.as_slice())
    }

    /// Looks up the leaf value addressed by `path`.
    #[must_use]
    pub fn get_value(&self, path: &FieldPath) -> Option<&PropertyValue> {
        self.get(path).and_then(FieldNode::value)
    }

    /// Looks up the nested state at `indices`; an empty prefix is `self`.
    #[must_use]
    pub fn get_nested_at(&self, indices: &[i32]) -> Option<&FieldState> {
        if indices.is_empty() {
            return Some(self);
        }
        self.get_at(indices).and_then(FieldNode::nested)
    }

    fn slot_mut(&mut self, slot: usize) -> &mut Option<FieldNode> {
        if self.slots.len() <= slot {
            self.slots.resize(slot + 1, None);
        }
        &mut self.slots[slot]
    }

    fn nested_mut(&mut self, slot: usize) -> &mut FieldState {
        let entry = self.slot_mut(slot);
        if !matches!(entry, Some(FieldNode::Nested(_))) {
            *entry = Some(FieldNode::Nested(FieldState::new()));
        }
        match entry {
            Some(FieldNode::Nested(state)) => state,
            _ => unreachable!("slot was just made nested"),
        }
    }

    /// Walks to the parent level of `indices`, creating nested levels on the way.
    fn parent_mut(&mut self, indices: &[i32]) -> Result<&mut FieldState, FieldPathError> {
        let mut level = self;
        for (depth, &index) in indices.iter().enumerate() {
            let slot = slot_index(index, depth)?;
            level = level.nested_mut(slot);
        }
        Ok(level)
    }

    /// Writes a leaf value.
    ///
    /// Intermediate levels that are missing or hold a leaf become nested
    /// levels. A container already present at the target is left intact.
    pub fn set(&mut self, path: &FieldPath, value: PropertyValue) -> Result<(), FieldPathError> {
        let indices = path.as_slice();
        let (&last, parents) = indices
            .split_last()
            .ok_or(FieldPathError::LevelOutOfRange { level: 0, depth: 0 })?;
        let slot = slot_index(last, parents.len())?;
        let entry = self.parent_mut(parents)?.slot_mut(slot);
        if !matches!(entry, Some(FieldNode::Nested(_))) {
            *entry = Some(FieldNode::Value(value));
        }
        Ok(())
    }

    /// Sets the slot count of the container at `path`, creating it if needed.
    ///
    /// Shrinking drops trailing slots; growing adds empty ones.
    pub fn resize(&mut self, path: &FieldPath, len: usize) -> Result<(), FieldPathError> {
        if len > MAX_STATE_SLOTS {
            return Err(FieldPathError::SlotOutOfRange {
                index: len,
                max: MAX_STATE_SLOTS,
            });
        }
        let container = self.parent_mut(path.as_slice())?;
        container.slots.truncate(len);
        container.slots.resize(len, None);
        Ok(())
    }

    /// Records the polymorphic variant of the table at `path`.
    ///
    /// Switching to a different variant discards the table's previous slots.
    pub fn set_variant(&mut self, path: &FieldPath, variant: u32) -> Result<(), FieldPathError> {
        let table = self.parent_mut(path.as_slice())?;
        if table.variant != Some(variant) {
            if table.variant.is_some() {
                table.slots.clear();
            }
            table.variant = Some(variant);
        }
        Ok(())
    }

    /// The polymorphic variant recorded at `indices`.
    #[must_use]
    pub fn variant_at(&self, indices: &[i32]) -> Option<u32> {
        self.get_nested_at(indices).and_then(FieldState::variant)
    }

    /// Iterates over set slots.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &FieldNode)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|node| (i, node)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(indices: &[i32]) -> FieldPath {
        FieldPath::from_slice(indices).unwrap()
    }

    #[test]
    fn set_and_get_nested() {
        let mut state = FieldState::new();
        state.set(&path(&[2, 1, 3]), PropertyValue::Signed(9)).unwrap();

        assert_eq!(
            state.get_value(&path(&[2, 1, 3])),
            Some(&PropertyValue::Signed(9))
        );
        assert_eq!(state.len(), 3);
        assert!(state.get(&path(&[0])).is_none());
        assert!(state.get(&path(&[2, 1])).unwrap().nested().is_some());
    }

    #[test]
    fn leaf_on_the_way_becomes_nested() {
        let mut state = FieldState::new();
        state.set(&path(&[1]), PropertyValue::Bool(true)).unwrap();
        state.set(&path(&[1, 0]), PropertyValue::Unsigned(4)).unwrap();

        let node = state.get(&path(&[1])).unwrap();
        assert_eq!(node.to_property(), PropertyValue::SubState { len: 1 });
    }

    #[test]
    fn set_does_not_overwrite_container() {
        let mut state = FieldState::new();
        state.resize(&path(&[0]), 2).unwrap();
        state.set(&path(&[0]), PropertyValue::Unsigned(5)).unwrap();
        assert_eq!(
            state.get(&path(&[0])).unwrap().to_property(),
            PropertyValue::SubState { len: 2 }
        );
    }

    #[test]
    fn resize_keeps_capacity() {
        let mut state = FieldState::new();
        let p = path(&[0]);
        state.resize(&p, 16).unwrap();
        state
            .set(&path(&[0, 15]), PropertyValue::Unsigned(1))
            .unwrap();
        state.resize(&p, 2).unwrap();
        let inner = state.get(&p).unwrap().nested().unwrap();
        assert_eq!(inner.len(), 2);
        assert!(inner.capacity() >= 16);

        state.resize(&p, 16).unwrap();
        assert!(state.get(&path(&[0, 15])).is_none());
    }

    #[test]
    fn negative_index_rejected() {
        let mut state = FieldState::new();
        let err = state
            .set(&FieldPath::new(), PropertyValue::Bool(true))
            .unwrap_err();
        assert_eq!(err, FieldPathError::NegativeIndex { level: 0, value: -1 });
    }

    #[test]
    fn huge_index_rejected() {
        let mut state = FieldState::new();
        assert!(matches!(
            state.set(&path(&[1 << 20]), PropertyValue::Bool(true)),
            Err(FieldPathError::SlotOutOfRange { .. })
        ));
    }

    #[test]
    fn variant_switch_clears_slots() {
        let mut state = FieldState::new();
        let table = path(&[4]);
        state.set_variant(&table, 1).unwrap();
        state.set(&path(&[4, 0]), PropertyValue::Signed(1)).unwrap();
        state.set_variant(&table, 1).unwrap();
        assert!(state.get(&path(&[4, 0])).is_some());

        state.set_variant(&table, 2).unwrap();
        assert!(state.get(&path(&[4, 0])).is_none());
        assert_eq!(state.variant_at(&[4]), Some(2));
    }

    #[test]
    fn iter_skips_empty_slots() {
        let mut state = FieldState::new();
        state.set(&path(&[3]), PropertyValue::Bool(false)).unwrap();
        let set: Vec<usize> = state.iter().map(|(i, _)| i).collect();
        assert_eq!(set, vec![3]);
    }
}
