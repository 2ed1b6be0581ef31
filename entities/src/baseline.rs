//! Decoded legacy instance baselines.

use std::collections::HashMap;

use schema::PropertyValue;

/// Slot values decoded from one class baseline.
pub type BaselineValues = Vec<(usize, PropertyValue)>;

/// Per-class memo of decoded legacy baselines.
///
/// A class baseline is decoded the first time an entity of that class is
/// created and reapplied verbatim afterwards. Replacing the raw baseline
/// invalidates the memo.
#[derive(Debug, Default)]
pub struct BaselineCache {
    decoded: HashMap<u32, BaselineValues>,
}

impl BaselineCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Decoded baseline of a class, if already decoded.
    #[must_use]
    pub fn get(&self, class_id: u32) -> Option<&[(usize, PropertyValue)]> {
        self.decoded.get(&class_id).map(Vec::as_slice)
    }

    pub fn insert(&mut self, class_id: u32, values: BaselineValues) {
        self.decoded.insert(class_id, values);
    }

    /// Drops the decoded baseline of a class.
    pub fn invalidate(&mut self, class_id: u32) {
        self.decoded.remove(&class_id);
    }

    pub fn clear(&mut self) {
        self.decoded.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.decoded.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.decoded.is_empty()
    }

    /// Writes a decoded baseline into property slots.
    pub(crate) fn apply(values: &[(usize, PropertyValue)], slots: &mut [Option<PropertyValue>]) {
        for (slot, value) in values {
            if let Some(target) = slots.get_mut(*slot) {
                *target = Some(value.clone());
            }
        }
    }
}
