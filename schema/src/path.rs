//! Field paths: addresses of nested fields in a flattened serializer.

use std::fmt;

/// Maximum nesting depth of a field path.
pub const MAX_FIELD_PATH_DEPTH: usize = 7;

/// Errors raised while mutating or applying a field path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum FieldPathError {
    /// A push would exceed the maximum depth.
    #[error("field path deeper than {max} levels")]
    TooDeep {
        /// Maximum depth.
        max: usize,
    },
    /// A pop removed more levels than the path holds.
    #[error("cannot pop {requested} levels from a path with {available} poppable levels")]
    PopUnderflow {
        /// Levels requested.
        requested: usize,
        /// Levels available above the root.
        available: usize,
    },
    /// A level holds a negative index where a slot is required.
    #[error("field path level {level} holds negative index {value}")]
    NegativeIndex {
        /// Level of the offending index.
        level: usize,
        /// The index.
        value: i32,
    },
    /// A level beyond the deepest occupied one was addressed.
    #[error("field path level {level} is not occupied (depth {depth})")]
    LevelOutOfRange {
        /// Requested level.
        level: usize,
        /// Occupied levels.
        depth: usize,
    },
    /// An index or container length exceeds the slot bound of a field state.
    #[error("slot index {index} exceeds the maximum of {max}")]
    SlotOutOfRange {
        /// Requested slot.
        index: usize,
        /// Upper bound.
        max: usize,
    },
    /// The parent level of a single-level path was addressed.
    #[error("field path has no parent level")]
    NoParent,
}

/// A fixed-capacity stack of indices addressing one field.
///
/// A fresh path is `[-1]` so that the first "plus one" operation lands on
/// field 0.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct FieldPath {
    path: [i32; MAX_FIELD_PATH_DEPTH],
    last: usize,
}

impl Default for FieldPath {
    fn default() -> Self {
        Self::new()
    }
}

impl FieldPath {
    /// Creates the initial path `[-1]`.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            path: [-1, 0, 0, 0, 0, 0, 0],
            last: 0,
        }
    }

    /// Builds a path from explicit indices.
    pub fn from_slice(indices: &[i32]) -> Result<Self, FieldPathError> {
        if indices.is_empty() {
            return Ok(Self::new());
        }
        if indices.len() > MAX_FIELD_PATH_DEPTH {
            return Err(FieldPathError::TooDeep {
                max: MAX_FIELD_PATH_DEPTH,
            });
        }
        let mut path = [0; MAX_FIELD_PATH_DEPTH];
        path[..indices.len()].copy_from_slice(indices);
        Ok(Self {
            path,
            last: indices.len() - 1,
        })
    }

    /// Resets to the initial path.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Index of the deepest occupied level.
    #[must_use]
    pub const fn last(&self) -> usize {
        self.last
    }

    /// Number of occupied levels.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.last + 1
    }

    /// Always `false`; a path holds at least its root level.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        false
    }

    /// The occupied levels.
    #[must_use]
    pub fn as_slice(&self) -> &[i32] {
        &self.path[..=self.last]
    }

    /// The index at `level`, if occupied.
    #[must_use]
    pub fn get(&self, level: usize) -> Option<i32> {
        self.as_slice().get(level).copied()
    }

    /// The index at `level` as a slot number.
    pub fn slot(&self, level: usize) -> Result<usize, FieldPathError> {
        let value = self.get(level).unwrap_or(0);
        usize::try_from(value).map_err(|_| FieldPathError::NegativeIndex { level, value })
    }

    /// Adds `delta` to the deepest level.
    pub fn add_last(&mut self, delta: i32) {
        self.path[self.last] = self.path[self.last].wrapping_add(delta);
    }

    /// Overwrites the deepest level.
    pub fn set_last(&mut self, value: i32) {
        self.path[self.last] = value;
    }

    /// Adds `delta` to an occupied level.
    pub fn add_at(&mut self, level: usize, delta: i32) -> Result<(), FieldPathError> {
        if level > self.last {
            return Err(FieldPathError::LevelOutOfRange {
                level,
                depth: self.last + 1,
            });
        }
        self.path[level] = self.path[level].wrapping_add(delta);
        Ok(())
    }

    /// Opens a new level holding `value`.
    pub fn push(&mut self, value: i32) -> Result<(), FieldPathError> {
        if self.last + 1 >= MAX_FIELD_PATH_DEPTH {
            return Err(FieldPathError::TooDeep {
                max: MAX_FIELD_PATH_DEPTH,
            });
        }
        self.last += 1;
        self.path[self.last] = value;
        Ok(())
    }

    /// Removes `n` levels, zeroing them.
    pub fn pop(&mut self, n: usize) -> Result<(), FieldPathError> {
        if n > self.last {
            return Err(FieldPathError::PopUnderflow {
                requested: n,
                available: self.last,
            });
        }
        for _ in 0..n {
            self.path[self.last] = 0;
            self.last -= 1;
        }
        Ok(())
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, index) in self.as_slice().iter().enumerate() {
            if i > 0 {
                write!(f, "/")?;
            }
            write!(f, "{index}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FieldPath({self})")
    }
}
