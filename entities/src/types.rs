//! Core entity types.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

/// Bits of the entity index in a modern handle word.
pub const MAX_EDICT_BITS: u32 = 14;

/// Mask selecting the entity index from a modern handle word.
pub const ENTITY_HANDLE_INDEX_MASK: u64 = (1 << MAX_EDICT_BITS) - 1;

/// Width of the serial number in a legacy enter-PVS header.
pub const LEGACY_SERIAL_BITS: u8 = 10;

/// Width of the serial number in a modern create header.
pub const MODERN_SERIAL_BITS: u8 = 17;

/// An `(index, serial)` pair that stays valid across index reuse.
///
/// A handle only resolves while the entity at its index still carries the
/// same serial number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct EntityHandle {
    index: u32,
    serial: u32,
}

impl EntityHandle {
    /// Creates a new handle.
    #[must_use]
    pub const fn new(index: u32, serial: u32) -> Self {
        Self { index, serial }
    }

    /// Splits a modern handle word into index and serial.
    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self {
            index: (raw & ENTITY_HANDLE_INDEX_MASK) as u32,
            serial: (raw >> MAX_EDICT_BITS) as u32,
        }
    }

    /// Packs the handle into a modern handle word.
    #[must_use]
    pub const fn to_raw(self) -> u64 {
        ((self.serial as u64) << MAX_EDICT_BITS) | (self.index as u64 & ENTITY_HANDLE_INDEX_MASK)
    }

    /// Returns the entity index.
    #[must_use]
    pub const fn index(self) -> u32 {
        self.index
    }

    /// Returns the serial number.
    #[must_use]
    pub const fn serial(self) -> u32 {
        self.serial
    }
}

impl fmt::Display for EntityHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.index, self.serial)
    }
}

/// What happened to an entity during a batch.
///
/// Operations combine, e.g. a freshly created entity reports
/// `CREATED | ENTERED`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct EntityOp(u8);

impl EntityOp {
    pub const NONE: Self = Self(0);
    pub const CREATED: Self = Self(1);
    pub const UPDATED: Self = Self(1 << 1);
    pub const DELETED: Self = Self(1 << 2);
    pub const ENTERED: Self = Self(1 << 3);
    pub const LEFT: Self = Self(1 << 4);

    const NAMES: [(Self, &'static str); 5] = [
        (Self::CREATED, "Created"),
        (Self::UPDATED, "Updated"),
        (Self::DELETED, "Deleted"),
        (Self::ENTERED, "Entered"),
        (Self::LEFT, "Left"),
    ];

    /// Returns the raw bits.
    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Returns `true` if every bit of `other` is set.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns `true` if no bit is set.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for EntityOp {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for EntityOp {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for EntityOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "None");
        }
        let mut first = true;
        for (op, name) in Self::NAMES {
            if self.contains(op) {
                if !first {
                    write!(f, "|")?;
                }
                write!(f, "{name}")?;
                first = false;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for EntityOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityOp({self})")
    }
}

/// One entity touched by a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityChange {
    pub handle: EntityHandle,
    pub op: EntityOp,
}

impl EntityChange {
    /// Creates a new change record.
    #[must_use]
    pub const fn new(handle: EntityHandle, op: EntityOp) -> Self {
        Self { handle, op }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_from_raw_splits_word() {
        let raw = (5u64 << 14) | 123;
        let handle = EntityHandle::from_raw(raw);
        assert_eq!(handle.index(), 123);
        assert_eq!(handle.serial(), 5);
        assert_eq!(handle.to_raw(), raw);
    }

    #[test]
    fn handle_display() {
        assert_eq!(EntityHandle::new(7, 2).to_string(), "7#2");
    }

    #[test]
    fn ops_combine() {
        let op = EntityOp::CREATED | EntityOp::ENTERED;
        assert!(op.contains(EntityOp::CREATED));
        assert!(op.contains(EntityOp::ENTERED));
        assert!(!op.contains(EntityOp::LEFT));
        assert_eq!(op.to_string(), "Created|Entered");
        assert_eq!(op.bits(), 0b1001);
    }

    #[test]
    fn empty_op_displays_none() {
        assert_eq!(EntityOp::NONE.to_string(), "None");
        let mut op = EntityOp::NONE;
        op |= EntityOp::LEFT;
        assert_eq!(format!("{op:?}"), "EntityOp(Left)");
    }
}
