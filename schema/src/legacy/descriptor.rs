//! Send-table descriptors as they arrive on the wire.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{SchemaError, SchemaResult};

/// Property flag bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PropFlags(u32);

impl PropFlags {
    pub const UNSIGNED: Self = Self(1 << 0);
    pub const COORD: Self = Self(1 << 1);
    pub const NO_SCALE: Self = Self(1 << 2);
    pub const ROUND_DOWN: Self = Self(1 << 3);
    pub const ROUND_UP: Self = Self(1 << 4);
    pub const NORMAL: Self = Self(1 << 5);
    pub const EXCLUDE: Self = Self(1 << 6);
    pub const XYZE: Self = Self(1 << 7);
    pub const INSIDE_ARRAY: Self = Self(1 << 8);
    pub const PROXY_ALWAYS_YES: Self = Self(1 << 9);
    pub const IS_VECTOR_ELEMENT: Self = Self(1 << 10);
    pub const COLLAPSIBLE: Self = Self(1 << 11);
    pub const COORD_MP: Self = Self(1 << 12);
    pub const COORD_MP_LOW_PRECISION: Self = Self(1 << 13);
    pub const COORD_MP_INTEGRAL: Self = Self(1 << 14);
    pub const CELL_COORD: Self = Self(1 << 15);
    pub const CELL_COORD_LOW_PRECISION: Self = Self(1 << 16);
    pub const CELL_COORD_INTEGRAL: Self = Self(1 << 17);
    pub const CHANGES_OFTEN: Self = Self(1 << 18);
    pub const VAR_INT: Self = Self(1 << 19);

    /// Flags that select a non-linear float encoding.
    pub const SPECIAL_FLOAT: Self = Self(
        Self::NO_SCALE.0
            | Self::COORD.0
            | Self::CELL_COORD.0
            | Self::NORMAL.0
            | Self::COORD_MP.0
            | Self::COORD_MP_LOW_PRECISION.0
            | Self::COORD_MP_INTEGRAL.0
            | Self::CELL_COORD_LOW_PRECISION.0
            | Self::CELL_COORD_INTEGRAL.0,
    );

    /// Wraps raw flag bits.
    #[must_use]
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// Raw flag bits.
    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Returns `true` if every bit of `other` is set.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns `true` if any bit of `other` is set.
    #[must_use]
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }
}

impl std::ops::BitOr for PropFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Wire type of a send prop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropType {
    Int,
    Float,
    Vector,
    VectorXY,
    String,
    Array,
    DataTable,
    Int64,
}

impl PropType {
    /// Maps the raw wire tag.
    #[must_use]
    pub const fn from_raw(raw: i32) -> Option<Self> {
        Some(match raw {
            0 => Self::Int,
            1 => Self::Float,
            2 => Self::Vector,
            3 => Self::VectorXY,
            4 => Self::String,
            5 => Self::Array,
            6 => Self::DataTable,
            7 => Self::Int64,
            _ => return None,
        })
    }

    /// The raw wire tag.
    #[must_use]
    pub const fn raw(self) -> i32 {
        self as i32
    }
}

/// One property of a send table.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SendProp {
    /// Raw wire type tag.
    pub prop_type: i32,
    pub var_name: String,
    pub flags: PropFlags,
    pub priority: i32,
    /// Referenced table for data-table props and exclude targets.
    pub dt_name: String,
    pub num_elements: i32,
    pub low_value: f32,
    pub high_value: f32,
    pub num_bits: i32,
}

impl SendProp {
    /// Creates a new property of the given type with no flags.
    #[must_use]
    pub fn new(name: impl Into<String>, prop_type: PropType) -> Self {
        Self {
            prop_type: prop_type.raw(),
            var_name: name.into(),
            flags: PropFlags::default(),
            priority: 0,
            dt_name: String::new(),
            num_elements: 0,
            low_value: 0.0,
            high_value: 0.0,
            num_bits: 0,
        }
    }

    /// Sets the flags.
    #[must_use]
    pub const fn flags(mut self, flags: PropFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Sets the bit width.
    #[must_use]
    pub const fn bits(mut self, bits: i32) -> Self {
        self.num_bits = bits;
        self
    }

    /// Sets the quantization range.
    #[must_use]
    pub const fn range(mut self, low: f32, high: f32) -> Self {
        self.low_value = low;
        self.high_value = high;
        self
    }

    /// Sets the transmission priority.
    #[must_use]
    pub const fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Sets the array element count.
    #[must_use]
    pub const fn elements(mut self, count: i32) -> Self {
        self.num_elements = count;
        self
    }

    /// Sets the referenced table.
    #[must_use]
    pub fn table(mut self, name: impl Into<String>) -> Self {
        self.dt_name = name.into();
        self
    }

    /// Builds a data-table reference.
    #[must_use]
    pub fn data_table(name: impl Into<String>, table: impl Into<String>) -> Self {
        Self::new(name, PropType::DataTable).table(table)
    }

    /// Builds an exclude directive for `name` in `table`.
    #[must_use]
    pub fn exclude(table: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(name, PropType::Int)
            .flags(PropFlags::EXCLUDE)
            .table(table)
    }

    /// Resolved wire type.
    pub fn kind(&self) -> SchemaResult<PropType> {
        PropType::from_raw(self.prop_type).ok_or_else(|| SchemaError::UnknownPropType {
            prop: self.var_name.clone(),
            type_id: self.prop_type,
        })
    }

    /// Returns `true` if `flag` is set.
    #[must_use]
    pub const fn has(&self, flag: PropFlags) -> bool {
        self.flags.contains(flag)
    }
}

/// A named list of send props.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SendTable {
    pub name: String,
    pub props: Vec<SendProp>,
    pub needs_decoder: bool,
}

impl SendTable {
    /// Creates a new empty table.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            props: Vec::new(),
            needs_decoder: false,
        }
    }

    /// Appends a property.
    #[must_use]
    pub fn prop(mut self, prop: SendProp) -> Self {
        self.props.push(prop);
        self
    }
}

/// A server class as listed after the send tables.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ServerClassInfo {
    pub class_id: u32,
    pub name: String,
    pub data_table: String,
}

impl ServerClassInfo {
    /// Creates a new class entry.
    #[must_use]
    pub fn new(class_id: u32, name: impl Into<String>, data_table: impl Into<String>) -> Self {
        Self {
            class_id,
            name: name.into(),
            data_table: data_table.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_contains_all_bits() {
        let flags = PropFlags::UNSIGNED | PropFlags::VAR_INT;
        assert!(flags.contains(PropFlags::UNSIGNED));
        assert!(!flags.contains(PropFlags::UNSIGNED | PropFlags::COORD));
        assert!(PropFlags::CELL_COORD.intersects(PropFlags::SPECIAL_FLOAT));
        assert!(!PropFlags::CHANGES_OFTEN.intersects(PropFlags::SPECIAL_FLOAT));
    }

    #[test]
    fn prop_type_round_trips_raw_tags() {
        for raw in 0..8 {
            assert_eq!(PropType::from_raw(raw).unwrap().raw(), raw);
        }
        assert_eq!(PropType::from_raw(8), None);
    }

    #[test]
    fn unknown_prop_type_names_prop() {
        let mut prop = SendProp::new("m_iWeird", PropType::Int);
        prop.prop_type = 42;
        assert_eq!(
            prop.kind(),
            Err(SchemaError::UnknownPropType {
                prop: "m_iWeird".to_owned(),
                type_id: 42
            })
        );
    }
}
