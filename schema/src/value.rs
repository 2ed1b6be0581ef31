//! Decoded property values.

use std::fmt;

/// A decoded property value.
///
/// Every decoder produces one of these. Accessors never coerce between
/// variants: `as_*` returns `None` on a mismatch and `expect_*` panics.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    /// Boolean.
    Bool(bool),
    /// Signed integer.
    Signed(i64),
    /// Unsigned integer.
    Unsigned(u64),
    /// Single precision float.
    Float(f32),
    /// Double precision float.
    Double(f64),
    /// Two-component vector.
    Vector2([f32; 2]),
    /// Three-component vector, also used for angles.
    Vector3([f32; 3]),
    /// Four-component vector or quaternion.
    Vector4([f32; 4]),
    /// Six-component transform.
    Transform([f32; 6]),
    /// Text.
    String(String),
    /// Legacy array property.
    Array(Vec<PropertyValue>),
    /// Container node in a nested field state; `len` is its current slot count.
    SubState {
        /// Number of slots in the container.
        len: usize,
    },
}

macro_rules! accessors {
    ($($as_fn:ident, $expect_fn:ident, $variant:ident, $ty:ty, $name:literal;)*) => {
        $(
            #[doc = concat!("Returns the value if it is ", $name, ".")]
            #[must_use]
            pub const fn $as_fn(&self) -> Option<$ty> {
                match self {
                    Self::$variant(v) => Some(*v),
                    _ => None,
                }
            }

            #[doc = concat!("Returns the value, panicking unless it is ", $name, ".")]
            #[must_use]
            pub fn $expect_fn(&self) -> $ty {
                match self {
                    Self::$variant(v) => *v,
                    other => panic!(concat!("expected ", $name, ", found {}"), other.kind()),
                }
            }
        )*
    };
}

impl PropertyValue {
    accessors! {
        as_bool, expect_bool, Bool, bool, "a bool";
        as_i64, expect_i64, Signed, i64, "a signed integer";
        as_u64, expect_u64, Unsigned, u64, "an unsigned integer";
        as_f32, expect_f32, Float, f32, "a float";
        as_f64, expect_f64, Double, f64, "a double";
        as_vector2, expect_vector2, Vector2, [f32; 2], "a 2D vector";
        as_vector3, expect_vector3, Vector3, [f32; 3], "a 3D vector";
        as_vector4, expect_vector4, Vector4, [f32; 4], "a 4D vector";
        as_transform, expect_transform, Transform, [f32; 6], "a transform";
    }

    /// Returns the text if this is a string.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the text, panicking unless this is a string.
    #[must_use]
    pub fn expect_str(&self) -> &str {
        match self {
            Self::String(s) => s,
            other => panic!("expected a string, found {}", other.kind()),
        }
    }

    /// Returns the elements if this is an array.
    #[must_use]
    pub fn as_array(&self) -> Option<&[PropertyValue]> {
        match self {
            Self::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Returns the container length if this is a sub-state.
    #[must_use]
    pub const fn as_sub_state_len(&self) -> Option<usize> {
        match self {
            Self::SubState { len } => Some(*len),
            _ => None,
        }
    }

    /// Short name of the variant.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Signed(_) => "signed",
            Self::Unsigned(_) => "unsigned",
            Self::Float(_) => "float",
            Self::Double(_) => "double",
            Self::Vector2(_) => "vector2",
            Self::Vector3(_) => "vector3",
            Self::Vector4(_) => "vector4",
            Self::Transform(_) => "transform",
            Self::String(_) => "string",
            Self::Array(_) => "array",
            Self::SubState { .. } => "sub-state",
        }
    }
}

fn write_floats(f: &mut fmt::Formatter<'_>, values: &[f32]) -> fmt::Result {
    write!(f, "(")?;
    for (i, v) in values.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{v}")?;
    }
    write!(f, ")")
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::Signed(v) => write!(f, "{v}"),
            Self::Unsigned(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Double(v) => write!(f, "{v}"),
            Self::Vector2(v) => write_floats(f, v),
            Self::Vector3(v) => write_floats(f, v),
            Self::Vector4(v) => write_floats(f, v),
            Self::Transform(v) => write_floats(f, v),
            Self::String(v) => write!(f, "{v:?}"),
            Self::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Self::SubState { len } => write!(f, "<{len} slots>"),
        }
    }
}

impl From<bool> for PropertyValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for PropertyValue {
    fn from(v: i64) -> Self {
        Self::Signed(v)
    }
}

impl From<u64> for PropertyValue {
    fn from(v: u64) -> Self {
        Self::Unsigned(v)
    }
}

impl From<f32> for PropertyValue {
    fn from(v: f32) -> Self {
        Self::Float(v)
    }
}

impl From<[f32; 3]> for PropertyValue {
    fn from(v: [f32; 3]) -> Self {
        Self::Vector3(v)
    }
}

impl From<String> for PropertyValue {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<&str> for PropertyValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_owned())
    }
}
