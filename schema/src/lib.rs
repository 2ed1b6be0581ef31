//! Entity schemas and property decoders for demo captures.
//!
//! This crate turns the schema messages of a capture into compiled classes
//! and decodes individual properties:
//! - Legacy send tables flattened into positional property lists
//! - Modern flattened serializers with field models and field-path resolution
//! - Quantized float and specialised numeric decoders
//! - The [`FieldState`] tree holding an entity's decoded values
//! - The [`SchemaRegistry`] owning every class, serializer and baseline
//!
//! # Design Principles
//!
//! - **Compile once** - Decoders are resolved when a schema is compiled, never per update.
//! - **Shared structure, per-entity values** - Compiled fields are immutable; anything
//!   that varies per entity, such as a polymorphic variant, lives in its field state.
//! - **Diagnosable failures** - Every fatal error names the table, serializer, field or class.

mod decoder;
mod error;
pub mod legacy;
pub mod modern;
mod path;
mod quantized;
mod registry;
mod state;
mod value;

pub use decoder::{find_child_decoder, find_decoder, type_decoder, FieldDecoder, FieldEncoding, FloatDecoder};
pub use error::{SchemaError, SchemaResult};
pub use path::{FieldPath, FieldPathError, MAX_FIELD_PATH_DEPTH};
pub use quantized::{QuantizedFloat, QuantizedFloatError, ENCODE_INTEGERS, ENCODE_ZERO, ROUND_DOWN, ROUND_UP};
pub use registry::{DecodingStrategy, ModernClass, SchemaClass, SchemaOptions, SchemaRegistry};
pub use state::{FieldNode, FieldState, MAX_STATE_SLOTS};
pub use value::PropertyValue;
