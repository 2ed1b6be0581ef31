//! Entity store and packet-entities update engine for demo captures.
//!
//! This crate applies the entity messages of a capture to a store of live
//! entities:
//! - Huffman-coded field paths addressing nested fields of modern entities
//! - Property-index lists of legacy send-table entities
//! - Instance baselines applied before the first delta of a new entity
//! - Entity handles that stop resolving once their index is reused
//! - Entity, field and position handlers notified after every batch
//!
//! # Design Principles
//!
//! - **Whole batches** - Handlers observe the state after the entire batch, never
//!   a half-applied one.
//! - **Bounded work** - [`EngineLimits`] caps every count read from the stream.
//! - **Reusable buffers** - Field lists are staged in scratch buffers owned by the store.
//! - **Errors with context** - Decode failures name the entity and class they hit.

mod baseline;
mod entity;
mod error;
mod handlers;
pub mod huffman;
pub mod legacy;
mod limits;
pub mod modern;
mod scratch;
mod store;
mod types;

pub use baseline::{BaselineCache, BaselineValues};
pub use entity::{Entity, EntityFields, EntityRef, MAX_COORD_INT, MODERN_CELL_BITS};
pub use error::{EntityError, EntityResult, HandlerError, LimitKind};
pub use handlers::{EntityHandler, FieldHandler, HandlerScope, PositionHandler};
pub use huffman::{read_field_paths, write_field_paths, FieldPathOp};
pub use limits::EngineLimits;
pub use scratch::UpdateScratch;
pub use store::{EntityStore, PacketEntities};
pub use types::{
    EntityChange, EntityHandle, EntityOp, ENTITY_HANDLE_INDEX_MASK, LEGACY_SERIAL_BITS, MAX_EDICT_BITS,
    MODERN_SERIAL_BITS,
};
