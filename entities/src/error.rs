//! Error types for entity updates.

use std::fmt;

use bitstream::BitError;
use schema::{FieldPathError, SchemaError};

use crate::huffman::FieldPathOp;

/// Result type for entity operations.
pub type EntityResult<T> = Result<T, EntityError>;

/// Error returned by a collaborator's entity handler.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur while applying packet entities.
#[derive(Debug, thiserror::Error)]
pub enum EntityError {
    /// Bit reader failure outside of any single entity.
    #[error(transparent)]
    Bit(#[from] BitError),

    /// Schema lookup or property decoding failure.
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// A field-path operation produced an invalid path.
    #[error("field path operation {op} failed: {source}")]
    FieldPath {
        /// The operation being applied.
        op: FieldPathOp,
        #[source]
        source: FieldPathError,
    },

    /// Decoding one entity failed.
    #[error("entity {index} ({class}): {source}")]
    Decode {
        /// Entity index.
        index: u32,
        /// Class name.
        class: String,
        #[source]
        source: Box<EntityError>,
    },

    /// An update addressed an entity that does not exist.
    #[error("entity {index} does not exist but received an update")]
    MissingEntity {
        /// Entity index.
        index: u32,
    },

    /// A legacy update addressed a property slot past the end of its class.
    #[error("property index {index} is out of range ({len} properties)")]
    PropIndexOutOfRange {
        /// Decoded slot index.
        index: usize,
        /// Number of flattened properties.
        len: usize,
    },

    /// A configured engine limit was exceeded.
    #[error("{kind} limit exceeded: {actual} > {limit}")]
    LimitExceeded {
        kind: LimitKind,
        limit: usize,
        actual: usize,
    },

    /// An entity handler rejected a notification.
    #[error("entity handler failed for entity {index}: {source}")]
    Handler {
        /// Entity index being notified.
        index: u32,
        #[source]
        source: HandlerError,
    },
}

impl EntityError {
    /// Returns `true` when the error is a truncated buffer.
    ///
    /// State applied before the error is kept and may be used.
    #[must_use]
    pub fn is_unexpected_end(&self) -> bool {
        match self {
            Self::Bit(err) => err.is_unexpected_end(),
            Self::Schema(err) => err.is_unexpected_end(),
            Self::Decode { source, .. } => source.is_unexpected_end(),
            _ => false,
        }
    }

    pub(crate) fn in_entity(self, index: u32, class: &str) -> Self {
        match self {
            Self::Decode { .. } => self,
            other => Self::Decode {
                index,
                class: class.to_owned(),
                source: Box::new(other),
            },
        }
    }
}

/// Specific limit that was exceeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitKind {
    Entities,
    UpdatesPerBatch,
    FieldPathsPerUpdate,
    LegacyFieldIndices,
}

impl fmt::Display for LimitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Entities => "entity index",
            Self::UpdatesPerBatch => "updates per batch",
            Self::FieldPathsPerUpdate => "field paths per update",
            Self::LegacyFieldIndices => "legacy field indices",
        };
        write!(f, "{name}")
    }
}
