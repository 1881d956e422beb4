//! Error types for record operations.

use std::path::PathBuf;

use calvault_store::StoreError;
use calvault_types::{EntityId, EntityKind, ObjectId};

/// Errors that can occur while loading, saving or indexing records.
#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    /// The front file does not exist.
    #[error("{kind} {id} not found")]
    NotFound { kind: EntityKind, id: EntityId },

    /// The front file exists but lacks required structure.
    #[error("corrupt front file {path}: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    /// The head of the history names a blob that is not in the store.
    #[error("{kind} {id} references missing object {hash}")]
    MissingObject {
        kind: EntityKind,
        id: EntityId,
        hash: ObjectId,
    },

    /// A revision was requested that is not part of the entity's history.
    #[error("{hash} is not a revision of {kind} {id}")]
    UnknownRevision {
        kind: EntityKind,
        id: EntityId,
        hash: ObjectId,
    },

    /// The operation needs an id, but the record was never saved.
    #[error("{0} record has not been saved yet")]
    Unsaved(EntityKind),

    /// The record already has a front file and cannot start a new history.
    #[error("{0} record was already saved")]
    AlreadySaved(EntityKind),

    /// The class uses a fixed id and has no counter.
    #[error("{0} ids are not allocated")]
    NotAllocated(EntityKind),

    /// The id is already present in a holder.
    #[error("{kind} {id} is already present")]
    Duplicate { kind: EntityKind, id: EntityId },

    /// Object store failure.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Filesystem failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Encoding failure on the write path.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl RecordError {
    /// Returns `true` for missing front files.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns `true` when data on disk is damaged or inconsistent.
    pub fn is_corrupt(&self) -> bool {
        match self {
            Self::Corrupt { .. } | Self::MissingObject { .. } => true,
            Self::Store(e) => e.is_corrupt(),
            _ => false,
        }
    }
}

/// Convenience alias for record results.
pub type RecordResult<T> = Result<T, RecordError>;
