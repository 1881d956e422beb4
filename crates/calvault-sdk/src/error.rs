use calvault_types::{EntityId, EntityKind};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum VaultError {
    #[error("{kind} {id} not found")]
    NotFound { kind: EntityKind, id: EntityId },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("invalid import document: {0}")]
    Import(String),

    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    #[error("trash.json is damaged; repair it before changing the trash")]
    DamagedTrash,

    #[error(transparent)]
    Record(#[from] calvault_record::RecordError),

    #[error("store error: {0}")]
    Store(#[from] calvault_store::StoreError),

    #[error("diff error: {0}")]
    Diff(#[from] calvault_diff::DiffError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl VaultError {
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound { .. } => true,
            Self::Record(e) => e.is_not_found(),
            _ => false,
        }
    }
}

pub type VaultResult<T> = Result<T, VaultError>;
