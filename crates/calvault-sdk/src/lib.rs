//! High-level API for calvault.
//!
//! [`Vault`] is the entry point for applications: it opens a vault
//! directory, takes the advisory write lock and exposes group, event,
//! account and trash operations on top of the versioned records.
//! Maintenance lives next to it: [`GarbageCollector`] drops blobs no history
//! refers to, and [`Vault::check_for_orphans`] reconciles front files with
//! their container lists.

pub mod config;
pub mod error;
pub mod gc;
pub mod interchange;
pub mod orphan;
mod scan;
pub mod vault;

pub use config::{LockConfig, OrphanConfig, StoreConfig, VaultConfig, CONFIG_FILE};
pub use error::{VaultError, VaultResult};
pub use gc::{GarbageCollector, GcPlan, GcReport};
pub use interchange::{ExportDocument, ExportInfo, ExportedEvent, ExportedGroup, ImportSummary};
pub use orphan::OrphanReport;
pub use vault::{Vault, VaultStatus};

// Re-export the types applications need alongside the facade.
pub use calvault_diff::{FieldChange, FieldDiff};
pub use calvault_model::{
    Account, AccountContent, Event, EventContent, EventGroup, EventRule, EventType, GroupContent,
    GroupType, Trash,
};
pub use calvault_record::HistoryEntry;
pub use calvault_store::MemoryFs;
pub use calvault_types::{EntityId, EntityKind, EntityUuid, ObjectId, Timestamp};
