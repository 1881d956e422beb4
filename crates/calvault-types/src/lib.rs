//! Foundation types for calvault.
//!
//! This crate provides the identifier and time types shared by every other
//! calvault crate: content hashes for the object store, the closed set of
//! entity classes, per-class integer ids and entity uuids, and the
//! timestamps recorded in history chains.
//!
//! # Key Types
//!
//! - [`ObjectId`]: Content-addressed identifier (BLAKE3 hash)
//! - [`EntityKind`]: The persisted entity classes (event, group, account, trash)
//! - [`EntityId`]: Integer id, unique within one entity class
//! - [`EntityUuid`]: Stable identifier assigned once at first save
//! - [`Timestamp`]: Unix-seconds timestamp used in history entries

pub mod entity;
pub mod error;
pub mod object;
pub mod temporal;

pub use entity::{EntityId, EntityKind, EntityUuid};
pub use error::TypeError;
pub use object::ObjectId;
pub use temporal::Timestamp;
