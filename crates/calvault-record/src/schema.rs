use std::fmt::Debug;
use std::path::PathBuf;

use calvault_types::{EntityId, EntityKind};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Describes how one entity class is split between its front file and its
/// content blobs.
///
/// `Basic` fields are rewritten in place on every save and are never hashed.
/// `Content` fields are canonically encoded and stored in the object store;
/// the hash of that encoding identifies a version.
pub trait Schema: Sized + 'static {
    /// The class this schema belongs to.
    const KIND: EntityKind;

    /// Unhashed fields kept in the front file. Must not use the keys `uuid`
    /// or `history`.
    type Basic: Serialize + DeserializeOwned + Clone + Debug + Default + PartialEq + Send + Sync;

    /// Hashed fields kept in content blobs.
    type Content: Serialize + DeserializeOwned + Clone + Debug + PartialEq + Send + Sync;

    /// The id used instead of the allocator, for singletons.
    fn fixed_id() -> Option<EntityId> {
        None
    }

    /// Front file location relative to the vault root.
    fn front_path(id: EntityId) -> PathBuf {
        PathBuf::from(Self::KIND.as_str()).join(format!("{id}.json"))
    }

    /// Holder list file relative to the vault root.
    fn list_path() -> PathBuf {
        PathBuf::from(format!("{}_list.json", Self::KIND.as_str()))
    }
}
