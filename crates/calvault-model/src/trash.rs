use std::path::PathBuf;

use calvault_record::{Record, Schema};
use calvault_types::{EntityId, EntityKind};
use serde::{Deserialize, Serialize};

use crate::id_list::IdList;

/// Front file of the singleton trash, relative to the vault root.
pub const TRASH_FILE: &str = "trash.json";

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrashBasic {
    #[serde(default)]
    pub id_list: IdList,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrashContent {
    pub title: String,
    #[serde(default)]
    pub icon: String,
}

impl Default for TrashContent {
    fn default() -> Self {
        Self {
            title: "Trash".to_string(),
            icon: "user-trash".to_string(),
        }
    }
}

/// Marker type for the trash. It always has id `-1` and lives in
/// [`TRASH_FILE`] rather than a class directory.
pub struct TrashSchema;

impl Schema for TrashSchema {
    const KIND: EntityKind = EntityKind::Trash;
    type Basic = TrashBasic;
    type Content = TrashContent;

    fn fixed_id() -> Option<EntityId> {
        Some(EntityId::TRASH)
    }

    fn front_path(_id: EntityId) -> PathBuf {
        PathBuf::from(TRASH_FILE)
    }
}

pub type Trash = Record<TrashSchema>;

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::Arc;

    use calvault_record::{HandleOptions, SaveMode, StoreHandle};
    use calvault_store::{FileSystem, MemoryFs, ShardedObjectStore};

    use super::*;

    #[test]
    fn trash_lives_in_its_own_file() {
        let fs = Arc::new(MemoryFs::new());
        let objects = Arc::new(ShardedObjectStore::new(fs.clone()));
        let handle = StoreHandle::open(fs.clone(), objects, HandleOptions::default()).unwrap();

        let mut trash = Trash::new(TrashContent::default());
        trash.basic.id_list.add(EntityId::new(3), false);
        trash.save(&handle, SaveMode::Normal).unwrap();

        assert_eq!(trash.id(), Some(EntityId::TRASH));
        assert!(fs.is_file(Path::new(TRASH_FILE)));

        let loaded = Trash::load(&handle, EntityId::TRASH).unwrap();
        assert!(loaded.basic.id_list.contains(EntityId::new(3)));
        assert_eq!(loaded.content.title, "Trash");
    }
}
