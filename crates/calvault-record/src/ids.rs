//! Crash-recoverable per-class ID counters.
//!
//! `last_ids.json` records the highest id handed out for each allocated
//! class. The file is always written before an id is returned, and it can be
//! rebuilt from the numeric file names under `<class>/`, so a lost or stale
//! counter file never leads to id reuse.

use std::collections::BTreeMap;
use std::io;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use calvault_store::FileSystem;
use calvault_types::{EntityId, EntityKind};
use tracing::{debug, info, warn};

use crate::error::{RecordError, RecordResult};

/// Counter file name, relative to the vault root.
pub const LAST_IDS_FILE: &str = "last_ids.json";

/// Hands out strictly increasing ids per entity class.
pub struct IdAllocator {
    fs: Arc<dyn FileSystem>,
    counters: Mutex<BTreeMap<EntityKind, i64>>,
}

impl IdAllocator {
    /// Read the persisted counters.
    ///
    /// A missing file yields zero counters. An unreadable file is logged and
    /// treated the same way; callers are expected to run [`Self::recover_all`]
    /// right after, which restores the true values from the directories.
    pub fn load(fs: Arc<dyn FileSystem>) -> RecordResult<Self> {
        let counters = match fs.read(Path::new(LAST_IDS_FILE)) {
            Ok(data) => match serde_json::from_slice::<BTreeMap<String, i64>>(&data) {
                Ok(raw) => raw
                    .into_iter()
                    .filter_map(|(name, value)| Some((name.parse::<EntityKind>().ok()?, value)))
                    .filter(|(kind, _)| kind.is_allocated())
                    .collect(),
                Err(e) => {
                    warn!(error = %e, "{LAST_IDS_FILE} is unreadable; recovering from directories");
                    BTreeMap::new()
                }
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            fs,
            counters: Mutex::new(counters),
        })
    }

    /// The highest id handed out so far for `kind` (0 if none).
    pub fn current(&self, kind: EntityKind) -> i64 {
        self.counters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&kind)
            .copied()
            .unwrap_or(0)
    }

    /// Allocate the next id for `kind`.
    ///
    /// The incremented counter is durable before the id is returned. If the
    /// write fails, no id is handed out and the counter is unchanged.
    pub fn next(&self, kind: EntityKind) -> RecordResult<EntityId> {
        if !kind.is_allocated() {
            return Err(RecordError::NotAllocated(kind));
        }
        let mut counters = self.counters.lock().unwrap_or_else(PoisonError::into_inner);
        let next = counters.get(&kind).copied().unwrap_or(0) + 1;
        let mut updated = counters.clone();
        updated.insert(kind, next);
        self.persist(&updated)?;
        *counters = updated;
        debug!(%kind, id = next, "allocated id");
        Ok(EntityId::new(next))
    }

    /// Raise the counter for `kind` to the largest numeric file name found
    /// under its directory. Never lowers a counter. Returns the new value.
    pub fn recover(&self, kind: EntityKind) -> RecordResult<i64> {
        let on_disk = max_numeric_stem(self.fs.as_ref(), Path::new(kind.as_str()))?;
        let mut counters = self.counters.lock().unwrap_or_else(PoisonError::into_inner);
        let persisted = counters.get(&kind).copied().unwrap_or(0);
        let recovered = persisted.max(on_disk);
        if recovered != persisted {
            info!(%kind, persisted, recovered, "id counter was behind the directory contents");
            let mut updated = counters.clone();
            updated.insert(kind, recovered);
            self.persist(&updated)?;
            *counters = updated;
        }
        Ok(recovered)
    }

    /// Run [`Self::recover`] for every allocated class.
    pub fn recover_all(&self) -> RecordResult<()> {
        for kind in EntityKind::ALLOCATED {
            self.recover(kind)?;
        }
        Ok(())
    }

    fn persist(&self, counters: &BTreeMap<EntityKind, i64>) -> RecordResult<()> {
        let raw: BTreeMap<&str, i64> = EntityKind::ALLOCATED
            .iter()
            .map(|kind| (kind.as_str(), counters.get(kind).copied().unwrap_or(0)))
            .collect();
        let data =
            serde_json::to_vec(&raw).map_err(|e| RecordError::Serialization(e.to_string()))?;
        self.fs.write_atomic(Path::new(LAST_IDS_FILE), &data)?;
        Ok(())
    }
}

impl std::fmt::Debug for IdAllocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let counters = self.counters.lock().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("IdAllocator").field("counters", &*counters).finish()
    }
}

/// Largest `<n>.json` stem in `dir`; 0 when the directory is missing or empty.
fn max_numeric_stem(fs: &dyn FileSystem, dir: &Path) -> RecordResult<i64> {
    let names = match fs.list_dir(dir) {
        Ok(names) => names,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e.into()),
    };
    Ok(names
        .iter()
        .filter_map(|name| Path::new(name).file_stem()?.to_str()?.parse::<i64>().ok())
        .max()
        .unwrap_or(0)
        .max(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use calvault_store::MemoryFs;

    fn touch(fs: &MemoryFs, kind: EntityKind, name: &str) {
        fs.make_dir(Path::new(kind.as_str())).unwrap();
        fs.write_atomic(&Path::new(kind.as_str()).join(name), b"{}")
            .unwrap();
    }

    #[test]
    fn ids_start_at_one_and_increase() {
        let fs = Arc::new(MemoryFs::new());
        let ids = IdAllocator::load(fs).unwrap();
        assert_eq!(ids.next(EntityKind::Event).unwrap(), EntityId::new(1));
        assert_eq!(ids.next(EntityKind::Event).unwrap(), EntityId::new(2));
        assert_eq!(ids.next(EntityKind::Group).unwrap(), EntityId::new(1));
    }

    #[test]
    fn counter_is_persisted_before_return() {
        let fs = Arc::new(MemoryFs::new());
        let ids = IdAllocator::load(fs.clone()).unwrap();
        ids.next(EntityKind::Account).unwrap();
        ids.next(EntityKind::Account).unwrap();

        let raw: serde_json::Value =
            serde_json::from_slice(&fs.read(Path::new(LAST_IDS_FILE)).unwrap()).unwrap();
        assert_eq!(raw["account"], 2);
        assert_eq!(raw["event"], 0);

        let reopened = IdAllocator::load(fs).unwrap();
        assert_eq!(reopened.next(EntityKind::Account).unwrap(), EntityId::new(3));
    }

    #[test]
    fn recover_after_lost_counter_file() {
        let fs = Arc::new(MemoryFs::new());
        let ids = IdAllocator::load(fs.clone()).unwrap();
        for _ in 0..5 {
            let id = ids.next(EntityKind::Event).unwrap();
            touch(&fs, EntityKind::Event, &format!("{id}.json"));
        }
        fs.remove_file(Path::new(LAST_IDS_FILE)).unwrap();

        let ids = IdAllocator::load(fs).unwrap();
        assert_eq!(ids.current(EntityKind::Event), 0);
        assert_eq!(ids.recover(EntityKind::Event).unwrap(), 5);
        assert_eq!(ids.next(EntityKind::Event).unwrap(), EntityId::new(6));
    }

    #[test]
    fn recover_never_lowers_the_counter() {
        let fs = Arc::new(MemoryFs::new());
        fs.write_atomic(Path::new(LAST_IDS_FILE), br#"{"event":9,"group":0,"account":0}"#)
            .unwrap();
        touch(&fs, EntityKind::Event, "3.json");
        let ids = IdAllocator::load(fs).unwrap();
        assert_eq!(ids.recover(EntityKind::Event).unwrap(), 9);
    }

    #[test]
    fn non_numeric_names_are_ignored() {
        let fs = Arc::new(MemoryFs::new());
        touch(&fs, EntityKind::Group, "4.json");
        touch(&fs, EntityKind::Group, "notes.json");
        touch(&fs, EntityKind::Group, "backup");
        let ids = IdAllocator::load(fs).unwrap();
        ids.recover_all().unwrap();
        assert_eq!(ids.current(EntityKind::Group), 4);
        assert_eq!(ids.current(EntityKind::Account), 0);
    }

    #[test]
    fn garbage_counter_file_is_recovered() {
        let fs = Arc::new(MemoryFs::new());
        fs.write_atomic(Path::new(LAST_IDS_FILE), b"[not an object").unwrap();
        touch(&fs, EntityKind::Account, "2.json");
        let ids = IdAllocator::load(fs).unwrap();
        ids.recover_all().unwrap();
        assert_eq!(ids.next(EntityKind::Account).unwrap(), EntityId::new(3));
    }

    #[test]
    fn trash_has_no_counter() {
        let fs = Arc::new(MemoryFs::new());
        let ids = IdAllocator::load(fs).unwrap();
        assert!(ids.next(EntityKind::Trash).is_err());
    }
}
