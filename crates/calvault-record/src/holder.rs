use std::collections::HashMap;
use std::io;

use calvault_types::{EntityId, EntityUuid};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::{debug, info, warn};

use crate::error::{RecordError, RecordResult};
use crate::handle::StoreHandle;
use crate::record::Record;
use crate::schema::Schema;

/// Position of one entity in a holder.
///
/// On disk a slot is a single signed integer: `+id` when enabled, `-id`
/// when disabled.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Slot {
    pub id: EntityId,
    pub enabled: bool,
}

impl Serialize for Slot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let raw = self.id.get();
        serializer.serialize_i64(if self.enabled { raw } else { -raw })
    }
}

impl<'de> Deserialize<'de> for Slot {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = i64::deserialize(deserializer)?;
        if raw == 0 {
            return Err(serde::de::Error::custom("0 is not a valid holder entry"));
        }
        let id = raw
            .checked_abs()
            .ok_or_else(|| serde::de::Error::custom(format!("{raw} is not a valid holder entry")))?;
        Ok(Slot {
            id: EntityId::new(id),
            enabled: raw > 0,
        })
    }
}

/// Ordered, enable-aware collection of every entity of one class.
///
/// Keeps `id -> record`, the `(id, enabled)` order and a `uuid -> id`
/// index in step. Only [`Holder::save`] touches the list file.
///
/// Listed entities that failed to load keep their slot, so saving the list
/// never drops them. Only [`Holder::is_listed`] and [`Holder::unloaded_ids`]
/// see them.
pub struct Holder<S: Schema> {
    order: Vec<Slot>,
    records: HashMap<EntityId, Record<S>>,
    by_uuid: HashMap<EntityUuid, EntityId>,
}

impl<S: Schema> Holder<S> {
    pub fn new() -> Self {
        Self {
            order: Vec::new(),
            records: HashMap::new(),
            by_uuid: HashMap::new(),
        }
    }

    /// Load the list file and every entity it names.
    ///
    /// A missing list file is an empty holder. Entities that are missing or
    /// corrupt are logged and kept as unloaded slots; a damaged list file is
    /// an error.
    pub fn load(handle: &StoreHandle) -> RecordResult<Self> {
        let path = S::list_path();
        let slots: Vec<Slot> = match handle.fs().read(&path) {
            Ok(data) => serde_json::from_slice(&data).map_err(|e| RecordError::Corrupt {
                path: path.clone(),
                reason: e.to_string(),
            })?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };

        let mut holder = Self::new();
        for slot in slots {
            if holder.is_listed(slot.id) {
                warn!(kind = %S::KIND, id = %slot.id, "duplicate entry in holder list; skipped");
                continue;
            }
            match Record::<S>::load(handle, slot.id) {
                Ok(record) => holder.link(slot, record),
                Err(RecordError::Io(e)) => return Err(RecordError::Io(e)),
                Err(e) => {
                    warn!(kind = %S::KIND, id = %slot.id, error = %e, "entity could not be loaded; kept in the list");
                    holder.order.push(slot);
                }
            }
        }
        debug!(
            kind = %S::KIND,
            count = holder.len(),
            unloaded = holder.order.len() - holder.len(),
            "holder loaded"
        );
        Ok(holder)
    }

    /// Write the list file. Plain atomic overwrite, no history.
    ///
    /// Returns `false` without writing when the handle is read-only.
    pub fn save(&self, handle: &StoreHandle) -> RecordResult<bool> {
        let _writer = handle.writer();
        if handle.is_read_only() {
            info!(kind = %S::KIND, "vault is read-only; holder not saved");
            return Ok(false);
        }
        let data = serde_json::to_vec(&self.order)
            .map_err(|e| RecordError::Serialization(e.to_string()))?;
        handle.fs().write_atomic(&S::list_path(), &data)?;
        debug!(kind = %S::KIND, count = self.order.len(), "holder saved");
        Ok(true)
    }

    /// Add a saved record at the end, enabled.
    pub fn append(&mut self, record: Record<S>) -> RecordResult<EntityId> {
        let index = self.order.len();
        self.insert(index, record)
    }

    /// Add a saved record at `index` (clamped to the length), enabled.
    pub fn insert(&mut self, index: usize, record: Record<S>) -> RecordResult<EntityId> {
        let id = record.require_id()?;
        if self.is_listed(id) {
            return Err(RecordError::Duplicate { kind: S::KIND, id });
        }
        let index = index.min(self.order.len());
        if let Some(uuid) = record.uuid() {
            self.index_uuid(uuid, id);
        }
        self.order.insert(index, Slot { id, enabled: true });
        self.records.insert(id, record);
        Ok(id)
    }

    /// Unlink `id` and remove its front file. Blobs are left for garbage
    /// collection.
    ///
    /// Returns `None` and changes nothing when the handle is read-only.
    pub fn delete(&mut self, handle: &StoreHandle, id: EntityId) -> RecordResult<Option<Record<S>>> {
        if !self.contains(id) {
            return Err(RecordError::NotFound { kind: S::KIND, id });
        }
        match Record::<S>::delete_id(handle, id) {
            Ok(false) => return Ok(None),
            Ok(true) => {}
            Err(e) if e.is_not_found() => {
                warn!(kind = %S::KIND, %id, "front file was already gone");
            }
            Err(e) => return Err(e),
        }
        Ok(self.remove(id))
    }

    /// Unlink `id` without touching any file.
    pub fn remove(&mut self, id: EntityId) -> Option<Record<S>> {
        let record = self.records.remove(&id)?;
        self.order.retain(|slot| slot.id != id);
        if let Some(uuid) = record.uuid() {
            if self.by_uuid.get(&uuid) == Some(&id) {
                self.by_uuid.remove(&uuid);
            }
        }
        Some(record)
    }

    pub fn get(&self, id: EntityId) -> Option<&Record<S>> {
        self.records.get(&id)
    }

    /// Mutable access. The uuid index is not affected, since uuids never
    /// change after the first save.
    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut Record<S>> {
        self.records.get_mut(&id)
    }

    pub fn by_uuid(&self, uuid: &EntityUuid) -> Option<&Record<S>> {
        self.by_uuid.get(uuid).and_then(|id| self.records.get(id))
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.records.contains_key(&id)
    }

    /// `true` when the list names `id`, loaded or not.
    pub fn is_listed(&self, id: EntityId) -> bool {
        self.order.iter().any(|slot| slot.id == id)
    }

    /// Number of loaded entities.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn is_enabled(&self, id: EntityId) -> Option<bool> {
        self.loaded_slots()
            .find(|slot| slot.id == id)
            .map(|slot| slot.enabled)
    }

    pub fn set_enabled(&mut self, id: EntityId, enabled: bool) -> RecordResult<()> {
        if !self.contains(id) {
            return Err(RecordError::NotFound { kind: S::KIND, id });
        }
        for slot in self.order.iter_mut().filter(|slot| slot.id == id) {
            slot.enabled = enabled;
        }
        Ok(())
    }

    /// Ids of loaded entities, in holder order.
    pub fn ids(&self) -> Vec<EntityId> {
        self.loaded_slots().map(|slot| slot.id).collect()
    }

    /// Ids of enabled loaded entities, in holder order.
    pub fn enabled_ids(&self) -> Vec<EntityId> {
        self.loaded_slots()
            .filter(|slot| slot.enabled)
            .map(|slot| slot.id)
            .collect()
    }

    /// Listed ids whose entity failed to load.
    pub fn unloaded_ids(&self) -> Vec<EntityId> {
        self.order
            .iter()
            .filter(|slot| !self.records.contains_key(&slot.id))
            .map(|slot| slot.id)
            .collect()
    }

    /// `(slot, record)` pairs in holder order.
    pub fn iter(&self) -> impl Iterator<Item = (Slot, &Record<S>)> + '_ {
        self.order
            .iter()
            .filter_map(|slot| Some((*slot, self.records.get(&slot.id)?)))
    }

    /// Move `id` to position `index` (clamped) among the loaded entities.
    /// Unloaded slots keep their place in the list.
    pub fn move_to(&mut self, id: EntityId, index: usize) -> RecordResult<()> {
        if !self.contains(id) {
            return Err(RecordError::NotFound { kind: S::KIND, id });
        }
        let from = self
            .order
            .iter()
            .position(|slot| slot.id == id)
            .ok_or(RecordError::NotFound { kind: S::KIND, id })?;
        let slot = self.order.remove(from);
        let loaded: Vec<usize> = self
            .order
            .iter()
            .enumerate()
            .filter(|(_, s)| self.records.contains_key(&s.id))
            .map(|(i, _)| i)
            .collect();
        let at = match loaded.get(index) {
            Some(&i) => i,
            None => loaded.last().map_or(self.order.len(), |&i| i + 1),
        };
        self.order.insert(at, slot);
        Ok(())
    }

    fn loaded_slots(&self) -> impl Iterator<Item = &Slot> + '_ {
        self.order
            .iter()
            .filter(|slot| self.records.contains_key(&slot.id))
    }

    fn link(&mut self, slot: Slot, record: Record<S>) {
        if let Some(uuid) = record.uuid() {
            self.index_uuid(uuid, slot.id);
        }
        self.order.push(slot);
        self.records.insert(slot.id, record);
    }

    fn index_uuid(&mut self, uuid: EntityUuid, id: EntityId) {
        if let Some(previous) = self.by_uuid.insert(uuid, id) {
            if previous != id {
                warn!(kind = %S::KIND, %uuid, previous = %previous, current = %id, "uuid shared by two entities");
            }
        }
    }
}

impl<S: Schema> Default for Holder<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Schema> std::fmt::Debug for Holder<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Holder")
            .field("kind", &S::KIND)
            .field("order", &self.order)
            .finish()
    }
}
