use std::io;
use std::path::{Path, PathBuf};

use calvault_crypto::canonical;
use calvault_store::{FileSystem, StoreError};
use calvault_types::{EntityId, EntityUuid, ObjectId, Timestamp};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{RecordError, RecordResult};
use crate::handle::StoreHandle;
use crate::history::HistoryEntry;
use crate::schema::Schema;

/// Whether a save honours the handle's read-only state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SaveMode {
    /// Refuse to write while the handle is read-only.
    #[default]
    Normal,
    /// Write even when the handle is read-only. Still serialized with other
    /// writers.
    IgnoreReadOnly,
}

#[derive(Deserialize)]
struct FrontFile<B> {
    #[serde(default)]
    uuid: Option<EntityUuid>,
    #[serde(flatten)]
    basic: B,
    history: Vec<HistoryEntry>,
}

#[derive(Serialize)]
struct FrontFileRef<'a, B> {
    uuid: &'a EntityUuid,
    #[serde(flatten)]
    basic: &'a B,
    history: &'a [HistoryEntry],
}

#[derive(Deserialize)]
struct HistoryOnly {
    history: Vec<HistoryEntry>,
}

fn corrupt(path: &Path, reason: impl Into<String>) -> RecordError {
    RecordError::Corrupt {
        path: path.to_path_buf(),
        reason: reason.into(),
    }
}

/// Read only the history of a front file, without touching the object
/// store or interpreting the basic fields.
///
/// A front file whose history is missing, empty or malformed is corrupt.
pub fn read_front_history(fs: &dyn FileSystem, path: &Path) -> RecordResult<Vec<HistoryEntry>> {
    let data = fs.read(path)?;
    let front: HistoryOnly =
        serde_json::from_slice(&data).map_err(|e| corrupt(path, e.to_string()))?;
    if front.history.is_empty() {
        return Err(corrupt(path, "empty history"));
    }
    Ok(front.history)
}

/// A versioned entity of class `S`.
///
/// `id` and `uuid` are unset until the first [`Record::save`]. The history
/// is newest first and only ever grows at the front.
pub struct Record<S: Schema> {
    id: Option<EntityId>,
    uuid: Option<EntityUuid>,
    /// Unhashed fields, rewritten in place on every save.
    pub basic: S::Basic,
    /// Hashed fields; their canonical encoding is one version.
    pub content: S::Content,
    history: Vec<HistoryEntry>,
}

impl<S: Schema> Record<S> {
    /// A new, unsaved record with default basic fields.
    pub fn new(content: S::Content) -> Self {
        Self::with_basic(S::Basic::default(), content)
    }

    /// A new, unsaved record.
    pub fn with_basic(basic: S::Basic, content: S::Content) -> Self {
        Self {
            id: None,
            uuid: None,
            basic,
            content,
            history: Vec::new(),
        }
    }

    pub fn id(&self) -> Option<EntityId> {
        self.id
    }

    /// The id, or [`RecordError::Unsaved`] before the first save.
    pub fn require_id(&self) -> RecordResult<EntityId> {
        self.id.ok_or(RecordError::Unsaved(S::KIND))
    }

    pub fn uuid(&self) -> Option<EntityUuid> {
        self.uuid
    }

    /// Use a known uuid instead of generating one at first save.
    pub fn set_uuid(&mut self, uuid: EntityUuid) {
        self.uuid = Some(uuid);
    }

    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    /// The current version, if the record was ever saved.
    pub fn head(&self) -> Option<&HistoryEntry> {
        self.history.first()
    }

    /// When the current version was saved.
    pub fn last_modified(&self) -> Option<Timestamp> {
        self.head().map(|entry| entry.timestamp)
    }

    /// Load a record and its current content.
    pub fn load(handle: &StoreHandle, id: EntityId) -> RecordResult<Self> {
        let path = S::front_path(id);
        let data = match handle.fs().read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(RecordError::NotFound { kind: S::KIND, id })
            }
            Err(e) => return Err(e.into()),
        };
        let front: FrontFile<S::Basic> =
            serde_json::from_slice(&data).map_err(|e| corrupt(&path, e.to_string()))?;
        let head = front
            .history
            .first()
            .ok_or_else(|| corrupt(&path, "empty history"))?;
        let content = Self::fetch(handle, id, &head.hash)?;
        debug!(kind = %S::KIND, %id, versions = front.history.len(), "record loaded");
        Ok(Self {
            id: Some(id),
            uuid: front.uuid,
            basic: front.basic,
            content,
            history: front.history,
        })
    }

    /// Persist the record.
    ///
    /// The content blob is written before the front file, so a crash in
    /// between leaves at most an unreferenced blob. A new history entry is
    /// prepended only if the content hash differs from the current head;
    /// basic fields are rewritten either way.
    ///
    /// Returns `None` without touching anything when the handle is
    /// read-only, otherwise the entry now at the head of the history.
    pub fn save(
        &mut self,
        handle: &StoreHandle,
        mode: SaveMode,
    ) -> RecordResult<Option<HistoryEntry>> {
        let _writer = handle.writer();
        if mode == SaveMode::Normal && handle.is_read_only() {
            info!(kind = %S::KIND, id = ?self.id, "vault is read-only; not saved");
            return Ok(None);
        }

        let id = match (self.id, S::fixed_id()) {
            (Some(id), _) | (None, Some(id)) => id,
            (None, None) => handle.next_id(S::KIND)?,
        };
        self.id = Some(id);
        let uuid = *self.uuid.get_or_insert_with(EntityUuid::generate);

        let bytes = canonical::encode_value(&self.content)
            .map_err(|e| RecordError::Serialization(e.to_string()))?;
        let hash = handle.objects().put(&bytes)?;

        let mut history = self.history.clone();
        match history.first() {
            Some(head) if head.hash == hash => {
                debug!(kind = %S::KIND, %id, "content unchanged; history kept");
            }
            _ => history.insert(0, HistoryEntry::new(Timestamp::now(), hash)),
        }

        self.write_front(handle, id, &uuid, &history)?;
        debug!(kind = %S::KIND, %id, hash = %hash.short_hex(), "record saved");

        self.history = history;
        Ok(self.history.first().cloned())
    }

    /// Persist a new record whose only version is the blob `hash`, which
    /// must already be in the object store. The blob is not re-encoded, so
    /// its hash stays referenced even when `content` would encode
    /// differently.
    ///
    /// Returns `None` without touching anything when the handle is
    /// read-only.
    pub fn save_with_object(
        &mut self,
        handle: &StoreHandle,
        hash: ObjectId,
    ) -> RecordResult<Option<HistoryEntry>> {
        let _writer = handle.writer();
        if handle.is_read_only() {
            info!(kind = %S::KIND, "vault is read-only; not saved");
            return Ok(None);
        }
        if self.id.is_some() {
            return Err(RecordError::AlreadySaved(S::KIND));
        }
        if !handle.objects().exists(&hash)? {
            return Err(StoreError::NotFound(hash).into());
        }

        let id = match S::fixed_id() {
            Some(id) => id,
            None => handle.next_id(S::KIND)?,
        };
        let uuid = *self.uuid.get_or_insert_with(EntityUuid::generate);
        let history = vec![HistoryEntry::new(Timestamp::now(), hash)];
        self.write_front(handle, id, &uuid, &history)?;
        debug!(kind = %S::KIND, %id, hash = %hash.short_hex(), "record saved over existing object");

        self.id = Some(id);
        self.history = history;
        Ok(self.history.first().cloned())
    }

    fn write_front(
        &self,
        handle: &StoreHandle,
        id: EntityId,
        uuid: &EntityUuid,
        history: &[HistoryEntry],
    ) -> RecordResult<()> {
        let path = S::front_path(id);
        let front = FrontFileRef {
            uuid,
            basic: &self.basic,
            history,
        };
        let data = serde_json::to_vec_pretty(&front)
            .map_err(|e| RecordError::Serialization(e.to_string()))?;
        if let Some(parent) = path.parent() {
            handle.fs().make_dir(parent)?;
        }
        handle.fs().write_atomic(&path, &data)?;
        Ok(())
    }

    /// This record with its content replaced by an older version.
    ///
    /// Basic fields stay current. Nothing is written.
    pub fn get_revision(&self, handle: &StoreHandle, hash: &ObjectId) -> RecordResult<Self> {
        let id = self.require_id()?;
        if !self.history.iter().any(|entry| entry.hash == *hash) {
            return Err(RecordError::UnknownRevision {
                kind: S::KIND,
                id,
                hash: *hash,
            });
        }
        let content = Self::fetch(handle, id, hash)?;
        Ok(Self {
            content,
            ..self.clone()
        })
    }

    /// Remove this record's front file. Its blobs stay until garbage
    /// collection.
    pub fn delete(&self, handle: &StoreHandle) -> RecordResult<bool> {
        Self::delete_id(handle, self.require_id()?)
    }

    /// Remove the front file of `id`.
    ///
    /// Returns `false` without touching anything when the handle is
    /// read-only.
    pub fn delete_id(handle: &StoreHandle, id: EntityId) -> RecordResult<bool> {
        let _writer = handle.writer();
        if handle.is_read_only() {
            info!(kind = %S::KIND, %id, "vault is read-only; not deleted");
            return Ok(false);
        }
        match handle.fs().remove_file(&S::front_path(id)) {
            Ok(()) => {
                debug!(kind = %S::KIND, %id, "front file removed");
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(RecordError::NotFound { kind: S::KIND, id })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Front file path of this record, once it has an id.
    pub fn path(&self) -> Option<PathBuf> {
        self.id.map(S::front_path)
    }

    fn fetch(handle: &StoreHandle, id: EntityId, hash: &ObjectId) -> RecordResult<S::Content> {
        let bytes = match handle.objects().get(hash) {
            Ok(bytes) => bytes,
            Err(StoreError::NotFound(_)) => {
                return Err(RecordError::MissingObject {
                    kind: S::KIND,
                    id,
                    hash: *hash,
                })
            }
            Err(e) => return Err(e.into()),
        };
        let path = S::front_path(id);
        let value = canonical::decode(&bytes)
            .map_err(|e| corrupt(&path, format!("object {}: {e}", hash.short_hex())))?;
        serde_json::from_value(value)
            .map_err(|e| corrupt(&path, format!("object {}: {e}", hash.short_hex())))
    }
}

impl<S: Schema> Clone for Record<S> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            uuid: self.uuid,
            basic: self.basic.clone(),
            content: self.content.clone(),
            history: self.history.clone(),
        }
    }
}

impl<S: Schema> std::fmt::Debug for Record<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Record")
            .field("kind", &S::KIND)
            .field("id", &self.id)
            .field("uuid", &self.uuid)
            .field("basic", &self.basic)
            .field("content", &self.content)
            .field("versions", &self.history.len())
            .finish()
    }
}
