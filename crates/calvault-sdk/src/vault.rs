use std::path::{Path, PathBuf};
use std::sync::Arc;

use calvault_diff::{diff_contents, FieldDiff};
use calvault_model::{
    Account, AccountContent, AccountSchema, Event, EventContent, EventGroup, GroupContent,
    GroupSchema, IdList, Trash, TrashContent,
};
use calvault_record::{HandleOptions, HistoryEntry, Holder, RecordError, SaveMode, StoreHandle};
use calvault_store::{
    FileSystem, LocalFs, LockToken, ObjectStore, ShardedObjectStore, StoreStats, OBJECT_STORE_DIR,
};
use calvault_types::{EntityId, EntityKind, ObjectId};
use tracing::{debug, info, warn};

use crate::config::{VaultConfig, CONFIG_FILE};
use crate::error::{VaultError, VaultResult};
use crate::gc::{GarbageCollector, GcPlan, GcReport};
use crate::interchange::{self, ExportDocument, ImportSummary};
use crate::orphan::{self, OrphanReport};

/// Counts shown by `status`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VaultStatus {
    pub groups: usize,
    pub enabled_groups: usize,
    pub accounts: usize,
    pub listed_events: usize,
    pub trashed_events: usize,
    pub objects: StoreStats,
    pub read_only: bool,
}

/// An open calendar vault.
///
/// Owns the store handle, the group and account holders and the trash.
/// Every mutating method is a no-op returning "not saved" (`None`, `false`
/// or an empty summary) while the vault is read-only.
pub struct Vault {
    root: Option<PathBuf>,
    config: VaultConfig,
    handle: StoreHandle,
    groups: Holder<GroupSchema>,
    accounts: Holder<AccountSchema>,
    trash: Trash,
    /// `trash.json` exists but could not be loaded; the in-memory trash is
    /// empty and is never written over it.
    trash_damaged: bool,
}

impl Vault {
    /// Open the vault in directory `root`, reading `config.toml` if present.
    pub fn open(root: impl AsRef<Path>) -> VaultResult<Self> {
        let root = root.as_ref();
        let fs = Arc::new(LocalFs::open(root)?);
        let config = VaultConfig::load(fs.as_ref())?;
        let mut vault = Self::open_with(fs, config)?;
        vault.root = Some(root.to_path_buf());
        Ok(vault)
    }

    /// Create the vault layout in `root` and write a default `config.toml`
    /// unless one exists.
    pub fn init(root: impl AsRef<Path>) -> VaultResult<Self> {
        let root = root.as_ref();
        let fs = LocalFs::open(root)?;
        if !fs.is_file(Path::new(CONFIG_FILE)) {
            VaultConfig::default().save(&fs)?;
            info!(root = %root.display(), "wrote default configuration");
        }
        Self::open(root)
    }

    /// Open a vault on any filesystem capability.
    pub fn open_with(fs: Arc<dyn FileSystem>, config: VaultConfig) -> VaultResult<Self> {
        let objects = ShardedObjectStore::new(fs.clone())
            .with_shard_width(config.store.shard_width)?
            .with_verification(config.store.verify_on_read);
        let objects: Arc<dyn ObjectStore> = Arc::new(objects);
        let handle = StoreHandle::open(
            fs.clone(),
            objects,
            HandleOptions {
                lock: config.lock_policy(),
                read_only: config.read_only,
            },
        )?;

        if !handle.is_read_only() {
            for dir in [
                EntityKind::Event.as_str(),
                EntityKind::Group.as_str(),
                EntityKind::Account.as_str(),
                OBJECT_STORE_DIR,
            ] {
                fs.make_dir(Path::new(dir))?;
            }
        }

        let groups = Holder::load(&handle)?;
        let accounts = Holder::load(&handle)?;
        let mut trash_damaged = false;
        let trash = match Trash::load(&handle, EntityId::TRASH) {
            Ok(trash) => trash,
            Err(e) if e.is_not_found() => {
                let mut trash = Trash::new(TrashContent::default());
                trash.save(&handle, SaveMode::Normal)?;
                trash
            }
            Err(RecordError::Io(e)) => return Err(e.into()),
            Err(e) => {
                warn!(error = %e, "trash could not be loaded; trash changes are disabled");
                trash_damaged = true;
                Trash::new(TrashContent::default())
            }
        };

        debug!(
            groups = groups.len(),
            accounts = accounts.len(),
            trashed = trash.basic.id_list.len(),
            read_only = handle.is_read_only(),
            "vault opened"
        );
        Ok(Self {
            root: None,
            config,
            handle,
            groups,
            accounts,
            trash,
            trash_damaged,
        })
    }

    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    pub fn config(&self) -> &VaultConfig {
        &self.config
    }

    pub fn handle(&self) -> &StoreHandle {
        &self.handle
    }

    pub fn is_read_only(&self) -> bool {
        self.handle.is_read_only()
    }

    /// The process holding the write lock, when it is not us.
    pub fn lock_holder(&self) -> Option<&LockToken> {
        self.handle.lock_holder()
    }

    pub fn groups(&self) -> &Holder<GroupSchema> {
        &self.groups
    }

    pub fn accounts(&self) -> &Holder<AccountSchema> {
        &self.accounts
    }

    pub fn trash(&self) -> &Trash {
        &self.trash
    }

    /// `true` when `trash.json` could not be loaded at open.
    pub fn trash_damaged(&self) -> bool {
        self.trash_damaged
    }

    fn check_trash(&self) -> VaultResult<()> {
        if self.trash_damaged {
            return Err(VaultError::DamagedTrash);
        }
        Ok(())
    }

    pub fn status(&self) -> VaultResult<VaultStatus> {
        Ok(VaultStatus {
            groups: self.groups.len(),
            enabled_groups: self.groups.enabled_ids().len(),
            accounts: self.accounts.len(),
            listed_events: self
                .groups
                .iter()
                .map(|(_, group)| group.basic.id_list.len())
                .sum(),
            trashed_events: self.trash.basic.id_list.len(),
            objects: self.handle.objects().stats()?,
            read_only: self.is_read_only(),
        })
    }

    // ---- Groups ----

    /// Create an enabled group. Returns its id, or `None` when read-only.
    pub fn create_group(&mut self, content: GroupContent) -> VaultResult<Option<EntityId>> {
        self.insert_group(EventGroup::new(content), true)
    }

    pub(crate) fn insert_group(
        &mut self,
        mut group: EventGroup,
        enabled: bool,
    ) -> VaultResult<Option<EntityId>> {
        if group.save(&self.handle, SaveMode::Normal)?.is_none() {
            return Ok(None);
        }
        let id = self.groups.append(group)?;
        if !enabled {
            self.groups.set_enabled(id, false)?;
        }
        self.groups.save(&self.handle)?;
        info!(%id, enabled, "group created");
        Ok(Some(id))
    }

    pub fn group(&self, id: EntityId) -> VaultResult<&EventGroup> {
        self.groups.get(id).ok_or(VaultError::NotFound {
            kind: EntityKind::Group,
            id,
        })
    }

    /// Mutable access to a group; call [`Vault::save_group`] afterwards.
    pub fn group_mut(&mut self, id: EntityId) -> VaultResult<&mut EventGroup> {
        self.groups.get_mut(id).ok_or(VaultError::NotFound {
            kind: EntityKind::Group,
            id,
        })
    }

    /// Persist the in-memory state of a group.
    pub fn save_group(&mut self, id: EntityId) -> VaultResult<Option<HistoryEntry>> {
        let handle = &self.handle;
        let group = self.groups.get_mut(id).ok_or(VaultError::NotFound {
            kind: EntityKind::Group,
            id,
        })?;
        Ok(group.save(handle, SaveMode::Normal)?)
    }

    /// Show or hide a group. Returns `false` when read-only.
    pub fn set_group_enabled(&mut self, id: EntityId, enabled: bool) -> VaultResult<bool> {
        if self.is_read_only() {
            info!(%id, "vault is read-only; group flag not changed");
            return Ok(false);
        }
        self.groups.set_enabled(id, enabled)?;
        Ok(self.groups.save(&self.handle)?)
    }

    pub fn enabled_group_ids(&self) -> Vec<EntityId> {
        self.groups.enabled_ids()
    }

    /// Delete a group. Its events are moved to the trash first.
    pub fn delete_group(&mut self, id: EntityId) -> VaultResult<bool> {
        if !self.groups.contains(id) {
            return Err(VaultError::NotFound {
                kind: EntityKind::Group,
                id,
            });
        }
        if self.is_read_only() {
            info!(%id, "vault is read-only; group not deleted");
            return Ok(false);
        }
        self.check_trash()?;

        let members = self.group(id)?.basic.id_list.as_slice().to_vec();
        for event_id in &members {
            self.trash.basic.id_list.add(*event_id, true);
        }
        self.trash.save(&self.handle, SaveMode::Normal)?;

        if self.groups.delete(&self.handle, id)?.is_none() {
            return Ok(false);
        }
        self.groups.save(&self.handle)?;
        info!(%id, trashed = members.len(), "group deleted");
        Ok(true)
    }

    // ---- Events ----

    /// Create an event in group `group_id`. Returns its id, or `None` when
    /// read-only.
    pub fn create_event(
        &mut self,
        group_id: EntityId,
        content: EventContent,
    ) -> VaultResult<Option<EntityId>> {
        self.insert_event(group_id, Event::new(content))
    }

    pub(crate) fn insert_event(
        &mut self,
        group_id: EntityId,
        mut event: Event,
    ) -> VaultResult<Option<EntityId>> {
        let at_beginning = self.group(group_id)?.content.add_events_to_beginning;
        if event.save(&self.handle, SaveMode::Normal)?.is_none() {
            return Ok(None);
        }
        let id = event.require_id()?;
        let group = self.group_mut(group_id)?;
        group.basic.id_list.add(id, at_beginning);
        self.save_group(group_id)?;
        debug!(%id, group = %group_id, "event created");
        Ok(Some(id))
    }

    pub fn load_event(&self, id: EntityId) -> VaultResult<Event> {
        Ok(Event::load(&self.handle, id)?)
    }

    /// Persist an edited event. Unchanged content adds no history entry.
    pub fn save_event(&self, event: &mut Event) -> VaultResult<Option<HistoryEntry>> {
        Ok(event.save(&self.handle, SaveMode::Normal)?)
    }

    /// Unlink an event from its container (a group or the trash) and delete
    /// its front file. Blobs stay until garbage collection.
    pub fn delete_event(&mut self, container: EntityId, id: EntityId) -> VaultResult<bool> {
        if self.is_read_only() {
            info!(%id, "vault is read-only; event not deleted");
            return Ok(false);
        }
        if !self.members_mut(container)?.remove(id) {
            return Err(VaultError::NotFound {
                kind: EntityKind::Event,
                id,
            });
        }
        self.save_container(container)?;
        match Event::delete_id(&self.handle, id) {
            Ok(_) => {}
            Err(e) if e.is_not_found() => warn!(%id, "event front file was already gone"),
            Err(e) => return Err(e.into()),
        }
        info!(%id, container = %container, "event deleted");
        Ok(true)
    }

    /// Move an event between containers. Either side may be the trash
    /// ([`EntityId::TRASH`]).
    pub fn move_event(&mut self, id: EntityId, from: EntityId, to: EntityId) -> VaultResult<bool> {
        if from == to {
            return Err(VaultError::InvalidOperation(format!(
                "event {id} is already in container {to}"
            )));
        }
        if !self.members(from)?.contains(id) {
            return Err(VaultError::NotFound {
                kind: EntityKind::Event,
                id,
            });
        }
        if self.is_read_only() {
            info!(%id, "vault is read-only; event not moved");
            return Ok(false);
        }
        if from.is_trash() || to.is_trash() {
            self.check_trash()?;
        }

        // Link into the destination first: a crash in between leaves the
        // event listed twice, never nowhere.
        let at_beginning = to.is_trash()
            || self
                .groups
                .get(to)
                .is_some_and(|g| g.content.add_events_to_beginning);
        self.members_mut(to)?.add(id, at_beginning);
        self.save_container(to)?;
        self.members_mut(from)?.remove(id);
        self.save_container(from)?;
        debug!(%id, from = %from, to = %to, "event moved");
        Ok(true)
    }

    pub fn move_to_trash(&mut self, group_id: EntityId, id: EntityId) -> VaultResult<bool> {
        self.move_event(id, group_id, EntityId::TRASH)
    }

    /// Delete every trashed event. Returns how many front files were
    /// removed.
    pub fn empty_trash(&mut self) -> VaultResult<usize> {
        if self.is_read_only() {
            info!("vault is read-only; trash not emptied");
            return Ok(0);
        }
        self.check_trash()?;
        let ids = self.trash.basic.id_list.take();
        self.trash.save(&self.handle, SaveMode::Normal)?;

        let mut removed = 0;
        for id in ids {
            match Event::delete_id(&self.handle, id) {
                Ok(true) => removed += 1,
                Ok(false) => {}
                Err(e) if e.is_not_found() => warn!(%id, "trashed event was already gone"),
                Err(e) => return Err(e.into()),
            }
        }
        info!(removed, "trash emptied");
        Ok(removed)
    }

    /// Events of a group (or of the trash), in list order. Events that fail
    /// to load are logged and skipped.
    pub fn group_events(&self, container: EntityId) -> VaultResult<Vec<Event>> {
        let mut events = Vec::new();
        for id in self.members(container)?.iter() {
            match Event::load(&self.handle, id) {
                Ok(event) => events.push(event),
                Err(RecordError::Io(e)) => return Err(e.into()),
                Err(e) => warn!(%id, container = %container, error = %e, "skipping unloadable event"),
            }
        }
        Ok(events)
    }

    /// The container currently listing `id`, if any.
    pub fn container_of(&self, id: EntityId) -> Option<EntityId> {
        if self.trash.basic.id_list.contains(id) {
            return Some(EntityId::TRASH);
        }
        self.groups
            .iter()
            .find(|(_, group)| group.basic.id_list.contains(id))
            .map(|(slot, _)| slot.id)
    }

    // ---- Revisions ----

    pub fn event_history(&self, id: EntityId) -> VaultResult<Vec<HistoryEntry>> {
        Ok(self.load_event(id)?.history().to_vec())
    }

    pub fn event_revision(&self, id: EntityId, hash: &ObjectId) -> VaultResult<Event> {
        Ok(self.load_event(id)?.get_revision(&self.handle, hash)?)
    }

    /// Field-level changes from revision `old` to revision `new`.
    pub fn diff_event_revisions(
        &self,
        id: EntityId,
        old: &ObjectId,
        new: &ObjectId,
    ) -> VaultResult<FieldDiff> {
        let event = self.load_event(id)?;
        let before = event.get_revision(&self.handle, old)?;
        let after = event.get_revision(&self.handle, new)?;
        Ok(diff_contents(&before.content, &after.content)?)
    }

    // ---- Accounts ----

    pub fn add_account(&mut self, content: AccountContent) -> VaultResult<Option<EntityId>> {
        let mut account = Account::new(content);
        if account.save(&self.handle, SaveMode::Normal)?.is_none() {
            return Ok(None);
        }
        let id = self.accounts.append(account)?;
        self.accounts.save(&self.handle)?;
        info!(%id, "account added");
        Ok(Some(id))
    }

    // ---- Maintenance ----

    /// Remove every blob no history entry refers to.
    pub fn remove_unused_objects(&self) -> VaultResult<GcReport> {
        GarbageCollector::new(&self.handle).run(false)
    }

    /// What [`Vault::remove_unused_objects`] would remove.
    pub fn plan_gc(&self) -> VaultResult<GcPlan> {
        let _guard = self.handle.exclusive();
        GarbageCollector::new(&self.handle).mark()
    }

    /// Reconcile front files, blobs and container lists. See [`orphan`].
    pub fn check_for_orphans(&mut self) -> VaultResult<OrphanReport> {
        orphan::reconcile(self)
    }

    pub fn export_data(&self, group_ids: Option<&[EntityId]>) -> VaultResult<ExportDocument> {
        interchange::export(self, group_ids)
    }

    pub fn import_data(&mut self, document: &ExportDocument) -> VaultResult<ImportSummary> {
        interchange::import(self, document)
    }

    // ---- Containers ----

    pub(crate) fn members(&self, container: EntityId) -> VaultResult<&IdList> {
        if container.is_trash() {
            Ok(&self.trash.basic.id_list)
        } else {
            Ok(&self.group(container)?.basic.id_list)
        }
    }

    fn members_mut(&mut self, container: EntityId) -> VaultResult<&mut IdList> {
        if container.is_trash() {
            self.check_trash()?;
            Ok(&mut self.trash.basic.id_list)
        } else {
            Ok(&mut self.group_mut(container)?.basic.id_list)
        }
    }

    fn save_container(&mut self, container: EntityId) -> VaultResult<()> {
        if container.is_trash() {
            self.trash.save(&self.handle, SaveMode::Normal)?;
        } else {
            self.save_group(container)?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for Vault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vault")
            .field("root", &self.root)
            .field("groups", &self.groups.len())
            .field("accounts", &self.accounts.len())
            .field("read_only", &self.is_read_only())
            .finish()
    }
}
