//! Reconciliation of front files, blobs and container lists after a crash
//! or a manual edit of the vault directory.
//!
//! Three kinds of leftovers are handled:
//!
//! 1. group and account front files their holder does not list are deleted;
//! 2. blobs no event history refers to, but which decode as event content,
//!    become new events;
//! 3. event front files listed by no group and not by the trash are adopted.
//!
//! Everything adopted lands in one new, disabled group.
//!
//! The whole vault is scanned before anything is changed, so a failed scan
//! leaves the vault untouched. Adopted blobs keep their hash: the new event's
//! only history entry points at the existing blob.

use std::collections::HashSet;

use calvault_model::{
    recognize_event, AccountSchema, Event, EventContent, EventGroup, EventSchema, GroupContent,
    GroupSchema, GroupType,
};
use calvault_record::{read_front_history, Record, Schema};
use calvault_store::StoreError;
use calvault_types::{EntityId, EntityKind, ObjectId};
use tracing::{debug, info, warn};

use crate::error::VaultResult;
use crate::scan::front_file_ids;
use crate::vault::Vault;

/// What a reconciliation found and fixed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OrphanReport {
    /// The group adopted events were put in, if anything was adopted.
    pub group_id: Option<EntityId>,
    pub removed_groups: Vec<EntityId>,
    pub removed_accounts: Vec<EntityId>,
    /// Events created from unreferenced blobs.
    pub adopted_blobs: Vec<EntityId>,
    /// Unlisted event front files.
    pub adopted_files: Vec<EntityId>,
}

impl OrphanReport {
    pub fn is_clean(&self) -> bool {
        self.removed_groups.is_empty()
            && self.removed_accounts.is_empty()
            && self.adopted_blobs.is_empty()
            && self.adopted_files.is_empty()
    }

    pub fn adopted(&self) -> usize {
        self.adopted_blobs.len() + self.adopted_files.len()
    }
}

/// Everything a reconciliation will change, gathered before the first write.
#[derive(Default)]
struct Plan {
    stray_groups: Vec<EntityId>,
    stray_accounts: Vec<EntityId>,
    blobs: Vec<(ObjectId, EventContent)>,
    unlisted: Vec<EntityId>,
}

pub(crate) fn reconcile(vault: &mut Vault) -> VaultResult<OrphanReport> {
    let mut report = OrphanReport::default();
    if vault.is_read_only() {
        info!("vault is read-only; orphan check skipped");
        return Ok(report);
    }

    let plan = scan(vault)?;

    report.removed_groups = remove_front_files::<GroupSchema>(vault, &plan.stray_groups)?;
    report.removed_accounts = remove_front_files::<AccountSchema>(vault, &plan.stray_accounts)?;
    for (hash, content) in plan.blobs {
        let mut event = Event::new(content);
        if event.save_with_object(vault.handle(), hash)?.is_none() {
            break;
        }
        let id = event.require_id()?;
        debug!(%id, blob = %hash.short_hex(), "event recovered from blob");
        report.adopted_blobs.push(id);
    }
    report.adopted_files = plan.unlisted;

    if report.adopted() > 0 {
        let title = vault.config().orphans.group_title.clone();
        let mut group = EventGroup::new(GroupContent::new(GroupType::Group, title));
        for id in report.adopted_blobs.iter().chain(&report.adopted_files) {
            group.basic.id_list.add(*id, false);
        }
        report.group_id = vault.insert_group(group, false)?;
    }

    if report.is_clean() {
        info!("no orphans found");
    } else {
        info!(
            removed_groups = report.removed_groups.len(),
            removed_accounts = report.removed_accounts.len(),
            adopted_blobs = report.adopted_blobs.len(),
            adopted_files = report.adopted_files.len(),
            group = ?report.group_id,
            "orphans reconciled"
        );
    }
    Ok(report)
}

fn scan(vault: &Vault) -> VaultResult<Plan> {
    let fs = vault.handle().fs();
    let groups = vault.groups();
    let accounts = vault.accounts();
    let mut plan = Plan {
        stray_groups: front_file_ids(fs, EntityKind::Group)?
            .into_iter()
            .filter(|id| !groups.is_listed(*id))
            .collect(),
        stray_accounts: front_file_ids(fs, EntityKind::Account)?
            .into_iter()
            .filter(|id| !accounts.is_listed(*id))
            .collect(),
        ..Plan::default()
    };

    let event_files = front_file_ids(fs, EntityKind::Event)?;
    plan.blobs = recoverable_blobs(vault, &event_files)?;

    let unloaded = groups.unloaded_ids();
    if !unloaded.is_empty() {
        warn!(groups = ?unloaded, "some groups could not be loaded; unlisted events are left alone");
    } else if vault.trash_damaged() {
        warn!("trash could not be loaded; unlisted events are left alone");
    } else {
        let listed = listed_events(vault);
        plan.unlisted = event_files
            .into_iter()
            .filter(|id| !listed.contains(id))
            .collect();
        for id in &plan.unlisted {
            debug!(%id, "adopting unlisted event");
        }
    }
    Ok(plan)
}

fn remove_front_files<S: Schema>(vault: &Vault, ids: &[EntityId]) -> VaultResult<Vec<EntityId>> {
    let mut removed = Vec::new();
    for id in ids {
        warn!(kind = %S::KIND, %id, "removing front file missing from its list");
        if Record::<S>::delete_id(vault.handle(), *id)? {
            removed.push(*id);
        }
    }
    Ok(removed)
}

fn listed_events(vault: &Vault) -> HashSet<EntityId> {
    let mut listed: HashSet<EntityId> = vault.trash().basic.id_list.iter().collect();
    for (_, group) in vault.groups().iter() {
        listed.extend(group.basic.id_list.iter());
    }
    listed
}

/// Unreferenced blobs that decode as event content. Blobs that fail
/// verification are not recognized.
fn recoverable_blobs(
    vault: &Vault,
    event_files: &[EntityId],
) -> VaultResult<Vec<(ObjectId, EventContent)>> {
    let handle = vault.handle();
    let mut referenced: HashSet<ObjectId> = HashSet::new();
    for id in event_files {
        let history = read_front_history(handle.fs(), &EventSchema::front_path(*id))?;
        referenced.extend(history.into_iter().map(|entry| entry.hash));
    }

    let mut candidates = Vec::new();
    for entry in handle.objects().iter()? {
        let entry = entry?;
        if !referenced.contains(&entry.id) {
            candidates.push(entry.id);
        }
    }

    let mut found = Vec::new();
    for hash in candidates {
        let bytes = match handle.objects().get(&hash) {
            Ok(bytes) => bytes,
            Err(e @ (StoreError::HashMismatch { .. } | StoreError::NotFound(_))) => {
                warn!(blob = %hash.short_hex(), error = %e, "unreadable blob not recognized");
                continue;
            }
            Err(e) => return Err(e.into()),
        };
        let Ok(value) = serde_json::from_slice::<serde_json::Value>(&bytes) else {
            continue;
        };
        if let Some(content) = recognize_event(&value) {
            found.push((hash, content));
        }
    }
    Ok(found)
}
