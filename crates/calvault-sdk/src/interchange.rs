//! JSON export and import of groups with their events.
//!
//! Groups and events are matched by uuid on import, so importing a document
//! exported from the same vault is a no-op: unchanged content dedups to the
//! current head and adds no history.

use std::collections::HashMap;

use calvault_model::{Event, EventContent, EventGroup, GroupContent};
use calvault_types::{EntityId, EntityUuid, Timestamp};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{VaultError, VaultResult};
use crate::vault::Vault;

pub const APP_NAME: &str = "calvault";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportInfo {
    pub app_name: String,
    pub version: String,
}

impl Default for ExportInfo {
    fn default() -> Self {
        Self {
            app_name: APP_NAME.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExportedEvent {
    #[serde(flatten)]
    pub content: EventContent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<EntityUuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified: Option<Timestamp>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExportedGroup {
    #[serde(flatten)]
    pub content: GroupContent,
    #[serde(default = "enabled_default")]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<EntityUuid>,
    #[serde(default)]
    pub events: Vec<ExportedEvent>,
}

fn enabled_default() -> bool {
    true
}

/// A complete export document.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ExportDocument {
    #[serde(default)]
    pub info: ExportInfo,
    #[serde(default)]
    pub groups: Vec<ExportedGroup>,
}

impl ExportDocument {
    pub fn from_json(data: &[u8]) -> VaultResult<Self> {
        serde_json::from_slice(data).map_err(|e| VaultError::Import(e.to_string()))
    }

    pub fn to_json(&self) -> VaultResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| VaultError::Serialization(e.to_string()))
    }

    pub fn event_count(&self) -> usize {
        self.groups.iter().map(|g| g.events.len()).sum()
    }
}

/// Counts of what an import changed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub groups_created: usize,
    pub groups_updated: usize,
    pub groups_unchanged: usize,
    pub events_created: usize,
    pub events_updated: usize,
    pub events_unchanged: usize,
}

pub(crate) fn export(vault: &Vault, group_ids: Option<&[EntityId]>) -> VaultResult<ExportDocument> {
    let ids = match group_ids {
        Some(ids) => ids.to_vec(),
        None => vault.groups().ids(),
    };

    let mut groups = Vec::with_capacity(ids.len());
    for id in ids {
        let group = vault.group(id)?;
        let events = vault
            .group_events(id)?
            .into_iter()
            .map(|event| ExportedEvent {
                uuid: event.uuid(),
                modified: event.last_modified(),
                content: event.content,
            })
            .collect();
        groups.push(ExportedGroup {
            content: group.content.clone(),
            enabled: vault.groups().is_enabled(id).unwrap_or(true),
            uuid: group.uuid(),
            events,
        });
    }

    let document = ExportDocument {
        info: ExportInfo::default(),
        groups,
    };
    info!(
        groups = document.groups.len(),
        events = document.event_count(),
        "exported"
    );
    Ok(document)
}

pub(crate) fn import(vault: &mut Vault, document: &ExportDocument) -> VaultResult<ImportSummary> {
    let mut summary = ImportSummary::default();
    if vault.is_read_only() {
        info!("vault is read-only; nothing imported");
        return Ok(summary);
    }
    if document.info.app_name != APP_NAME {
        return Err(VaultError::Import(format!(
            "document was written by {:?}, not {APP_NAME}",
            document.info.app_name
        )));
    }

    let mut known_events = event_uuids(vault)?;

    for exported in &document.groups {
        let existing = exported
            .uuid
            .and_then(|uuid| vault.groups().by_uuid(&uuid))
            .and_then(|group| group.id());
        let group_id = match existing {
            Some(id) => {
                let before = vault.group(id)?.head().map(|entry| entry.hash);
                vault.group_mut(id)?.content = exported.content.clone();
                let after = vault.save_group(id)?.map(|entry| entry.hash);
                if after == before {
                    summary.groups_unchanged += 1;
                } else {
                    summary.groups_updated += 1;
                }
                if vault.groups().is_enabled(id) != Some(exported.enabled) {
                    vault.set_group_enabled(id, exported.enabled)?;
                }
                id
            }
            None => {
                let mut group = EventGroup::new(exported.content.clone());
                if let Some(uuid) = exported.uuid {
                    group.set_uuid(uuid);
                }
                let Some(id) = vault.insert_group(group, exported.enabled)? else {
                    return Ok(summary);
                };
                summary.groups_created += 1;
                id
            }
        };

        for exported_event in &exported.events {
            let known = exported_event
                .uuid
                .and_then(|uuid| known_events.get(&uuid).copied());
            match known {
                Some(id) => {
                    let mut event = vault.load_event(id)?;
                    let before = event.head().map(|entry| entry.hash);
                    event.content = exported_event.content.clone();
                    let after = vault.save_event(&mut event)?.map(|entry| entry.hash);
                    if after == before {
                        summary.events_unchanged += 1;
                    } else {
                        summary.events_updated += 1;
                    }
                }
                None => {
                    let mut event = Event::new(exported_event.content.clone());
                    if let Some(uuid) = exported_event.uuid {
                        event.set_uuid(uuid);
                    }
                    if let Some(id) = vault.insert_event(group_id, event)? {
                        if let Some(uuid) = exported_event.uuid {
                            known_events.insert(uuid, id);
                        }
                        summary.events_created += 1;
                    }
                }
            }
        }
    }

    info!(
        groups_created = summary.groups_created,
        groups_updated = summary.groups_updated,
        events_created = summary.events_created,
        events_updated = summary.events_updated,
        events_unchanged = summary.events_unchanged,
        "imported"
    );
    Ok(summary)
}

/// Uuid of every event listed in a group or the trash.
fn event_uuids(vault: &Vault) -> VaultResult<HashMap<EntityUuid, EntityId>> {
    let mut containers = vault.groups().ids();
    containers.push(EntityId::TRASH);

    let mut uuids = HashMap::new();
    for container in containers {
        for event in vault.group_events(container)? {
            if let (Some(uuid), Some(id)) = (event.uuid(), event.id()) {
                uuids.insert(uuid, id);
            }
        }
    }
    debug!(known = uuids.len(), "indexed event uuids");
    Ok(uuids)
}
