use std::path::Path;
use std::sync::Arc;

use calvault_record::{Record, SaveMode, LAST_IDS_FILE};
use calvault_sdk::{
    EntityId, Event, EventContent, EventGroup, EventType, ExportDocument, GroupContent, GroupType,
    MemoryFs, Vault, VaultConfig, VaultError,
};
use calvault_store::{FileSystem, ShardedObjectStore};

fn memory_vault() -> (Arc<MemoryFs>, Vault) {
    let fs = Arc::new(MemoryFs::new());
    let vault = Vault::open_with(fs.clone(), VaultConfig::default()).unwrap();
    (fs, vault)
}

fn group(vault: &mut Vault, title: &str) -> EntityId {
    vault
        .create_group(GroupContent::new(GroupType::Group, title))
        .unwrap()
        .unwrap()
}

fn event(vault: &mut Vault, group: EntityId, summary: &str) -> EntityId {
    vault
        .create_event(group, EventContent::new(EventType::Custom, summary))
        .unwrap()
        .unwrap()
}

#[test]
fn revisions_survive_gc_until_the_event_is_deleted() {
    let (_fs, mut vault) = memory_vault();
    let g = group(&mut vault, "Work");
    let id = event(&mut vault, g, "X");

    let mut e = vault.load_event(id).unwrap();
    e.content.summary = "Y".into();
    vault.save_event(&mut e).unwrap().unwrap();
    e.content.summary = "X".into();
    vault.save_event(&mut e).unwrap().unwrap();

    let history = vault.event_history(id).unwrap();
    assert_eq!(history.len(), 3);
    let (h3, h2, h1) = (history[0].hash, history[1].hash, history[2].hash);
    assert_eq!(h3, h1);
    assert_ne!(h2, h1);

    let report = vault.remove_unused_objects().unwrap();
    assert_eq!(report.removed, 0);
    let objects = vault.handle().objects();
    assert!(objects.exists(&h1).unwrap());
    assert!(objects.exists(&h2).unwrap());

    let old = vault.event_revision(id, &h2).unwrap();
    assert_eq!(old.content.summary, "Y");

    assert!(vault.delete_event(g, id).unwrap());
    let report = vault.remove_unused_objects().unwrap();
    assert_eq!(report.removed, 2);
    let objects = vault.handle().objects();
    assert!(!objects.exists(&h1).unwrap());
    assert!(!objects.exists(&h2).unwrap());
    assert!(vault.group_events(g).unwrap().is_empty());
}

#[test]
fn gc_keeps_every_referenced_blob() {
    let (_fs, mut vault) = memory_vault();
    let work = group(&mut vault, "Work");
    let home = group(&mut vault, "Home");
    for i in 0..4 {
        event(&mut vault, work, &format!("work {i}"));
        event(&mut vault, home, &format!("home {i}"));
    }
    let garbage = vault.handle().objects().put(b"not referenced").unwrap();

    let plan = vault.plan_gc().unwrap();
    assert_eq!(plan.candidates.len(), 1);
    assert_eq!(plan.candidates[0].id, garbage);
    assert!(vault.handle().objects().exists(&garbage).unwrap(), "mark alone deletes nothing");

    let before = vault.handle().objects().stats().unwrap();
    let report = vault.remove_unused_objects().unwrap();
    assert_eq!(report.removed, 1);
    assert_eq!(report.scanned, before.objects);
    assert_eq!(vault.handle().objects().stats().unwrap().objects, before.objects - 1);
    assert_eq!(vault.group_events(work).unwrap().len(), 4);
    assert_eq!(vault.group_events(home).unwrap().len(), 4);
}

#[test]
fn second_vault_on_locked_store_writes_nothing() {
    let (fs, mut writer) = memory_vault();
    let g = group(&mut writer, "Work");
    let id = event(&mut writer, g, "meeting");
    writer.handle().objects().put(b"garbage").unwrap();
    assert!(!writer.is_read_only());

    let before = fs.snapshot();
    let mut reader = Vault::open_with(fs.clone(), VaultConfig::default()).unwrap();
    assert!(reader.is_read_only());
    assert!(reader.lock_holder().is_some());

    let mut e = reader.load_event(id).unwrap();
    e.content.summary = "changed".into();
    for _ in 0..3 {
        assert!(reader.save_event(&mut e).unwrap().is_none());
    }
    assert!(reader.create_group(GroupContent::new(GroupType::Group, "x")).unwrap().is_none());
    assert!(reader.create_event(g, EventContent::new(EventType::Task, "x")).unwrap().is_none());
    assert!(!reader.set_group_enabled(g, false).unwrap());
    assert!(!reader.move_to_trash(g, id).unwrap());
    assert!(!reader.delete_event(g, id).unwrap());
    assert!(!reader.delete_group(g).unwrap());
    assert_eq!(reader.empty_trash().unwrap(), 0);
    assert!(reader.remove_unused_objects().unwrap().dry_run);
    assert!(reader.check_for_orphans().unwrap().is_clean());

    assert_eq!(fs.snapshot(), before);
}

#[test]
fn configured_read_only_skips_the_lock() {
    let fs = Arc::new(MemoryFs::new());
    let config = VaultConfig {
        read_only: true,
        ..VaultConfig::default()
    };
    let mut vault = Vault::open_with(fs.clone(), config).unwrap();
    assert!(vault.is_read_only());
    assert!(vault.create_group(GroupContent::new(GroupType::Group, "x")).unwrap().is_none());
    assert_eq!(fs.file_count(), 0);
}

#[test]
fn ids_keep_growing_after_counters_are_lost() {
    let dir = tempfile::tempdir().unwrap();
    {
        let mut vault = Vault::init(dir.path()).unwrap();
        let g = group(&mut vault, "Work");
        let ids: Vec<i64> = (0..5).map(|i| event(&mut vault, g, &format!("e{i}")).get()).collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
    }
    std::fs::remove_file(dir.path().join(LAST_IDS_FILE)).unwrap();

    let mut vault = Vault::open(dir.path()).unwrap();
    assert!(!vault.is_read_only(), "lock was released on drop");
    let g = vault.enabled_group_ids()[0];
    assert_eq!(event(&mut vault, g, "next").get(), 6);
    assert_eq!(group(&mut vault, "More").get(), 2);
}

#[test]
fn deleting_a_group_trashes_its_events() {
    let (_fs, mut vault) = memory_vault();
    let work = group(&mut vault, "Work");
    let home = group(&mut vault, "Home");
    let a = event(&mut vault, work, "a");
    let b = event(&mut vault, work, "b");

    assert!(vault.delete_group(work).unwrap());
    assert!(vault.group(work).is_err());
    let trashed: Vec<_> = vault.trash().basic.id_list.iter().collect();
    assert!(trashed.contains(&a) && trashed.contains(&b));
    assert_eq!(vault.container_of(a), Some(EntityId::TRASH));

    assert!(vault.move_event(a, EntityId::TRASH, home).unwrap());
    assert_eq!(vault.container_of(a), Some(home));
    assert_eq!(vault.empty_trash().unwrap(), 1);
    assert!(vault.load_event(b).unwrap_err().is_not_found());
    assert_eq!(vault.load_event(a).unwrap().content.summary, "a");
}

#[test]
fn task_lists_add_new_events_first() {
    let (_fs, mut vault) = memory_vault();
    let tasks = vault
        .create_group(GroupContent::new(GroupType::TaskList, "Todo"))
        .unwrap()
        .unwrap();
    let first = event(&mut vault, tasks, "first");
    let second = event(&mut vault, tasks, "second");
    let order: Vec<_> = vault.group(tasks).unwrap().basic.id_list.iter().collect();
    assert_eq!(order, vec![second, first]);
}

#[test]
fn revision_diff_names_changed_fields() {
    let (_fs, mut vault) = memory_vault();
    let g = group(&mut vault, "Work");
    let id = event(&mut vault, g, "standup");
    let mut e = vault.load_event(id).unwrap();
    e.content.summary = "retro".into();
    e.content.description = "bring notes\n".into();
    vault.save_event(&mut e).unwrap();

    let history = vault.event_history(id).unwrap();
    let diff = vault
        .diff_event_revisions(id, &history[1].hash, &history[0].hash)
        .unwrap();
    assert_eq!(diff.fields(), vec!["description", "summary"]);
}

#[test]
fn orphans_are_adopted_into_a_disabled_group() {
    let (_fs, mut vault) = memory_vault();
    let g = group(&mut vault, "Work");
    event(&mut vault, g, "listed");

    let mut stray = Event::new(EventContent::new(EventType::Task, "unlisted file"));
    stray.save(vault.handle(), SaveMode::Normal).unwrap();
    let stray_id = stray.id().unwrap();

    let mut lost = Event::new(EventContent::new(EventType::Yearly, "lost blob"));
    lost.save(vault.handle(), SaveMode::Normal).unwrap();
    Event::delete_id(vault.handle(), lost.id().unwrap()).unwrap();

    let mut ghost = EventGroup::new(GroupContent::new(GroupType::Group, "ghost"));
    ghost.save(vault.handle(), SaveMode::Normal).unwrap();
    let ghost_id = ghost.id().unwrap();

    let report = vault.check_for_orphans().unwrap();
    assert_eq!(report.removed_groups, vec![ghost_id]);
    assert!(report.removed_accounts.is_empty());
    assert_eq!(report.adopted_files, vec![stray_id]);
    assert_eq!(report.adopted_blobs.len(), 1);
    assert!(Record::<calvault_model::GroupSchema>::load(vault.handle(), ghost_id).is_err());

    let orphans = report.group_id.unwrap();
    assert_eq!(vault.groups().is_enabled(orphans), Some(false));
    assert!(!vault.enabled_group_ids().contains(&orphans));
    let adopted = vault.group_events(orphans).unwrap();
    let summaries: Vec<_> = adopted.iter().map(|e| e.content.summary.as_str()).collect();
    assert_eq!(summaries, vec!["lost blob", "unlisted file"]);
    assert_eq!(vault.group(orphans).unwrap().content.title, "Orphan Events");

    assert!(vault.check_for_orphans().unwrap().is_clean());
}

#[test]
fn damaged_group_stays_listed_through_saves_and_fsck() {
    let (fs, mut vault) = memory_vault();
    let work = group(&mut vault, "Work");
    event(&mut vault, work, "standup");
    let head = vault.group(work).unwrap().head().unwrap().hash;
    drop(vault);

    let blob = ShardedObjectStore::new(fs.clone()).object_path(&head);
    fs.write_atomic(&blob, b"bitrot").unwrap();

    let mut vault = Vault::open_with(fs.clone(), VaultConfig::default()).unwrap();
    assert!(vault.groups().ids().is_empty());
    assert_eq!(vault.groups().unloaded_ids(), vec![work]);

    let home = group(&mut vault, "Home");
    let list: Vec<i64> =
        serde_json::from_slice(&fs.read(Path::new("group_list.json")).unwrap()).unwrap();
    assert_eq!(list, vec![work.get(), home.get()]);

    let report = vault.check_for_orphans().unwrap();
    assert!(report.is_clean(), "{report:?}");
    assert!(fs.is_file(Path::new(&format!("group/{work}.json"))));
    assert!(vault.groups().is_listed(work));
}

#[test]
fn blob_recovery_is_idempotent() {
    let (_fs, mut vault) = memory_vault();
    let sparse = vault
        .handle()
        .objects()
        .put(br#"{"summary":"lost","type":"task"}"#)
        .unwrap();

    let adopted: Vec<usize> = (0..3)
        .map(|_| vault.check_for_orphans().unwrap().adopted_blobs.len())
        .collect();
    assert_eq!(adopted, vec![1, 0, 0]);

    let orphans = vault.group_events(vault.groups().ids()[0]).unwrap();
    assert_eq!(orphans.len(), 1);
    assert_eq!(orphans[0].head().unwrap().hash, sparse);
    assert_eq!(orphans[0].content.summary, "lost");
    assert_eq!(orphans[0].content.event_type, EventType::Task);
}

#[test]
fn damaged_trash_opens_but_is_never_overwritten() {
    let (fs, mut vault) = memory_vault();
    let work = group(&mut vault, "Work");
    let gone = event(&mut vault, work, "gone");
    assert!(vault.move_to_trash(work, gone).unwrap());
    let head = vault.trash().head().unwrap().hash;
    vault.handle().objects().remove(&head).unwrap();
    drop(vault);

    let trash_file = fs.read(Path::new("trash.json")).unwrap();
    let mut vault = Vault::open_with(fs.clone(), VaultConfig::default()).unwrap();
    assert!(vault.trash_damaged());
    assert!(vault.trash().basic.id_list.is_empty());

    let kept = event(&mut vault, work, "kept");
    assert!(matches!(vault.move_to_trash(work, kept), Err(VaultError::DamagedTrash)));
    assert_eq!(vault.container_of(kept), Some(work));
    assert!(matches!(vault.empty_trash(), Err(VaultError::DamagedTrash)));
    assert!(matches!(vault.delete_group(work), Err(VaultError::DamagedTrash)));
    assert!(vault.group(work).is_ok());

    let report = vault.check_for_orphans().unwrap();
    assert!(report.adopted_files.is_empty());
    assert_eq!(fs.read(Path::new("trash.json")).unwrap(), trash_file);
}

#[test]
fn export_then_import_matches_by_uuid() {
    let (_fs, mut source) = memory_vault();
    let g = group(&mut source, "Work");
    event(&mut source, g, "one");
    event(&mut source, g, "two");
    let hidden = group(&mut source, "Hidden");
    source.set_group_enabled(hidden, false).unwrap();

    let json = source.export_data(None).unwrap().to_json().unwrap();
    let document = ExportDocument::from_json(json.as_bytes()).unwrap();
    assert_eq!(document.groups.len(), 2);
    assert_eq!(document.event_count(), 2);
    assert_eq!(document.info.app_name, "calvault");

    let unchanged = source.import_data(&document).unwrap();
    assert_eq!(unchanged.groups_unchanged, 2);
    assert_eq!(unchanged.events_unchanged, 2);
    assert_eq!(unchanged.events_created, 0);

    let (_fs, mut target) = memory_vault();
    let created = target.import_data(&document).unwrap();
    assert_eq!(created.groups_created, 2);
    assert_eq!(created.events_created, 2);
    let copy = target.groups().by_uuid(&document.groups[0].uuid.unwrap()).unwrap();
    assert_eq!(copy.content.title, "Work");
    let hidden_copy = target.groups().by_uuid(&document.groups[1].uuid.unwrap()).unwrap();
    assert_eq!(target.groups().is_enabled(hidden_copy.id().unwrap()), Some(false));

    let mut edited = document.clone();
    edited.groups[0].events[1].content.summary = "two (moved)".into();
    let updated = target.import_data(&edited).unwrap();
    assert_eq!(updated.events_updated, 1);
    assert_eq!(updated.events_unchanged, 1);
    assert_eq!(updated.events_created, 0);
    assert_eq!(target.status().unwrap().listed_events, 2);
}

#[test]
fn import_rejects_foreign_documents() {
    let (_fs, mut vault) = memory_vault();
    let mut document = ExportDocument::default();
    document.info.app_name = "other".into();
    assert!(vault.import_data(&document).is_err());
}
