use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context};
use calvault_sdk::{
    EntityId, Event, EventContent, ExportDocument, FieldChange, GcReport, GroupContent, ObjectId,
    Timestamp, Vault, VaultConfig,
};
use calvault_store::LocalFs;
use colored::Colorize;
use serde_json::json;

use crate::cli::*;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let session = Session {
        root: cli.root,
        format: cli.format,
        read_only: cli.read_only,
    };
    match cli.command {
        Command::Init => cmd_init(&session),
        Command::Status => cmd_status(&session),
        Command::Lock => cmd_lock(&session),
        Command::Group(args) => cmd_group(&session, args.action),
        Command::Event(args) => cmd_event(&session, args.action),
        Command::Trash(args) => cmd_trash(&session, args.action),
        Command::Gc(args) => cmd_gc(&session, args),
        Command::Fsck => cmd_fsck(&session),
        Command::Export(args) => cmd_export(&session, args),
        Command::Import(args) => cmd_import(&session, args),
    }
}

/// Global options shared by every command.
struct Session {
    root: PathBuf,
    format: OutputFormat,
    read_only: bool,
}

impl Session {
    fn open(&self) -> anyhow::Result<Vault> {
        let fs = Arc::new(LocalFs::open(&self.root)?);
        let mut config = VaultConfig::load(fs.as_ref())?;
        config.read_only |= self.read_only;
        let vault = Vault::open_with(fs, config)
            .with_context(|| format!("opening vault at {}", self.root.display()))?;
        if let Some(holder) = vault.lock_holder() {
            eprintln!(
                "{} vault is locked by pid {}; changes will not be saved",
                "!".yellow().bold(),
                holder.pid
            );
        }
        Ok(vault)
    }

    fn json(&self) -> bool {
        self.format == OutputFormat::Json
    }
}

fn print_json(value: &serde_json::Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn format_time(ts: Timestamp) -> String {
    chrono::DateTime::from_timestamp(ts.as_secs(), 0)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| ts.to_string())
}

fn not_saved() {
    println!("{} vault is read-only; nothing was changed", "!".yellow().bold());
}

fn done(message: impl std::fmt::Display) {
    println!("{} {}", "✓".green().bold(), message);
}

fn cmd_init(session: &Session) -> anyhow::Result<()> {
    let vault = Vault::init(&session.root)?;
    if vault.is_read_only() {
        not_saved();
        return Ok(());
    }
    done(format!(
        "Initialized vault in {}",
        session.root.display().to_string().bold()
    ));
    Ok(())
}

fn cmd_status(session: &Session) -> anyhow::Result<()> {
    let vault = session.open()?;
    let status = vault.status()?;
    if session.json() {
        return print_json(&json!({
            "root": session.root,
            "groups": status.groups,
            "enabledGroups": status.enabled_groups,
            "accounts": status.accounts,
            "events": status.listed_events,
            "trashed": status.trashed_events,
            "objects": status.objects.objects,
            "objectBytes": status.objects.bytes,
            "readOnly": status.read_only,
        }));
    }
    println!("Vault {}", session.root.display().to_string().bold());
    println!(
        "Groups: {} ({} enabled)",
        status.groups.to_string().bold(),
        status.enabled_groups
    );
    println!("Events: {}", status.listed_events.to_string().bold());
    println!("Trash: {}", status.trashed_events);
    println!("Accounts: {}", status.accounts);
    println!(
        "Objects: {} ({} bytes)",
        status.objects.objects.to_string().bold(),
        status.objects.bytes
    );
    let mode = if status.read_only {
        "read-only".yellow()
    } else {
        "writable".green()
    };
    println!("Mode: {mode}");
    Ok(())
}

fn cmd_lock(session: &Session) -> anyhow::Result<()> {
    let vault = session.open()?;
    let holder = vault.lock_holder();
    if session.json() {
        return print_json(&json!({
            "readOnly": vault.is_read_only(),
            "holder": holder,
        }));
    }
    match holder {
        Some(token) => println!(
            "Locked by pid {} since {}",
            token.pid.to_string().yellow().bold(),
            format_time(token.started_at)
        ),
        None if vault.is_read_only() => println!("Opened read-only; lock not taken"),
        None => done("Lock is free"),
    }
    Ok(())
}

fn cmd_group(session: &Session, action: GroupAction) -> anyhow::Result<()> {
    let mut vault = session.open()?;
    match action {
        GroupAction::List => list_groups(session, &vault)?,
        GroupAction::Add {
            title,
            group_type,
            color,
        } => {
            let mut content = GroupContent::new(group_type, title);
            if let Some(color) = color {
                content.color = color;
            }
            match vault.create_group(content)? {
                Some(id) => done(format!("Created group {}", id.to_string().yellow())),
                None => not_saved(),
            }
        }
        GroupAction::Enable { id } => toggle_group(&mut vault, id, true)?,
        GroupAction::Disable { id } => toggle_group(&mut vault, id, false)?,
        GroupAction::Delete { id } => {
            if vault.delete_group(id)? {
                done(format!("Deleted group {id}; its events are in the trash"));
            } else {
                not_saved();
            }
        }
    }
    Ok(())
}

fn list_groups(session: &Session, vault: &Vault) -> anyhow::Result<()> {
    let groups = vault.groups();
    if session.json() {
        let list: Vec<_> = groups
            .iter()
            .map(|(slot, group)| {
                json!({
                    "id": slot.id,
                    "enabled": slot.enabled,
                    "uuid": group.uuid(),
                    "title": group.content.title,
                    "type": group.content.group_type,
                    "events": group.basic.id_list.len(),
                })
            })
            .collect();
        return print_json(&json!(list));
    }
    if groups.is_empty() {
        println!("No groups.");
    }
    for (slot, group) in groups.iter() {
        let mark = if slot.enabled {
            "●".green()
        } else {
            "○".dimmed()
        };
        println!(
            "{} {:>4}  {}  {}  ({} events)",
            mark,
            slot.id.to_string().yellow(),
            group.content.title.bold(),
            group.content.group_type.as_str().dimmed(),
            group.basic.id_list.len()
        );
    }
    Ok(())
}

fn toggle_group(vault: &mut Vault, id: EntityId, enabled: bool) -> anyhow::Result<()> {
    if !vault.set_group_enabled(id, enabled)? {
        not_saved();
        return Ok(());
    }
    let state = if enabled { "Enabled" } else { "Disabled" };
    done(format!("{state} group {id}"));
    Ok(())
}

fn cmd_event(session: &Session, action: EventAction) -> anyhow::Result<()> {
    let mut vault = session.open()?;
    match action {
        EventAction::Add {
            group,
            summary,
            event_type,
            description,
        } => {
            let default_type = vault.group(group)?.content.default_event_type;
            let mut content = EventContent::new(event_type.unwrap_or(default_type), summary);
            if let Some(description) = description {
                content.description = description;
            }
            match vault.create_event(group, content)? {
                Some(id) => done(format!(
                    "Created event {} in group {}",
                    id.to_string().yellow(),
                    group
                )),
                None => not_saved(),
            }
        }
        EventAction::Edit {
            id,
            summary,
            description,
            event_type,
        } => {
            let mut event = vault.load_event(id)?;
            if let Some(summary) = summary {
                event.content.summary = summary;
            }
            if let Some(description) = description {
                event.content.description = description;
            }
            if let Some(event_type) = event_type {
                event.content.event_type = event_type;
            }
            let before = event.head().map(|entry| entry.hash);
            match vault.save_event(&mut event)? {
                Some(head) if Some(head.hash) == before => println!("Event {id} unchanged"),
                Some(head) => done(format!(
                    "Saved event {} as revision {}",
                    id,
                    head.hash.short_hex().cyan()
                )),
                None => not_saved(),
            }
        }
        EventAction::Show { id, revision } => {
            let mut event = vault.load_event(id)?;
            if let Some(prefix) = revision {
                let hash = resolve_revision(&event, &prefix)?;
                event = vault.event_revision(id, &hash)?;
            }
            show_event(session, &event)?;
        }
        EventAction::History { id, diff } => show_history(session, &vault, id, diff)?,
        EventAction::Delete { id } => {
            let container = container_of(&vault, id)?;
            if vault.delete_event(container, id)? {
                done(format!("Deleted event {id}"));
            } else {
                not_saved();
            }
        }
        EventAction::Trash { id } => {
            let container = container_of(&vault, id)?;
            if container.is_trash() {
                bail!("event {id} is already in the trash");
            }
            if vault.move_to_trash(container, id)? {
                done(format!("Moved event {id} to the trash"));
            } else {
                not_saved();
            }
        }
        EventAction::Restore { id, to } => {
            if vault.move_event(id, EntityId::TRASH, to)? {
                done(format!("Restored event {id} into group {to}"));
            } else {
                not_saved();
            }
        }
    }
    Ok(())
}

fn container_of(vault: &Vault, id: EntityId) -> anyhow::Result<EntityId> {
    vault
        .container_of(id)
        .ok_or_else(|| anyhow!("event {id} is not listed in any group or the trash"))
}

/// Find the history entry whose hash starts with `prefix`.
fn resolve_revision(event: &Event, prefix: &str) -> anyhow::Result<ObjectId> {
    let prefix = prefix.to_ascii_lowercase();
    let mut matches = event
        .history()
        .iter()
        .map(|entry| entry.hash)
        .filter(|hash| hash.to_hex().starts_with(&prefix));
    let hash = matches
        .next()
        .ok_or_else(|| anyhow!("no revision matches {prefix}"))?;
    if matches.any(|other| other != hash) {
        bail!("revision prefix {prefix} is ambiguous");
    }
    Ok(hash)
}

fn show_event(session: &Session, event: &Event) -> anyhow::Result<()> {
    if session.json() {
        return print_json(&json!({
            "id": event.id(),
            "uuid": event.uuid(),
            "modified": event.last_modified(),
            "content": event.content,
        }));
    }
    let c = &event.content;
    println!(
        "{} {}  {}",
        "Event".bold(),
        event.id().map(|id| id.to_string()).unwrap_or_default().yellow(),
        c.event_type.as_str().dimmed()
    );
    println!("  Summary: {}", c.summary.bold());
    if let Some(uuid) = event.uuid() {
        println!("  Uuid: {}", uuid.to_string().dimmed());
    }
    if let Some(modified) = event.last_modified() {
        println!("  Modified: {}", format_time(modified));
    }
    if let Some(tz) = &c.time_zone {
        println!("  Time zone: {tz}");
    }
    for rule in &c.rules {
        println!("  Rule {}: {}", rule.rule_type.cyan(), rule.value);
    }
    if !c.description.is_empty() {
        println!();
        for line in c.description.lines() {
            println!("  {line}");
        }
    }
    Ok(())
}

fn show_history(session: &Session, vault: &Vault, id: EntityId, diff: bool) -> anyhow::Result<()> {
    let history = vault.event_history(id)?;
    if session.json() {
        let list: Vec<_> = history
            .iter()
            .map(|entry| json!({ "timestamp": entry.timestamp, "hash": entry.hash }))
            .collect();
        return print_json(&json!(list));
    }
    for (i, entry) in history.iter().enumerate() {
        let marker = if i == 0 { " (head)".green() } else { "".normal() };
        println!(
            "{}  {}{}",
            entry.hash.short_hex().yellow(),
            format_time(entry.timestamp),
            marker
        );
        let Some(older) = history.get(i + 1) else {
            continue;
        };
        if !diff || older.hash == entry.hash {
            continue;
        }
        for change in &vault.diff_event_revisions(id, &older.hash, &entry.hash)?.changes {
            print_change(change);
        }
    }
    Ok(())
}

fn print_change(change: &FieldChange) {
    match change {
        FieldChange::Added { field, value } => println!("    {} {field}: {value}", "+".green()),
        FieldChange::Removed { field, value } => println!("    {} {field}: {value}", "-".red()),
        FieldChange::Modified { field, old, new } => match change.text_diff() {
            Some(text) => {
                println!("    {} {field}:", "~".cyan());
                for line in text.to_unified().lines() {
                    println!("      {line}");
                }
            }
            None => println!("    {} {field}: {old} → {new}", "~".cyan()),
        },
    }
}

fn cmd_trash(session: &Session, action: TrashAction) -> anyhow::Result<()> {
    let mut vault = session.open()?;
    match action {
        TrashAction::List => {
            let events = vault.group_events(EntityId::TRASH)?;
            if session.json() {
                let list: Vec<_> = events
                    .iter()
                    .map(|e| json!({ "id": e.id(), "summary": e.content.summary }))
                    .collect();
                return print_json(&json!(list));
            }
            if events.is_empty() {
                println!("Trash is empty.");
            }
            for event in &events {
                println!(
                    "{:>6}  {}",
                    event.id().map(|id| id.to_string()).unwrap_or_default().yellow(),
                    event.content.summary
                );
            }
        }
        TrashAction::Empty => {
            if vault.is_read_only() {
                not_saved();
                return Ok(());
            }
            let removed = vault.empty_trash()?;
            done(format!("Deleted {removed} trashed events"));
        }
    }
    Ok(())
}

fn cmd_gc(session: &Session, args: GcArgs) -> anyhow::Result<()> {
    let vault = session.open()?;
    let report = if args.dry_run {
        let plan = vault.plan_gc()?;
        if !session.json() {
            for entry in &plan.candidates {
                println!("  would remove {}", entry.id.short_hex().dimmed());
            }
        }
        GcReport {
            reachable: plan.reachable.len(),
            scanned: plan.scanned,
            removed: 0,
            bytes_freed: 0,
            dry_run: true,
        }
    } else {
        vault.remove_unused_objects()?
    };
    if session.json() {
        return print_json(&json!({
            "reachable": report.reachable,
            "scanned": report.scanned,
            "removed": report.removed,
            "bytesFreed": report.bytes_freed,
            "dryRun": report.dry_run,
        }));
    }
    if report.dry_run {
        println!(
            "GC dry run: {} of {} objects reachable",
            report.reachable, report.scanned
        );
    } else {
        done(format!(
            "GC: {} objects removed, {} bytes freed",
            report.removed, report.bytes_freed
        ));
    }
    Ok(())
}

fn cmd_fsck(session: &Session) -> anyhow::Result<()> {
    let mut vault = session.open()?;
    if vault.is_read_only() {
        not_saved();
        return Ok(());
    }
    let report = vault.check_for_orphans()?;
    if session.json() {
        return print_json(&json!({
            "group": report.group_id,
            "removedGroups": report.removed_groups,
            "removedAccounts": report.removed_accounts,
            "adoptedBlobs": report.adopted_blobs,
            "adoptedFiles": report.adopted_files,
        }));
    }
    if report.is_clean() {
        done("No issues.");
        return Ok(());
    }
    for id in &report.removed_groups {
        println!("  removed unlisted group {}", id.to_string().yellow());
    }
    for id in &report.removed_accounts {
        println!("  removed unlisted account {}", id.to_string().yellow());
    }
    if let Some(group) = report.group_id {
        done(format!(
            "Adopted {} events into disabled group {}",
            report.adopted(),
            group.to_string().yellow()
        ));
    }
    Ok(())
}

fn cmd_export(session: &Session, args: ExportArgs) -> anyhow::Result<()> {
    let vault = session.open()?;
    let groups = (!args.group.is_empty()).then_some(args.group.as_slice());
    let document = vault.export_data(groups)?;
    let json = document.to_json()?;
    match args.output {
        Some(path) => {
            fs::write(&path, json).with_context(|| format!("writing {}", path.display()))?;
            done(format!(
                "Exported {} groups, {} events to {}",
                document.groups.len(),
                document.event_count(),
                path.display()
            ));
        }
        None => println!("{json}"),
    }
    Ok(())
}

fn cmd_import(session: &Session, args: ImportArgs) -> anyhow::Result<()> {
    let data = fs::read(&args.file).with_context(|| format!("reading {}", args.file.display()))?;
    let document = ExportDocument::from_json(&data)?;
    let mut vault = session.open()?;
    if vault.is_read_only() {
        not_saved();
        return Ok(());
    }
    let summary = vault.import_data(&document)?;
    if session.json() {
        return print_json(&json!({
            "groupsCreated": summary.groups_created,
            "groupsUpdated": summary.groups_updated,
            "groupsUnchanged": summary.groups_unchanged,
            "eventsCreated": summary.events_created,
            "eventsUpdated": summary.events_updated,
            "eventsUnchanged": summary.events_unchanged,
        }));
    }
    done(format!(
        "Imported {} new and {} updated groups, {} new and {} updated events ({} unchanged)",
        summary.groups_created,
        summary.groups_updated,
        summary.events_created,
        summary.events_updated,
        summary.events_unchanged
    ));
    Ok(())
}
