//! Mark-and-sweep garbage collection of unreferenced blobs.
//!
//! The reachable set is rebuilt from the front files on disk, not from
//! in-memory state: every hash in the *entire* history of every event,
//! group, account and the trash is kept. Any blob outside that set is
//! removed.
//!
//! Marking never deletes. If any front file cannot be listed or parsed the
//! collection aborts before a single blob is touched; a crash during the
//! sweep only leaves some garbage behind.

use std::collections::HashSet;
use std::path::Path;

use calvault_model::TRASH_FILE;
use calvault_record::{read_front_history, StoreHandle};
use calvault_store::BlobEntry;
use calvault_types::{EntityKind, ObjectId};
use tracing::{debug, error, info};

use crate::error::VaultResult;
use crate::scan::front_file_ids;

/// Result of the mark phase.
#[derive(Clone, Debug, Default)]
pub struct GcPlan {
    /// Every hash named by some history entry.
    pub reachable: HashSet<ObjectId>,
    /// Number of front files read.
    pub front_files: usize,
    /// Number of blobs in the store.
    pub scanned: usize,
    /// Blobs that would be removed.
    pub candidates: Vec<BlobEntry>,
}

/// Outcome of a collection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GcReport {
    pub reachable: usize,
    pub scanned: usize,
    pub removed: usize,
    pub bytes_freed: u64,
    /// Nothing was removed because this was a dry run or the vault is
    /// read-only.
    pub dry_run: bool,
}

/// Collects unreachable blobs of one vault.
pub struct GarbageCollector<'a> {
    handle: &'a StoreHandle,
}

impl<'a> GarbageCollector<'a> {
    pub fn new(handle: &'a StoreHandle) -> Self {
        Self { handle }
    }

    /// Mark phase: compute the reachable set and the removal candidates.
    /// Has no side effects.
    pub fn mark(&self) -> VaultResult<GcPlan> {
        let fs = self.handle.fs();
        let mut plan = GcPlan::default();

        for kind in EntityKind::ALLOCATED {
            for id in front_file_ids(fs, kind)? {
                let path = Path::new(kind.as_str()).join(format!("{id}.json"));
                self.mark_front_file(&path, &mut plan)?;
            }
        }
        let trash = Path::new(TRASH_FILE);
        if fs.is_file(trash) {
            self.mark_front_file(trash, &mut plan)?;
        }

        for entry in self.handle.objects().iter()? {
            let entry = entry?;
            plan.scanned += 1;
            if !plan.reachable.contains(&entry.id) {
                plan.candidates.push(entry);
            }
        }

        debug!(
            front_files = plan.front_files,
            reachable = plan.reachable.len(),
            scanned = plan.scanned,
            candidates = plan.candidates.len(),
            "mark phase complete"
        );
        Ok(plan)
    }

    /// Sweep phase: remove every candidate of `plan`.
    pub fn sweep(&self, plan: &GcPlan) -> VaultResult<GcReport> {
        let objects = self.handle.objects();
        let mut report = self.report_for(plan, false);
        for entry in &plan.candidates {
            let size = objects.size(&entry.id).unwrap_or(0);
            if objects.remove(&entry.id)? {
                report.removed += 1;
                report.bytes_freed += size;
            }
        }
        Ok(report)
    }

    /// Mark and sweep under one exclusive guard. With `dry_run`, or when the
    /// vault is read-only, only the mark phase runs.
    pub fn run(&self, dry_run: bool) -> VaultResult<GcReport> {
        if self.handle.is_permanently_read_only() && !dry_run {
            info!("vault is read-only; garbage collection runs as a dry run");
            return self.run(true);
        }

        let _guard = self.handle.exclusive();
        let plan = self.mark().inspect_err(|e| {
            error!(error = %e, "garbage collection aborted before removing anything");
        })?;
        let report = if dry_run {
            self.report_for(&plan, true)
        } else {
            self.sweep(&plan)?
        };
        info!(
            reachable = report.reachable,
            scanned = report.scanned,
            removed = report.removed,
            bytes_freed = report.bytes_freed,
            dry_run = report.dry_run,
            "garbage collection finished"
        );
        Ok(report)
    }

    fn mark_front_file(&self, path: &Path, plan: &mut GcPlan) -> VaultResult<()> {
        let history = read_front_history(self.handle.fs(), path)?;
        plan.front_files += 1;
        plan.reachable.extend(history.into_iter().map(|entry| entry.hash));
        Ok(())
    }

    fn report_for(&self, plan: &GcPlan, dry_run: bool) -> GcReport {
        GcReport {
            reachable: plan.reachable.len(),
            scanned: plan.scanned,
            removed: 0,
            bytes_freed: 0,
            dry_run,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use calvault_model::{Event, EventContent, EventType};
    use calvault_record::{HandleOptions, SaveMode};
    use calvault_store::{FileSystem, MemoryFs, ShardedObjectStore};

    use super::*;

    fn setup() -> (Arc<MemoryFs>, StoreHandle) {
        let fs = Arc::new(MemoryFs::new());
        let objects = Arc::new(ShardedObjectStore::new(fs.clone()));
        let handle = StoreHandle::open(fs.clone(), objects, HandleOptions::default()).unwrap();
        (fs, handle)
    }

    #[test]
    fn mark_finds_garbage_without_removing_it() {
        let (_fs, h) = setup();
        let mut event = Event::new(EventContent::new(EventType::Custom, "kept"));
        let kept = event.save(&h, SaveMode::Normal).unwrap().unwrap().hash;
        let garbage = h.objects().put(b"{\"stray\":true}").unwrap();

        let plan = GarbageCollector::new(&h).mark().unwrap();
        assert!(plan.reachable.contains(&kept));
        assert_eq!(plan.front_files, 1);
        assert_eq!(plan.scanned, 2);
        assert_eq!(plan.candidates.len(), 1);
        assert_eq!(plan.candidates[0].id, garbage);
        assert!(h.objects().exists(&garbage).unwrap());
    }

    #[test]
    fn run_removes_unreachable_blobs() {
        let (_fs, h) = setup();
        let mut event = Event::new(EventContent::new(EventType::Task, "v1"));
        let v1 = event.save(&h, SaveMode::Normal).unwrap().unwrap().hash;
        event.content.summary = "v2".into();
        let v2 = event.save(&h, SaveMode::Normal).unwrap().unwrap().hash;
        let garbage = h.objects().put(b"orphaned bytes").unwrap();

        let report = GarbageCollector::new(&h).run(false).unwrap();
        assert_eq!(report.removed, 1);
        assert_eq!(report.bytes_freed, b"orphaned bytes".len() as u64);
        assert!(h.objects().exists(&v1).unwrap(), "old revisions stay reachable");
        assert!(h.objects().exists(&v2).unwrap());
        assert!(!h.objects().exists(&garbage).unwrap());
        assert!(!h.is_read_only());
    }

    #[test]
    fn dry_run_removes_nothing() {
        let (_fs, h) = setup();
        let garbage = h.objects().put(b"garbage").unwrap();
        let report = GarbageCollector::new(&h).run(true).unwrap();
        assert!(report.dry_run);
        assert_eq!(report.removed, 0);
        assert!(h.objects().exists(&garbage).unwrap());
    }

    #[test]
    fn unparseable_front_file_aborts() {
        let (fs, h) = setup();
        let garbage = h.objects().put(b"garbage").unwrap();
        fs.make_dir(Path::new("group")).unwrap();
        fs.write_atomic(Path::new("group/4.json"), b"{\"title\": \"no history\"}")
            .unwrap();

        assert!(GarbageCollector::new(&h).run(false).is_err());
        assert!(h.objects().exists(&garbage).unwrap());
        assert!(!h.is_read_only(), "mode is restored after an abort");
    }
}
