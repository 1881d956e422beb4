//! The store handle every record operation runs against.
//!
//! A [`StoreHandle`] bundles the filesystem, the object store, the ID
//! allocator and the vault's write state. There is no process-wide
//! read-only flag: the handle is read-only when another process holds the
//! write lock, when it was opened read-only, or while an
//! [`ExclusiveGuard`] is alive.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use calvault_store::{FileSystem, LockPolicy, LockToken, ObjectStore, WriteLock};
use calvault_types::{EntityId, EntityKind};
use tracing::{debug, info};

use crate::error::RecordResult;
use crate::ids::IdAllocator;

/// How a handle should be opened.
#[derive(Clone, Debug, Default)]
pub struct HandleOptions {
    /// Claim the advisory write lock with this policy. `None` skips locking.
    pub lock: Option<LockPolicy>,
    /// Open read-only regardless of the lock.
    pub read_only: bool,
}

/// Shared state for one open vault.
pub struct StoreHandle {
    fs: Arc<dyn FileSystem>,
    objects: Arc<dyn ObjectStore>,
    ids: IdAllocator,
    lock: Option<WriteLock>,
    read_only: bool,
    exclusive: AtomicUsize,
    writer: Mutex<()>,
}

impl StoreHandle {
    /// Open a handle: claim the write lock (if requested) and recover the
    /// ID counters.
    pub fn open(
        fs: Arc<dyn FileSystem>,
        objects: Arc<dyn ObjectStore>,
        options: HandleOptions,
    ) -> RecordResult<Self> {
        let lock = match (&options.lock, options.read_only) {
            (Some(policy), false) => Some(WriteLock::acquire(fs.clone(), policy)?),
            _ => None,
        };
        let locked_out = lock.as_ref().is_some_and(|l| !l.is_owned());
        let read_only = options.read_only || locked_out;

        let ids = IdAllocator::load(fs.clone())?;
        if !read_only {
            ids.recover_all()?;
        }

        if read_only {
            info!("store handle opened read-only");
        } else {
            debug!("store handle opened read-write");
        }
        Ok(Self {
            fs,
            objects,
            ids,
            lock,
            read_only,
            exclusive: AtomicUsize::new(0),
            writer: Mutex::new(()),
        })
    }

    /// The filesystem capability.
    pub fn fs(&self) -> &dyn FileSystem {
        self.fs.as_ref()
    }

    /// A shared reference to the filesystem capability.
    pub fn fs_arc(&self) -> Arc<dyn FileSystem> {
        Arc::clone(&self.fs)
    }

    /// The object store.
    pub fn objects(&self) -> &dyn ObjectStore {
        self.objects.as_ref()
    }

    /// The ID allocator.
    pub fn ids(&self) -> &IdAllocator {
        &self.ids
    }

    /// Allocate the next id for `kind`.
    pub fn next_id(&self, kind: EntityKind) -> RecordResult<EntityId> {
        self.ids.next(kind)
    }

    /// Returns `true` if mutations are currently refused.
    pub fn is_read_only(&self) -> bool {
        self.read_only || self.exclusive.load(Ordering::SeqCst) > 0
    }

    /// Returns `true` if this handle is read-only for its whole lifetime.
    pub fn is_permanently_read_only(&self) -> bool {
        self.read_only
    }

    /// The foreign lock holder, if another process owns the vault.
    pub fn lock_holder(&self) -> Option<&LockToken> {
        self.lock.as_ref().and_then(WriteLock::holder)
    }

    /// Our own lock token, if we own the write lock.
    pub fn lock_token(&self) -> Option<&LockToken> {
        self.lock
            .as_ref()
            .filter(|l| l.is_owned())
            .map(WriteLock::token)
    }

    /// Take the in-process writer lock.
    ///
    /// Every mutation of the vault directory runs under this lock. A panic
    /// while holding it leaves nothing half-written (all writes are atomic
    /// renames), so poisoning is ignored.
    pub fn writer(&self) -> MutexGuard<'_, ()> {
        self.writer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Enter exclusive mode: wait for in-flight writers, then refuse all
    /// mutations until the guard is dropped.
    pub fn exclusive(&self) -> ExclusiveGuard<'_> {
        let writer = self.writer();
        self.exclusive.fetch_add(1, Ordering::SeqCst);
        debug!("entered exclusive mode");
        ExclusiveGuard {
            handle: self,
            _writer: writer,
        }
    }
}

impl std::fmt::Debug for StoreHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreHandle")
            .field("fs", &self.fs)
            .field("read_only", &self.is_read_only())
            .field("lock", &self.lock)
            .finish()
    }
}

/// Scoped exclusive mode. Mutations are refused while it is alive, and the
/// previous mode is restored on drop, on every exit path.
pub struct ExclusiveGuard<'a> {
    handle: &'a StoreHandle,
    _writer: MutexGuard<'a, ()>,
}

impl ExclusiveGuard<'_> {
    /// The guarded handle.
    pub fn handle(&self) -> &StoreHandle {
        self.handle
    }
}

impl Drop for ExclusiveGuard<'_> {
    fn drop(&mut self) {
        self.handle.exclusive.fetch_sub(1, Ordering::SeqCst);
        debug!("left exclusive mode");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use calvault_store::{MemoryFs, ShardedObjectStore};

    fn open(fs: &Arc<MemoryFs>, options: HandleOptions) -> StoreHandle {
        let objects = Arc::new(ShardedObjectStore::new(fs.clone()));
        StoreHandle::open(fs.clone(), objects, options).unwrap()
    }

    fn locking() -> HandleOptions {
        HandleOptions {
            lock: Some(LockPolicy::default()),
            read_only: false,
        }
    }

    #[test]
    fn default_handle_is_writable() {
        let fs = Arc::new(MemoryFs::new());
        let handle = open(&fs, HandleOptions::default());
        assert!(!handle.is_read_only());
        assert!(handle.lock_token().is_none());
    }

    #[test]
    fn second_locking_handle_is_read_only() {
        let fs = Arc::new(MemoryFs::new());
        let first = open(&fs, locking());
        let second = open(&fs, locking());
        assert!(!first.is_read_only());
        assert!(second.is_read_only());
        assert!(second.is_permanently_read_only());
        assert_eq!(second.lock_holder(), first.lock_token());
    }

    #[test]
    fn exclusive_guard_restores_mode() {
        let fs = Arc::new(MemoryFs::new());
        let handle = open(&fs, HandleOptions::default());
        {
            let guard = handle.exclusive();
            assert!(guard.handle().is_read_only());
        }
        assert!(!handle.is_read_only());
    }

    #[test]
    fn exclusive_guard_restores_mode_after_panic() {
        let fs = Arc::new(MemoryFs::new());
        let handle = open(&fs, HandleOptions::default());
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = handle.exclusive();
            panic!("collector failed");
        }));
        assert!(result.is_err());
        assert!(!handle.is_read_only());
        // The writer lock is usable again.
        drop(handle.writer());
    }

    #[test]
    fn read_only_option_skips_lock_and_recovery() {
        let fs = Arc::new(MemoryFs::new());
        let before = fs.snapshot();
        let handle = open(
            &fs,
            HandleOptions {
                lock: Some(LockPolicy::default()),
                read_only: true,
            },
        );
        assert!(handle.is_read_only());
        assert_eq!(fs.snapshot(), before);
    }
}
