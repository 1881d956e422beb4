//! Advisory single-writer lock.
//!
//! The first process to open a vault claims `lock.json` by publishing a
//! complete token file with an exclusive create; the file is never visible
//! half-written. Any later process that finds a live foreign token runs
//! read-only for its whole lifetime. There is no retry and no escalation:
//! the lock is cooperative, not a consensus protocol.
//!
//! A lock is considered stale, and is taken over, when any of these hold:
//! - the file cannot be parsed as a token;
//! - its age exceeds [`LockPolicy::stale_after`];
//! - on Linux, no process with the recorded pid exists.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use calvault_types::Timestamp;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};
use crate::fs::FileSystem;

/// Lock file name, relative to the vault root.
pub const LOCK_FILE: &str = "lock.json";

/// Identity of the process holding the lock.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockToken {
    /// Random per-open token; only the holder of this token may release.
    pub token: Uuid,
    /// Process id of the holder.
    pub pid: u32,
    /// When the lock was claimed.
    pub started_at: Timestamp,
}

impl LockToken {
    /// A fresh token for the current process.
    pub fn for_current_process() -> Self {
        Self {
            token: Uuid::now_v7(),
            pid: std::process::id(),
            started_at: Timestamp::now(),
        }
    }
}

/// Staleness policy for foreign locks.
#[derive(Clone, Debug)]
pub struct LockPolicy {
    /// A lock older than this is assumed abandoned.
    pub stale_after: Duration,
}

impl Default for LockPolicy {
    fn default() -> Self {
        Self {
            stale_after: Duration::from_secs(7 * 24 * 60 * 60),
        }
    }
}

impl LockPolicy {
    fn is_stale(&self, other: &LockToken, now: Timestamp) -> bool {
        if other.started_at.elapsed_until(&now) > self.stale_after.as_secs() {
            return true;
        }
        !process_exists(other.pid)
    }
}

#[cfg(target_os = "linux")]
fn process_exists(pid: u32) -> bool {
    Path::new("/proc").join(pid.to_string()).exists()
}

#[cfg(not(target_os = "linux"))]
fn process_exists(_pid: u32) -> bool {
    true
}

/// Outcome of trying to claim the lock.
#[derive(Clone, Debug, PartialEq, Eq)]
enum LockState {
    Owned,
    Foreign(LockToken),
    Released,
}

/// Advisory write lock on a vault root.
///
/// Dropping an owned lock releases it.
pub struct WriteLock {
    fs: Arc<dyn FileSystem>,
    token: LockToken,
    state: LockState,
}

impl WriteLock {
    /// Try to claim the lock. Never blocks.
    ///
    /// The returned value reports through [`WriteLock::is_owned`] whether this
    /// process may write.
    pub fn acquire(fs: Arc<dyn FileSystem>, policy: &LockPolicy) -> StoreResult<Self> {
        let token = LockToken::for_current_process();
        let payload =
            serde_json::to_vec_pretty(&token).map_err(|e| StoreError::Serialization(e.to_string()))?;
        let path = Path::new(LOCK_FILE);

        // At most one takeover attempt; losing the race after removing a
        // stale lock means someone else just claimed it.
        for attempt in 0..2 {
            if fs.create_new(path, &payload)? {
                debug!(pid = token.pid, "write lock acquired");
                return Ok(Self {
                    fs,
                    token,
                    state: LockState::Owned,
                });
            }

            let existing = match fs.read(path) {
                Ok(data) => serde_json::from_slice::<LockToken>(&data).ok(),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };

            match existing {
                Some(other) if attempt > 0 || !policy.is_stale(&other, Timestamp::now()) => {
                    info!(
                        holder_pid = other.pid,
                        since = %other.started_at,
                        "vault is locked by another process; opening read-only"
                    );
                    return Ok(Self {
                        fs,
                        token,
                        state: LockState::Foreign(other),
                    });
                }
                Some(other) => {
                    warn!(holder_pid = other.pid, "taking over stale write lock");
                }
                None => {
                    warn!("lock file is unreadable; taking it over");
                }
            }
            match fs.remove_file(path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }

        let holder = fs
            .read(path)
            .ok()
            .and_then(|data| serde_json::from_slice::<LockToken>(&data).ok())
            .unwrap_or_else(|| token.clone());
        info!("could not claim write lock; opening read-only");
        Ok(Self {
            fs,
            token,
            state: LockState::Foreign(holder),
        })
    }

    /// Returns `true` if this process holds the lock.
    pub fn is_owned(&self) -> bool {
        self.state == LockState::Owned
    }

    /// Our own token.
    pub fn token(&self) -> &LockToken {
        &self.token
    }

    /// The foreign holder, if another process owns the lock.
    pub fn holder(&self) -> Option<&LockToken> {
        match &self.state {
            LockState::Foreign(other) => Some(other),
            _ => None,
        }
    }

    /// Give the lock up. Removes the file only if it still carries our token.
    pub fn release(&mut self) -> StoreResult<()> {
        if self.state != LockState::Owned {
            return Ok(());
        }
        self.state = LockState::Released;
        let path = Path::new(LOCK_FILE);
        let current = match self.fs.read(path) {
            Ok(data) => serde_json::from_slice::<LockToken>(&data).ok(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        if current.as_ref() == Some(&self.token) {
            self.fs.remove_file(path)?;
            debug!("write lock released");
        } else {
            warn!("lock file no longer carries our token; leaving it in place");
        }
        Ok(())
    }
}

impl Drop for WriteLock {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            warn!(error = %e, "failed to release write lock");
        }
    }
}

impl std::fmt::Debug for WriteLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteLock")
            .field("pid", &self.token.pid)
            .field("state", &self.state)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryFs;

    fn write_foreign(fs: &MemoryFs, token: &LockToken) {
        fs.write_atomic(Path::new(LOCK_FILE), &serde_json::to_vec(token).unwrap())
            .unwrap();
    }

    #[test]
    fn first_open_owns_the_lock() {
        let fs = Arc::new(MemoryFs::new());
        let lock = WriteLock::acquire(fs.clone(), &LockPolicy::default()).unwrap();
        assert!(lock.is_owned());
        assert!(lock.holder().is_none());
        assert!(fs.is_file(Path::new(LOCK_FILE)));
    }

    #[test]
    fn second_open_is_read_only() {
        let fs = Arc::new(MemoryFs::new());
        let first = WriteLock::acquire(fs.clone(), &LockPolicy::default()).unwrap();
        let second = WriteLock::acquire(fs.clone(), &LockPolicy::default()).unwrap();
        assert!(first.is_owned());
        assert!(!second.is_owned());
        assert_eq!(second.holder(), Some(first.token()));
    }

    #[test]
    fn drop_releases_only_own_lock() {
        let fs = Arc::new(MemoryFs::new());
        let first = WriteLock::acquire(fs.clone(), &LockPolicy::default()).unwrap();
        let second = WriteLock::acquire(fs.clone(), &LockPolicy::default()).unwrap();
        drop(second);
        assert!(fs.is_file(Path::new(LOCK_FILE)));
        drop(first);
        assert!(!fs.is_file(Path::new(LOCK_FILE)));
    }

    #[test]
    fn old_lock_is_stale() {
        let fs = Arc::new(MemoryFs::new());
        let ancient = LockToken {
            token: Uuid::now_v7(),
            pid: std::process::id(),
            started_at: Timestamp::zero(),
        };
        write_foreign(&fs, &ancient);

        let lock = WriteLock::acquire(fs.clone(), &LockPolicy::default()).unwrap();
        assert!(lock.is_owned());
    }

    #[test]
    fn recent_live_lock_is_respected() {
        let fs = Arc::new(MemoryFs::new());
        let live = LockToken {
            token: Uuid::now_v7(),
            pid: std::process::id(),
            started_at: Timestamp::now(),
        };
        write_foreign(&fs, &live);

        let lock = WriteLock::acquire(fs.clone(), &LockPolicy::default()).unwrap();
        assert!(!lock.is_owned());
        assert_eq!(lock.holder(), Some(&live));
        drop(lock);
        // A read-only opener never removes someone else's lock.
        assert!(fs.is_file(Path::new(LOCK_FILE)));
    }

    #[test]
    fn garbage_lock_file_is_taken_over() {
        let fs = Arc::new(MemoryFs::new());
        fs.write_atomic(Path::new(LOCK_FILE), b"not json").unwrap();
        let lock = WriteLock::acquire(fs.clone(), &LockPolicy::default()).unwrap();
        assert!(lock.is_owned());
    }

    #[test]
    fn racing_openers_on_disk_elect_one_writer() {
        let dir = tempfile::tempdir().unwrap();
        let fs: Arc<dyn FileSystem> = Arc::new(crate::fs::LocalFs::open(dir.path()).unwrap());
        let openers: Vec<_> = (0..8)
            .map(|_| {
                let fs = fs.clone();
                std::thread::spawn(move || WriteLock::acquire(fs, &LockPolicy::default()).unwrap())
            })
            .collect();
        let locks: Vec<WriteLock> = openers.into_iter().map(|t| t.join().unwrap()).collect();

        let owners: Vec<&WriteLock> = locks.iter().filter(|l| l.is_owned()).collect();
        assert_eq!(owners.len(), 1);
        let on_disk: LockToken =
            serde_json::from_slice(&fs.read(Path::new(LOCK_FILE)).unwrap()).unwrap();
        assert_eq!(&on_disk, owners[0].token());
        for lock in locks.iter().filter(|l| !l.is_owned()) {
            assert_eq!(lock.holder(), Some(&on_disk));
        }
        assert_eq!(fs.list_dir(Path::new("")).unwrap(), vec![LOCK_FILE]);
    }

    #[test]
    fn token_uses_camel_case_keys() {
        let json = serde_json::to_value(LockToken::for_current_process()).unwrap();
        assert!(json.get("startedAt").is_some());
        assert!(json.get("pid").is_some());
    }
}
