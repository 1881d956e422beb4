//! Content-addressed object storage for calvault.
//!
//! Every hashed part of every calendar entity lives here as an immutable
//! blob named by the BLAKE3 hash of its canonical bytes. Blobs are sharded
//! into `object_store/<hash[..w]>/<hash[w..]>` so no single directory grows
//! unbounded.
//!
//! # Filesystem capability
//!
//! All I/O goes through the [`FileSystem`] trait. Paths are relative and
//! resolved against one root, so a vault can be pointed at a real directory
//! ([`LocalFs`]) or a sandbox ([`MemoryFs`]).
//!
//! # Design Rules
//!
//! 1. Blobs are immutable once written (content-addressing guarantees this).
//! 2. Write-then-link: the blob is durable before any front file names it.
//! 3. Concurrent reads are always safe (blobs are immutable, writes rename
//!    into place).
//! 4. Only the garbage collector removes blobs.
//! 5. The store never interprets blob contents.
//! 6. All I/O errors are propagated, except removal of an already-absent blob.

pub mod error;
pub mod fs;
pub mod lock;
pub mod memory;
pub mod sharded;
pub mod traits;

// Re-export primary types at crate root for ergonomic imports.
pub use error::{StoreError, StoreResult};
pub use fs::{FileSystem, LocalFs};
pub use lock::{LockPolicy, LockToken, WriteLock, LOCK_FILE};
pub use memory::MemoryFs;
pub use sharded::{ShardedObjectStore, OBJECT_STORE_DIR};
pub use traits::{BlobEntry, ObjectIter, ObjectStore, StoreStats};
