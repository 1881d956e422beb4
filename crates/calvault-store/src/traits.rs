use std::path::PathBuf;

use calvault_types::ObjectId;

use crate::error::StoreResult;

/// A blob discovered while walking the store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlobEntry {
    /// The blob's content hash, as parsed from its location.
    pub id: ObjectId,
    /// Relative path of the blob file.
    pub path: PathBuf,
}

/// Lazy walk over every blob in a store.
pub type ObjectIter<'a> = Box<dyn Iterator<Item = StoreResult<BlobEntry>> + 'a>;

/// Blob count and total size.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub objects: usize,
    pub bytes: u64,
}

/// Content-addressed blob store.
///
/// All implementations must satisfy these invariants:
/// - Blobs are immutable once written. The same bytes always produce the
///   same ID, so writing them again is a no-op.
/// - `put` returns only after the blob is durable; callers rely on this to
///   link the hash from a front file afterwards.
/// - Concurrent reads are always safe.
/// - The store never interprets blob contents.
/// - I/O errors are propagated, except that removing an absent blob is not
///   an error.
pub trait ObjectStore: Send + Sync {
    /// Store bytes and return their content-addressed ID.
    ///
    /// If a blob with the same ID already exists it is trusted and left
    /// untouched (idempotent).
    fn put(&self, data: &[u8]) -> StoreResult<ObjectId>;

    /// Read a blob by ID.
    ///
    /// Fails with `NotFound` if no blob exists and with `HashMismatch` if the
    /// stored bytes no longer hash to `id`.
    fn get(&self, id: &ObjectId) -> StoreResult<Vec<u8>>;

    /// Check whether a blob exists.
    fn exists(&self, id: &ObjectId) -> StoreResult<bool>;

    /// Delete a blob. Returns `true` if it existed.
    ///
    /// This is intended for garbage collection only. Removing a blob that is
    /// still named by some history entry corrupts that entity.
    fn remove(&self, id: &ObjectId) -> StoreResult<bool>;

    /// Size of a stored blob in bytes.
    fn size(&self, id: &ObjectId) -> StoreResult<u64>;

    /// Walk every blob. Stray entries that cannot be blobs are skipped.
    fn iter(&self) -> StoreResult<ObjectIter<'_>>;

    /// Count blobs and sum their sizes.
    fn stats(&self) -> StoreResult<StoreStats> {
        let mut stats = StoreStats::default();
        for entry in self.iter()? {
            let entry = entry?;
            stats.objects += 1;
            stats.bytes += self.size(&entry.id)?;
        }
        Ok(stats)
    }
}
