use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use calvault_crypto::ContentHasher;
use calvault_types::object::OBJECT_ID_HEX_LEN;
use calvault_types::ObjectId;
use tracing::{debug, warn};

use crate::error::{StoreError, StoreResult};
use crate::fs::FileSystem;
use crate::traits::{BlobEntry, ObjectIter, ObjectStore};

/// Directory (relative to the vault root) holding all blobs.
pub const OBJECT_STORE_DIR: &str = "object_store";

/// Default number of hex characters used for the shard directory.
pub const DEFAULT_SHARD_WIDTH: usize = 2;

/// Filesystem-backed object store, sharded by hash prefix.
///
/// A blob with hash `h` lives at `object_store/<h[..w]>/<h[w..]>` where `w`
/// is the shard width. Blobs are written with an atomic rename, so a reader
/// never sees a partially written blob.
pub struct ShardedObjectStore {
    fs: Arc<dyn FileSystem>,
    shard_width: usize,
    verify_on_read: bool,
}

impl ShardedObjectStore {
    /// Create a store with the default shard width and read verification on.
    pub fn new(fs: Arc<dyn FileSystem>) -> Self {
        Self {
            fs,
            shard_width: DEFAULT_SHARD_WIDTH,
            verify_on_read: true,
        }
    }

    /// Use a different shard width (1..64 hex characters).
    pub fn with_shard_width(mut self, width: usize) -> StoreResult<Self> {
        if width == 0 || width >= OBJECT_ID_HEX_LEN {
            return Err(StoreError::InvalidShardWidth(width));
        }
        self.shard_width = width;
        Ok(self)
    }

    /// Enable or disable hash verification in [`ObjectStore::get`].
    pub fn with_verification(mut self, verify: bool) -> Self {
        self.verify_on_read = verify;
        self
    }

    /// The configured shard width.
    pub fn shard_width(&self) -> usize {
        self.shard_width
    }

    /// Relative path of the blob for `id`.
    pub fn object_path(&self, id: &ObjectId) -> PathBuf {
        let hex = id.to_hex();
        let (shard, rest) = hex.split_at(self.shard_width);
        Path::new(OBJECT_STORE_DIR).join(shard).join(rest)
    }

    fn is_hex_of_len(name: &str, len: usize) -> bool {
        name.len() == len && name.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
    }

    fn parse_entry(&self, shard: &str, name: &str) -> Option<ObjectId> {
        if !Self::is_hex_of_len(name, OBJECT_ID_HEX_LEN - self.shard_width) {
            return None;
        }
        ObjectId::from_hex(&format!("{shard}{name}")).ok()
    }
}

impl ObjectStore for ShardedObjectStore {
    fn put(&self, data: &[u8]) -> StoreResult<ObjectId> {
        let id = ContentHasher::OBJECT.hash(data);
        let path = self.object_path(&id);
        if self.fs.is_file(&path) {
            debug!(id = %id.short_hex(), "object already stored");
            return Ok(id);
        }
        if let Some(shard) = path.parent() {
            self.fs.make_dir(shard)?;
        }
        self.fs.write_atomic(&path, data)?;
        debug!(id = %id.short_hex(), len = data.len(), "object stored");
        Ok(id)
    }

    fn get(&self, id: &ObjectId) -> StoreResult<Vec<u8>> {
        let data = match self.fs.read(&self.object_path(id)) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(StoreError::NotFound(*id)),
            Err(e) => return Err(e.into()),
        };
        if self.verify_on_read && !ContentHasher::OBJECT.verify(&data, id) {
            return Err(StoreError::HashMismatch {
                id: *id,
                computed: ContentHasher::OBJECT.hash(&data),
            });
        }
        Ok(data)
    }

    fn exists(&self, id: &ObjectId) -> StoreResult<bool> {
        Ok(self.fs.is_file(&self.object_path(id)))
    }

    fn remove(&self, id: &ObjectId) -> StoreResult<bool> {
        match self.fs.remove_file(&self.object_path(id)) {
            Ok(()) => {
                debug!(id = %id.short_hex(), "object removed");
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                warn!(id = %id.short_hex(), "object already absent, nothing to remove");
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn size(&self, id: &ObjectId) -> StoreResult<u64> {
        match self.fs.file_len(&self.object_path(id)) {
            Ok(len) => Ok(len),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(StoreError::NotFound(*id)),
            Err(e) => Err(e.into()),
        }
    }

    fn iter(&self) -> StoreResult<ObjectIter<'_>> {
        let root = Path::new(OBJECT_STORE_DIR);
        let shards = if self.fs.is_dir(root) {
            self.fs.list_dir(root)?
        } else {
            Vec::new()
        };
        Ok(Box::new(ShardWalk {
            store: self,
            shards: shards.into_iter(),
            current: None,
        }))
    }
}

impl std::fmt::Debug for ShardedObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShardedObjectStore")
            .field("shard_width", &self.shard_width)
            .field("verify_on_read", &self.verify_on_read)
            .finish()
    }
}

/// Two-level walk: shard directories, then the blobs inside each.
struct ShardWalk<'a> {
    store: &'a ShardedObjectStore,
    shards: std::vec::IntoIter<String>,
    current: Option<(String, std::vec::IntoIter<String>)>,
}

impl ShardWalk<'_> {
    /// Advance to the next well-formed shard directory.
    fn next_shard(&mut self) -> Option<StoreResult<()>> {
        let width = self.store.shard_width;
        for shard in self.shards.by_ref() {
            let path = Path::new(OBJECT_STORE_DIR).join(&shard);
            if !ShardedObjectStore::is_hex_of_len(&shard, width) || !self.store.fs.is_dir(&path) {
                warn!(entry = %shard, "skipping stray entry in object store");
                continue;
            }
            return Some(match self.store.fs.list_dir(&path) {
                Ok(names) => {
                    self.current = Some((shard, names.into_iter()));
                    Ok(())
                }
                Err(e) => Err(e.into()),
            });
        }
        None
    }
}

impl Iterator for ShardWalk<'_> {
    type Item = StoreResult<BlobEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some((shard, names)) = self.current.as_mut() {
                for name in names.by_ref() {
                    match self.store.parse_entry(shard, &name) {
                        Some(id) => {
                            let path = Path::new(OBJECT_STORE_DIR).join(shard.as_str()).join(&name);
                            return Some(Ok(BlobEntry { id, path }));
                        }
                        None => {
                            warn!(shard = %shard, entry = %name, "skipping stray file in object store");
                        }
                    }
                }
                self.current = None;
            }
            match self.next_shard()? {
                Ok(()) => continue,
                Err(e) => return Some(Err(e)),
            }
        }
    }
}
