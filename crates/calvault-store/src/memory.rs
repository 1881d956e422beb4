use std::collections::{BTreeMap, BTreeSet};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use crate::fs::{normalize, FileSystem};

#[derive(Default)]
struct Tree {
    files: BTreeMap<PathBuf, Vec<u8>>,
    dirs: BTreeSet<PathBuf>,
}

impl Tree {
    fn dir_exists(&self, path: &Path) -> bool {
        path.as_os_str().is_empty() || self.dirs.contains(path)
    }

    fn parent_exists(&self, path: &Path) -> bool {
        path.parent().map(|p| self.dir_exists(p)).unwrap_or(true)
    }
}

fn not_found(path: &Path) -> io::Error {
    io::Error::new(io::ErrorKind::NotFound, format!("no such file: {}", path.display()))
}

/// In-memory [`FileSystem`].
///
/// Intended for tests and sandboxed vaults. Files and directories live in
/// ordered maps behind a `RwLock`; data is lost when the value is dropped.
/// Writes are trivially atomic since every operation holds the lock.
pub struct MemoryFs {
    tree: RwLock<Tree>,
}

impl MemoryFs {
    /// Create an empty filesystem containing only the root directory.
    pub fn new() -> Self {
        Self {
            tree: RwLock::new(Tree::default()),
        }
    }

    /// Number of regular files.
    pub fn file_count(&self) -> usize {
        self.tree.read().expect("lock poisoned").files.len()
    }

    /// Copy of every file and its contents, keyed by path.
    ///
    /// Two equal snapshots mean no file was created, modified or removed in
    /// between.
    pub fn snapshot(&self) -> BTreeMap<PathBuf, Vec<u8>> {
        self.tree.read().expect("lock poisoned").files.clone()
    }
}

impl Default for MemoryFs {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryFs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tree = self.tree.read().expect("lock poisoned");
        f.debug_struct("MemoryFs")
            .field("files", &tree.files.len())
            .field("dirs", &tree.dirs.len())
            .finish()
    }
}

impl FileSystem for MemoryFs {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        let path = normalize(path)?;
        let tree = self.tree.read().expect("lock poisoned");
        tree.files.get(&path).cloned().ok_or_else(|| not_found(&path))
    }

    fn write_atomic(&self, path: &Path, data: &[u8]) -> io::Result<()> {
        let path = normalize(path)?;
        let mut tree = self.tree.write().expect("lock poisoned");
        if !tree.parent_exists(&path) {
            return Err(not_found(&path));
        }
        tree.files.insert(path, data.to_vec());
        Ok(())
    }

    fn create_new(&self, path: &Path, data: &[u8]) -> io::Result<bool> {
        let path = normalize(path)?;
        let mut tree = self.tree.write().expect("lock poisoned");
        if !tree.parent_exists(&path) {
            return Err(not_found(&path));
        }
        if tree.files.contains_key(&path) {
            return Ok(false);
        }
        tree.files.insert(path, data.to_vec());
        Ok(true)
    }

    fn list_dir(&self, path: &Path) -> io::Result<Vec<String>> {
        let path = normalize(path)?;
        let tree = self.tree.read().expect("lock poisoned");
        if !tree.dir_exists(&path) {
            return Err(not_found(&path));
        }
        let children = tree
            .files
            .keys()
            .chain(tree.dirs.iter())
            .filter(|p| p.parent() == Some(path.as_path()))
            .filter_map(|p| p.file_name()?.to_str().map(str::to_string))
            .collect::<BTreeSet<_>>();
        Ok(children.into_iter().collect())
    }

    fn is_file(&self, path: &Path) -> bool {
        match normalize(path) {
            Ok(path) => self.tree.read().expect("lock poisoned").files.contains_key(&path),
            Err(_) => false,
        }
    }

    fn is_dir(&self, path: &Path) -> bool {
        match normalize(path) {
            Ok(path) => self.tree.read().expect("lock poisoned").dir_exists(&path),
            Err(_) => false,
        }
    }

    fn make_dir(&self, path: &Path) -> io::Result<()> {
        let path = normalize(path)?;
        let mut tree = self.tree.write().expect("lock poisoned");
        let mut current = PathBuf::new();
        for part in path.components() {
            current.push(part);
            if tree.files.contains_key(&current) {
                return Err(io::Error::new(
                    io::ErrorKind::AlreadyExists,
                    format!("a file is in the way: {}", current.display()),
                ));
            }
            tree.dirs.insert(current.clone());
        }
        Ok(())
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        let path = normalize(path)?;
        let mut tree = self.tree.write().expect("lock poisoned");
        tree.files.remove(&path).map(|_| ()).ok_or_else(|| not_found(&path))
    }

    fn file_len(&self, path: &Path) -> io::Result<u64> {
        let path = normalize(path)?;
        let tree = self.tree.read().expect("lock poisoned");
        tree.files
            .get(&path)
            .map(|data| data.len() as u64)
            .ok_or_else(|| not_found(&path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_requires_parent_dir() {
        let fs = MemoryFs::new();
        assert!(fs.write_atomic(Path::new("event/1.json"), b"{}").is_err());
        fs.make_dir(Path::new("event")).unwrap();
        fs.write_atomic(Path::new("event/1.json"), b"{}").unwrap();
        assert_eq!(fs.read(Path::new("event/1.json")).unwrap(), b"{}");
    }

    #[test]
    fn root_level_files_need_no_dir() {
        let fs = MemoryFs::new();
        fs.write_atomic(Path::new("last_ids.json"), b"{}").unwrap();
        assert!(fs.is_file(Path::new("last_ids.json")));
        assert!(fs.is_dir(Path::new("")));
    }

    #[test]
    fn list_dir_shows_direct_children_only() {
        let fs = MemoryFs::new();
        fs.make_dir(Path::new("object_store/ab")).unwrap();
        fs.write_atomic(Path::new("object_store/ab/cdef"), b"x").unwrap();
        fs.write_atomic(Path::new("object_store/stray"), b"y").unwrap();
        assert_eq!(
            fs.list_dir(Path::new("object_store")).unwrap(),
            vec!["ab", "stray"]
        );
        assert_eq!(fs.list_dir(Path::new("object_store/ab")).unwrap(), vec!["cdef"]);
        assert!(fs.list_dir(Path::new("missing")).is_err());
    }

    #[test]
    fn create_new_is_exclusive() {
        let fs = MemoryFs::new();
        assert!(fs.create_new(Path::new("lock.json"), b"a").unwrap());
        assert!(!fs.create_new(Path::new("lock.json"), b"b").unwrap());
        assert_eq!(fs.read(Path::new("lock.json")).unwrap(), b"a");
    }

    #[test]
    fn remove_file_and_snapshot() {
        let fs = MemoryFs::new();
        fs.write_atomic(Path::new("a"), b"1").unwrap();
        let before = fs.snapshot();
        fs.remove_file(Path::new("a")).unwrap();
        assert_ne!(before, fs.snapshot());
        assert_eq!(fs.file_count(), 0);
        assert_eq!(
            fs.remove_file(Path::new("a")).unwrap_err().kind(),
            io::ErrorKind::NotFound
        );
    }

    #[test]
    fn concurrent_reads_are_safe() {
        use std::sync::Arc;
        use std::thread;

        let fs = Arc::new(MemoryFs::new());
        fs.write_atomic(Path::new("shared"), b"data").unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let fs = Arc::clone(&fs);
                thread::spawn(move || {
                    assert_eq!(fs.read(Path::new("shared")).unwrap(), b"data");
                })
            })
            .collect();

        for h in handles {
            h.join().expect("thread should not panic");
        }
    }
}
