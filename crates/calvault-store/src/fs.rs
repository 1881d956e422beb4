//! The filesystem capability every calvault component performs I/O through.

use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::debug;

/// Rooted filesystem capability.
///
/// Every path handed to a `FileSystem` is relative and is resolved against
/// the implementation's root. Absolute paths and `..` components are rejected
/// with [`io::ErrorKind::InvalidInput`].
pub trait FileSystem: Send + Sync + fmt::Debug {
    /// Read a whole file.
    fn read(&self, path: &Path) -> io::Result<Vec<u8>>;

    /// Replace a file's contents atomically (write a temporary file, then
    /// rename it over `path`). The parent directory must exist.
    fn write_atomic(&self, path: &Path, data: &[u8]) -> io::Result<()>;

    /// Create a file only if it does not exist yet.
    ///
    /// Returns `Ok(false)` without touching anything if `path` exists.
    fn create_new(&self, path: &Path, data: &[u8]) -> io::Result<bool>;

    /// Names of the direct children of a directory, sorted.
    fn list_dir(&self, path: &Path) -> io::Result<Vec<String>>;

    /// Returns `true` if `path` is an existing regular file.
    fn is_file(&self, path: &Path) -> bool;

    /// Returns `true` if `path` is an existing directory.
    fn is_dir(&self, path: &Path) -> bool;

    /// Create a directory and all missing parents. Existing directories are
    /// not an error.
    fn make_dir(&self, path: &Path) -> io::Result<()>;

    /// Remove a file.
    fn remove_file(&self, path: &Path) -> io::Result<()>;

    /// Size of a file in bytes.
    fn file_len(&self, path: &Path) -> io::Result<u64> {
        self.read(path).map(|data| data.len() as u64)
    }
}

/// Normalize a relative path, rejecting anything that could escape the root.
pub fn normalize(path: &Path) -> io::Result<PathBuf> {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            _ => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("path must be relative and inside the root: {}", path.display()),
                ))
            }
        }
    }
    Ok(out)
}

/// A [`FileSystem`] backed by a directory on the local disk.
#[derive(Clone)]
pub struct LocalFs {
    root: PathBuf,
}

impl LocalFs {
    /// Use `root` as the base directory. It is created if missing.
    pub fn open(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// The base directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &Path) -> io::Result<PathBuf> {
        Ok(self.root.join(normalize(path)?))
    }
}

impl fmt::Debug for LocalFs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalFs").field("root", &self.root).finish()
    }
}

impl FileSystem for LocalFs {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        fs::read(self.resolve(path)?)
    }

    fn write_atomic(&self, path: &Path, data: &[u8]) -> io::Result<()> {
        let full = self.resolve(path)?;
        let parent = full.parent().unwrap_or(&self.root);
        let mut tmp = NamedTempFile::new_in(parent)?;
        tmp.write_all(data)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&full).map_err(|e| e.error)?;
        debug!(path = %path.display(), len = data.len(), "atomic write");
        Ok(())
    }

    fn create_new(&self, path: &Path, data: &[u8]) -> io::Result<bool> {
        let full = self.resolve(path)?;
        let parent = full.parent().unwrap_or(&self.root);
        let mut tmp = NamedTempFile::new_in(parent)?;
        tmp.write_all(data)?;
        tmp.as_file().sync_all()?;
        // Linked into place complete, so nobody ever reads a partial file.
        match tmp.persist_noclobber(&full) {
            Ok(_) => Ok(true),
            Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(e.error),
        }
    }

    fn list_dir(&self, path: &Path) -> io::Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(self.resolve(path)?)? {
            let entry = entry?;
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    fn is_file(&self, path: &Path) -> bool {
        self.resolve(path).map(|p| p.is_file()).unwrap_or(false)
    }

    fn is_dir(&self, path: &Path) -> bool {
        self.resolve(path).map(|p| p.is_dir()).unwrap_or(false)
    }

    fn make_dir(&self, path: &Path) -> io::Result<()> {
        fs::create_dir_all(self.resolve(path)?)
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(self.resolve(path)?)
    }

    fn file_len(&self, path: &Path) -> io::Result<u64> {
        Ok(fs::metadata(self.resolve(path)?)?.len())
    }
}
