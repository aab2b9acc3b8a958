//! Filesystem abstraction shared by the loader and the file-producing operations
//!
//! Scripts are always read through a [`FileSystem`]; operations that write
//! (download, template) receive their own handle so a run can direct all
//! writes into memory while still reading scripts and templates from disk.

use std::fmt::Debug;
use std::fs;
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};

pub mod memory;
pub mod overlay;

pub use memory::MemoryFileSystem;
pub use overlay::OverlayFileSystem;

/// Minimal view of a filesystem entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStat {
    pub is_dir: bool,
    pub len: u64,
}

/// Abstract filesystem interface.
pub trait FileSystem: Send + Sync + Debug {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>>;

    /// Create or truncate `path`, write `contents` and flush them to storage
    /// before returning.
    fn write_synced(&self, path: &Path, contents: &[u8]) -> io::Result<()>;

    fn create_dir_all(&self, path: &Path) -> io::Result<()>;

    fn metadata(&self, path: &Path) -> io::Result<FileStat>;

    fn exists(&self, path: &Path) -> bool {
        self.metadata(path).is_ok()
    }

    fn is_dir(&self, path: &Path) -> bool {
        self.metadata(path).map(|m| m.is_dir).unwrap_or(false)
    }

    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        let bytes = self.read(path)?;
        String::from_utf8(bytes).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }
}

/// Implementation backed by `std::fs`.
#[derive(Debug, Clone, Default)]
pub struct OsFileSystem;

impl FileSystem for OsFileSystem {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        fs::read(path)
    }

    fn write_synced(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.write_all(contents)?;
        file.flush()?;
        file.sync_all()
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        fs::create_dir_all(path)
    }

    fn metadata(&self, path: &Path) -> io::Result<FileStat> {
        let meta = fs::metadata(path)?;
        Ok(FileStat {
            is_dir: meta.is_dir(),
            len: meta.len(),
        })
    }
}

/// Join `path` onto `base` unless it is already absolute.
pub fn resolve_against(base: &Path, path: impl AsRef<Path>) -> PathBuf {
    let path = path.as_ref();
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

/// Lexically resolve `.` and `..` so equivalent spellings compare equal.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_os_write_synced_truncates() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.txt");
        let fs = OsFileSystem;

        fs.write_synced(&path, b"first version").unwrap();
        fs.write_synced(&path, b"second").unwrap();

        assert_eq!(fs.read_to_string(&path).unwrap(), "second");
        assert_eq!(fs.metadata(&path).unwrap().len, 6);
        assert!(fs.is_dir(dir.path()));
    }

    #[test]
    fn test_resolve_against() {
        let base = Path::new("/srv/scripts");
        assert_eq!(
            resolve_against(base, "conf/app.ini"),
            PathBuf::from("/srv/scripts/conf/app.ini")
        );
        assert_eq!(resolve_against(base, "/etc/hosts"), PathBuf::from("/etc/hosts"));
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(
            normalize_path(Path::new("/srv/./a/../b/c.lua")),
            PathBuf::from("/srv/b/c.lua")
        );
    }
}
