//! Copy-on-write view used by `--in-memory-fs`
//!
//! Reads fall through to the lower filesystem when the in-memory layer has no
//! entry; every write lands in memory.

use super::{FileStat, FileSystem, MemoryFileSystem};
use std::io;
use std::path::Path;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct OverlayFileSystem {
    lower: Arc<dyn FileSystem>,
    upper: MemoryFileSystem,
}

impl OverlayFileSystem {
    pub fn new(lower: Arc<dyn FileSystem>) -> Self {
        Self {
            lower,
            upper: MemoryFileSystem::new(),
        }
    }

    /// The in-memory layer holding everything written so far.
    pub fn upper(&self) -> &MemoryFileSystem {
        &self.upper
    }
}

impl FileSystem for OverlayFileSystem {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        match self.upper.read(path) {
            Err(e) if e.kind() == io::ErrorKind::NotFound => self.lower.read(path),
            other => other,
        }
    }

    fn write_synced(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        if !self.upper.exists(path) && self.lower.is_dir(path) {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                format!("is a directory: {}", path.display()),
            ));
        }
        self.upper.write_synced(path, contents)
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        if !self.upper.exists(path) {
            if let Ok(stat) = self.lower.metadata(path) {
                if !stat.is_dir {
                    return Err(io::Error::new(
                        io::ErrorKind::AlreadyExists,
                        format!("file exists: {}", path.display()),
                    ));
                }
            }
        }
        self.upper.create_dir_all(path)
    }

    fn metadata(&self, path: &Path) -> io::Result<FileStat> {
        match self.upper.metadata(path) {
            Err(e) if e.kind() == io::ErrorKind::NotFound => self.lower.metadata(path),
            other => other,
        }
    }
}
