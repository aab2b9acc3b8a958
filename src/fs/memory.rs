//! In-memory filesystem used by `--in-memory-fs` and by tests

use super::{normalize_path as normalize, FileStat, FileSystem};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Clone)]
enum MemEntry {
    File(Vec<u8>),
    Dir,
}

/// Thread-safe map of normalized paths to entries. Clones share storage.
#[derive(Debug, Clone, Default)]
pub struct MemoryFileSystem {
    entries: Arc<Mutex<HashMap<PathBuf, MemEntry>>>,
}

impl MemoryFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a file, creating its parent directories.
    pub fn add_file(&self, path: impl AsRef<Path>, contents: impl Into<Vec<u8>>) {
        let path = normalize(path.as_ref());
        let mut entries = self.lock();
        if let Some(parent) = path.parent() {
            insert_dirs(&mut entries, parent);
        }
        entries.insert(path, MemEntry::File(contents.into()));
    }

    pub fn add_dir(&self, path: impl AsRef<Path>) {
        let path = normalize(path.as_ref());
        insert_dirs(&mut self.lock(), &path);
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<PathBuf, MemEntry>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl FileSystem for MemoryFileSystem {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        match self.lock().get(&normalize(path)) {
            Some(MemEntry::File(contents)) => Ok(contents.clone()),
            Some(MemEntry::Dir) => Err(io::Error::new(
                io::ErrorKind::Other,
                format!("is a directory: {}", path.display()),
            )),
            None => Err(not_found(path)),
        }
    }

    fn write_synced(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        let path = normalize(path);
        let mut entries = self.lock();
        if let Some(MemEntry::Dir) = entries.get(&path) {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                format!("is a directory: {}", path.display()),
            ));
        }
        if let Some(parent) = path.parent() {
            insert_dirs(&mut entries, parent);
        }
        entries.insert(path, MemEntry::File(contents.to_vec()));
        Ok(())
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        let path = normalize(path);
        let mut entries = self.lock();
        if let Some(MemEntry::File(_)) = entries.get(&path) {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("file exists: {}", path.display()),
            ));
        }
        insert_dirs(&mut entries, &path);
        Ok(())
    }

    fn metadata(&self, path: &Path) -> io::Result<FileStat> {
        match self.lock().get(&normalize(path)) {
            Some(MemEntry::File(contents)) => Ok(FileStat {
                is_dir: false,
                len: contents.len() as u64,
            }),
            Some(MemEntry::Dir) => Ok(FileStat {
                is_dir: true,
                len: 0,
            }),
            None => Err(not_found(path)),
        }
    }
}

fn insert_dirs(entries: &mut HashMap<PathBuf, MemEntry>, path: &Path) {
    for ancestor in path.ancestors() {
        if ancestor.as_os_str().is_empty() {
            continue;
        }
        entries
            .entry(ancestor.to_path_buf())
            .or_insert(MemEntry::Dir);
    }
}

fn not_found(path: &Path) -> io::Error {
    io::Error::new(
        io::ErrorKind::NotFound,
        format!("no such file: {}", path.display()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_creates_parents() {
        let fs = MemoryFileSystem::new();
        fs.write_synced(Path::new("/a/b/c.txt"), b"hello").unwrap();

        assert!(fs.is_dir(Path::new("/a/b")));
        assert!(fs.is_dir(Path::new("/a")));
        assert_eq!(fs.read(Path::new("/a/b/c.txt")).unwrap(), b"hello");
    }

    #[test]
    fn test_normalized_paths_share_entries() {
        let fs = MemoryFileSystem::new();
        fs.add_file("/srv/./conf/../app.ini", "x=1");

        assert_eq!(fs.read_to_string(Path::new("/srv/app.ini")).unwrap(), "x=1");
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let fs = MemoryFileSystem::new();
        let err = fs.read(Path::new("/nope")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
        assert!(!fs.exists(Path::new("/nope")));
    }

    #[test]
    fn test_cannot_write_over_directory() {
        let fs = MemoryFileSystem::new();
        fs.add_dir("/data");
        assert!(fs.write_synced(Path::new("/data"), b"x").is_err());
    }
}
