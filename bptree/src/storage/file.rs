//! Node directory I/O on the local file system.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::storage::io::{NodeStore, StorageError};

/// Suffix of the scratch file a replacement is written to before the rename.
const TMP_SUFFIX: &str = "tmp";

/// A `NodeStore` backed by `std::fs`.
#[derive(Debug, Clone, Default)]
pub struct DirectoryStore {
    sync_writes: bool,
}

impl DirectoryStore {
    /// Create a store. With `sync_writes`, file contents are fsynced before
    /// they become visible under their final name.
    #[must_use]
    pub const fn new(sync_writes: bool) -> Self {
        Self { sync_writes }
    }

    #[must_use]
    pub const fn sync_writes(&self) -> bool {
        self.sync_writes
    }

    fn tmp_path(path: &Path) -> PathBuf {
        let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        name.push(".");
        name.push(TMP_SUFFIX);
        path.with_file_name(name)
    }
}

impl NodeStore for DirectoryStore {
    fn read_file(&mut self, path: &Path) -> Result<Vec<u8>, StorageError> {
        fs::read(path).map_err(|e| StorageError::io(path, e))
    }

    fn write_file(&mut self, path: &Path, bytes: &[u8]) -> Result<(), StorageError> {
        let tmp = Self::tmp_path(path);
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp)
            .map_err(|e| StorageError::io(&tmp, e))?;
        file.write_all(bytes).map_err(|e| StorageError::io(&tmp, e))?;
        if self.sync_writes {
            file.sync_all().map_err(|e| StorageError::io(&tmp, e))?;
        }
        drop(file);
        fs::rename(&tmp, path).map_err(|e| StorageError::io(path, e))
    }

    fn append_file(&mut self, path: &Path, bytes: &[u8]) -> Result<(), StorageError> {
        let mut file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(path)
            .map_err(|e| StorageError::io(path, e))?;
        file.write_all(bytes).map_err(|e| StorageError::io(path, e))?;
        if self.sync_writes {
            file.sync_data().map_err(|e| StorageError::io(path, e))?;
        }
        Ok(())
    }

    fn rename(&mut self, from: &Path, to: &Path) -> Result<(), StorageError> {
        if to.exists() {
            return Err(StorageError::io(
                to,
                std::io::Error::new(std::io::ErrorKind::AlreadyExists, "rename target exists"),
            ));
        }
        fs::rename(from, to).map_err(|e| StorageError::io(from, e))
    }

    fn create_dir_all(&mut self, path: &Path) -> Result<(), StorageError> {
        fs::create_dir_all(path).map_err(|e| StorageError::io(path, e))
    }

    fn remove_dir_all(&mut self, path: &Path) -> Result<(), StorageError> {
        fs::remove_dir_all(path).map_err(|e| StorageError::io(path, e))
    }

    fn remove_file(&mut self, path: &Path) -> Result<(), StorageError> {
        fs::remove_file(path).map_err(|e| StorageError::io(path, e))
    }

    fn exists(&mut self, path: &Path) -> Result<bool, StorageError> {
        path.try_exists().map_err(|e| StorageError::io(path, e))
    }

    fn list_dirs(&mut self, path: &Path) -> Result<Vec<String>, StorageError> {
        let mut names = Vec::new();
        for entry in fs::read_dir(path).map_err(|e| StorageError::io(path, e))? {
            let entry = entry.map_err(|e| StorageError::io(path, e))?;
            let file_type = entry.file_type().map_err(|e| StorageError::io(path, e))?;
            if file_type.is_dir() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_write_and_read() {
        let dir = tempdir().expect("create temp dir");
        let path = dir.path().join("keylist");
        let mut store = DirectoryStore::new(true);

        store.write_file(&path, b"first").expect("write");
        assert_eq!(store.read_file(&path).expect("read"), b"first");

        store.write_file(&path, b"second").expect("overwrite");
        assert_eq!(store.read_file(&path).expect("read"), b"second");
        assert!(!DirectoryStore::tmp_path(&path).exists());
    }

    #[test]
    fn test_append() {
        let dir = tempdir().expect("create temp dir");
        let path = dir.path().join("log");
        let mut store = DirectoryStore::default();

        store.append_file(&path, b"ab").expect("append");
        store.append_file(&path, b"cd").expect("append");
        assert_eq!(store.read_file(&path).expect("read"), b"abcd");
    }

    #[test]
    fn test_rename_moves_subtree() {
        let dir = tempdir().expect("create temp dir");
        let mut store = DirectoryStore::default();
        let from = dir.path().join("0");
        store.create_dir_all(&from.join("3")).expect("mkdir");
        store
            .write_file(&from.join("3").join("keylist"), b"leaf")
            .expect("write");

        let to = dir.path().join("1");
        store.rename(&from, &to).expect("rename");
        assert!(!store.exists(&from).expect("exists"));
        assert_eq!(
            store.read_file(&to.join("3").join("keylist")).expect("read"),
            b"leaf"
        );
    }

    #[test]
    fn test_rename_refuses_existing_target() {
        let dir = tempdir().expect("create temp dir");
        let mut store = DirectoryStore::default();
        store.create_dir_all(&dir.path().join("0")).expect("mkdir");
        store.create_dir_all(&dir.path().join("1")).expect("mkdir");

        let err = store
            .rename(&dir.path().join("0"), &dir.path().join("1"))
            .expect_err("target exists");
        assert!(matches!(err, StorageError::Io { .. }));
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let dir = tempdir().expect("create temp dir");
        let mut store = DirectoryStore::default();
        let err = store
            .read_file(&dir.path().join("missing"))
            .expect_err("missing file");
        assert!(err.is_not_found());
    }

    #[test]
    fn test_list_dirs_skips_files() {
        let dir = tempdir().expect("create temp dir");
        let mut store = DirectoryStore::default();
        store.create_dir_all(&dir.path().join("1")).expect("mkdir");
        store.create_dir_all(&dir.path().join("0")).expect("mkdir");
        store
            .write_file(&dir.path().join("keylist"), b"x")
            .expect("write");

        assert_eq!(
            store.list_dirs(dir.path()).expect("list"),
            vec!["0".to_string(), "1".to_string()]
        );
    }

    #[test]
    fn test_remove() {
        let dir = tempdir().expect("create temp dir");
        let mut store = DirectoryStore::default();
        let node = dir.path().join("2");
        store.create_dir_all(&node).expect("mkdir");
        store.write_file(&node.join("keylist"), b"x").expect("write");

        store.remove_file(&node.join("keylist")).expect("remove file");
        assert!(!store.exists(&node.join("keylist")).expect("exists"));
        store.remove_dir_all(&node).expect("remove dir");
        assert!(!store.exists(&node).expect("exists"));
    }
}
