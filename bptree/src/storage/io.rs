//! Storage abstraction for deterministic simulation testing.
//!
//! The tree never touches the file system directly. Every read and every
//! mutation of a node directory goes through a `NodeStore`, so production code
//! runs against real directories while tests wrap the same store with fault
//! injection.

use std::path::{Path, PathBuf};

/// Errors that can occur during storage operations.
#[derive(Debug)]
pub enum StorageError {
    /// I/O error on a specific path.
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Injected fault for simulation.
    InjectedFault(String),
}

impl StorageError {
    /// Wrap an I/O error with the path it concerns.
    pub fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Whether the underlying I/O error is `NotFound`.
    #[cfg(test)]
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Io { source, .. } if source.kind() == std::io::ErrorKind::NotFound)
    }
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => write!(f, "I/O error on {}: {source}", path.display()),
            Self::InjectedFault(msg) => write!(f, "injected fault: {msg}"),
        }
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::InjectedFault(_) => None,
        }
    }
}

/// Abstraction over the directory operations a tree needs.
///
/// # Implementation Notes
///
/// Implementations must ensure:
/// - `write_file` replaces the whole file atomically: readers observe either
///   the old or the new contents, never a mix
/// - `rename` moves a directory together with its entire subtree
/// - `read_file` returns the last written contents
pub trait NodeStore {
    /// Read a whole file.
    fn read_file(&mut self, path: &Path) -> Result<Vec<u8>, StorageError>;

    /// Replace a file's contents, creating it if needed.
    fn write_file(&mut self, path: &Path, bytes: &[u8]) -> Result<(), StorageError>;

    /// Append bytes to a file, creating it if needed.
    fn append_file(&mut self, path: &Path, bytes: &[u8]) -> Result<(), StorageError>;

    /// Rename a file or directory. The destination must not exist.
    fn rename(&mut self, from: &Path, to: &Path) -> Result<(), StorageError>;

    /// Create a directory and any missing parents.
    fn create_dir_all(&mut self, path: &Path) -> Result<(), StorageError>;

    /// Remove a directory and everything beneath it.
    fn remove_dir_all(&mut self, path: &Path) -> Result<(), StorageError>;

    /// Remove a single file.
    fn remove_file(&mut self, path: &Path) -> Result<(), StorageError>;

    /// Whether a file or directory exists at `path`.
    fn exists(&mut self, path: &Path) -> Result<bool, StorageError>;

    /// Names of the subdirectories directly beneath `path`, sorted.
    fn list_dirs(&mut self, path: &Path) -> Result<Vec<String>, StorageError>;
}

impl<S: NodeStore + ?Sized> NodeStore for &mut S {
    fn read_file(&mut self, path: &Path) -> Result<Vec<u8>, StorageError> {
        (**self).read_file(path)
    }

    fn write_file(&mut self, path: &Path, bytes: &[u8]) -> Result<(), StorageError> {
        (**self).write_file(path, bytes)
    }

    fn append_file(&mut self, path: &Path, bytes: &[u8]) -> Result<(), StorageError> {
        (**self).append_file(path, bytes)
    }

    fn rename(&mut self, from: &Path, to: &Path) -> Result<(), StorageError> {
        (**self).rename(from, to)
    }

    fn create_dir_all(&mut self, path: &Path) -> Result<(), StorageError> {
        (**self).create_dir_all(path)
    }

    fn remove_dir_all(&mut self, path: &Path) -> Result<(), StorageError> {
        (**self).remove_dir_all(path)
    }

    fn remove_file(&mut self, path: &Path) -> Result<(), StorageError> {
        (**self).remove_file(path)
    }

    fn exists(&mut self, path: &Path) -> Result<bool, StorageError> {
        (**self).exists(path)
    }

    fn list_dirs(&mut self, path: &Path) -> Result<Vec<String>, StorageError> {
        (**self).list_dirs(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_storage_error_display() {
        let err = StorageError::io(
            Path::new("/tmp/x/keylist"),
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert_eq!(err.to_string(), "I/O error on /tmp/x/keylist: gone");
        assert!(err.source().is_some());
        assert!(err.is_not_found());

        let err = StorageError::InjectedFault("rename".to_string());
        assert_eq!(err.to_string(), "injected fault: rename");
        assert!(err.source().is_none());
        assert!(!err.is_not_found());
    }
}
