//! Simulated node storage for deterministic testing.
//!
//! `MemoryStore` keeps the whole directory tree in memory.
//! `FaultInjectingStore` wraps any store and injects failures:
//! - Random read and mutation errors at configurable rates
//! - A crash point after which every mutation fails
//! - A torn append at the crash point

use std::collections::{BTreeMap, BTreeSet};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::storage::io::{NodeStore, StorageError};

/// Configuration for fault injection.
#[derive(Debug, Clone, Default)]
pub struct FaultConfig {
    /// Probability of a read error (0.0 - 1.0).
    pub read_error_rate: f64,
    /// Probability of a write, append, rename or removal error (0.0 - 1.0).
    pub write_error_rate: f64,
    /// Number of mutations that succeed before the simulated crash.
    pub crash_after: Option<u64>,
}

impl FaultConfig {
    /// Create a fault config with no faults (for baseline testing).
    #[must_use]
    pub fn no_faults() -> Self {
        Self::default()
    }

    /// Create a fault config with low fault rates (for stress testing).
    #[must_use]
    pub const fn low_faults() -> Self {
        Self {
            read_error_rate: 0.001,
            write_error_rate: 0.001,
            crash_after: None,
        }
    }

    /// Create a fault config with high fault rates (for extreme testing).
    #[must_use]
    pub const fn high_faults() -> Self {
        Self {
            read_error_rate: 0.05,
            write_error_rate: 0.05,
            crash_after: None,
        }
    }

    /// Fail every mutation after the first `mutations`.
    #[must_use]
    pub const fn crash_after(mutations: u64) -> Self {
        Self {
            read_error_rate: 0.0,
            write_error_rate: 0.0,
            crash_after: Some(mutations),
        }
    }
}

fn not_found(path: &Path) -> StorageError {
    StorageError::io(path, std::io::Error::from(ErrorKind::NotFound))
}

fn already_exists(path: &Path) -> StorageError {
    StorageError::io(path, std::io::Error::from(ErrorKind::AlreadyExists))
}

/// In-memory directory tree.
///
/// Directories must exist before files or subdirectories are placed in them,
/// and renames refuse existing targets, matching `DirectoryStore`.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    files: BTreeMap<PathBuf, Vec<u8>>,
    dirs: BTreeSet<PathBuf>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of files currently stored.
    #[must_use]
    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    fn check_parent(&self, path: &Path) -> Result<(), StorageError> {
        match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() && !self.dirs.contains(parent) => {
                Err(not_found(parent))
            }
            _ => Ok(()),
        }
    }

    fn is_dir(&self, path: &Path) -> bool {
        self.dirs.contains(path)
    }
}

impl NodeStore for MemoryStore {
    fn read_file(&mut self, path: &Path) -> Result<Vec<u8>, StorageError> {
        self.files.get(path).cloned().ok_or_else(|| not_found(path))
    }

    fn write_file(&mut self, path: &Path, bytes: &[u8]) -> Result<(), StorageError> {
        self.check_parent(path)?;
        self.files.insert(path.to_path_buf(), bytes.to_vec());
        Ok(())
    }

    fn append_file(&mut self, path: &Path, bytes: &[u8]) -> Result<(), StorageError> {
        self.check_parent(path)?;
        self.files
            .entry(path.to_path_buf())
            .or_default()
            .extend_from_slice(bytes);
        Ok(())
    }

    fn rename(&mut self, from: &Path, to: &Path) -> Result<(), StorageError> {
        if self.files.contains_key(to) || self.is_dir(to) {
            return Err(already_exists(to));
        }
        self.check_parent(to)?;
        if let Some(bytes) = self.files.remove(from) {
            self.files.insert(to.to_path_buf(), bytes);
            return Ok(());
        }
        if !self.is_dir(from) {
            return Err(not_found(from));
        }

        let moved_dirs: Vec<PathBuf> = self
            .dirs
            .iter()
            .filter(|d| d.starts_with(from))
            .cloned()
            .collect();
        for dir in moved_dirs {
            self.dirs.remove(&dir);
            if let Ok(rest) = dir.strip_prefix(from) {
                self.dirs.insert(to.join(rest));
            }
        }
        let moved_files: Vec<PathBuf> = self
            .files
            .keys()
            .filter(|f| f.starts_with(from))
            .cloned()
            .collect();
        for file in moved_files {
            if let (Some(bytes), Ok(rest)) = (self.files.remove(&file), file.strip_prefix(from)) {
                self.files.insert(to.join(rest), bytes);
            }
        }
        Ok(())
    }

    fn create_dir_all(&mut self, path: &Path) -> Result<(), StorageError> {
        for ancestor in path.ancestors() {
            if ancestor.as_os_str().is_empty() {
                break;
            }
            if self.files.contains_key(ancestor) {
                return Err(already_exists(ancestor));
            }
            self.dirs.insert(ancestor.to_path_buf());
        }
        Ok(())
    }

    fn remove_dir_all(&mut self, path: &Path) -> Result<(), StorageError> {
        if !self.is_dir(path) {
            return Err(not_found(path));
        }
        self.dirs.retain(|d| !d.starts_with(path));
        self.files.retain(|f, _| !f.starts_with(path));
        Ok(())
    }

    fn remove_file(&mut self, path: &Path) -> Result<(), StorageError> {
        self.files
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| not_found(path))
    }

    fn exists(&mut self, path: &Path) -> Result<bool, StorageError> {
        Ok(self.files.contains_key(path) || self.is_dir(path))
    }

    fn list_dirs(&mut self, path: &Path) -> Result<Vec<String>, StorageError> {
        if !self.is_dir(path) {
            return Err(not_found(path));
        }
        let mut names: Vec<String> = self
            .dirs
            .iter()
            .filter(|d| d.parent() == Some(path))
            .filter_map(|d| d.file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .collect();
        names.sort();
        Ok(names)
    }
}

/// Statistics about simulated storage operations.
#[derive(Debug, Default, Clone)]
pub struct FaultStats {
    /// Number of file reads.
    pub reads: u64,
    /// Number of mutating calls, failed ones included.
    pub mutations: u64,
    /// Number of injected read errors.
    pub injected_read_errors: u64,
    /// Number of injected mutation errors.
    pub injected_write_errors: u64,
    /// Number of appends cut short at the crash point.
    pub torn_appends: u64,
}

/// A store wrapper that fails operations on demand.
///
/// This implementation is not thread-safe. Simulations run everything in a
/// single thread.
pub struct FaultInjectingStore<S: NodeStore> {
    inner: S,
    fault_config: FaultConfig,
    rng: StdRng,
    stats: FaultStats,
}

impl<S: NodeStore> FaultInjectingStore<S> {
    /// Wrap `inner`. The seed fixes the sequence of random faults.
    #[must_use]
    pub fn new(inner: S, seed: u64, fault_config: FaultConfig) -> Self {
        Self {
            inner,
            fault_config,
            rng: StdRng::seed_from_u64(seed),
            stats: FaultStats::default(),
        }
    }

    /// Get the current statistics.
    #[must_use]
    pub const fn stats(&self) -> &FaultStats {
        &self.stats
    }

    #[must_use]
    pub const fn fault_config(&self) -> &FaultConfig {
        &self.fault_config
    }

    /// Update the fault configuration.
    pub fn set_fault_config(&mut self, config: FaultConfig) {
        self.fault_config = config;
    }

    /// Lift the crash point and random faults, as a restart would.
    pub fn heal(&mut self) {
        self.fault_config = FaultConfig::no_faults();
    }

    #[must_use]
    pub const fn inner(&self) -> &S {
        &self.inner
    }

    pub const fn inner_mut(&mut self) -> &mut S {
        &mut self.inner
    }

    #[must_use]
    pub fn into_inner(self) -> S {
        self.inner
    }

    /// Check if a fault should be injected based on the given rate.
    fn should_inject_fault(&mut self, rate: f64) -> bool {
        if rate <= 0.0 {
            return false;
        }
        self.rng.random::<f64>() < rate
    }

    /// Count a mutation and decide whether it fails.
    ///
    /// Returns `Ok(true)` if this mutation is the one the crash lands on.
    fn before_mutation(&mut self, what: &str) -> Result<bool, StorageError> {
        let sequence = self.stats.mutations;
        self.stats.mutations += 1;
        if let Some(limit) = self.fault_config.crash_after {
            if sequence > limit {
                return Err(StorageError::InjectedFault(format!(
                    "{what} after simulated crash"
                )));
            }
            if sequence == limit {
                return Ok(true);
            }
        }
        if self.should_inject_fault(self.fault_config.write_error_rate) {
            self.stats.injected_write_errors += 1;
            return Err(StorageError::InjectedFault(format!("simulated {what} error")));
        }
        Ok(false)
    }

    fn crash(what: &str) -> StorageError {
        StorageError::InjectedFault(format!("simulated crash during {what}"))
    }
}

impl<S: NodeStore> NodeStore for FaultInjectingStore<S> {
    fn read_file(&mut self, path: &Path) -> Result<Vec<u8>, StorageError> {
        self.stats.reads += 1;
        if self.should_inject_fault(self.fault_config.read_error_rate) {
            self.stats.injected_read_errors += 1;
            return Err(StorageError::InjectedFault(
                "simulated read error".to_string(),
            ));
        }
        self.inner.read_file(path)
    }

    fn write_file(&mut self, path: &Path, bytes: &[u8]) -> Result<(), StorageError> {
        if self.before_mutation("write")? {
            return Err(Self::crash("write"));
        }
        self.inner.write_file(path, bytes)
    }

    fn append_file(&mut self, path: &Path, bytes: &[u8]) -> Result<(), StorageError> {
        if self.before_mutation("append")? {
            let cut = self.rng.random_range(0..bytes.len().max(1));
            if cut > 0 {
                self.stats.torn_appends += 1;
                self.inner.append_file(path, &bytes[..cut])?;
            }
            return Err(Self::crash("append"));
        }
        self.inner.append_file(path, bytes)
    }

    fn rename(&mut self, from: &Path, to: &Path) -> Result<(), StorageError> {
        if self.before_mutation("rename")? {
            return Err(Self::crash("rename"));
        }
        self.inner.rename(from, to)
    }

    fn create_dir_all(&mut self, path: &Path) -> Result<(), StorageError> {
        if self.before_mutation("mkdir")? {
            return Err(Self::crash("mkdir"));
        }
        self.inner.create_dir_all(path)
    }

    fn remove_dir_all(&mut self, path: &Path) -> Result<(), StorageError> {
        if self.before_mutation("rmdir")? {
            return Err(Self::crash("rmdir"));
        }
        self.inner.remove_dir_all(path)
    }

    fn remove_file(&mut self, path: &Path) -> Result<(), StorageError> {
        if self.before_mutation("unlink")? {
            return Err(Self::crash("unlink"));
        }
        self.inner.remove_file(path)
    }

    fn exists(&mut self, path: &Path) -> Result<bool, StorageError> {
        self.inner.exists(path)
    }

    fn list_dirs(&mut self, path: &Path) -> Result<Vec<String>, StorageError> {
        self.inner.list_dirs(path)
    }
}
