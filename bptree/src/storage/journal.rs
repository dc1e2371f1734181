//! Relocation journal.
//!
//! Structural changes (splits, merges, redistributions between index nodes,
//! root promotion and collapse) rename whole subtrees. A crash in the middle
//! of such a cascade could leave two siblings claiming one slot, or a gap. The
//! journal makes each cascade redo-able: the complete list of operations is
//! persisted before the first one runs, and a progress record is appended
//! after each one completes.
//!
//! # File Format
//!
//! ```text
//! +-----------+--------------------------------------------+
//! | 0-7       | magic "BPTJRNL1"                           |
//! | 8-11      | op count (u32)                             |
//! | 12-N      | ops                                        |
//! | N-N+3     | CRC32 of bytes 0..N                        |
//! +-----------+--------------------------------------------+
//! | progress  | (op index u32, CRC32 of the index) * k     |
//! +-----------+--------------------------------------------+
//! ```
//!
//! Each op is a tag byte followed by its operands. Paths are relative to the
//! tree root and encoded as a u16 length plus UTF-8 bytes; file contents are
//! a u32 length plus raw bytes. All integers are big-endian.
//!
//! # Replay
//!
//! Every op before the first missing progress record is known to be done and
//! every op after it is known not to have started, so replay resumes at that
//! op. The resumed op itself may or may not have completed, so replay treats
//! it idempotently: a rename whose source is gone already happened, directory
//! creation and removal tolerate prior completion, and file writes are redone.

// Journal fields are bounded by page-sized node files and short paths
#![allow(clippy::cast_possible_truncation)]

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::constants::JOURNAL_FILE_NAME;
use crate::storage::io::{NodeStore, StorageError};

const MAGIC: &[u8; 8] = b"BPTJRNL1";

/// Magic plus op count.
const HEADER_SIZE: usize = 12;

const CHECKSUM_SIZE: usize = 4;

const PROGRESS_RECORD_SIZE: usize = 8;

/// Op tags.
const TAG_CREATE_DIR: u8 = 0x01;
const TAG_RENAME: u8 = 0x02;
const TAG_WRITE_FILE: u8 = 0x03;
const TAG_REMOVE_DIR: u8 = 0x04;

/// One step of a structural change. Paths are relative to the tree root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JournalOp {
    CreateDir(PathBuf),
    Rename { from: PathBuf, to: PathBuf },
    WriteFile { path: PathBuf, bytes: Vec<u8> },
    RemoveDir(PathBuf),
}

/// Errors that can occur while writing or replaying the journal.
#[derive(Debug)]
pub enum JournalError {
    /// Storage error.
    Storage(StorageError),
    /// Checksum mismatch.
    ChecksumMismatch { expected: u32, actual: u32 },
    /// Structurally invalid journal contents.
    Malformed(String),
}

impl std::fmt::Display for JournalError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Storage(e) => write!(f, "journal storage error: {e}"),
            Self::ChecksumMismatch { expected, actual } => write!(
                f,
                "journal checksum mismatch: expected 0x{expected:08x}, got 0x{actual:08x}"
            ),
            Self::Malformed(msg) => write!(f, "malformed journal: {msg}"),
        }
    }
}

impl std::error::Error for JournalError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Storage(e) => Some(e),
            _ => None,
        }
    }
}

impl From<StorageError> for JournalError {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}

/// Location of the journal for the tree rooted at `root`.
#[must_use]
pub fn journal_path(root: &Path) -> PathBuf {
    root.join(JOURNAL_FILE_NAME)
}

/// Apply a plan of operations against the tree rooted at `root`.
///
/// A plan consisting of a single file write is applied directly since the
/// store replaces files atomically. Anything longer goes through the journal.
pub fn commit<S: NodeStore>(
    store: &mut S,
    root: &Path,
    ops: &[JournalOp],
) -> Result<(), JournalError> {
    match ops {
        [] => Ok(()),
        [op @ JournalOp::WriteFile { .. }] => apply(store, root, op, false),
        _ => {
            let path = journal_path(root);
            store.write_file(&path, &encode_plan(ops))?;
            for (index, op) in ops.iter().enumerate() {
                apply(store, root, op, false)?;
                store.append_file(&path, &encode_progress(index as u32))?;
            }
            store.remove_file(&path)?;
            Ok(())
        }
    }
}

/// Finish any plan interrupted by a crash or a failed commit.
///
/// Returns `true` if a journal was replayed.
pub fn recover<S: NodeStore>(store: &mut S, root: &Path) -> Result<bool, JournalError> {
    let path = journal_path(root);
    if !store.exists(&path)? {
        return Ok(false);
    }
    let bytes = store.read_file(&path)?;
    let (ops, plan_len) = match decode_plan(&bytes) {
        Ok(decoded) => decoded,
        Err(e @ (JournalError::ChecksumMismatch { .. } | JournalError::Malformed(_))) => {
            // The plan is written in one atomic replace, so a damaged plan was
            // never the basis for any change.
            warn!(path = %path.display(), error = %e, "discarding unreadable journal");
            store.remove_file(&path)?;
            return Ok(false);
        }
        Err(e) => return Err(e),
    };

    let done = completed_ops(&bytes[plan_len..]).min(ops.len());
    // Drop a torn progress record so new records follow the intact ones.
    let intact = plan_len + done * PROGRESS_RECORD_SIZE;
    if bytes.len() > intact {
        store.write_file(&path, &bytes[..intact])?;
    }
    info!(
        path = %path.display(),
        ops = ops.len(),
        completed = done,
        "replaying relocation journal"
    );
    for (index, op) in ops.iter().enumerate().skip(done) {
        apply(store, root, op, true)?;
        store.append_file(&path, &encode_progress(index as u32))?;
    }
    store.remove_file(&path)?;
    Ok(true)
}

fn apply<S: NodeStore>(
    store: &mut S,
    root: &Path,
    op: &JournalOp,
    replaying: bool,
) -> Result<(), JournalError> {
    match op {
        JournalOp::CreateDir(dir) => store.create_dir_all(&root.join(dir))?,
        JournalOp::Rename { from, to } => {
            let from = root.join(from);
            if replaying && !store.exists(&from)? {
                return Ok(());
            }
            store.rename(&from, &root.join(to))?;
        }
        JournalOp::WriteFile { path, bytes } => store.write_file(&root.join(path), bytes)?,
        JournalOp::RemoveDir(dir) => {
            let dir = root.join(dir);
            if replaying && !store.exists(&dir)? {
                return Ok(());
            }
            store.remove_dir_all(&dir)?;
        }
    }
    Ok(())
}

/// Serialize a plan with its trailing checksum.
#[must_use]
pub fn encode_plan(ops: &[JournalOp]) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.extend_from_slice(MAGIC);
    buf.extend_from_slice(&(ops.len() as u32).to_be_bytes());
    for op in ops {
        match op {
            JournalOp::CreateDir(dir) => {
                buf.push(TAG_CREATE_DIR);
                put_path(&mut buf, dir);
            }
            JournalOp::Rename { from, to } => {
                buf.push(TAG_RENAME);
                put_path(&mut buf, from);
                put_path(&mut buf, to);
            }
            JournalOp::WriteFile { path, bytes } => {
                buf.push(TAG_WRITE_FILE);
                put_path(&mut buf, path);
                buf.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
                buf.extend_from_slice(bytes);
            }
            JournalOp::RemoveDir(dir) => {
                buf.push(TAG_REMOVE_DIR);
                put_path(&mut buf, dir);
            }
        }
    }
    let checksum = crc32fast::hash(&buf);
    buf.extend_from_slice(&checksum.to_be_bytes());
    buf
}

/// Parse a plan, returning the ops and the number of bytes the plan occupies.
pub fn decode_plan(bytes: &[u8]) -> Result<(Vec<JournalOp>, usize), JournalError> {
    if bytes.len() < HEADER_SIZE + CHECKSUM_SIZE || &bytes[..MAGIC.len()] != MAGIC {
        return Err(JournalError::Malformed("missing journal header".to_string()));
    }
    let mut reader = Reader::new(bytes, MAGIC.len());
    let count = reader.u32()?;
    let mut ops = Vec::new();
    for _ in 0..count {
        let op = match reader.u8()? {
            TAG_CREATE_DIR => JournalOp::CreateDir(reader.path()?),
            TAG_RENAME => JournalOp::Rename {
                from: reader.path()?,
                to: reader.path()?,
            },
            TAG_WRITE_FILE => {
                let path = reader.path()?;
                let len = reader.u32()? as usize;
                JournalOp::WriteFile {
                    path,
                    bytes: reader.take(len)?.to_vec(),
                }
            }
            TAG_REMOVE_DIR => JournalOp::RemoveDir(reader.path()?),
            tag => return Err(JournalError::Malformed(format!("unknown op tag 0x{tag:02x}"))),
        };
        ops.push(op);
    }
    let body_len = reader.offset;
    let expected = reader.u32()?;
    let actual = crc32fast::hash(&bytes[..body_len]);
    if expected != actual {
        return Err(JournalError::ChecksumMismatch { expected, actual });
    }
    Ok((ops, reader.offset))
}

fn encode_progress(index: u32) -> [u8; PROGRESS_RECORD_SIZE] {
    let index_bytes = index.to_be_bytes();
    let checksum = crc32fast::hash(&index_bytes);
    let mut record = [0u8; PROGRESS_RECORD_SIZE];
    record[..4].copy_from_slice(&index_bytes);
    record[4..].copy_from_slice(&checksum.to_be_bytes());
    record
}

/// Count leading progress records that are intact and in sequence.
fn completed_ops(progress: &[u8]) -> usize {
    let mut done = 0;
    for record in progress.chunks_exact(PROGRESS_RECORD_SIZE) {
        let index_bytes = [record[0], record[1], record[2], record[3]];
        let checksum = u32::from_be_bytes([record[4], record[5], record[6], record[7]]);
        if crc32fast::hash(&index_bytes) != checksum
            || u32::from_be_bytes(index_bytes) as usize != done
        {
            break;
        }
        done += 1;
    }
    done
}

fn put_path(buf: &mut Vec<u8>, path: &Path) {
    let text = path.to_string_lossy();
    buf.extend_from_slice(&(text.len() as u16).to_be_bytes());
    buf.extend_from_slice(text.as_bytes());
}

struct Reader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    const fn new(bytes: &'a [u8], offset: usize) -> Self {
        Self { bytes, offset }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], JournalError> {
        let end = self
            .offset
            .checked_add(len)
            .filter(|end| *end <= self.bytes.len())
            .ok_or_else(|| JournalError::Malformed("journal truncated".to_string()))?;
        let slice = &self.bytes[self.offset..end];
        self.offset = end;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8, JournalError> {
        Ok(self.take(1)?[0])
    }

    fn u32(&mut self) -> Result<u32, JournalError> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn path(&mut self) -> Result<PathBuf, JournalError> {
        let b = self.take(2)?;
        let len = u16::from_be_bytes([b[0], b[1]]) as usize;
        let raw = self.take(len)?;
        let text = std::str::from_utf8(raw)
            .map_err(|_| JournalError::Malformed("path is not UTF-8".to_string()))?;
        Ok(PathBuf::from(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::file::DirectoryStore;
    use tempfile::tempdir;

    fn sample_plan() -> Vec<JournalOp> {
        vec![
            JournalOp::CreateDir(PathBuf::from(".pending")),
            JournalOp::WriteFile {
                path: PathBuf::from(".pending/keylist"),
                bytes: vec![1, 2, 3],
            },
            JournalOp::Rename {
                from: PathBuf::from("1"),
                to: PathBuf::from("2"),
            },
            JournalOp::Rename {
                from: PathBuf::from(".pending"),
                to: PathBuf::from("1"),
            },
        ]
    }

    #[test]
    fn test_plan_encoding() {
        let ops = sample_plan();
        let bytes = encode_plan(&ops);
        let (decoded, len) = decode_plan(&bytes).expect("decode");
        assert_eq!(decoded, ops);
        assert_eq!(len, bytes.len());
    }

    #[test]
    fn test_checksum_validation() {
        let mut bytes = encode_plan(&sample_plan());
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        assert!(matches!(
            decode_plan(&bytes),
            Err(JournalError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_truncated_plan_is_malformed() {
        let bytes = encode_plan(&sample_plan());
        assert!(matches!(
            decode_plan(&bytes[..bytes.len() - 10]),
            Err(JournalError::Malformed(_) | JournalError::ChecksumMismatch { .. })
        ));
        assert!(matches!(
            decode_plan(b"nonsense"),
            Err(JournalError::Malformed(_))
        ));
    }

    #[test]
    fn test_completed_ops_stops_at_damage() {
        let mut progress = Vec::new();
        progress.extend_from_slice(&encode_progress(0));
        progress.extend_from_slice(&encode_progress(1));
        assert_eq!(completed_ops(&progress), 2);

        // Torn trailing record.
        progress.extend_from_slice(&encode_progress(2)[..5]);
        assert_eq!(completed_ops(&progress), 2);

        let mut damaged = encode_progress(0).to_vec();
        damaged[6] ^= 0x01;
        assert_eq!(completed_ops(&damaged), 0);

        // Out of sequence.
        assert_eq!(completed_ops(&encode_progress(3)), 0);
    }

    #[test]
    fn test_commit_applies_and_removes_journal() {
        let dir = tempdir().expect("create temp dir");
        let root = dir.path();
        let mut store = DirectoryStore::default();
        store.create_dir_all(&root.join("1")).expect("mkdir");
        store.write_file(&root.join("1/keylist"), b"old").expect("write");

        commit(&mut store, root, &sample_plan()).expect("commit");

        assert_eq!(store.read_file(&root.join("1/keylist")).expect("read"), [1, 2, 3]);
        assert_eq!(store.read_file(&root.join("2/keylist")).expect("read"), b"old");
        assert!(!root.join(".pending").exists());
        assert!(!journal_path(root).exists());
    }

    #[test]
    fn test_single_write_skips_journal() {
        let dir = tempdir().expect("create temp dir");
        let mut store = DirectoryStore::default();
        let op = JournalOp::WriteFile {
            path: PathBuf::from("keylist"),
            bytes: vec![9],
        };
        commit(&mut store, dir.path(), &[op]).expect("commit");
        assert_eq!(
            store.read_file(&dir.path().join("keylist")).expect("read"),
            [9]
        );
        assert!(!journal_path(dir.path()).exists());
    }

    #[test]
    fn test_recover_resumes_after_partial_apply() {
        let dir = tempdir().expect("create temp dir");
        let root = dir.path();
        let mut store = DirectoryStore::default();
        store.create_dir_all(&root.join("1")).expect("mkdir");
        store.write_file(&root.join("1/keylist"), b"old").expect("write");

        // Crash after the first three ops ran but only two were recorded.
        let ops = sample_plan();
        let path = journal_path(root);
        store.write_file(&path, &encode_plan(&ops)).expect("journal");
        for (index, op) in ops.iter().take(3).enumerate() {
            apply(&mut store, root, op, false).expect("apply");
            if index < 2 {
                store
                    .append_file(&path, &encode_progress(index as u32))
                    .expect("progress");
            }
        }

        assert!(recover(&mut store, root).expect("recover"));
        assert_eq!(store.read_file(&root.join("1/keylist")).expect("read"), [1, 2, 3]);
        assert_eq!(store.read_file(&root.join("2/keylist")).expect("read"), b"old");
        assert!(!path.exists());
        assert!(!recover(&mut store, root).expect("nothing to recover"));
    }

    #[test]
    fn test_recover_drops_torn_progress_record() {
        let dir = tempdir().expect("create temp dir");
        let root = dir.path();
        let mut store = DirectoryStore::default();
        store.create_dir_all(&root.join("1")).expect("mkdir");
        store.write_file(&root.join("1/keylist"), b"old").expect("write");

        let ops = sample_plan();
        let path = journal_path(root);
        store.write_file(&path, &encode_plan(&ops)).expect("journal");
        apply(&mut store, root, &ops[0], false).expect("apply");
        store.append_file(&path, &encode_progress(0)).expect("progress");
        apply(&mut store, root, &ops[1], false).expect("apply");
        store
            .append_file(&path, &encode_progress(1)[..3])
            .expect("torn progress");

        assert!(recover(&mut store, root).expect("recover"));
        assert_eq!(store.read_file(&root.join("1/keylist")).expect("read"), [1, 2, 3]);
        assert_eq!(store.read_file(&root.join("2/keylist")).expect("read"), b"old");
        assert!(!path.exists());
    }

    #[test]
    fn test_recover_discards_corrupt_journal() {
        let dir = tempdir().expect("create temp dir");
        let root = dir.path();
        let mut store = DirectoryStore::default();
        let mut bytes = encode_plan(&sample_plan());
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        store.write_file(&journal_path(root), &bytes).expect("write");

        assert!(!recover(&mut store, root).expect("recover"));
        assert!(!journal_path(root).exists());
        assert!(!root.join("2").exists());
    }
}
