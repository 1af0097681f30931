//! Embedded transactional key-value store
//!
//! One store is one append-only log file holding named namespaces, each a
//! flat, ordered map from string keys to opaque byte values.
//!
//! # Design Principles
//!
//! - One write transaction = one checksummed commit frame
//! - A transaction is visible iff its frame is fully written and fsynced
//! - Single writer per file, enforced with an exclusive file lock
//! - Readers see committed state only
//!
//! The committed state is replayed into memory on open; the log is the
//! durable copy. `compact` rewrites the log down to the live state.
//!
//! # Recovery
//!
//! A frame cut short at the end of the log is a commit that never
//! completed; it is discarded and the file truncated. Any other framing or
//! checksum failure is corruption and halts the open.

mod errors;
mod reader;
mod record;
mod writer;

pub use errors::{Severity, StoreError, StoreErrorCode, StoreResult};
pub use record::{CommitFrame, LogOp};

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::observability::Logger;
use reader::{FrameRead, LogReader};
use writer::LogWriter;

type Entries = BTreeMap<String, Vec<u8>>;
type Namespaces = BTreeMap<String, Entries>;

/// Exclusive handle on one store file.
pub struct Store {
    writer: LogWriter,
    state: Arc<RwLock<Namespaces>>,
}

impl Store {
    /// Opens (or creates) the store at `path`, replaying its log.
    pub fn open(path: &Path) -> StoreResult<Self> {
        let mut writer = LogWriter::open(path)?;
        let mut state = Namespaces::new();
        let mut frames = 0u64;

        if writer.len() > 0 {
            let mut reader = LogReader::open(path)?;
            loop {
                match reader.read_next()? {
                    FrameRead::Frame(frame) => {
                        apply_frame(&mut state, frame, reader.current_offset())?;
                        frames += 1;
                    }
                    FrameRead::End => break,
                    FrameRead::TornTail { offset } => {
                        let discarded = (writer.len() - offset).to_string();
                        let offset_str = offset.to_string();
                        let path_str = path.display().to_string();
                        Logger::warn(
                            "STORE_TORN_TAIL_DISCARDED",
                            &[
                                ("bytes", discarded.as_str()),
                                ("offset", offset_str.as_str()),
                                ("path", path_str.as_str()),
                            ],
                        );
                        writer.truncate(offset)?;
                        break;
                    }
                }
            }
        }

        let frames = frames.to_string();
        let namespaces = state.len().to_string();
        let path_str = path.display().to_string();
        Logger::debug(
            "STORE_OPENED",
            &[
                ("frames", frames.as_str()),
                ("namespaces", namespaces.as_str()),
                ("path", path_str.as_str()),
            ],
        );

        Ok(Self {
            writer,
            state: Arc::new(RwLock::new(state)),
        })
    }

    pub fn path(&self) -> &Path {
        self.writer.path()
    }

    /// Size of the log file in bytes.
    pub fn log_len(&self) -> u64 {
        self.writer.len()
    }

    /// A read-only view of committed state, usable from other tasks.
    pub fn reader(&self) -> StoreReader {
        StoreReader {
            state: Arc::clone(&self.state),
        }
    }

    /// Starts the (only) write transaction.
    pub fn begin_write(&mut self) -> WriteTxn<'_> {
        WriteTxn {
            store: self,
            ops: Vec::new(),
            created: BTreeSet::new(),
            pending: BTreeMap::new(),
        }
    }

    /// Rewrites the log so it holds exactly one frame with the live state.
    pub fn compact(&mut self) -> StoreResult<()> {
        let before = self.writer.len();
        let frame = {
            let state = read_state(&self.state)?;
            let mut ops = Vec::new();
            for (namespace, entries) in state.iter() {
                ops.push(LogOp::CreateNamespace {
                    namespace: namespace.clone(),
                });
                for (key, value) in entries {
                    ops.push(LogOp::Put {
                        namespace: namespace.clone(),
                        key: key.clone(),
                        value: value.clone(),
                    });
                }
            }
            CommitFrame::new(ops)
        };

        let bytes = frame
            .serialize()
            .map_err(|e| StoreError::write_failed("Compacted state does not fit one frame", e))?;
        self.writer.rewrite(&bytes)?;

        let after = self.writer.len().to_string();
        let before = before.to_string();
        Logger::debug(
            "STORE_COMPACTED",
            &[("after", after.as_str()), ("before", before.as_str())],
        );
        Ok(())
    }
}

/// A pending write transaction.
///
/// Reads see committed state plus this transaction's own writes. Dropping
/// the transaction without `commit` discards everything.
pub struct WriteTxn<'a> {
    store: &'a mut Store,
    ops: Vec<LogOp>,
    created: BTreeSet<String>,
    pending: BTreeMap<(String, String), Vec<u8>>,
}

impl WriteTxn<'_> {
    fn namespace_exists(&self, namespace: &str) -> StoreResult<bool> {
        if self.created.contains(namespace) {
            return Ok(true);
        }
        Ok(read_state(&self.store.state)?.contains_key(namespace))
    }

    /// Creates `namespace` if it does not exist yet.
    pub fn create_namespace(&mut self, namespace: &str) -> StoreResult<()> {
        if !self.namespace_exists(namespace)? {
            self.created.insert(namespace.to_string());
            self.ops.push(LogOp::CreateNamespace {
                namespace: namespace.to_string(),
            });
        }
        Ok(())
    }

    pub fn get(&self, namespace: &str, key: &str) -> StoreResult<Option<Vec<u8>>> {
        if let Some(value) = self.pending.get(&(namespace.to_string(), key.to_string())) {
            return Ok(Some(value.clone()));
        }
        if self.created.contains(namespace) {
            return Ok(None);
        }
        let state = read_state(&self.store.state)?;
        let entries = state
            .get(namespace)
            .ok_or_else(|| StoreError::namespace_not_found(namespace))?;
        Ok(entries.get(key).cloned())
    }

    /// Writes `value` under `key`, replacing any previous value.
    pub fn put(&mut self, namespace: &str, key: &str, value: Vec<u8>) -> StoreResult<()> {
        if !self.namespace_exists(namespace)? {
            return Err(StoreError::namespace_not_found(namespace));
        }
        self.pending
            .insert((namespace.to_string(), key.to_string()), value.clone());
        self.ops.push(LogOp::Put {
            namespace: namespace.to_string(),
            key: key.to_string(),
            value,
        });
        Ok(())
    }

    /// Number of mutations this transaction would commit.
    pub fn op_count(&self) -> usize {
        self.ops.len()
    }

    /// Makes every mutation durable and visible, or none of them.
    pub fn commit(self) -> StoreResult<()> {
        if self.ops.is_empty() {
            return Ok(());
        }

        let frame = CommitFrame::new(self.ops);
        let bytes = frame
            .serialize()
            .map_err(|e| StoreError::write_failed("Transaction does not fit one frame", e))?;
        self.store.writer.append(&bytes)?;

        let offset = self.store.writer.len();
        let mut state = write_state(&self.store.state)?;
        apply_frame(&mut state, frame, offset)
    }
}

/// Read-only view of committed state.
#[derive(Clone)]
pub struct StoreReader {
    state: Arc<RwLock<Namespaces>>,
}

impl StoreReader {
    pub fn namespaces(&self) -> StoreResult<Vec<String>> {
        Ok(read_state(&self.state)?.keys().cloned().collect())
    }

    pub fn get(&self, namespace: &str, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let state = read_state(&self.state)?;
        let entries = state
            .get(namespace)
            .ok_or_else(|| StoreError::namespace_not_found(namespace))?;
        Ok(entries.get(key).cloned())
    }

    /// Number of keys in `namespace`.
    pub fn len(&self, namespace: &str) -> StoreResult<usize> {
        let state = read_state(&self.state)?;
        state
            .get(namespace)
            .map(BTreeMap::len)
            .ok_or_else(|| StoreError::namespace_not_found(namespace))
    }

    /// Copies out every entry of `namespace`, in key order.
    ///
    /// The copy is taken under one read lock, so it reflects a single
    /// committed state even while a writer is active.
    pub fn scan(&self, namespace: &str) -> StoreResult<Vec<(String, Vec<u8>)>> {
        let state = read_state(&self.state)?;
        let entries = state
            .get(namespace)
            .ok_or_else(|| StoreError::namespace_not_found(namespace))?;
        Ok(entries
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}

fn read_state(state: &RwLock<Namespaces>) -> StoreResult<RwLockReadGuard<'_, Namespaces>> {
    state
        .read()
        .map_err(|_| StoreError::poisoned("Store state lock poisoned"))
}

fn write_state(state: &RwLock<Namespaces>) -> StoreResult<RwLockWriteGuard<'_, Namespaces>> {
    state
        .write()
        .map_err(|_| StoreError::poisoned("Store state lock poisoned"))
}

fn apply_frame(state: &mut Namespaces, frame: CommitFrame, offset: u64) -> StoreResult<()> {
    for op in frame.ops {
        match op {
            LogOp::CreateNamespace { namespace } => {
                state.entry(namespace).or_default();
            }
            LogOp::Put {
                namespace,
                key,
                value,
            } => {
                let entries = state.get_mut(&namespace).ok_or_else(|| {
                    StoreError::corruption_at_offset(
                        offset,
                        format!("Put into unknown namespace: {}", namespace),
                    )
                })?;
                entries.insert(key, value);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_temp() -> (TempDir, Store) {
        let dir = TempDir::new().unwrap();
        let store = Store::open(&dir.path().join("cat.tdx")).unwrap();
        (dir, store)
    }

    #[test]
    fn test_commit_makes_writes_visible() {
        let (_dir, mut store) = open_temp();
        let reader = store.reader();

        let mut txn = store.begin_write();
        txn.create_namespace("13").unwrap();
        txn.put("13", "cellA", vec![1]).unwrap();
        assert_eq!(txn.get("13", "cellA").unwrap(), Some(vec![1]));
        assert!(reader.namespaces().unwrap().is_empty());
        txn.commit().unwrap();

        assert_eq!(reader.get("13", "cellA").unwrap(), Some(vec![1]));
    }

    #[test]
    fn test_dropped_txn_leaves_nothing() {
        let (_dir, mut store) = open_temp();
        {
            let mut txn = store.begin_write();
            txn.create_namespace("13").unwrap();
            txn.put("13", "cellA", vec![1]).unwrap();
        }
        assert_eq!(store.log_len(), 0);
        assert!(store.reader().namespaces().unwrap().is_empty());
    }

    #[test]
    fn test_put_requires_namespace() {
        let (_dir, mut store) = open_temp();
        let mut txn = store.begin_write();
        let err = txn.put("missing", "k", vec![]).unwrap_err();
        assert_eq!(err.code(), StoreErrorCode::NamespaceNotFound);
    }

    #[test]
    fn test_empty_commit_writes_no_frame() {
        let (_dir, mut store) = open_temp();
        let mut txn = store.begin_write();
        txn.create_namespace("1").unwrap();
        txn.commit().unwrap();
        let len = store.log_len();

        let mut txn = store.begin_write();
        txn.create_namespace("1").unwrap();
        assert_eq!(txn.op_count(), 0);
        txn.commit().unwrap();
        assert_eq!(store.log_len(), len);
    }

    #[test]
    fn test_scan_is_key_ordered() {
        let (_dir, mut store) = open_temp();
        let mut txn = store.begin_write();
        txn.create_namespace("2").unwrap();
        for key in ["c", "a", "b"] {
            txn.put("2", key, key.as_bytes().to_vec()).unwrap();
        }
        txn.commit().unwrap();

        let keys: Vec<_> = store
            .reader()
            .scan("2")
            .unwrap()
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(keys, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_compact_preserves_live_state() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cat.tdx");
        {
            let mut store = Store::open(&path).unwrap();
            for i in 0..20u8 {
                let mut txn = store.begin_write();
                txn.create_namespace("5").unwrap();
                txn.put("5", "same", vec![i; 64]).unwrap();
                txn.commit().unwrap();
            }
            let before = store.log_len();
            store.compact().unwrap();
            assert!(store.log_len() < before);

            let mut txn = store.begin_write();
            txn.put("5", "other", vec![7]).unwrap();
            txn.commit().unwrap();
        }

        let store = Store::open(&path).unwrap();
        let reader = store.reader();
        assert_eq!(reader.get("5", "same").unwrap(), Some(vec![19; 64]));
        assert_eq!(reader.get("5", "other").unwrap(), Some(vec![7]));
        assert_eq!(reader.len("5").unwrap(), 2);
    }
}
