//! Store Durability Tests
//!
//! Tests for:
//! - An interrupted final commit is discarded on reopen
//! - Corruption inside the log is never ignored, even in a length prefix
//! - Transactions are all-or-nothing
//! - Compaction keeps the live state

use std::fs::{self, OpenOptions};

use tempfile::TempDir;

use trackdex::store::{Store, StoreErrorCode};

// =============================================================================
// Test Utilities
// =============================================================================

fn create_temp_data_dir() -> TempDir {
    TempDir::new().expect("Failed to create temp dir")
}

/// Commits `key` = `value` into namespace "cells" and returns the log length.
fn put(store: &mut Store, key: &str, value: &[u8]) -> u64 {
    let mut txn = store.begin_write();
    txn.create_namespace("cells").unwrap();
    txn.put("cells", key, value.to_vec()).unwrap();
    txn.commit().unwrap();
    store.log_len()
}

// =============================================================================
// Torn writes
// =============================================================================

#[test]
fn test_truncated_final_frame_is_discarded() {
    let temp_dir = create_temp_data_dir();
    let path = temp_dir.path().join("store.log");

    let first_len;
    {
        let mut store = Store::open(&path).unwrap();
        first_len = put(&mut store, "a", b"one");
        put(&mut store, "b", b"two");
    }

    // Cut the second commit in half
    let full = fs::metadata(&path).unwrap().len();
    let file = OpenOptions::new().write(true).open(&path).unwrap();
    file.set_len(first_len + (full - first_len) / 2).unwrap();
    drop(file);

    let store = Store::open(&path).unwrap();
    let reader = store.reader();
    assert_eq!(reader.get("cells", "a").unwrap(), Some(b"one".to_vec()));
    assert_eq!(reader.get("cells", "b").unwrap(), None);
    assert_eq!(store.log_len(), first_len);
    assert_eq!(fs::metadata(&path).unwrap().len(), first_len);
}

#[test]
fn test_store_writable_after_torn_tail_recovery() {
    let temp_dir = create_temp_data_dir();
    let path = temp_dir.path().join("store.log");

    {
        let mut store = Store::open(&path).unwrap();
        put(&mut store, "a", b"one");
    }
    let mut contents = fs::read(&path).unwrap();
    contents.extend_from_slice(&[7, 0, 0]);
    fs::write(&path, contents).unwrap();

    {
        let mut store = Store::open(&path).unwrap();
        put(&mut store, "b", b"two");
    }

    let store = Store::open(&path).unwrap();
    assert_eq!(store.reader().len("cells").unwrap(), 2);
}

// =============================================================================
// Corruption
// =============================================================================

#[test]
fn test_flipped_byte_is_fatal_corruption() {
    let temp_dir = create_temp_data_dir();
    let path = temp_dir.path().join("store.log");

    let first_len;
    {
        let mut store = Store::open(&path).unwrap();
        first_len = put(&mut store, "a", b"a fairly long value to corrupt");
        put(&mut store, "b", b"two");
    }

    let mut contents = fs::read(&path).unwrap();
    let target = (first_len / 2) as usize;
    contents[target] ^= 0xFF;
    fs::write(&path, contents).unwrap();

    let err = match Store::open(&path) {
        Err(e) => e,
        Ok(_) => panic!("corrupted store opened"),
    };
    assert_eq!(err.code(), StoreErrorCode::DataCorruption);
    assert!(err.is_fatal());
}

#[test]
fn test_corrupted_length_prefix_halts_open() {
    let temp_dir = create_temp_data_dir();
    let path = temp_dir.path().join("store.log");

    {
        let mut store = Store::open(&path).unwrap();
        put(&mut store, "a", b"one");
        put(&mut store, "b", b"two");
        put(&mut store, "c", b"three");
    }

    // A high bit in the first frame's length now points past EOF
    let mut contents = fs::read(&path).unwrap();
    contents[3] ^= 0x40;
    fs::write(&path, &contents).unwrap();
    let len = contents.len() as u64;

    let err = match Store::open(&path) {
        Err(e) => e,
        Ok(_) => panic!("store with a damaged length opened"),
    };
    assert_eq!(err.code(), StoreErrorCode::DataCorruption);
    assert!(err.is_fatal());

    // Nothing was truncated away
    assert_eq!(fs::metadata(&path).unwrap().len(), len);
}

// =============================================================================
// Atomicity
// =============================================================================

#[test]
fn test_dropped_transaction_leaves_no_trace() {
    let temp_dir = create_temp_data_dir();
    let path = temp_dir.path().join("store.log");

    let mut store = Store::open(&path).unwrap();
    put(&mut store, "a", b"one");
    let len = store.log_len();

    {
        let mut txn = store.begin_write();
        txn.put("cells", "b", b"two".to_vec()).unwrap();
        txn.put("cells", "a", b"changed".to_vec()).unwrap();
        assert_eq!(txn.get("cells", "a").unwrap(), Some(b"changed".to_vec()));
    }

    assert_eq!(store.log_len(), len);
    let reader = store.reader();
    assert_eq!(reader.get("cells", "a").unwrap(), Some(b"one".to_vec()));
    assert_eq!(reader.get("cells", "b").unwrap(), None);
}

#[test]
fn test_put_into_missing_namespace_fails() {
    let temp_dir = create_temp_data_dir();
    let mut store = Store::open(&temp_dir.path().join("store.log")).unwrap();
    let mut txn = store.begin_write();
    let err = txn.put("nowhere", "k", vec![1]).unwrap_err();
    assert_eq!(err.code(), StoreErrorCode::NamespaceNotFound);
}

// =============================================================================
// Compaction
// =============================================================================

#[test]
fn test_compaction_keeps_latest_values() {
    let temp_dir = create_temp_data_dir();
    let path = temp_dir.path().join("store.log");

    {
        let mut store = Store::open(&path).unwrap();
        for i in 0..20u8 {
            put(&mut store, "hot", &[i; 64]);
        }
        put(&mut store, "cold", b"x");
        let before = store.log_len();
        store.compact().unwrap();
        assert!(store.log_len() < before);

        // Still writable after the rewrite
        put(&mut store, "late", b"y");
    }

    let store = Store::open(&path).unwrap();
    let reader = store.reader();
    assert_eq!(reader.get("cells", "hot").unwrap(), Some(vec![19u8; 64]));
    assert_eq!(reader.get("cells", "cold").unwrap(), Some(b"x".to_vec()));
    assert_eq!(reader.get("cells", "late").unwrap(), Some(b"y".to_vec()));
    assert!(!path.with_extension("compact").exists());
}
